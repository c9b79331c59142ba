//! Deterministic seed data for demos and tests: one campus, three
//! departments (two with approval ladders, one deliberately without), and a
//! small cast of accounts covering every role.

use chrono::Utc;

use budgetflow_core::domain::request::RequestId;

use crate::repositories::RepositoryError;
use crate::DbPool;

const ACCOUNTS: &[(i64, &str, &str, &str, Option<&str>)] = &[
    (1, "Rhea Santos", "requester.cs@campus.edu", "requester", Some("CS")),
    (2, "Marco Dela Cruz", "approver.cs@campus.edu", "approver", Some("CS")),
    (3, "Elena Alvarez", "dean.cs@campus.edu", "dean", Some("CS")),
    (4, "Vic Ramos", "vp.finance@campus.edu", "vp_finance", None),
    (5, "Paula Reyes", "head.fin@campus.edu", "department_head", Some("FIN")),
    (6, "Joel Bautista", "approver2.cs@campus.edu", "approver", Some("CS")),
];

const POLICIES: &[(&str, i64, &str)] = &[
    ("CS", 1, "approver"),
    ("CS", 2, "dean"),
    ("FIN", 1, "department_head"),
    ("FIN", 2, "dean"),
    ("FIN", 3, "vp_finance"),
];

/// Seeds the directory and policy tables. Idempotent; safe to run against a
/// database that already carries the seed.
pub async fn seed_minimal(pool: &DbPool) -> Result<(), RepositoryError> {
    sqlx::query("INSERT OR IGNORE INTO campus (code, name) VALUES ('MAIN', 'Main Campus')")
        .execute(pool)
        .await?;

    for (code, college) in
        [("CS", "College of Computing"), ("FIN", "Finance Office"), ("ART", "College of Arts")]
    {
        sqlx::query("INSERT OR IGNORE INTO department (code, college) VALUES (?, ?)")
            .bind(code)
            .bind(college)
            .execute(pool)
            .await?;
    }

    for (id, name, email, role, department) in ACCOUNTS {
        sqlx::query(
            "INSERT OR IGNORE INTO account (id, name, username_email, role, department_code)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role)
        .bind(department)
        .execute(pool)
        .await?;
    }

    for (department, level, role) in POLICIES {
        sqlx::query(
            "INSERT OR IGNORE INTO approval_workflow (department_code, approval_level, approver_role)
             VALUES (?, ?, ?)",
        )
        .bind(department)
        .bind(level)
        .bind(role)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Row counts of the seeded directory, for operator tooling to report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedSummary {
    pub accounts: i64,
    pub departments: i64,
    pub policy_rows: i64,
}

pub async fn seed_summary(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
    use sqlx::Row;

    let count = |table: &str| format!("SELECT COUNT(*) AS count FROM {table}");
    let accounts: i64 = sqlx::query(&count("account")).fetch_one(pool).await?.get("count");
    let departments: i64 = sqlx::query(&count("department")).fetch_one(pool).await?.get("count");
    let policy_rows: i64 =
        sqlx::query(&count("approval_workflow")).fetch_one(pool).await?.get("count");

    Ok(SeedSummary { accounts, departments, policy_rows })
}

async fn insert_request_with_entries(
    pool: &DbPool,
    request_id: &str,
    status: &str,
    current_level: Option<i64>,
    total_levels: i64,
    complete: bool,
) -> Result<RequestId, RepositoryError> {
    sqlx::query(
        "INSERT OR IGNORE INTO budget_request
             (request_id, account_id, department_code, campus_code, academic_year, budget_title,
              description, duration, proposed_budget, status, current_approval_level,
              total_approval_levels, workflow_complete, created_at)
         VALUES (?, 1, 'CS', 'MAIN', '2026-2027', 'Seeded request', 'seed fixture', 'Annually',
                 '800', ?, ?, ?, ?, ?)",
    )
    .bind(request_id)
    .bind(status)
    .bind(current_level)
    .bind(total_levels)
    .bind(complete)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    for (row_num, gl_code, description, amount) in
        [(1, "5010", "Workstations", "500"), (2, "5020", "Software licenses", "300")]
    {
        sqlx::query(
            "INSERT OR IGNORE INTO budget_entries
                 (request_id, row_num, gl_code, budget_description, amount)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(row_num)
        .bind(gl_code)
        .bind(description)
        .bind(amount)
        .execute(pool)
        .await?;
    }

    Ok(RequestId(request_id.to_string()))
}

/// A pending request with an uninitialized workflow, the state every new
/// submission starts in.
pub async fn seeded_pending_request(pool: &DbPool) -> Result<RequestId, RepositoryError> {
    insert_request_with_entries(pool, "BR-20260110-SEED", "pending", None, 0, false).await
}

/// A fully approved request with a closed two-level chain, the state
/// amendments attach to.
pub async fn seeded_approved_request(pool: &DbPool) -> Result<RequestId, RepositoryError> {
    let request_id =
        insert_request_with_entries(pool, "BR-20260105-APRV", "approved", Some(2), 2, true).await?;

    for (level, approver_id) in [(1_i64, 2_i64), (2, 3)] {
        sqlx::query(
            "INSERT OR IGNORE INTO approval_progress
                 (request_id, approval_level, status, approver_id, timestamp, comments)
             VALUES (?, ?, 'approved', ?, ?, '')",
        )
        .bind(&request_id.0)
        .bind(level)
        .bind(approver_id)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    }

    Ok(request_id)
}
