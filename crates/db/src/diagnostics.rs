//! Structural readiness probes over the directory and policy tables,
//! reported by `budgetflow doctor`.

use sqlx::Row;

use crate::repositories::RepositoryError;
use crate::DbPool;

/// True once the migrated schema is in place.
pub async fn schema_present(pool: &DbPool) -> Result<bool, RepositoryError> {
    let count: i64 = sqlx::query(
        "SELECT COUNT(*) AS count FROM sqlite_master
         WHERE type = 'table' AND name IN ('approval_workflow', 'account', 'budget_request')",
    )
    .fetch_one(pool)
    .await?
    .get("count");
    Ok(count == 3)
}

/// Departments whose approval ladder is malformed. Levels must start at 1
/// and be contiguous; a gap strands every request in that department
/// mid-chain.
pub async fn ladder_defects(pool: &DbPool) -> Result<Vec<String>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT department_code,
                MIN(approval_level) AS first_level,
                MAX(approval_level) AS last_level,
                COUNT(*) AS level_count
         FROM approval_workflow
         GROUP BY department_code
         ORDER BY department_code",
    )
    .fetch_all(pool)
    .await?;

    let mut defects = Vec::new();
    for row in rows {
        let department: String = row.get("department_code");
        let first: i64 = row.get("first_level");
        let last: i64 = row.get("last_level");
        let count: i64 = row.get("level_count");
        if first != 1 {
            defects.push(format!("{department}: ladder starts at level {first}, not 1"));
        } else if last != count {
            defects.push(format!("{department}: ladder has gaps between levels 1 and {last}"));
        }
    }
    Ok(defects)
}

/// Roles a ladder names that no account in the directory holds. A request
/// reaching such a level could never be assigned.
pub async fn uncovered_roles(pool: &DbPool) -> Result<Vec<String>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT DISTINCT approver_role FROM approval_workflow
         WHERE approver_role NOT IN (SELECT role FROM account)
         ORDER BY approver_role",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| row.get("approver_role")).collect())
}
