use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use budgetflow_core::domain::entry::{proposed_total, BudgetEntry};
use budgetflow_core::domain::request::{
    BudgetDuration, BudgetRequest, RequestId, RequestStatus,
};
use budgetflow_core::errors::WorkflowError;

use super::{parse_amount, parse_timestamp, storage, RepositoryError};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

#[derive(Clone, Debug)]
pub struct NewBudgetEntry {
    pub gl_code: String,
    pub description: String,
    pub remarks: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug)]
pub struct NewBudgetRequest {
    pub account_id: i64,
    pub department_code: String,
    pub campus_code: String,
    pub academic_year: String,
    pub budget_title: String,
    pub description: String,
    pub fund_account: String,
    pub fund_name: String,
    pub duration: BudgetDuration,
    pub entries: Vec<NewBudgetEntry>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestSort {
    #[default]
    Latest,
    Oldest,
    AmountHigh,
    AmountLow,
}

#[derive(Clone, Debug, Default)]
pub struct RequestFilter {
    /// Restrict to one owner (requester dashboards); `None` lists all.
    pub account_id: Option<i64>,
    pub status: Option<RequestStatus>,
    /// Matched against request id and title, `LIKE %term%`.
    pub search: Option<String>,
    pub sort: RequestSort,
}

pub(crate) fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<BudgetRequest, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let status_str: String = row.try_get("status").map_err(decode)?;
    let duration_str: String = row.try_get("duration").map_err(decode)?;
    let proposed_str: String = row.try_get("proposed_budget").map_err(decode)?;
    let approved_str: Option<String> = row.try_get("approved_budget").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;

    Ok(BudgetRequest {
        request_id: RequestId(row.try_get("request_id").map_err(decode)?),
        account_id: row.try_get("account_id").map_err(decode)?,
        department_code: row.try_get("department_code").map_err(decode)?,
        campus_code: row.try_get("campus_code").map_err(decode)?,
        academic_year: row.try_get("academic_year").map_err(decode)?,
        budget_title: row.try_get("budget_title").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        fund_account: row.try_get("fund_account").map_err(decode)?,
        fund_name: row.try_get("fund_name").map_err(decode)?,
        duration: BudgetDuration::from_str(&duration_str)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        proposed_budget: parse_amount(&proposed_str)?,
        approved_budget: approved_str.as_deref().map(parse_amount).transpose()?,
        status: RequestStatus::from_str(&status_str)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        current_approval_level: row.try_get("current_approval_level").map_err(decode)?,
        total_approval_levels: row.try_get("total_approval_levels").map_err(decode)?,
        workflow_complete: row.try_get("workflow_complete").map_err(decode)?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

pub(crate) fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<BudgetEntry, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let amount_str: String = row.try_get("amount").map_err(decode)?;
    let approved_str: Option<String> = row.try_get("approved_amount").map_err(decode)?;

    Ok(BudgetEntry {
        request_id: RequestId(row.try_get("request_id").map_err(decode)?),
        row_num: row.try_get("row_num").map_err(decode)?,
        gl_code: row.try_get("gl_code").map_err(decode)?,
        description: row.try_get("budget_description").map_err(decode)?,
        remarks: row.try_get("remarks").map_err(decode)?,
        amount: parse_amount(&amount_str)?,
        approved_amount: approved_str.as_deref().map(parse_amount).transpose()?,
    })
}

const REQUEST_COLUMNS: &str = "request_id, account_id, department_code, campus_code, \
     academic_year, budget_title, description, fund_account, fund_name, duration, \
     proposed_budget, approved_budget, status, current_approval_level, \
     total_approval_levels, workflow_complete, created_at";

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts the request and all of its entries in one transaction. The
    /// request id is minted here; entry row numbers are assigned 1-based in
    /// submission order and the proposed total is the sum of entry amounts.
    pub async fn create(&self, new: NewBudgetRequest) -> Result<BudgetRequest, RepositoryError> {
        let now = Utc::now();
        let request_id = RequestId::mint(now);

        let entries: Vec<BudgetEntry> = new
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| BudgetEntry {
                request_id: request_id.clone(),
                row_num: index as i64 + 1,
                gl_code: entry.gl_code.clone(),
                description: entry.description.clone(),
                remarks: entry.remarks.clone(),
                amount: entry.amount,
                approved_amount: None,
            })
            .collect();
        let proposed = proposed_total(&entries);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO budget_request (request_id, account_id, department_code, campus_code,
                                         academic_year, budget_title, description, fund_account,
                                         fund_name, duration, proposed_budget, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&request_id.0)
        .bind(new.account_id)
        .bind(&new.department_code)
        .bind(&new.campus_code)
        .bind(&new.academic_year)
        .bind(&new.budget_title)
        .bind(&new.description)
        .bind(&new.fund_account)
        .bind(&new.fund_name)
        .bind(new.duration.as_str())
        .bind(proposed.to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for entry in &entries {
            sqlx::query(
                "INSERT INTO budget_entries (request_id, row_num, gl_code, budget_description,
                                             remarks, amount)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.request_id.0)
            .bind(entry.row_num)
            .bind(&entry.gl_code)
            .bind(&entry.description)
            .bind(&entry.remarks)
            .bind(entry.amount.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(BudgetRequest {
            request_id,
            account_id: new.account_id,
            department_code: new.department_code,
            campus_code: new.campus_code,
            academic_year: new.academic_year,
            budget_title: new.budget_title,
            description: new.description,
            fund_account: new.fund_account,
            fund_name: new.fund_name,
            duration: new.duration,
            proposed_budget: proposed,
            approved_budget: None,
            status: RequestStatus::Pending,
            current_approval_level: None,
            total_approval_levels: 0,
            workflow_complete: false,
            created_at: now,
        })
    }

    pub async fn find(&self, id: &RequestId) -> Result<Option<BudgetRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM budget_request WHERE request_id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    pub async fn entries(&self, id: &RequestId) -> Result<Vec<BudgetEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, row_num, gl_code, budget_description, remarks, amount,
                    approved_amount
             FROM budget_entries WHERE request_id = ? ORDER BY row_num",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<BudgetRequest>, RepositoryError> {
        let mut sql = format!("SELECT {REQUEST_COLUMNS} FROM budget_request WHERE 1 = 1");
        if filter.account_id.is_some() {
            sql.push_str(" AND account_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.search.is_some() {
            sql.push_str(" AND (request_id LIKE ? OR budget_title LIKE ?)");
        }
        sql.push_str(match filter.sort {
            RequestSort::Latest => " ORDER BY created_at DESC",
            RequestSort::Oldest => " ORDER BY created_at ASC",
            // Amounts are stored as decimal text; CAST keeps ordering numeric.
            RequestSort::AmountHigh => " ORDER BY CAST(proposed_budget AS REAL) DESC",
            RequestSort::AmountLow => " ORDER BY CAST(proposed_budget AS REAL) ASC",
        });

        let mut query = sqlx::query(&sql);
        if let Some(account_id) = filter.account_id {
            query = query.bind(account_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            query = query.bind(pattern.clone()).bind(pattern);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_request).collect()
    }

    /// Owner-only delete, allowed while the request is pending and no level
    /// has acted. Cascades through amendments, progress, and entries in one
    /// transaction.
    pub async fn delete_pending(
        &self,
        id: &RequestId,
        owner_account_id: i64,
    ) -> Result<(), WorkflowError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM budget_request WHERE request_id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let request = match row {
            Some(ref row) => row_to_request(row)
                .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
            None => return Err(WorkflowError::RequestNotFound { request_id: id.0.clone() }),
        };

        if request.account_id != owner_account_id {
            return Err(WorkflowError::RequestNotFound { request_id: id.0.clone() });
        }
        if !request.is_untouched() {
            return Err(WorkflowError::NotPending { status: request.status });
        }

        for table in ["budget_amendments", "approval_progress", "budget_entries", "history"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE request_id = ?"))
                .bind(&id.0)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }
        sqlx::query("DELETE FROM budget_request WHERE request_id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    /// Owner-only edit of header fields and entries. Allowed while the
    /// request is untouched, and also while it sits suspended at
    /// `more_info_requested`: that edit is how the requester supplies the
    /// missing information, so it re-opens the flagged level in the same
    /// transaction. Entries are replaced wholesale and the proposed total
    /// recomputed.
    pub async fn update_editable(
        &self,
        id: &RequestId,
        owner_account_id: i64,
        update: NewBudgetRequest,
    ) -> Result<BudgetRequest, WorkflowError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM budget_request WHERE request_id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let existing = match row {
            Some(ref row) => row_to_request(row)
                .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
            None => return Err(WorkflowError::RequestNotFound { request_id: id.0.clone() }),
        };

        if existing.account_id != owner_account_id {
            return Err(WorkflowError::RequestNotFound { request_id: id.0.clone() });
        }
        let supplying_info = existing.status == RequestStatus::MoreInfoRequested;
        if !existing.is_untouched() && !supplying_info {
            return Err(WorkflowError::NotPending { status: existing.status });
        }

        let entries: Vec<BudgetEntry> = update
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| BudgetEntry {
                request_id: id.clone(),
                row_num: index as i64 + 1,
                gl_code: entry.gl_code.clone(),
                description: entry.description.clone(),
                remarks: entry.remarks.clone(),
                amount: entry.amount,
                approved_amount: None,
            })
            .collect();
        let proposed = proposed_total(&entries);

        sqlx::query(
            "UPDATE budget_request
             SET academic_year = ?, budget_title = ?, description = ?, fund_account = ?,
                 fund_name = ?, duration = ?, proposed_budget = ?
             WHERE request_id = ?",
        )
        .bind(&update.academic_year)
        .bind(&update.budget_title)
        .bind(&update.description)
        .bind(&update.fund_account)
        .bind(&update.fund_name)
        .bind(update.duration.as_str())
        .bind(proposed.to_string())
        .bind(&id.0)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("DELETE FROM budget_entries WHERE request_id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        for entry in &entries {
            sqlx::query(
                "INSERT INTO budget_entries (request_id, row_num, gl_code, budget_description,
                                             remarks, amount)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.request_id.0)
            .bind(entry.row_num)
            .bind(&entry.gl_code)
            .bind(&entry.description)
            .bind(&entry.remarks)
            .bind(entry.amount.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        if supplying_info {
            resume_flagged_level(&mut tx, id, &existing, owner_account_id).await?;
        }

        tx.commit().await.map_err(storage)?;

        Ok(BudgetRequest {
            academic_year: update.academic_year,
            budget_title: update.budget_title,
            description: update.description,
            fund_account: update.fund_account,
            fund_name: update.fund_name,
            duration: update.duration,
            proposed_budget: proposed,
            status: RequestStatus::Pending,
            ..existing
        })
    }
}

/// The suspended edit's second half: put the `request_info` row back to
/// pending, lift the request out of `more_info_requested`, and note the
/// supplied information in the activity trail.
async fn resume_flagged_level(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &RequestId,
    existing: &BudgetRequest,
    owner_account_id: i64,
) -> Result<(), WorkflowError> {
    let flagged: Option<i64> = sqlx::query(
        "SELECT approval_level FROM approval_progress
         WHERE request_id = ? AND status = 'request_info'",
    )
    .bind(&id.0)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?
    .map(|row| row.get("approval_level"));

    let level = flagged.ok_or(WorkflowError::NoInfoRequestFound {
        level: existing.current_approval_level.unwrap_or(0),
    })?;

    sqlx::query(
        "UPDATE approval_progress
         SET status = 'pending', timestamp = NULL, comments = ''
         WHERE request_id = ? AND approval_level = ?",
    )
    .bind(&id.0)
    .bind(level)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;

    sqlx::query("UPDATE budget_request SET status = 'pending' WHERE request_id = ?")
        .bind(&id.0)
        .execute(&mut **tx)
        .await
        .map_err(storage)?;

    sqlx::query("INSERT INTO history (request_id, account_id, action, timestamp) VALUES (?, ?, ?, ?)")
        .bind(&id.0)
        .bind(owner_account_id)
        .bind("info_provided")
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(storage)?;

    Ok(())
}
