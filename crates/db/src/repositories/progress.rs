use std::str::FromStr;

use sqlx::Row;

use budgetflow_core::domain::progress::{ApprovalProgress, LevelStatus};
use budgetflow_core::domain::request::RequestId;

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

/// Read side of the approval-progress ledger. All writes go through the
/// workflow engine's transaction; nothing here mutates.
pub struct SqlProgressRepository {
    pool: DbPool,
}

pub(crate) fn row_to_progress(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ApprovalProgress, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let status_str: String = row.try_get("status").map_err(decode)?;
    let timestamp_str: Option<String> = row.try_get("timestamp").map_err(decode)?;

    Ok(ApprovalProgress {
        request_id: RequestId(row.try_get("request_id").map_err(decode)?),
        approval_level: row.try_get("approval_level").map_err(decode)?,
        status: LevelStatus::from_str(&status_str)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        approver_id: row.try_get("approver_id").map_err(decode)?,
        timestamp: timestamp_str.as_deref().map(parse_timestamp).transpose()?,
        comments: row.try_get("comments").map_err(decode)?,
    })
}

impl SqlProgressRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn rows_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalProgress>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, approval_level, status, approver_id, timestamp, comments
             FROM approval_progress WHERE request_id = ? ORDER BY approval_level",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_progress).collect()
    }

    pub async fn row_for_level(
        &self,
        request_id: &RequestId,
        level: i64,
    ) -> Result<Option<ApprovalProgress>, RepositoryError> {
        let row = sqlx::query(
            "SELECT request_id, approval_level, status, approver_id, timestamp, comments
             FROM approval_progress WHERE request_id = ? AND approval_level = ?",
        )
        .bind(&request_id.0)
        .bind(level)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_progress(row)?)),
            None => Ok(None),
        }
    }
}
