use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use budgetflow_core::domain::amendment::{AmendmentStatus, BudgetAmendment};
use budgetflow_core::domain::request::{RequestId, RequestStatus};
use budgetflow_core::errors::WorkflowError;

use super::{parse_amount, parse_timestamp, storage, RepositoryError};
use crate::DbPool;

/// Append-only ledger of post-approval changes. Amendments never touch the
/// approval chain; they only record what changed after it closed.
pub struct SqlAmendmentRepository {
    pool: DbPool,
}

#[derive(Clone, Debug)]
pub struct NewAmendment {
    pub amendment_type: String,
    pub title: String,
    pub reason: String,
    pub amended_total: Decimal,
    pub created_by: i64,
}

fn row_to_amendment(row: &sqlx::sqlite::SqliteRow) -> Result<BudgetAmendment, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let status_str: String = row.try_get("status").map_err(decode)?;
    let original_str: String = row.try_get("original_total").map_err(decode)?;
    let amended_str: String = row.try_get("amended_total").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;

    Ok(BudgetAmendment {
        request_id: RequestId(row.try_get("request_id").map_err(decode)?),
        amendment_number: row.try_get("amendment_number").map_err(decode)?,
        amendment_type: row.try_get("amendment_type").map_err(decode)?,
        title: row.try_get("title").map_err(decode)?,
        reason: row.try_get("reason").map_err(decode)?,
        original_total: parse_amount(&original_str)?,
        amended_total: parse_amount(&amended_str)?,
        status: AmendmentStatus::from_str(&status_str)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        created_by: row.try_get("created_by").map_err(decode)?,
        approved_by: row.try_get("approved_by").map_err(decode)?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

impl SqlAmendmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Appends an amendment against a fully approved request. The parent
    /// must be `approved` with a complete workflow; the amendment number is
    /// the next in the request's sequence, assigned inside the transaction.
    pub async fn append(
        &self,
        request_id: &RequestId,
        new: NewAmendment,
    ) -> Result<BudgetAmendment, WorkflowError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let parent = sqlx::query(
            "SELECT status, workflow_complete, COALESCE(approved_budget, proposed_budget) AS total
             FROM budget_request WHERE request_id = ?",
        )
        .bind(&request_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let Some(parent) = parent else {
            return Err(WorkflowError::RequestNotFound { request_id: request_id.0.clone() });
        };
        let status: String = parent.get("status");
        let complete: bool = parent.get("workflow_complete");
        if status != RequestStatus::Approved.as_str() || !complete {
            return Err(WorkflowError::AmendmentNotAllowed { request_id: request_id.0.clone() });
        }
        let original_total: String = parent.get("total");

        let next_number: i64 = sqlx::query(
            "SELECT COALESCE(MAX(amendment_number), 0) + 1 AS next
             FROM budget_amendments WHERE request_id = ?",
        )
        .bind(&request_id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?
        .get("next");

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO budget_amendments (request_id, amendment_number, amendment_type, title,
                                            reason, original_total, amended_total, status,
                                            created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&request_id.0)
        .bind(next_number)
        .bind(&new.amendment_type)
        .bind(&new.title)
        .bind(&new.reason)
        .bind(&original_total)
        .bind(new.amended_total.to_string())
        .bind(new.created_by)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        Ok(BudgetAmendment {
            request_id: request_id.clone(),
            amendment_number: next_number,
            amendment_type: new.amendment_type,
            title: new.title,
            reason: new.reason,
            original_total: parse_amount(&original_total)
                .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
            amended_total: new.amended_total,
            status: AmendmentStatus::Pending,
            created_by: new.created_by,
            approved_by: None,
            created_at: now,
        })
    }

    /// Newest first, matching how the detail screen shows them.
    pub async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<BudgetAmendment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, amendment_number, amendment_type, title, reason, original_total,
                    amended_total, status, created_by, approved_by, created_at
             FROM budget_amendments WHERE request_id = ? ORDER BY amendment_number DESC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_amendment).collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use budgetflow_core::errors::WorkflowError;

    use super::{NewAmendment, SqlAmendmentRepository};
    use crate::fixtures::{seed_minimal, seeded_approved_request, seeded_pending_request};
    use crate::{connect_with_settings, migrations};

    fn amendment(created_by: i64) -> NewAmendment {
        NewAmendment {
            amendment_type: "budget_change".to_string(),
            title: "Vendor price increase".to_string(),
            reason: "Hardware quote expired".to_string(),
            amended_total: Decimal::new(900, 0),
            created_by,
        }
    }

    #[tokio::test]
    async fn appends_numbered_amendments_to_approved_requests() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_minimal(&pool).await.expect("seed");
        let request_id = seeded_approved_request(&pool).await.expect("seed request");

        let repo = SqlAmendmentRepository::new(pool);

        let first = repo.append(&request_id, amendment(2)).await.expect("append");
        assert_eq!(first.amendment_number, 1);
        assert_eq!(first.original_total, Decimal::new(800, 0));

        let second = repo.append(&request_id, amendment(2)).await.expect("append");
        assert_eq!(second.amendment_number, 2);

        let listed = repo.list_for_request(&request_id).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].amendment_number, 2, "newest first");
    }

    #[tokio::test]
    async fn refuses_amendments_against_unfinished_workflows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_minimal(&pool).await.expect("seed");
        let request_id = seeded_pending_request(&pool).await.expect("seed request");

        let repo = SqlAmendmentRepository::new(pool);
        let error = repo.append(&request_id, amendment(2)).await.expect_err("must refuse");
        assert!(matches!(error, WorkflowError::AmendmentNotAllowed { .. }));
    }
}
