//! Transactional half of the workflow engine. The pure decision functions
//! live in `budgetflow_core::workflow`; this module loads state, asks them
//! what to do, and persists the answer atomically. Every public operation is
//! one transaction: on any failure the request and its progress ledger are
//! left exactly as they were.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{Row, Sqlite, Transaction};
use tracing::{info, warn};

use budgetflow_core::audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use budgetflow_core::domain::account::{Account, Role};
use budgetflow_core::domain::progress::{ApprovalProgress, LevelStatus};
use budgetflow_core::domain::request::{BudgetRequest, RequestId, RequestStatus};
use budgetflow_core::errors::WorkflowError;
use budgetflow_core::workflow::{
    apply_overrides, decide_assignment, decide_transition, ensure_actionable, ensure_resumable,
    select_approver, ApprovalAction, AssignmentDecision, ResolvedAssignment, Transition,
    WorkflowOutcome,
};

use crate::repositories::account::row_to_account;
use crate::repositories::progress::row_to_progress;
use crate::repositories::request::{row_to_entry, row_to_request};
use crate::repositories::{parse_timestamp, storage};
use crate::DbPool;

pub struct WorkflowEngine {
    pool: DbPool,
    audit: Arc<dyn AuditSink>,
}

/// One line of a request's approval history, enriched with the approver's
/// display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalHistoryEntry {
    pub approval_level: i64,
    pub status: LevelStatus,
    pub approver_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub comments: String,
}

/// One line of a request's activity trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub action: String,
    pub actor_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEngine {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, audit: Arc::new(NoopAuditSink) }
    }

    pub fn with_audit_sink(pool: DbPool, audit: Arc<dyn AuditSink>) -> Self {
        Self { pool, audit }
    }

    /// Creates the progress ledger for a request: one pending, unassigned
    /// row per policy level, and moves the request to level 1. Normally
    /// invoked lazily by [`process_approval`](Self::process_approval), but
    /// exposed for callers that want to initialize eagerly.
    pub async fn initialize_workflow(&self, request_id: &RequestId) -> Result<i64, WorkflowError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let request = load_request(&mut tx, request_id).await?;
        let total = init_in_tx(&mut tx, &request).await?;
        tx.commit().await.map_err(storage)?;

        info!(
            event_name = "workflow.initialized",
            correlation_id = %request_id.0,
            request_id = %request_id.0,
            total_levels = total,
            "approval chain created"
        );

        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                request_id.0.clone(),
                "workflow.initialized",
                AuditCategory::Workflow,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("total_levels", total.to_string()),
        );
        Ok(total)
    }

    /// Applies one approver action to the request's active level.
    ///
    /// Self-heals an uninitialized workflow, lazily resolves or re-binds the
    /// level's assignment, applies final-level amount overrides before the
    /// terminal transition, advances or terminates the chain, and appends to
    /// the activity trail. All inside a single transaction; the
    /// status-conditional update on the progress row is the double-submission
    /// guard, so the loser of a race observes `LevelNotPending`.
    pub async fn process_approval(
        &self,
        request_id: &RequestId,
        actor_account_id: i64,
        action: ApprovalAction,
        comments: &str,
        approved_amounts: Option<&BTreeMap<i64, Decimal>>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let result = self
            .process_approval_inner(request_id, actor_account_id, action, comments, approved_amounts)
            .await;

        let (event_type, outcome) = match &result {
            Ok(applied) => {
                info!(
                    event_name = "workflow.action_applied",
                    correlation_id = %request_id.0,
                    request_id = %request_id.0,
                    account_id = actor_account_id,
                    action = action.as_str(),
                    status = applied.status.as_str(),
                    current_level = applied.current_level,
                    "approval action applied"
                );
                ("workflow.action_applied", AuditOutcome::Success)
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.action_rejected",
                    correlation_id = %request_id.0,
                    request_id = %request_id.0,
                    account_id = actor_account_id,
                    action = action.as_str(),
                    error_kind = error.kind(),
                    "approval action rejected"
                );
                ("workflow.action_rejected", AuditOutcome::Rejected)
            }
        };
        let mut event = AuditEvent::new(
            Some(request_id.clone()),
            request_id.0.clone(),
            event_type,
            AuditCategory::Workflow,
            format!("account-{actor_account_id}"),
            outcome,
        )
        .with_metadata("action", action.as_str());
        if let Err(error) = &result {
            event = event.with_metadata("error", error.kind());
        }
        self.audit.emit(event);

        result
    }

    async fn process_approval_inner(
        &self,
        request_id: &RequestId,
        actor_account_id: i64,
        action: ApprovalAction,
        comments: &str,
        approved_amounts: Option<&BTreeMap<i64, Decimal>>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let mut request = load_request(&mut tx, request_id).await?;
        if request.current_approval_level.is_none() {
            init_in_tx(&mut tx, &request).await?;
            request = load_request(&mut tx, request_id).await?;
        }

        ensure_actionable(&request)?;
        let active_level = request
            .current_approval_level
            .ok_or_else(|| WorkflowError::StorageConflict("workflow level vanished".to_string()))?;

        let mut row = load_progress_row(&mut tx, request_id, active_level)
            .await?
            .ok_or_else(|| WorkflowError::StorageConflict("missing progress row".to_string()))?;
        let actor = load_account(&mut tx, actor_account_id).await?;
        let expected_role = load_expected_role(&mut tx, &request.department_code, active_level)
            .await?;

        // Lazy assignment: bind the level to a role holder the first time it
        // is acted upon, preferring the request's own department.
        if row.approver_id.is_none() {
            if let Some(resolved) =
                resolve_approver(&mut tx, &request.department_code, expected_role).await?
            {
                assign_approver(&mut tx, request_id, active_level, resolved.id).await?;
                row.approver_id = Some(resolved.id);
            }
        }

        match decide_assignment(&row, &actor, expected_role)? {
            AssignmentDecision::AlreadyAssigned => {}
            AssignmentDecision::AssignToActor => {
                assign_approver(&mut tx, request_id, active_level, actor.id).await?;
                row.approver_id = Some(actor.id);
            }
        }

        let transition =
            decide_transition(&row, action, active_level, request.total_approval_levels)?;

        // Overrides must land before the approved total and the terminal
        // transition so the total reflects them.
        if transition == Transition::CompleteApproved {
            if let Some(overrides) = approved_amounts {
                if !overrides.is_empty() {
                    persist_overrides(&mut tx, request_id, overrides).await?;
                }
            }
        }

        let now = Utc::now();
        let (row_status, new_status, complete) = match &transition {
            Transition::Advance { .. } => (LevelStatus::Approved, RequestStatus::Pending, false),
            Transition::CompleteApproved => {
                (LevelStatus::Approved, RequestStatus::Approved, true)
            }
            Transition::CompleteRejected => {
                (LevelStatus::Rejected, RequestStatus::Rejected, true)
            }
            Transition::SuspendForInfo => {
                (LevelStatus::RequestInfo, RequestStatus::MoreInfoRequested, false)
            }
        };

        // Double-submission guard: only a still-pending row may be acted on.
        let updated = sqlx::query(
            "UPDATE approval_progress
             SET status = ?, approver_id = ?, timestamp = ?, comments = ?
             WHERE request_id = ? AND approval_level = ? AND status = 'pending'",
        )
        .bind(row_status.as_str())
        .bind(row.approver_id)
        .bind(now.to_rfc3339())
        .bind(comments)
        .bind(&request_id.0)
        .bind(active_level)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        if updated.rows_affected() == 0 {
            return Err(WorkflowError::LevelNotPending { level: active_level });
        }

        let current_level = match &transition {
            Transition::Advance { next_level } => {
                sqlx::query(
                    "UPDATE budget_request SET current_approval_level = ? WHERE request_id = ?",
                )
                .bind(next_level)
                .bind(&request_id.0)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
                *next_level
            }
            _ => {
                sqlx::query(
                    "UPDATE budget_request SET status = ?, workflow_complete = ?
                     WHERE request_id = ?",
                )
                .bind(new_status.as_str())
                .bind(complete)
                .bind(&request_id.0)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
                active_level
            }
        };

        append_history(&mut tx, request_id, Some(actor.id), action.as_str(), now).await?;
        tx.commit().await.map_err(storage)?;

        Ok(WorkflowOutcome {
            status: new_status,
            current_level,
            total_levels: request.total_approval_levels,
            complete,
        })
    }

    /// Re-opens a level suspended by `request_info` once the requester has
    /// supplied the missing information. The level does not move; its row
    /// simply becomes pending again and the request leaves
    /// `more_info_requested`.
    pub async fn resume_after_info(
        &self,
        request_id: &RequestId,
        level: i64,
    ) -> Result<(), WorkflowError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        load_request(&mut tx, request_id).await?;
        let row = load_progress_row(&mut tx, request_id, level)
            .await?
            .ok_or(WorkflowError::NoInfoRequestFound { level })?;
        ensure_resumable(&row)?;

        sqlx::query(
            "UPDATE approval_progress
             SET status = 'pending', timestamp = NULL, comments = ''
             WHERE request_id = ? AND approval_level = ?",
        )
        .bind(&request_id.0)
        .bind(level)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("UPDATE budget_request SET status = 'pending' WHERE request_id = ?")
            .bind(&request_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        append_history(&mut tx, request_id, None, "info_provided", Utc::now()).await?;
        tx.commit().await.map_err(storage)?;

        info!(
            event_name = "workflow.resumed",
            correlation_id = %request_id.0,
            request_id = %request_id.0,
            level,
            "suspended level reopened"
        );

        self.audit.emit(AuditEvent::new(
            Some(request_id.clone()),
            request_id.0.clone(),
            "workflow.resumed",
            AuditCategory::Workflow,
            "requester",
            AuditOutcome::Success,
        ));
        Ok(())
    }

    /// Who a level is (or would be) assigned to. An already-bound level
    /// reports its approver; an unbound one reports the resolver's pick
    /// without persisting it, and an unresolvable one reports only the
    /// expected role.
    pub async fn assignment_for_level(
        &self,
        request_id: &RequestId,
        level: i64,
    ) -> Result<ResolvedAssignment, WorkflowError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let request = load_request(&mut tx, request_id).await?;
        let expected_role = load_expected_role(&mut tx, &request.department_code, level).await?;

        if let Some(row) = load_progress_row(&mut tx, request_id, level).await? {
            if let Some(approver_id) = row.approver_id {
                let approver = load_account(&mut tx, approver_id).await?;
                return Ok(ResolvedAssignment { expected_role, approver: Some(approver) });
            }
        }

        // Preview only: rank the role holders without binding the level.
        let candidates = load_role_holders(&mut tx, expected_role).await?;
        let approver =
            select_approver(&candidates, &request.department_code, expected_role).cloned();
        Ok(ResolvedAssignment { expected_role, approver })
    }

    pub async fn approval_history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalHistoryEntry>, WorkflowError> {
        let rows = sqlx::query(
            "SELECT ap.approval_level, ap.status, ap.timestamp, ap.comments,
                    acc.name AS approver_name
             FROM approval_progress ap
             LEFT JOIN account acc ON ap.approver_id = acc.id
             WHERE ap.request_id = ?
             ORDER BY ap.approval_level ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let status_str: String =
                    row.try_get("status").map_err(|e| WorkflowError::StorageConflict(e.to_string()))?;
                let timestamp_str: Option<String> = row
                    .try_get("timestamp")
                    .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?;
                Ok(ApprovalHistoryEntry {
                    approval_level: row
                        .try_get("approval_level")
                        .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
                    status: LevelStatus::from_str(&status_str)?,
                    approver_name: row
                        .try_get("approver_name")
                        .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
                    timestamp: timestamp_str
                        .as_deref()
                        .map(parse_timestamp)
                        .transpose()
                        .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
                    comments: row
                        .try_get("comments")
                        .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
                })
            })
            .collect()
    }

    /// The request's activity trail, newest first.
    pub async fn activity_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ActivityEntry>, WorkflowError> {
        let rows = sqlx::query(
            "SELECT h.action, h.timestamp, acc.name AS actor_name
             FROM history h
             LEFT JOIN account acc ON h.account_id = acc.id
             WHERE h.request_id = ?
             ORDER BY h.timestamp DESC, h.id DESC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let timestamp_str: String = row
                    .try_get("timestamp")
                    .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?;
                Ok(ActivityEntry {
                    action: row
                        .try_get("action")
                        .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
                    actor_name: row
                        .try_get("actor_name")
                        .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
                    timestamp: parse_timestamp(&timestamp_str)
                        .map_err(|e| WorkflowError::StorageConflict(e.to_string()))?,
                })
            })
            .collect()
    }
}

async fn load_request(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &RequestId,
) -> Result<BudgetRequest, WorkflowError> {
    let row = sqlx::query(
        "SELECT request_id, account_id, department_code, campus_code, academic_year,
                budget_title, description, fund_account, fund_name, duration, proposed_budget,
                approved_budget, status, current_approval_level, total_approval_levels,
                workflow_complete, created_at
         FROM budget_request WHERE request_id = ?",
    )
    .bind(&request_id.0)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?;

    match row {
        Some(ref row) => {
            row_to_request(row).map_err(|e| WorkflowError::StorageConflict(e.to_string()))
        }
        None => Err(WorkflowError::RequestNotFound { request_id: request_id.0.clone() }),
    }
}

async fn load_progress_row(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &RequestId,
    level: i64,
) -> Result<Option<ApprovalProgress>, WorkflowError> {
    let row = sqlx::query(
        "SELECT request_id, approval_level, status, approver_id, timestamp, comments
         FROM approval_progress WHERE request_id = ? AND approval_level = ?",
    )
    .bind(&request_id.0)
    .bind(level)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?;

    row.as_ref()
        .map(|row| row_to_progress(row).map_err(|e| WorkflowError::StorageConflict(e.to_string())))
        .transpose()
}

async fn load_account(
    tx: &mut Transaction<'_, Sqlite>,
    account_id: i64,
) -> Result<Account, WorkflowError> {
    let row = sqlx::query(
        "SELECT id, name, username_email, role, department_code FROM account WHERE id = ?",
    )
    .bind(account_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?;

    match row {
        Some(ref row) => {
            row_to_account(row).map_err(|e| WorkflowError::StorageConflict(e.to_string()))
        }
        None => Err(WorkflowError::AccountNotFound { account_id }),
    }
}

async fn load_expected_role(
    tx: &mut Transaction<'_, Sqlite>,
    department_code: &str,
    level: i64,
) -> Result<Role, WorkflowError> {
    let row = sqlx::query(
        "SELECT approver_role FROM approval_workflow
         WHERE department_code = ? AND approval_level = ?",
    )
    .bind(department_code)
    .bind(level)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?;

    match row {
        Some(row) => {
            let role_str: String =
                row.try_get("approver_role").map_err(|e| WorkflowError::StorageConflict(e.to_string()))?;
            Role::from_str(&role_str)
        }
        None => Err(WorkflowError::PolicyNotFound {
            department_code: department_code.to_string(),
            level,
        }),
    }
}

/// Same preference order as `budgetflow_core::workflow::select_approver`,
/// expressed in SQL: same-department holders first, then any holder, lowest
/// account id winning ties.
async fn resolve_approver(
    tx: &mut Transaction<'_, Sqlite>,
    department_code: &str,
    role: Role,
) -> Result<Option<Account>, WorkflowError> {
    let row = sqlx::query(
        "SELECT id, name, username_email, role, department_code
         FROM account
         WHERE role = ?
         ORDER BY CASE WHEN department_code = ? THEN 0 ELSE 1 END, id ASC
         LIMIT 1",
    )
    .bind(role.as_str())
    .bind(department_code)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?;

    row.as_ref()
        .map(|row| row_to_account(row).map_err(|e| WorkflowError::StorageConflict(e.to_string())))
        .transpose()
}

async fn load_role_holders(
    tx: &mut Transaction<'_, Sqlite>,
    role: Role,
) -> Result<Vec<Account>, WorkflowError> {
    let rows = sqlx::query(
        "SELECT id, name, username_email, role, department_code
         FROM account WHERE role = ? ORDER BY id",
    )
    .bind(role.as_str())
    .fetch_all(&mut **tx)
    .await
    .map_err(storage)?;

    rows.iter()
        .map(|row| row_to_account(row).map_err(|e| WorkflowError::StorageConflict(e.to_string())))
        .collect()
}

async fn assign_approver(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &RequestId,
    level: i64,
    approver_id: i64,
) -> Result<(), WorkflowError> {
    sqlx::query(
        "UPDATE approval_progress SET approver_id = ?
         WHERE request_id = ? AND approval_level = ?",
    )
    .bind(approver_id)
    .bind(&request_id.0)
    .bind(level)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(())
}

async fn init_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    request: &BudgetRequest,
) -> Result<i64, WorkflowError> {
    let existing: i64 =
        sqlx::query("SELECT COUNT(*) AS count FROM approval_progress WHERE request_id = ?")
            .bind(&request.request_id.0)
            .fetch_one(&mut **tx)
            .await
            .map_err(storage)?
            .get("count");
    if existing > 0 {
        return Err(WorkflowError::AlreadyInitialized {
            request_id: request.request_id.0.clone(),
        });
    }

    let levels: Vec<i64> = sqlx::query(
        "SELECT approval_level FROM approval_workflow
         WHERE department_code = ? ORDER BY approval_level",
    )
    .bind(&request.department_code)
    .fetch_all(&mut **tx)
    .await
    .map_err(storage)?
    .iter()
    .map(|row| row.get("approval_level"))
    .collect();

    if levels.is_empty() {
        return Err(WorkflowError::NoPolicyDefined {
            department_code: request.department_code.clone(),
        });
    }
    let total = *levels.iter().max().unwrap_or(&0);

    for level in &levels {
        let row = ApprovalProgress::unassigned(request.request_id.clone(), *level);
        sqlx::query(
            "INSERT INTO approval_progress
                 (request_id, approval_level, status, approver_id, timestamp, comments)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.request_id.0)
        .bind(row.approval_level)
        .bind(row.status.as_str())
        .bind(row.approver_id)
        .bind(row.timestamp.map(|t| t.to_rfc3339()))
        .bind(&row.comments)
        .execute(&mut **tx)
        .await
        .map_err(storage)?;
    }

    sqlx::query(
        "UPDATE budget_request SET current_approval_level = 1, total_approval_levels = ?
         WHERE request_id = ?",
    )
    .bind(total)
    .bind(&request.request_id.0)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;

    Ok(total)
}

async fn persist_overrides(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &RequestId,
    overrides: &BTreeMap<i64, Decimal>,
) -> Result<(), WorkflowError> {
    let rows = sqlx::query(
        "SELECT request_id, row_num, gl_code, budget_description, remarks, amount,
                approved_amount
         FROM budget_entries WHERE request_id = ? ORDER BY row_num",
    )
    .bind(&request_id.0)
    .fetch_all(&mut **tx)
    .await
    .map_err(storage)?;

    let mut entries = rows
        .iter()
        .map(|row| row_to_entry(row).map_err(|e| WorkflowError::StorageConflict(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    let result = apply_overrides(&mut entries, overrides);

    for entry in entries.iter().filter(|entry| result.overridden_rows.contains(&entry.row_num)) {
        sqlx::query(
            "UPDATE budget_entries SET approved_amount = ?
             WHERE request_id = ? AND row_num = ?",
        )
        .bind(entry.approved_amount.map(|amount| amount.to_string()))
        .bind(&request_id.0)
        .bind(entry.row_num)
        .execute(&mut **tx)
        .await
        .map_err(storage)?;
    }

    if result.should_persist_total() {
        sqlx::query("UPDATE budget_request SET approved_budget = ? WHERE request_id = ?")
            .bind(result.approved_total.to_string())
            .bind(&request_id.0)
            .execute(&mut **tx)
            .await
            .map_err(storage)?;
    }

    Ok(())
}

async fn append_history(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &RequestId,
    account_id: Option<i64>,
    action: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    sqlx::query("INSERT INTO history (request_id, account_id, action, timestamp) VALUES (?, ?, ?, ?)")
        .bind(&request_id.0)
        .bind(account_id)
        .bind(action)
        .bind(now.to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(storage)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use budgetflow_core::audit::InMemoryAuditSink;
    use budgetflow_core::domain::account::Role;
    use budgetflow_core::domain::progress::LevelStatus;
    use budgetflow_core::domain::request::{RequestId, RequestStatus};
    use budgetflow_core::errors::WorkflowError;
    use budgetflow_core::workflow::ApprovalAction;

    use super::WorkflowEngine;
    use crate::fixtures::{seed_minimal, seeded_pending_request};
    use crate::repositories::SqlRequestRepository;
    use crate::{connect_with_settings, migrations};

    const REQUESTER: i64 = 1;
    const CS_APPROVER: i64 = 2;
    const CS_DEAN: i64 = 3;
    const FIN_HEAD: i64 = 5;
    const SECOND_APPROVER: i64 = 6;

    async fn setup() -> (sqlx::SqlitePool, RequestId) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_minimal(&pool).await.expect("seed");
        let request_id = seeded_pending_request(&pool).await.expect("seed request");
        (pool, request_id)
    }

    #[tokio::test]
    async fn first_approval_initializes_assigns_and_advances() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool.clone());

        let outcome = engine
            .process_approval(&request_id, CS_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect("first approval");

        assert_eq!(outcome.status, RequestStatus::Pending);
        assert_eq!(outcome.current_level, 2);
        assert_eq!(outcome.total_levels, 2);
        assert!(!outcome.complete);

        let history = engine.approval_history(&request_id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, LevelStatus::Approved);
        assert_eq!(history[0].approver_name.as_deref(), Some("Marco Dela Cruz"));
        assert_eq!(history[1].status, LevelStatus::Pending);
        assert!(history[1].approver_name.is_none(), "next level stays unassigned until acted on");
    }

    #[tokio::test]
    async fn final_approval_completes_in_one_step() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool);

        engine
            .process_approval(&request_id, CS_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect("level 1");
        let outcome = engine
            .process_approval(&request_id, CS_DEAN, ApprovalAction::Approve, "looks good", None)
            .await
            .expect("level 2");

        assert_eq!(outcome.status, RequestStatus::Approved);
        assert_eq!(outcome.current_level, 2);
        assert!(outcome.complete);
    }

    #[tokio::test]
    async fn rejection_is_terminal_at_any_level() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool);

        let outcome = engine
            .process_approval(
                &request_id,
                CS_APPROVER,
                ApprovalAction::Reject,
                "budget too high",
                None,
            )
            .await
            .expect("reject");
        assert_eq!(outcome.status, RequestStatus::Rejected);
        assert!(outcome.complete);

        let error = engine
            .process_approval(&request_id, CS_DEAN, ApprovalAction::Approve, "", None)
            .await
            .expect_err("nothing may follow a rejection");
        assert!(matches!(
            error,
            WorkflowError::WorkflowAlreadyComplete | WorkflowError::NotPending { .. }
        ));
    }

    #[tokio::test]
    async fn request_info_suspends_then_resume_restores_the_chain() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool.clone());

        let outcome = engine
            .process_approval(
                &request_id,
                CS_APPROVER,
                ApprovalAction::RequestInfo,
                "need vendor quotes",
                None,
            )
            .await
            .expect("request info");
        assert_eq!(outcome.status, RequestStatus::MoreInfoRequested);
        assert_eq!(outcome.current_level, 1);
        assert!(!outcome.complete);

        // Suspended: no further action allowed until resumed.
        let error = engine
            .process_approval(&request_id, CS_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect_err("suspended request is not actionable");
        assert!(matches!(error, WorkflowError::NotPending { .. }));

        engine.resume_after_info(&request_id, 1).await.expect("resume");

        let outcome = engine
            .process_approval(&request_id, CS_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect("approve after resume");
        assert_eq!(outcome.current_level, 2);

        // The activity trail keeps the request_info episode even though the
        // ledger row was reset.
        let activity = engine.activity_for_request(&request_id).await.expect("activity");
        let actions: Vec<&str> = activity.iter().map(|entry| entry.action.as_str()).collect();
        assert!(actions.contains(&"request_info"));
        assert!(actions.contains(&"info_provided"));
        assert!(actions.contains(&"approve"));
    }

    #[tokio::test]
    async fn resume_requires_a_suspended_level() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool);

        let error = engine.resume_after_info(&request_id, 1).await.expect_err("nothing suspended");
        assert_eq!(error, WorkflowError::NoInfoRequestFound { level: 1 });
    }

    #[tokio::test]
    async fn wrong_role_cannot_take_the_level() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool);

        let error = engine
            .process_approval(&request_id, FIN_HEAD, ApprovalAction::Approve, "", None)
            .await
            .expect_err("department head is not level 1's role");
        assert_eq!(error, WorkflowError::NotAssignedApprover { expected_role: Role::Approver });
    }

    #[tokio::test]
    async fn role_holder_takes_over_an_assigned_level() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool.clone());
        engine.initialize_workflow(&request_id).await.expect("init");

        // Resolution would bind level 1 to the lowest-id approver (account
        // 2); the other CS approver acts instead and the level re-binds.
        let outcome = engine
            .process_approval(&request_id, SECOND_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect("handoff");
        assert_eq!(outcome.current_level, 2);

        let history = engine.approval_history(&request_id).await.expect("history");
        assert_eq!(history[0].approver_name.as_deref(), Some("Joel Bautista"));
    }

    #[tokio::test]
    async fn requester_cannot_act_on_a_level() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool);

        let error = engine
            .process_approval(&request_id, REQUESTER, ApprovalAction::Approve, "", None)
            .await
            .expect_err("requester holds no approver role");
        assert_eq!(error, WorkflowError::NotAssignedApprover { expected_role: Role::Approver });
    }

    #[tokio::test]
    async fn initialize_twice_is_rejected() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool);

        let total = engine.initialize_workflow(&request_id).await.expect("init");
        assert_eq!(total, 2);

        let error = engine.initialize_workflow(&request_id).await.expect_err("second init");
        assert!(matches!(error, WorkflowError::AlreadyInitialized { .. }));
    }

    #[tokio::test]
    async fn department_without_policy_cannot_initialize() {
        let (pool, _) = setup().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let engine = WorkflowEngine::new(pool);

        let created = repo
            .create(crate::repositories::NewBudgetRequest {
                account_id: REQUESTER,
                department_code: "ART".to_string(),
                campus_code: "MAIN".to_string(),
                academic_year: "2026-2027".to_string(),
                budget_title: "Gallery supplies".to_string(),
                description: String::new(),
                fund_account: String::new(),
                fund_name: String::new(),
                duration: budgetflow_core::domain::request::BudgetDuration::Annually,
                entries: vec![crate::repositories::NewBudgetEntry {
                    gl_code: "5010".to_string(),
                    description: "Canvas".to_string(),
                    remarks: String::new(),
                    amount: Decimal::new(100, 0),
                }],
            })
            .await
            .expect("create");

        let error = engine
            .process_approval(&created.request_id, CS_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect_err("no ladder defined");
        assert!(matches!(error, WorkflowError::NoPolicyDefined { department_code } if department_code == "ART"));
    }

    #[tokio::test]
    async fn unknown_request_and_actor_are_reported() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool);

        let missing = RequestId("BR-20260101-NONE".to_string());
        let error = engine
            .process_approval(&missing, CS_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect_err("missing request");
        assert!(matches!(error, WorkflowError::RequestNotFound { .. }));

        let error = engine
            .process_approval(&request_id, 999, ApprovalAction::Approve, "", None)
            .await
            .expect_err("missing account");
        assert_eq!(error, WorkflowError::AccountNotFound { account_id: 999 });
    }

    #[tokio::test]
    async fn final_level_overrides_land_before_completion() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool.clone());
        let repo = SqlRequestRepository::new(pool);

        engine
            .process_approval(&request_id, CS_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect("level 1");

        // Entries are 500 and 300; {1: 500, 2: 0} keeps row 1 at 500 and
        // ignores the non-positive override for row 2.
        let mut overrides = BTreeMap::new();
        overrides.insert(1, Decimal::new(500, 0));
        overrides.insert(2, Decimal::ZERO);

        let outcome = engine
            .process_approval(
                &request_id,
                CS_DEAN,
                ApprovalAction::Approve,
                "adjusted",
                Some(&overrides),
            )
            .await
            .expect("final approval");
        assert!(outcome.complete);

        let request = repo.find(&request_id).await.expect("find").expect("exists");
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.approved_budget, Some(Decimal::new(800, 0)));

        let entries = repo.entries(&request_id).await.expect("entries");
        assert_eq!(entries[0].approved_amount, Some(Decimal::new(500, 0)));
        assert_eq!(entries[1].approved_amount, None);
    }

    #[tokio::test]
    async fn overrides_are_ignored_below_the_final_level() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool.clone());
        let repo = SqlRequestRepository::new(pool);

        let mut overrides = BTreeMap::new();
        overrides.insert(1, Decimal::new(450, 0));

        engine
            .process_approval(&request_id, CS_APPROVER, ApprovalAction::Approve, "", Some(&overrides))
            .await
            .expect("level 1");

        let entries = repo.entries(&request_id).await.expect("entries");
        assert!(entries.iter().all(|entry| entry.approved_amount.is_none()));
        let request = repo.find(&request_id).await.expect("find").expect("exists");
        assert_eq!(request.approved_budget, None);
    }

    #[tokio::test]
    async fn assignment_preview_does_not_bind_the_level() {
        let (pool, request_id) = setup().await;
        let engine = WorkflowEngine::new(pool.clone());
        engine.initialize_workflow(&request_id).await.expect("init");

        let assignment = engine.assignment_for_level(&request_id, 1).await.expect("assignment");
        assert_eq!(assignment.expected_role, Role::Approver);
        assert_eq!(assignment.approver.as_ref().map(|a| a.id), Some(CS_APPROVER));

        // Preview must not have persisted anything.
        let history = engine.approval_history(&request_id).await.expect("history");
        assert!(history[0].approver_name.is_none());

        let error =
            engine.assignment_for_level(&request_id, 9).await.expect_err("undefined level");
        assert!(matches!(error, WorkflowError::PolicyNotFound { level: 9, .. }));
    }

    #[tokio::test]
    async fn concurrent_approvals_have_exactly_one_winner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_minimal(&pool).await.expect("seed");
        let request_id = seeded_pending_request(&pool).await.expect("seed request");

        let engine = Arc::new(WorkflowEngine::new(pool));
        engine.initialize_workflow(&request_id).await.expect("init");

        let first = {
            let engine = Arc::clone(&engine);
            let request_id = request_id.clone();
            tokio::spawn(async move {
                engine
                    .process_approval(&request_id, CS_APPROVER, ApprovalAction::Approve, "", None)
                    .await
            })
        };
        let second = {
            let engine = Arc::clone(&engine);
            let request_id = request_id.clone();
            tokio::spawn(async move {
                engine
                    .process_approval(&request_id, SECOND_APPROVER, ApprovalAction::Approve, "", None)
                    .await
            })
        };

        let results = [first.await.expect("join"), second.await.expect("join")];
        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1, "exactly one approval may claim the level: {results:?}");

        for result in &results {
            if let Err(error) = result {
                assert!(
                    matches!(
                        error,
                        WorkflowError::LevelNotPending { .. } | WorkflowError::StorageConflict(_)
                    ),
                    "loser must see a conflict, got {error:?}"
                );
            }
        }

        // Whatever the interleaving, the chain advanced exactly one level.
        let history = engine.approval_history(&request_id).await.expect("history");
        assert_eq!(history[0].status, LevelStatus::Approved);
        assert_eq!(history[1].status, LevelStatus::Pending);
    }

    #[tokio::test]
    async fn audit_sink_sees_applied_and_rejected_actions() {
        let (pool, request_id) = setup().await;
        let sink = InMemoryAuditSink::default();
        let engine = WorkflowEngine::with_audit_sink(pool, Arc::new(sink.clone()));

        engine
            .process_approval(&request_id, CS_APPROVER, ApprovalAction::Approve, "", None)
            .await
            .expect("approve");
        let _ = engine
            .process_approval(&request_id, FIN_HEAD, ApprovalAction::Approve, "", None)
            .await
            .expect_err("wrong role");

        let events = sink.events();
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert!(types.contains(&"workflow.action_applied"));
        assert!(types.contains(&"workflow.action_rejected"));

        let rejected = events
            .iter()
            .find(|event| event.event_type == "workflow.action_rejected")
            .expect("rejected event");
        assert_eq!(
            rejected.metadata.get("error").map(String::as_str),
            Some("not_assigned_approver")
        );
    }
}
