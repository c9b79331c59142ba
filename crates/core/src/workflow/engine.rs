//! Pure decision half of the workflow engine. Every function here is a
//! total function over snapshots; the transactional half in the db crate
//! loads state, asks these functions what to do, and persists the answer.

use crate::domain::account::{Account, Role};
use crate::domain::progress::{ApprovalProgress, LevelStatus};
use crate::domain::request::{BudgetRequest, RequestStatus};
use crate::errors::WorkflowError;
use crate::workflow::states::{ApprovalAction, AssignmentDecision, Transition};

/// Gate checks that precede any action: the request must still be pending
/// and its chain unfinished. A terminal status counts as a finished chain
/// even if the completion flag failed to land.
pub fn ensure_actionable(request: &BudgetRequest) -> Result<(), WorkflowError> {
    if request.workflow_complete || request.status.is_terminal() {
        return Err(WorkflowError::WorkflowAlreadyComplete);
    }
    if request.status != RequestStatus::Pending {
        return Err(WorkflowError::NotPending { status: request.status });
    }
    Ok(())
}

/// Decides who the active level is bound to once the actor shows up.
///
/// An unassigned level, or one assigned to somebody else, is handed to the
/// actor when the actor holds the level's expected role (role-based
/// handoff). Anything else is a hard refusal.
pub fn decide_assignment(
    row: &ApprovalProgress,
    actor: &Account,
    expected_role: Role,
) -> Result<AssignmentDecision, WorkflowError> {
    // Requester accounts never act on a level, even one somehow bound to
    // them.
    if !actor.role.can_act_on_approvals() {
        return Err(WorkflowError::NotAssignedApprover { expected_role });
    }
    match row.approver_id {
        Some(assigned) if assigned == actor.id => Ok(AssignmentDecision::AlreadyAssigned),
        _ if actor.role == expected_role => Ok(AssignmentDecision::AssignToActor),
        _ => Err(WorkflowError::NotAssignedApprover { expected_role }),
    }
}

/// The state transition itself. Assumes the gate checks and assignment
/// decision have already passed; rejects a non-pending active row to defend
/// against double submission.
pub fn decide_transition(
    row: &ApprovalProgress,
    action: ApprovalAction,
    active_level: i64,
    total_levels: i64,
) -> Result<Transition, WorkflowError> {
    if row.status != LevelStatus::Pending {
        return Err(WorkflowError::LevelNotPending { level: active_level });
    }

    Ok(match action {
        ApprovalAction::Approve if active_level >= total_levels => Transition::CompleteApproved,
        ApprovalAction::Approve => Transition::Advance { next_level: active_level + 1 },
        ApprovalAction::Reject => Transition::CompleteRejected,
        ApprovalAction::RequestInfo => Transition::SuspendForInfo,
    })
}

/// A resume is only meaningful against a level suspended by `request_info`.
pub fn ensure_resumable(row: &ApprovalProgress) -> Result<(), WorkflowError> {
    if row.status != LevelStatus::RequestInfo {
        return Err(WorkflowError::NoInfoRequestFound { level: row.approval_level });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{decide_assignment, decide_transition, ensure_actionable, ensure_resumable};
    use crate::domain::account::{Account, Role};
    use crate::domain::progress::{ApprovalProgress, LevelStatus};
    use crate::domain::request::{BudgetDuration, BudgetRequest, RequestId, RequestStatus};
    use crate::errors::WorkflowError;
    use crate::workflow::states::{ApprovalAction, AssignmentDecision, Transition};

    fn request(status: RequestStatus, complete: bool) -> BudgetRequest {
        BudgetRequest {
            request_id: RequestId("BR-20260115-AAAA".to_string()),
            account_id: 1,
            department_code: "CS".to_string(),
            campus_code: "MAIN".to_string(),
            academic_year: "2026-2027".to_string(),
            budget_title: "Lab upgrades".to_string(),
            description: String::new(),
            fund_account: String::new(),
            fund_name: String::new(),
            duration: BudgetDuration::Annually,
            proposed_budget: Decimal::new(1000, 0),
            approved_budget: None,
            status,
            current_approval_level: Some(1),
            total_approval_levels: 2,
            workflow_complete: complete,
            created_at: Utc::now(),
        }
    }

    fn row(status: LevelStatus, approver_id: Option<i64>) -> ApprovalProgress {
        ApprovalProgress {
            request_id: RequestId("BR-20260115-AAAA".to_string()),
            approval_level: 1,
            status,
            approver_id,
            timestamp: None,
            comments: String::new(),
        }
    }

    fn actor(id: i64, role: Role) -> Account {
        Account {
            id,
            name: format!("account-{id}"),
            username_email: format!("a{id}@campus.edu"),
            role,
            department_code: Some("CS".to_string()),
        }
    }

    #[test]
    fn gate_rejects_non_pending_request() {
        let error = ensure_actionable(&request(RequestStatus::MoreInfoRequested, false))
            .expect_err("must reject");
        assert!(matches!(error, WorkflowError::NotPending { .. }));
    }

    #[test]
    fn gate_rejects_completed_workflow() {
        let mut req = request(RequestStatus::Pending, true);
        req.workflow_complete = true;
        assert_eq!(ensure_actionable(&req), Err(WorkflowError::WorkflowAlreadyComplete));
    }

    #[test]
    fn gate_treats_terminal_status_as_completed_chain() {
        // Terminal status with a stale completion flag still closes the gate.
        let req = request(RequestStatus::Rejected, false);
        assert_eq!(ensure_actionable(&req), Err(WorkflowError::WorkflowAlreadyComplete));
    }

    #[test]
    fn assignment_is_noop_for_the_assigned_actor() {
        let decision = decide_assignment(
            &row(LevelStatus::Pending, Some(5)),
            &actor(5, Role::Approver),
            Role::Approver,
        )
        .expect("assigned actor may act");
        assert_eq!(decision, AssignmentDecision::AlreadyAssigned);
    }

    #[test]
    fn role_match_rebinds_level_to_actor() {
        // Assigned to account 5, but account 9 holds the expected role.
        let decision = decide_assignment(
            &row(LevelStatus::Pending, Some(5)),
            &actor(9, Role::Dean),
            Role::Dean,
        )
        .expect("role holder may take over");
        assert_eq!(decision, AssignmentDecision::AssignToActor);
    }

    #[test]
    fn wrong_role_is_refused() {
        let error = decide_assignment(
            &row(LevelStatus::Pending, Some(5)),
            &actor(9, Role::Approver),
            Role::Dean,
        )
        .expect_err("wrong role must be refused");
        assert_eq!(error, WorkflowError::NotAssignedApprover { expected_role: Role::Dean });
    }

    #[test]
    fn requester_is_refused_even_when_bound_to_the_level() {
        let error = decide_assignment(
            &row(LevelStatus::Pending, Some(5)),
            &actor(5, Role::Requester),
            Role::Approver,
        )
        .expect_err("requester may never act");
        assert_eq!(error, WorkflowError::NotAssignedApprover { expected_role: Role::Approver });
    }

    #[test]
    fn unassigned_level_binds_to_role_holder() {
        let decision = decide_assignment(
            &row(LevelStatus::Pending, None),
            &actor(9, Role::Approver),
            Role::Approver,
        )
        .expect("unassigned level accepts role holder");
        assert_eq!(decision, AssignmentDecision::AssignToActor);
    }

    #[test]
    fn approve_below_top_advances() {
        let transition =
            decide_transition(&row(LevelStatus::Pending, Some(1)), ApprovalAction::Approve, 1, 2)
                .expect("advance");
        assert_eq!(transition, Transition::Advance { next_level: 2 });
    }

    #[test]
    fn approve_at_top_completes() {
        let transition =
            decide_transition(&row(LevelStatus::Pending, Some(1)), ApprovalAction::Approve, 2, 2)
                .expect("complete");
        assert_eq!(transition, Transition::CompleteApproved);
    }

    #[test]
    fn reject_is_terminal_at_any_level() {
        let transition =
            decide_transition(&row(LevelStatus::Pending, Some(1)), ApprovalAction::Reject, 1, 3)
                .expect("reject");
        assert_eq!(transition, Transition::CompleteRejected);
    }

    #[test]
    fn request_info_suspends_without_advancing() {
        let transition = decide_transition(
            &row(LevelStatus::Pending, Some(1)),
            ApprovalAction::RequestInfo,
            1,
            3,
        )
        .expect("suspend");
        assert_eq!(transition, Transition::SuspendForInfo);
    }

    #[test]
    fn acted_row_defends_against_double_submission() {
        let error =
            decide_transition(&row(LevelStatus::Approved, Some(1)), ApprovalAction::Approve, 1, 2)
                .expect_err("second submission must fail");
        assert_eq!(error, WorkflowError::LevelNotPending { level: 1 });
    }

    #[test]
    fn resume_requires_request_info_state() {
        ensure_resumable(&row(LevelStatus::RequestInfo, Some(1))).expect("resumable");
        let error =
            ensure_resumable(&row(LevelStatus::Pending, Some(1))).expect_err("not resumable");
        assert_eq!(error, WorkflowError::NoInfoRequestFound { level: 1 });
    }
}
