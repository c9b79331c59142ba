use thiserror::Error;

use crate::domain::account::Role;
use crate::domain::request::RequestStatus;

/// Every way a workflow call can fail. The engine never reports failure
/// without one of these kinds; callers translate them at the transport edge
/// and rely on the transaction boundary to leave state untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no policy row for department `{department_code}` at level {level}")]
    PolicyNotFound { department_code: String, level: i64 },
    #[error("no approval policy defined for department `{department_code}`")]
    NoPolicyDefined { department_code: String },
    #[error("workflow already initialized for request `{request_id}`")]
    AlreadyInitialized { request_id: String },
    #[error("budget request `{request_id}` not found")]
    RequestNotFound { request_id: String },
    #[error("account {account_id} not found")]
    AccountNotFound { account_id: i64 },
    #[error("request is not pending (status: {status:?})")]
    NotPending { status: RequestStatus },
    #[error("request workflow has already been completed")]
    WorkflowAlreadyComplete,
    #[error("request is assigned to a different approver (expected role: {expected_role})")]
    NotAssignedApprover { expected_role: Role },
    #[error("approval level {level} is not pending")]
    LevelNotPending { level: i64 },
    #[error("unknown approval action `{value}`")]
    UnknownAction { value: String },
    #[error("unknown role `{value}`")]
    UnknownRole { value: String },
    #[error("unknown status `{value}`")]
    UnknownStatus { value: String },
    #[error("unknown duration `{value}`")]
    UnknownDuration { value: String },
    #[error("no information request found at level {level}")]
    NoInfoRequestFound { level: i64 },
    #[error("amendments require a fully approved request (`{request_id}` is not)")]
    AmendmentNotAllowed { request_id: String },
    #[error("storage conflict: {0}")]
    StorageConflict(String),
}

impl WorkflowError {
    /// Stable machine-readable kind, used by the HTTP layer and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PolicyNotFound { .. } => "policy_not_found",
            Self::NoPolicyDefined { .. } => "no_policy_defined",
            Self::AlreadyInitialized { .. } => "already_initialized",
            Self::RequestNotFound { .. } => "request_not_found",
            Self::AccountNotFound { .. } => "account_not_found",
            Self::NotPending { .. } => "not_pending",
            Self::WorkflowAlreadyComplete => "workflow_already_complete",
            Self::NotAssignedApprover { .. } => "not_assigned_approver",
            Self::LevelNotPending { .. } => "level_not_pending",
            Self::UnknownAction { .. } => "unknown_action",
            Self::UnknownRole { .. } => "unknown_role",
            Self::UnknownStatus { .. } => "unknown_status",
            Self::UnknownDuration { .. } => "unknown_duration",
            Self::NoInfoRequestFound { .. } => "no_info_request_found",
            Self::AmendmentNotAllowed { .. } => "amendment_not_allowed",
            Self::StorageConflict(_) => "storage_conflict",
        }
    }

    /// Conflicts are worth retrying; everything else is a caller mistake or
    /// a state the caller must first change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageConflict(_))
    }
}
