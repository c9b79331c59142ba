use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::request::RequestStatus;
use crate::errors::WorkflowError;

/// What an approver can do to the active level of a request. Raw action
/// strings are converted at the edge; the engine only sees this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    RequestInfo,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestInfo => "request_info",
        }
    }
}

impl FromStr for ApprovalAction {
    type Err = WorkflowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "request_info" => Ok(Self::RequestInfo),
            _ => Err(WorkflowError::UnknownAction { value: raw.to_string() }),
        }
    }
}

/// What a successful action did to the request, as reported back to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub status: RequestStatus,
    pub current_level: i64,
    pub total_levels: i64,
    pub complete: bool,
}

/// Where an action sends the chain. Produced by the pure transition function
/// and executed transactionally by the persistence engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Active level approved, a higher level remains.
    Advance { next_level: i64 },
    /// Final level approved; the whole request is approved and complete.
    CompleteApproved,
    /// Rejected at the active level; terminal regardless of level.
    CompleteRejected,
    /// Suspended at the active level awaiting more information.
    SuspendForInfo,
}

/// How the active level's assignment relates to the actor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssignmentDecision {
    /// The actor already holds the assignment.
    AlreadyAssigned,
    /// Unassigned or assigned elsewhere, but the actor holds the expected
    /// role; bind (or rebind) the level to the actor.
    AssignToActor,
}
