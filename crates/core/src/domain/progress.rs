use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;
use crate::errors::WorkflowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    Pending,
    Approved,
    Rejected,
    RequestInfo,
}

impl LevelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RequestInfo => "request_info",
        }
    }
}

impl FromStr for LevelStatus {
    type Err = WorkflowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "request_info" => Ok(Self::RequestInfo),
            _ => Err(WorkflowError::UnknownStatus { value: raw.to_string() }),
        }
    }
}

/// Ledger row for one approval level of one request. Unique on
/// (request_id, approval_level); mutated only by the workflow engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalProgress {
    pub request_id: RequestId,
    pub approval_level: i64,
    pub status: LevelStatus,
    pub approver_id: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub comments: String,
}

impl ApprovalProgress {
    pub fn unassigned(request_id: RequestId, approval_level: i64) -> Self {
        Self {
            request_id,
            approval_level,
            status: LevelStatus::Pending,
            approver_id: None,
            timestamp: None,
            comments: String::new(),
        }
    }
}
