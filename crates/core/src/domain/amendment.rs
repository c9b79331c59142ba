use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;
use crate::errors::WorkflowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentStatus {
    Pending,
    Approved,
    Rejected,
}

impl AmendmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for AmendmentStatus {
    type Err = WorkflowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(WorkflowError::UnknownStatus { value: raw.to_string() }),
        }
    }
}

/// Post-approval change record. Amendments form an append-only ledger per
/// request, numbered from 1, and never re-open the approval chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetAmendment {
    pub request_id: RequestId,
    pub amendment_number: i64,
    pub amendment_type: String,
    pub title: String,
    pub reason: String,
    pub original_total: Decimal,
    pub amended_total: Decimal,
    pub status: AmendmentStatus,
    pub created_by: i64,
    pub approved_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}
