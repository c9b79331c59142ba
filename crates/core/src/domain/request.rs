use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Mints a new id in the `BR-<YYYYMMDD>-<4 alphanumeric>` format the
    /// rest of the system (and its printed paperwork) keys on.
    pub fn mint(now: DateTime<Utc>) -> Self {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let mut rng = rand::thread_rng();
        let suffix: String =
            (0..4).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect();
        Self(format!("BR-{}-{}", now.format("%Y%m%d"), suffix))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetDuration {
    Annually,
    Quarterly,
    Monthly,
}

impl BudgetDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annually => "Annually",
            Self::Quarterly => "Quarterly",
            Self::Monthly => "Monthly",
        }
    }
}

impl FromStr for BudgetDuration {
    type Err = WorkflowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "annually" => Ok(Self::Annually),
            "quarterly" => Ok(Self::Quarterly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(WorkflowError::UnknownDuration { value: raw.to_string() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    MoreInfoRequested,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::MoreInfoRequested => "more_info_requested",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl FromStr for RequestStatus {
    type Err = WorkflowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "more_info_requested" => Ok(Self::MoreInfoRequested),
            _ => Err(WorkflowError::UnknownStatus { value: raw.to_string() }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetRequest {
    pub request_id: RequestId,
    pub account_id: i64,
    pub department_code: String,
    pub campus_code: String,
    pub academic_year: String,
    pub budget_title: String,
    pub description: String,
    pub fund_account: String,
    pub fund_name: String,
    pub duration: BudgetDuration,
    pub proposed_budget: Decimal,
    pub approved_budget: Option<Decimal>,
    pub status: RequestStatus,
    pub current_approval_level: Option<i64>,
    pub total_approval_levels: i64,
    pub workflow_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl BudgetRequest {
    /// No approval level has acted on the request yet. The owner may delete
    /// it, and edit it without workflow side effects, only in this window.
    pub fn is_untouched(&self) -> bool {
        self.status == RequestStatus::Pending
            && !self.workflow_complete
            && self.current_approval_level.map_or(true, |level| level <= 1)
    }
}
