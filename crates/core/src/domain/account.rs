use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

/// Closed set of roles known to the approval ladder. Raw strings from the
/// transport layer are converted here and never travel further in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Approver,
    DepartmentHead,
    Dean,
    VpFinance,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Approver => "approver",
            Self::DepartmentHead => "department_head",
            Self::Dean => "dean",
            Self::VpFinance => "vp_finance",
        }
    }

    pub fn can_act_on_approvals(&self) -> bool {
        !matches!(self, Self::Requester)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "requester" => Ok(Self::Requester),
            "approver" => Ok(Self::Approver),
            "department_head" => Ok(Self::DepartmentHead),
            "dean" => Ok(Self::Dean),
            "vp_finance" => Ok(Self::VpFinance),
            _ => Err(WorkflowError::UnknownRole { value: raw.to_string() }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub username_email: String,
    pub role: Role,
    pub department_code: Option<String>,
}
