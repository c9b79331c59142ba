use serde::{Deserialize, Serialize};

use crate::domain::account::Role;

/// One row of the static per-department workflow policy: at `approval_level`,
/// a holder of `approver_role` must sign off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRow {
    pub department_code: String,
    pub approval_level: i64,
    pub approver_role: Role,
}

/// A department's full approval ladder, read-only at runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyTable {
    rows: Vec<PolicyRow>,
}

impl PolicyTable {
    pub fn new(mut rows: Vec<PolicyRow>) -> Self {
        rows.sort_by_key(|row| row.approval_level);
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PolicyRow] {
        &self.rows
    }

    /// Total levels for the department, defined as the highest level number
    /// present rather than the row count.
    pub fn total_levels(&self) -> i64 {
        self.rows.iter().map(|row| row.approval_level).max().unwrap_or(0)
    }

    pub fn role_for_level(&self, level: i64) -> Option<Role> {
        self.rows.iter().find(|row| row.approval_level == level).map(|row| row.approver_role)
    }
}
