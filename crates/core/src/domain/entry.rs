use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

/// One itemized line of a budget request. `row_num` is 1-based and unique
/// within the request; `approved_amount` is only ever written by the
/// final-level override overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetEntry {
    pub request_id: RequestId,
    pub row_num: i64,
    pub gl_code: String,
    pub description: String,
    pub remarks: String,
    pub amount: Decimal,
    pub approved_amount: Option<Decimal>,
}

impl BudgetEntry {
    /// Override-else-proposed amount, the value every total is summed from.
    pub fn effective_amount(&self) -> Decimal {
        self.approved_amount.unwrap_or(self.amount)
    }
}

pub fn proposed_total(entries: &[BudgetEntry]) -> Decimal {
    entries.iter().map(|entry| entry.amount).sum()
}

pub fn effective_total(entries: &[BudgetEntry]) -> Decimal {
    entries.iter().map(BudgetEntry::effective_amount).sum()
}
