use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::domain::entry::{effective_total, BudgetEntry};

/// Result of applying final-approver overrides to a request's entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayResult {
    /// Row numbers whose `approved_amount` was actually set.
    pub overridden_rows: Vec<i64>,
    /// Sum of override-else-proposed amounts across all entries.
    pub approved_total: Decimal,
}

impl OverlayResult {
    /// The recomputed total is only persisted when positive.
    pub fn should_persist_total(&self) -> bool {
        self.approved_total > Decimal::ZERO
    }
}

/// Applies per-row amount overrides in place. Only positive amounts count;
/// zero, negative, and unknown row numbers are ignored and those rows keep
/// their proposed amount. This is a pure data transform — the caller is
/// responsible for only invoking it from a final-level approve.
pub fn apply_overrides(
    entries: &mut [BudgetEntry],
    overrides: &BTreeMap<i64, Decimal>,
) -> OverlayResult {
    let mut overridden_rows = Vec::new();

    for entry in entries.iter_mut() {
        if let Some(amount) = overrides.get(&entry.row_num) {
            if *amount > Decimal::ZERO {
                entry.approved_amount = Some(*amount);
                overridden_rows.push(entry.row_num);
            }
        }
    }

    OverlayResult { overridden_rows, approved_total: effective_total(entries) }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::apply_overrides;
    use crate::domain::entry::BudgetEntry;
    use crate::domain::request::RequestId;

    fn entry(row_num: i64, amount: i64) -> BudgetEntry {
        BudgetEntry {
            request_id: RequestId("BR-20260115-AAAA".to_string()),
            row_num,
            gl_code: "5010".to_string(),
            description: format!("line {row_num}"),
            remarks: String::new(),
            amount: Decimal::new(amount, 0),
            approved_amount: None,
        }
    }

    #[test]
    fn positive_override_replaces_row_amount() {
        let mut entries = vec![entry(1, 500), entry(2, 300)];
        let mut overrides = BTreeMap::new();
        overrides.insert(1, Decimal::new(450, 0));

        let result = apply_overrides(&mut entries, &overrides);

        assert_eq!(result.overridden_rows, vec![1]);
        assert_eq!(entries[0].approved_amount, Some(Decimal::new(450, 0)));
        assert_eq!(entries[1].approved_amount, None);
        assert_eq!(result.approved_total, Decimal::new(750, 0));
    }

    #[test]
    fn zero_override_is_ignored_and_row_falls_back() {
        // {1: 500, 2: 0} over amounts [500, 300]: row 2 keeps 300.
        let mut entries = vec![entry(1, 500), entry(2, 300)];
        let mut overrides = BTreeMap::new();
        overrides.insert(1, Decimal::new(500, 0));
        overrides.insert(2, Decimal::ZERO);

        let result = apply_overrides(&mut entries, &overrides);

        assert_eq!(result.overridden_rows, vec![1]);
        assert_eq!(entries[1].approved_amount, None);
        assert_eq!(result.approved_total, Decimal::new(800, 0));
        assert!(result.should_persist_total());
    }

    #[test]
    fn unknown_rows_and_negative_amounts_do_nothing() {
        let mut entries = vec![entry(1, 500)];
        let mut overrides = BTreeMap::new();
        overrides.insert(9, Decimal::new(100, 0));
        overrides.insert(1, Decimal::new(-50, 0));

        let result = apply_overrides(&mut entries, &overrides);

        assert!(result.overridden_rows.is_empty());
        assert_eq!(entries[0].approved_amount, None);
        assert_eq!(result.approved_total, Decimal::new(500, 0));
    }

    #[test]
    fn empty_entries_yield_non_persistable_total() {
        let mut entries: Vec<BudgetEntry> = Vec::new();
        let result = apply_overrides(&mut entries, &BTreeMap::new());
        assert!(!result.should_persist_total());
    }
}
