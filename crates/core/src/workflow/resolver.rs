use serde::{Deserialize, Serialize};

use crate::domain::account::{Account, Role};

/// What a level resolution produced for display and assignment. A level can
/// be legitimately unassigned when nobody holds the required role yet; the
/// expected role is still surfaced so dashboards can say who is awaited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAssignment {
    pub expected_role: Role,
    pub approver: Option<Account>,
}

/// Picks the concrete account to assign for (department, role).
///
/// Preference order: same-department holders of the role first, then any
/// holder of the role system-wide. Ties break on the lowest account id so
/// repeated resolution is deterministic. Returns `None` when nobody holds
/// the role at all.
pub fn select_approver<'a>(
    candidates: &'a [Account],
    department_code: &str,
    role: Role,
) -> Option<&'a Account> {
    let holders = candidates.iter().filter(|account| account.role == role);

    let mut in_department: Vec<&Account> = holders
        .clone()
        .filter(|account| account.department_code.as_deref() == Some(department_code))
        .collect();
    if !in_department.is_empty() {
        in_department.sort_by_key(|account| account.id);
        return in_department.first().copied();
    }

    let mut anywhere: Vec<&Account> = holders.collect();
    anywhere.sort_by_key(|account| account.id);
    anywhere.first().copied()
}

#[cfg(test)]
mod tests {
    use super::select_approver;
    use crate::domain::account::{Account, Role};

    fn account(id: i64, role: Role, department: Option<&str>) -> Account {
        Account {
            id,
            name: format!("account-{id}"),
            username_email: format!("a{id}@campus.edu"),
            role,
            department_code: department.map(str::to_string),
        }
    }

    #[test]
    fn prefers_same_department_holder() {
        let pool = vec![
            account(3, Role::Dean, Some("ENG")),
            account(7, Role::Dean, Some("CS")),
            account(9, Role::Approver, Some("CS")),
        ];
        let chosen = select_approver(&pool, "CS", Role::Dean).expect("resolve");
        assert_eq!(chosen.id, 7);
    }

    #[test]
    fn falls_back_to_any_holder_of_the_role() {
        let pool = vec![account(3, Role::Dean, Some("ENG")), account(9, Role::Approver, Some("CS"))];
        let chosen = select_approver(&pool, "CS", Role::Dean).expect("resolve");
        assert_eq!(chosen.id, 3);
    }

    #[test]
    fn ties_break_on_lowest_account_id() {
        let pool = vec![
            account(12, Role::Approver, Some("CS")),
            account(4, Role::Approver, Some("CS")),
            account(8, Role::Approver, Some("CS")),
        ];
        let chosen = select_approver(&pool, "CS", Role::Approver).expect("resolve");
        assert_eq!(chosen.id, 4);
    }

    #[test]
    fn no_holder_anywhere_leaves_level_unassigned() {
        let pool = vec![account(3, Role::Approver, Some("CS"))];
        assert!(select_approver(&pool, "CS", Role::VpFinance).is_none());
    }

    #[test]
    fn accounts_without_department_only_match_in_fallback() {
        let pool =
            vec![account(2, Role::Dean, None), account(5, Role::Dean, Some("CS"))];
        let chosen = select_approver(&pool, "CS", Role::Dean).expect("resolve");
        assert_eq!(chosen.id, 5);

        let fallback_only = vec![account(2, Role::Dean, None)];
        let chosen = select_approver(&fallback_only, "CS", Role::Dean).expect("resolve");
        assert_eq!(chosen.id, 2);
    }
}
