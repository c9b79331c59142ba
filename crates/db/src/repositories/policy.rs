use std::str::FromStr;

use sqlx::Row;

use budgetflow_core::domain::account::Role;
use budgetflow_core::domain::policy::{PolicyRow, PolicyTable};

use super::RepositoryError;
use crate::DbPool;

/// Read-only access to the static department → approval-ladder mapping.
pub struct SqlPolicyRepository {
    pool: DbPool,
}

pub(crate) fn row_to_policy(row: &sqlx::sqlite::SqliteRow) -> Result<PolicyRow, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let role_str: String = row.try_get("approver_role").map_err(decode)?;

    Ok(PolicyRow {
        department_code: row.try_get("department_code").map_err(decode)?,
        approval_level: row.try_get("approval_level").map_err(decode)?,
        approver_role: Role::from_str(&role_str)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
    })
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn table_for_department(
        &self,
        department_code: &str,
    ) -> Result<PolicyTable, RepositoryError> {
        let rows = sqlx::query(
            "SELECT department_code, approval_level, approver_role
             FROM approval_workflow WHERE department_code = ? ORDER BY approval_level",
        )
        .bind(department_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(PolicyTable::new(rows.iter().map(row_to_policy).collect::<Result<Vec<_>, _>>()?))
    }

    pub async fn role_for_level(
        &self,
        department_code: &str,
        level: i64,
    ) -> Result<Option<Role>, RepositoryError> {
        let row = sqlx::query(
            "SELECT department_code, approval_level, approver_role
             FROM approval_workflow WHERE department_code = ? AND approval_level = ?",
        )
        .bind(department_code)
        .bind(level)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_policy(row)?.approver_role)),
            None => Ok(None),
        }
    }
}
