use std::str::FromStr;

use sqlx::Row;

use budgetflow_core::domain::account::{Account, Role};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlAccountRepository {
    pool: DbPool,
}

pub(crate) fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let role_str: String = row.try_get("role").map_err(decode)?;

    Ok(Account {
        id: row.try_get("id").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        username_email: row.try_get("username_email").map_err(decode)?,
        role: Role::from_str(&role_str).map_err(|e| RepositoryError::Decode(e.to_string()))?,
        department_code: row.try_get("department_code").map_err(decode)?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, name, username_email, role, department_code";

impl SqlAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_account(row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_username(
        &self,
        username_email: &str,
    ) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE username_email = ?"
        ))
        .bind(username_email)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_account(row)?)),
            None => Ok(None),
        }
    }

    /// All holders of a role, ordered by id so callers inherit the
    /// deterministic tie-break.
    pub async fn list_by_role(&self, role: Role) -> Result<Vec<Account>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE role = ? ORDER BY id"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }
}
