use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use budgetflow_core::errors::WorkflowError;

pub mod account;
pub mod amendment;
pub mod policy;
pub mod progress;
pub mod request;

pub use account::SqlAccountRepository;
pub use amendment::{NewAmendment, SqlAmendmentRepository};
pub use policy::SqlPolicyRepository;
pub use progress::SqlProgressRepository;
pub use request::{
    NewBudgetEntry, NewBudgetRequest, RequestFilter, RequestSort, SqlRequestRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Database failures crossing into the workflow engine all surface as
/// storage conflicts; the caller retries or gives up, state is unchanged.
pub(crate) fn storage(error: sqlx::Error) -> WorkflowError {
    WorkflowError::StorageConflict(error.to_string())
}

/// Amounts are persisted as canonical decimal strings; a row that fails to
/// parse is corrupt and must not be silently zeroed.
pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("bad amount `{raw}`: {error}")))
}

/// Timestamps are persisted as RFC 3339 text and, like amounts, a row that
/// fails to parse is corrupt and must not be papered over.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}
