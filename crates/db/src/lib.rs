//! SQLite persistence for the budget approval workflow: connection
//! management, migrations, repositories for the read side, and the
//! transactional workflow engine for the write side.

pub mod connection;
pub mod diagnostics;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod workflow;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::RepositoryError;
pub use workflow::{ActivityEntry, ApprovalHistoryEntry, WorkflowEngine};
