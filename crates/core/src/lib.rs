pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::account::{Account, Role};
pub use domain::amendment::{AmendmentStatus, BudgetAmendment};
pub use domain::entry::BudgetEntry;
pub use domain::policy::{PolicyRow, PolicyTable};
pub use domain::progress::{ApprovalProgress, LevelStatus};
pub use domain::request::{BudgetDuration, BudgetRequest, RequestId, RequestStatus};
pub use errors::WorkflowError;
pub use workflow::{ApprovalAction, ResolvedAssignment, Transition, WorkflowOutcome};
