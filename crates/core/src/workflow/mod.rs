pub mod engine;
pub mod overlay;
pub mod resolver;
pub mod states;

pub use engine::{decide_assignment, decide_transition, ensure_actionable, ensure_resumable};
pub use overlay::{apply_overrides, OverlayResult};
pub use resolver::{select_approver, ResolvedAssignment};
pub use states::{ApprovalAction, AssignmentDecision, Transition, WorkflowOutcome};
