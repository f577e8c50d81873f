pub mod generation;
pub mod style;

pub use generation::{Draft, GenerationWarning, GenerationWorkflow, WorkflowPhase, WorkflowState};
pub use style::{StylePhase, StyleWorkflow, StyleWorkflowState};
