//! Batch orchestration: one state machine per layer, layers processed in parallel.

mod orchestrator;
mod state;
mod summary;

pub use orchestrator::Orchestrator;
pub use state::{AbortHandle, LayerState};
pub use summary::{BatchSummary, LayerOutcome};
