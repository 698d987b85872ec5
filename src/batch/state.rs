use std::{
    fmt,
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    time::{Duration, Instant},
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::LayerError;

/// Where a layer is in its pipeline. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayerState {
    Pending,
    LoadingTargets,
    Overlaying,
    Aggregating,
    Validating,
    Done,
    Failed,
}

impl LayerState {
    #[inline] pub fn is_terminal(self) -> bool { matches!(self, Self::Done | Self::Failed) }

    /// The stage that follows this one on success.
    pub fn next(self) -> Option<Self> {
        Some(match self {
            Self::Pending => Self::LoadingTargets,
            Self::LoadingTargets => Self::Overlaying,
            Self::Overlaying => Self::Aggregating,
            Self::Aggregating => Self::Validating,
            Self::Validating => Self::Done,
            Self::Done | Self::Failed => return None,
        })
    }
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::LoadingTargets => "LOADING_TARGETS",
            Self::Overlaying => "OVERLAYING",
            Self::Aggregating => "AGGREGATING",
            Self::Validating => "VALIDATING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        })
    }
}

/// Batch-wide abort signal. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self { Self::default() }

    /// Ask every layer that has not finished to stop at its next stage boundary.
    pub fn abort(&self) { self.0.store(true, Ordering::SeqCst); }

    #[inline] pub fn is_aborted(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Drives one layer's state machine, checking the abort flag and the timeout
/// at every stage boundary.
#[derive(Debug)]
pub(crate) struct StageTracker<'a> {
    layer: &'a str,
    state: LayerState,
    history: Vec<LayerState>,
    started: Instant,
    timeout: Option<Duration>,
    abort: &'a AbortHandle,
}

impl<'a> StageTracker<'a> {
    pub(crate) fn new(layer: &'a str, timeout: Option<Duration>, abort: &'a AbortHandle) -> Self {
        Self {
            layer,
            state: LayerState::Pending,
            history: vec![LayerState::Pending],
            started: Instant::now(),
            timeout,
            abort,
        }
    }

    #[inline] pub(crate) fn state(&self) -> LayerState { self.state }

    #[inline] pub(crate) fn elapsed(&self) -> Duration { self.started.elapsed() }

    /// Move to the next stage, unless the batch was aborted or the layer ran out of time.
    /// Reaching `Done` is never refused: by then the layer's results are complete.
    pub(crate) fn advance(&mut self) -> Result<LayerState, LayerError> {
        let next = self.state.next().unwrap_or(self.state);

        if next != LayerState::Done {
            if self.abort.is_aborted() {
                return Err(LayerError::Aborted);
            }
            if let Some(limit) = self.timeout {
                let elapsed = self.elapsed();
                if elapsed > limit {
                    return Err(LayerError::TimedOut { elapsed });
                }
            }
        }

        debug!(layer = self.layer, from = %self.state, to = %next, "[batch] layer state transition");
        self.state = next;
        self.history.push(next);
        Ok(next)
    }

    pub(crate) fn fail(&mut self, error: &LayerError) {
        warn!(layer = self.layer, from = %self.state, %error, "[batch] layer FAILED");
        self.state = LayerState::Failed;
        self.history.push(LayerState::Failed);
    }

    pub(crate) fn into_history(self) -> Vec<LayerState> { self.history }
}
