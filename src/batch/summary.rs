use std::time::Duration;

use chrono::{DateTime, Utc};

use super::LayerState;
use crate::{apportion::ApportionedTable, error::{Anomaly, LayerError}, validate::ValidationReport};

/// Everything one layer produced: its path through the state machine and either
/// a table with its report, or the error that stopped it.
#[derive(Debug, Clone)]
pub struct LayerOutcome {
    pub layer_name: String,
    pub history: Vec<LayerState>,
    pub table: Option<ApportionedTable>,
    pub report: Option<ValidationReport>,
    pub error: Option<LayerError>,
    pub elapsed: Duration,
}

impl LayerOutcome {
    /// Final state of the layer.
    pub fn state(&self) -> LayerState {
        self.history.last().copied().unwrap_or(LayerState::Pending)
    }

    #[inline] pub fn is_done(&self) -> bool { self.state() == LayerState::Done }
}

/// Result of one orchestrator pass, in declared layer order.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub vintage: String,
    pub computed_at: DateTime<Utc>,
    pub outcomes: Vec<LayerOutcome>,
    /// Declared layers that were not scheduled, e.g. point or line layers.
    pub skipped: Vec<String>,
    /// Anomalies recorded while loading and preparing the shared block collection.
    pub block_anomalies: Vec<Anomaly>,
}

impl BatchSummary {
    pub fn outcome(&self, layer: &str) -> Option<&LayerOutcome> {
        self.outcomes.iter().find(|o| o.layer_name == layer)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> + '_ {
        self.outcomes.iter().filter(|o| o.is_done()).map(|o| o.layer_name.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &LayerError)> + '_ {
        self.outcomes.iter().filter_map(|o| o.error.as_ref().map(|e| (o.layer_name.as_str(), e)))
    }

    /// True if any scheduled layer failed.
    pub fn is_partial(&self) -> bool { self.failed().next().is_some() }

    /// Layers whose report flags a tolerance miss. Advisory; these layers still succeeded.
    pub fn out_of_tolerance(&self) -> impl Iterator<Item = &ValidationReport> + '_ {
        self.outcomes.iter()
            .filter_map(|o| o.report.as_ref())
            .filter(|r| !r.within_tolerance())
    }
}
