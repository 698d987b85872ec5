use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, info_span, warn};

use super::{AbortHandle, BatchSummary, LayerOutcome, LayerState, state::StageTracker};
use crate::{
    apportion::{self, ApportionedTable, RunStamp},
    common::Projection,
    config::{Config, LayerConfig, OverlapMode},
    error::LayerError,
    layer::{TargetLayer, TargetSource},
    overlay,
    source::{BlockSet, LoadedBlocks},
    validate::{self, ValidationReport},
};

/// Runs Overlay → Aggregate → Validate for every polygon layer in the
/// configuration against one shared, read-only block collection.
///
/// Layers run as independent tasks on a rayon pool. Each task owns its targets
/// and overlay fragments and drops them on completion; results come back as
/// returned values. A failing layer never affects another.
pub struct Orchestrator<'a> {
    config: &'a Config,
    blocks: &'a BlockSet,
    abort: AbortHandle,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config, blocks: &'a BlockSet) -> Self {
        Self { config, blocks, abort: AbortHandle::new() }
    }

    /// Project and clean loaded blocks into the configured equal-area system.
    pub fn prepare_blocks(config: &Config, loaded: LoadedBlocks) -> Result<BlockSet> {
        let projection = Projection::from_config(&config.crs)?;
        Ok(BlockSet::prepare(loaded, &projection))
    }

    /// Handle that aborts this orchestrator's runs from another thread.
    pub fn abort_handle(&self) -> AbortHandle { self.abort.clone() }

    /// Process every declared polygon layer. Errors only if the worker pool
    /// cannot be built; per-layer failures are recorded in the summary.
    pub fn run(&self, source: &dyn TargetSource) -> Result<BatchSummary> {
        let stamp = RunStamp::now(&self.config.vintage);

        let (scheduled, skipped): (Vec<&LayerConfig>, Vec<&LayerConfig>) =
            self.config.layers.iter().partition(|l| l.is_apportionable());
        for layer in &skipped {
            info!(layer = %layer.name, geometry_type = ?layer.geometry_type, "[batch] skipping non-polygon layer");
        }

        info!(layers = scheduled.len(), blocks = self.blocks.len(), vintage = %self.config.vintage, "[batch] starting run");

        let task = || scheduled.par_iter()
            .map(|layer| self.run_layer(layer, source, &stamp))
            .collect::<Vec<_>>();

        let outcomes = match self.config.workers {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("apportion-{i}"))
                .build()
                .context("[batch] Failed to build worker pool")?
                .install(task),
            None => task(),
        };

        let summary = BatchSummary {
            vintage: self.config.vintage.clone(),
            computed_at: stamp.computed_at,
            outcomes,
            skipped: skipped.iter().map(|l| l.name.clone()).collect(),
            block_anomalies: self.blocks.anomalies().to_vec(),
        };

        info!(
            succeeded = summary.succeeded().count(),
            failed = summary.failed().count(),
            skipped = summary.skipped.len(),
            "[batch] run finished"
        );

        Ok(summary)
    }

    /// Run one layer to `Done` or `Failed`.
    pub fn run_layer(&self, layer: &LayerConfig, source: &dyn TargetSource, stamp: &RunStamp) -> LayerOutcome {
        let span = info_span!("layer", name = %layer.name);
        let _guard = span.enter();

        let mut tracker = StageTracker::new(&layer.name, layer.timeout(self.config), &self.abort);
        let result = self.pipeline(layer, source, stamp, &mut tracker);
        let elapsed = tracker.elapsed();

        let (table, report, error) = match result {
            Ok((table, report)) => {
                info!(records = table.len(), within_tolerance = report.within_tolerance(), ?elapsed, "[batch] layer done");
                (Some(table), Some(report), None)
            }
            Err(error) => {
                tracker.fail(&error);
                (None, None, Some(error))
            }
        };

        LayerOutcome { layer_name: layer.name.clone(), history: tracker.into_history(), table, report, error, elapsed }
    }

    fn pipeline(
        &self,
        layer: &LayerConfig,
        source: &dyn TargetSource,
        stamp: &RunStamp,
        tracker: &mut StageTracker,
    ) -> Result<(ApportionedTable, ValidationReport), LayerError> {
        let schema = layer.schema(self.config);

        tracker.advance()?; // LOADING_TARGETS
        let features = source.load(&layer.name)
            .with_context(|| format!("[batch] loading targets for layer {}", layer.name))
            .map_err(LayerError::load)?;
        // proj4rs projections are built per task rather than shared across threads.
        let projection = Projection::from_config(&self.config.crs).map_err(LayerError::projection)?;
        let targets = TargetLayer::prepare(schema, features, &projection)?;

        tracker.advance()?; // OVERLAYING
        if targets.schema().overlap == OverlapMode::Prohibit {
            overlay::check_no_overlaps(&targets)?;
        }
        let fragments = overlay::overlay(self.blocks, &targets, targets.schema().overlap);

        tracker.advance()?; // AGGREGATING
        let aggregation = apportion::aggregate(self.blocks, &targets, &fragments, stamp)?;
        let footprint = fragments.footprint();
        drop(fragments);

        tracker.advance()?; // VALIDATING
        let mut report = validate::validate(&aggregation.table, self.blocks, &footprint, targets.schema(), &stamp.vintage)?;

        let mut anomalies = targets.anomalies().to_vec();
        anomalies.extend(aggregation.anomalies);
        anomalies.append(&mut report.anomalies);
        report.anomalies = anomalies;
        if !report.anomalies.is_empty() {
            warn!(anomalies = report.anomalies.len(), "[batch] layer recorded anomalies");
        }

        let state = tracker.advance()?;
        debug_assert_eq!(state, LayerState::Done);

        Ok((aggregation.table, report))
    }
}
