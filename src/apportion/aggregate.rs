use std::sync::Arc;

use ahash::AHashSet;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{ApportionedRecord, ApportionedTable};
use crate::{
    config::DenominatorMode,
    error::{Anomaly, LayerError},
    layer::TargetLayer,
    overlay::OverlayOutput,
    source::BlockSet,
};

/// Stamp shared by every record produced in one run.
#[derive(Debug, Clone)]
pub struct RunStamp {
    pub vintage: Arc<str>,
    pub computed_at: DateTime<Utc>,
}

impl RunStamp {
    pub fn new(vintage: impl AsRef<str>, computed_at: DateTime<Utc>) -> Self {
        Self { vintage: Arc::from(vintage.as_ref()), computed_at }
    }

    pub fn now(vintage: impl AsRef<str>) -> Self { Self::new(vintage, Utc::now()) }
}

/// Aggregated table for one layer plus the anomalies recorded while weighting.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub table: ApportionedTable,
    pub anomalies: Vec<Anomaly>,
}

/// Neumaier-compensated running sum. Targets may receive tens of thousands of
/// small contributions; plain accumulation drifts.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    #[inline]
    pub(crate) fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    #[inline] pub(crate) fn value(&self) -> f64 { self.sum + self.compensation }
}

impl FromIterator<f64> for CompensatedSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Self::default();
        iter.into_iter().for_each(|v| acc.add(v));
        acc
    }
}

/// Resolve the layer's value columns against the block collection.
pub(crate) fn resolve_columns(blocks: &BlockSet, columns: &[String]) -> Result<Vec<usize>, LayerError> {
    columns.iter()
        .map(|c| blocks.column_index(c).ok_or_else(|| LayerError::UnknownColumn { column: c.clone() }))
        .collect()
}

/// Weight each fragment by its share of the block's denominator and accumulate
/// `value * weight` into the fragment's target.
///
/// Every target in the layer gets exactly one record, in layer order; targets no
/// block reaches carry all-zero values and `source_block_count == 0`. Fragments of
/// a block with a zero denominator are excluded and recorded once per block.
pub fn aggregate(
    blocks: &BlockSet,
    layer: &TargetLayer,
    overlay: &OverlayOutput,
    stamp: &RunStamp,
) -> Result<Aggregation, LayerError> {
    let schema = layer.schema();
    let cols = resolve_columns(blocks, &schema.value_columns)?;

    let mut sums = vec![vec![CompensatedSum::default(); cols.len()]; layer.len()];
    let mut counts = vec![0usize; layer.len()];
    let mut anomalies = Vec::new();
    let mut zero_blocks = AHashSet::new();

    for fragment in overlay.fragments() {
        let denominator = match schema.denominator {
            DenominatorMode::Covered => overlay.covered_area(fragment.block),
            DenominatorMode::TrueArea => blocks.area(fragment.block),
        };

        if !(denominator > 0.0 && denominator.is_finite()) {
            if zero_blocks.insert(fragment.block) {
                let block_id = blocks.block(fragment.block).block_id.to_string();
                warn!(layer = layer.name(), %block_id, "[apportion] zero denominator, fragments excluded");
                anomalies.push(Anomaly::DenominatorZero { block_id });
            }
            continue;
        }

        let weight = fragment.area / denominator;
        let values = &blocks.block(fragment.block).values;
        let target = fragment.target as usize;

        for (sum, &col) in sums[target].iter_mut().zip(&cols) {
            sum.add(values[col] as f64 * weight);
        }
        counts[target] += 1;
    }

    let records = layer.targets().iter()
        .zip(sums.into_iter().zip(counts))
        .map(|(target, (sums, source_block_count))| ApportionedRecord {
            target_id: target.target_id.clone(),
            values: sums.iter().map(CompensatedSum::value).collect(),
            source_block_count,
            computed_at: stamp.computed_at,
            vintage: stamp.vintage.clone(),
            layer_name: schema.layer_name.clone(),
        })
        .collect::<Vec<_>>();

    debug!(layer = layer.name(), records = records.len(), "[apportion] aggregated fragments");

    Ok(Aggregation {
        table: ApportionedTable::new(schema.layer_name.clone(), schema.value_columns.clone(), records),
        anomalies,
    })
}
