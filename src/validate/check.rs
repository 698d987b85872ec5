use tracing::{info, warn};

use super::report::{BenchmarkCheck, ConservationCheck, ValidationReport, relative_difference};
use crate::{
    apportion::{ApportionedTable, CompensatedSum, resolve_columns},
    config::LayerSchema,
    error::{Anomaly, LayerError},
    source::BlockSet,
};

/// Check one layer's table against its source blocks and configured benchmarks.
///
/// `footprint` lists the blocks that intersect at least one target; the expected
/// total of each column is summed over those blocks only. A negative value is a
/// hard error. Tolerance misses are reported, not raised.
pub fn validate(
    table: &ApportionedTable,
    blocks: &BlockSet,
    footprint: &[u32],
    schema: &LayerSchema,
    vintage: &str,
) -> Result<ValidationReport, LayerError> {
    let mut anomalies = Vec::new();

    for record in table.records() {
        for (column, &value) in table.columns().iter().zip(&record.values) {
            if !value.is_finite() {
                warn!(layer = %schema.layer_name, target_id = %record.target_id, %column, "[validate] non-finite value");
                anomalies.push(Anomaly::NonFiniteValue {
                    target_id: record.target_id.to_string(),
                    column: column.clone(),
                });
            } else if value < 0.0 {
                return Err(LayerError::NegativeValue {
                    target_id: record.target_id.to_string(),
                    column: column.clone(),
                    value,
                });
            }
        }
    }

    let block_cols = resolve_columns(blocks, table.columns())?;
    let conservation = table.columns().iter().zip(block_cols)
        .enumerate()
        .map(|(col, (column, block_col))| {
            let expected_total = footprint.iter()
                .map(|&b| blocks.block(b).values[block_col] as f64)
                .collect::<CompensatedSum>()
                .value();
            let observed_total = table.column_total(col);
            let relative_difference = relative_difference(observed_total, expected_total);
            let within_tolerance = relative_difference <= schema.tolerance;

            if !within_tolerance {
                warn!(layer = %schema.layer_name, %column, expected_total, observed_total, relative_difference,
                    "[validate] conservation outside tolerance");
            }

            ConservationCheck { column: column.clone(), expected_total, observed_total, relative_difference, within_tolerance }
        })
        .collect::<Vec<_>>();

    let benchmarks = schema.benchmarks.iter()
        .map(|benchmark| {
            let col = table.column_index(&benchmark.column)
                .ok_or_else(|| LayerError::UnknownColumn { column: benchmark.column.clone() })?;
            let observed_total = table.column_total(col);
            let tolerance = benchmark.tolerance.unwrap_or(schema.tolerance);
            let relative_difference = relative_difference(observed_total, benchmark.total);
            let within_tolerance = relative_difference <= tolerance;

            if !within_tolerance {
                warn!(layer = %schema.layer_name, column = %benchmark.column, description = %benchmark.description,
                    expected_total = benchmark.total, observed_total, relative_difference,
                    "[validate] benchmark outside tolerance");
            }

            Ok(BenchmarkCheck {
                column: benchmark.column.clone(),
                description: benchmark.description.clone(),
                expected_total: benchmark.total,
                observed_total,
                relative_difference,
                tolerance,
                within_tolerance,
            })
        })
        .collect::<Result<Vec<_>, LayerError>>()?;

    let report = ValidationReport {
        layer_name: schema.layer_name.to_string(),
        vintage: vintage.to_string(),
        tolerance: schema.tolerance,
        footprint_blocks: footprint.len(),
        conservation,
        benchmarks,
        anomalies,
    };

    info!(layer = %schema.layer_name, within_tolerance = report.within_tolerance(), "[validate] layer validated");

    Ok(report)
}
