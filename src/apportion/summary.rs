use serde::Serialize;

use super::ApportionedTable;

/// A target and its value in the summarized column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTarget {
    pub target_id: String,
    pub value: f64,
}

/// Descriptive statistics for one value column of one layer's output.
#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub layer_name: String,
    pub column: String,
    pub feature_count: usize,
    pub total: f64,
    pub mean: f64,
    /// Highest values first.
    pub top: Vec<RankedTarget>,
    /// Lowest values first.
    pub bottom: Vec<RankedTarget>,
    pub total_source_blocks: usize,
    pub mean_source_blocks: f64,
}

impl LayerSummary {
    /// Summarize `column` of `table`, listing the `top_n` highest and lowest targets.
    /// Returns `None` if the table has no such column.
    pub fn from_table(table: &ApportionedTable, column: &str, top_n: usize) -> Option<Self> {
        let col = table.column_index(column)?;
        let records = table.records();
        let count = records.len();

        let mut ranked: Vec<RankedTarget> = records.iter()
            .map(|r| RankedTarget { target_id: r.target_id.to_string(), value: r.values[col] })
            .collect();
        // Ties keep layer order.
        ranked.sort_by(|a, b| b.value.total_cmp(&a.value));

        let top = ranked.iter().take(top_n).cloned().collect();
        let bottom = ranked.iter().rev().take(top_n).cloned().collect();

        let total = table.column_total(col);
        let total_source_blocks: usize = records.iter().map(|r| r.source_block_count).sum();

        let per_feature = |x: f64| if count == 0 { 0.0 } else { x / count as f64 };

        Some(Self {
            layer_name: table.layer_name().to_string(),
            column: column.to_string(),
            feature_count: count,
            total,
            mean: per_feature(total),
            top,
            bottom,
            total_source_blocks,
            mean_source_blocks: per_feature(total_source_blocks as f64),
        })
    }
}
