use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use polars::{frame::DataFrame, prelude::*};

use super::aggregate::CompensatedSum;
use crate::io::csv;

/// Apportioned values for one target of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApportionedRecord {
    pub target_id: Arc<str>,
    /// One value per table column, in table column order. Fractional; never rounded here.
    pub values: Vec<f64>,
    pub source_block_count: usize,
    pub computed_at: DateTime<Utc>,
    pub vintage: Arc<str>,
    pub layer_name: Arc<str>,
}

/// One layer's output: a row per target, keyed by `target_id`.
#[derive(Debug, Clone)]
pub struct ApportionedTable {
    layer_name: Arc<str>,
    columns: Vec<String>,
    records: Vec<ApportionedRecord>,
}

impl ApportionedTable {
    pub fn new(layer_name: Arc<str>, columns: Vec<String>, records: Vec<ApportionedRecord>) -> Self {
        Self { layer_name, columns, records }
    }

    #[inline] pub fn layer_name(&self) -> &str { &self.layer_name }

    #[inline] pub fn columns(&self) -> &[String] { &self.columns }

    #[inline] pub fn records(&self) -> &[ApportionedRecord] { &self.records }

    #[inline] pub fn len(&self) -> usize { self.records.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn record(&self, target_id: &str) -> Option<&ApportionedRecord> {
        self.records.iter().find(|r| r.target_id.as_ref() == target_id)
    }

    /// Value of `column` for `target_id`, if both exist.
    pub fn value(&self, target_id: &str, column: &str) -> Option<f64> {
        let col = self.column_index(column)?;
        self.record(target_id).map(|r| r.values[col])
    }

    /// Sum of one column across every record.
    pub fn column_total(&self, col: usize) -> f64 {
        self.records.iter().map(|r| r.values[col]).collect::<CompensatedSum>().value()
    }

    /// Export as a DataFrame: `target_id`, one Float64 column per value column,
    /// then `source_block_count`, `computed_at` (RFC 3339), `vintage`, `layer_name`.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.columns.len() + 5);

        columns.push(Column::new(
            "target_id".into(),
            self.records.iter().map(|r| r.target_id.to_string()).collect::<Vec<_>>(),
        ));
        for (col, name) in self.columns.iter().enumerate() {
            columns.push(Column::new(
                name.as_str().into(),
                self.records.iter().map(|r| r.values[col]).collect::<Vec<f64>>(),
            ));
        }
        columns.push(Column::new(
            "source_block_count".into(),
            self.records.iter().map(|r| r.source_block_count as u64).collect::<Vec<_>>(),
        ));
        columns.push(Column::new(
            "computed_at".into(),
            self.records.iter()
                .map(|r| r.computed_at.to_rfc3339_opts(SecondsFormat::Secs, true))
                .collect::<Vec<_>>(),
        ));
        columns.push(Column::new(
            "vintage".into(),
            self.records.iter().map(|r| r.vintage.to_string()).collect::<Vec<_>>(),
        ));
        columns.push(Column::new(
            "layer_name".into(),
            self.records.iter().map(|r| r.layer_name.to_string()).collect::<Vec<_>>(),
        ));

        DataFrame::new(columns)
            .with_context(|| format!("[apportion] Failed to build output table for layer {}", self.layer_name))
    }

    /// Conventional file name for the layer's exported table.
    pub fn file_name(&self) -> String { format!("{}_demographics.csv", self.layer_name) }

    /// Write the table as `<dir>/<layer>_demographics.csv` and return the path.
    pub fn write_csv(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        csv::write_csv(&mut self.to_dataframe()?, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ApportionedTable {
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        let record = |id: &str, pop: f64, housing: f64, n: usize| ApportionedRecord {
            target_id: Arc::from(id),
            values: vec![pop, housing],
            source_block_count: n,
            computed_at: at,
            vintage: Arc::from("2020"),
            layer_name: Arc::from("wards"),
        };
        ApportionedTable::new(
            Arc::from("wards"),
            vec!["pop_total".into(), "housing_total".into()],
            vec![record("1", 50.5, 20.0, 3), record("2", 49.5, 10.0, 2), record("3", 0.0, 0.0, 0)],
        )
    }

    #[test]
    fn lookups_and_totals() {
        let table = table();
        assert_eq!(table.value("2", "pop_total"), Some(49.5));
        assert_eq!(table.value("4", "pop_total"), None);
        assert_eq!(table.value("1", "pop_hispanic"), None);
        assert_eq!(table.column_total(0), 100.0);
        assert_eq!(table.file_name(), "wards_demographics.csv");
    }

    #[test]
    fn dataframe_has_metadata_columns() {
        let df = table().to_dataframe().unwrap();
        assert_eq!(df.height(), 3);

        let names: Vec<&str> = df.get_column_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(names, [
            "target_id", "pop_total", "housing_total",
            "source_block_count", "computed_at", "vintage", "layer_name",
        ]);

        let at = df.column("computed_at").unwrap().str().unwrap().get(0).map(str::to_string);
        assert_eq!(at.as_deref(), Some("2026-01-02T03:04:05Z"));
    }

    #[test]
    fn csv_lands_in_layer_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = table().write_csv(dir.path()).unwrap();
        assert!(path.ends_with("wards_demographics.csv"));

        let text = std::fs::read_to_string(path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("target_id,pop_total,housing_total,source_block_count,computed_at,vintage,layer_name"));
        assert!(lines.next().is_some_and(|l| l.starts_with("1,50.5,")));
    }
}
