use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::Anomaly;

/// `|observed - expected| / expected`. A zero expectation is met only by a zero observation.
pub fn relative_difference(observed: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        if observed == 0.0 { 0.0 } else { f64::INFINITY }
    } else {
        (observed - expected).abs() / expected.abs()
    }
}

/// Layer total of one column against the blocks that intersect the layer's footprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConservationCheck {
    pub column: String,
    pub expected_total: f64,
    pub observed_total: f64,
    pub relative_difference: f64,
    pub within_tolerance: bool,
}

/// Layer total of one column against an authoritative external figure. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkCheck {
    pub column: String,
    pub description: String,
    pub expected_total: f64,
    pub observed_total: f64,
    pub relative_difference: f64,
    pub tolerance: f64,
    pub within_tolerance: bool,
}

/// Outcome of validating one layer. Never mutated after it is produced.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub layer_name: String,
    pub vintage: String,
    pub tolerance: f64,
    /// Number of blocks intersecting at least one target.
    pub footprint_blocks: usize,
    pub conservation: Vec<ConservationCheck>,
    pub benchmarks: Vec<BenchmarkCheck>,
    pub anomalies: Vec<Anomaly>,
}

impl ValidationReport {
    /// True when every conservation and benchmark check is within its tolerance.
    pub fn within_tolerance(&self) -> bool {
        self.conservation.iter().all(|c| c.within_tolerance)
            && self.benchmarks.iter().all(|b| b.within_tolerance)
    }

    /// Labels of the checks that exceeded their tolerance.
    pub fn exceeded(&self) -> Vec<String> {
        self.conservation.iter()
            .filter(|c| !c.within_tolerance)
            .map(|c| format!("conservation:{}", c.column))
            .chain(self.benchmarks.iter()
                .filter(|b| !b.within_tolerance)
                .map(|b| if b.description.is_empty() {
                    format!("benchmark:{}", b.column)
                } else {
                    format!("benchmark:{} ({})", b.column, b.description)
                }))
            .collect()
    }

    pub fn conservation_for(&self, column: &str) -> Option<&ConservationCheck> {
        self.conservation.iter().find(|c| c.column == column)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .with_context(|| format!("[validate] Failed to serialize report for layer {}", self.layer_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_difference_edges() {
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        assert_eq!(relative_difference(1.0, 0.0), f64::INFINITY);
        assert!((relative_difference(95.0, 100.0) - 0.05).abs() < 1e-12);
        assert!((relative_difference(105.0, 100.0) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn exceeded_lists_failing_checks() {
        let report = ValidationReport {
            layer_name: "county".into(),
            vintage: "2020".into(),
            tolerance: 0.01,
            footprint_blocks: 3,
            conservation: vec![ConservationCheck {
                column: "pop_total".into(),
                expected_total: 100.0,
                observed_total: 100.0,
                relative_difference: 0.0,
                within_tolerance: true,
            }],
            benchmarks: vec![BenchmarkCheck {
                column: "pop_total".into(),
                description: "county population".into(),
                expected_total: 105.0,
                observed_total: 100.0,
                relative_difference: 5.0 / 105.0,
                tolerance: 0.01,
                within_tolerance: false,
            }],
            anomalies: Vec::new(),
        };

        assert!(!report.within_tolerance());
        assert_eq!(report.exceeded(), ["benchmark:pop_total (county population)"]);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["benchmarks"][0]["within_tolerance"], false);
        assert_eq!(json["conservation"][0]["column"], "pop_total");
    }
}
