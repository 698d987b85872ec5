use std::{fmt, time::Duration};

use serde::Serialize;
use thiserror::Error;

/// Fatal, per-layer failures. Any of these moves the layer to `FAILED`;
/// other layers in the same batch are unaffected.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerError {
    /// Target polygons for the layer could not be obtained or parsed.
    #[error("failed to load target polygons: {message}")]
    LayerLoad { message: String },

    /// Target geometries could not be moved into the equal-area system.
    #[error("failed to reproject target polygons: {message}")]
    Projection { message: String },

    /// Two targets share the same identifier within one layer.
    #[error("duplicate target identifier {target_id:?}")]
    DuplicateTarget { target_id: String },

    /// Two targets overlap in area while the layer prohibits overlap.
    #[error("targets {a:?} and {b:?} overlap")]
    OverlappingTargets { a: String, b: String },

    /// The layer asks for a value column the block collection does not carry.
    #[error("unknown value column {column:?}")]
    UnknownColumn { column: String },

    /// An aggregated value came out negative. This is always an aggregation bug.
    #[error("negative apportioned value {value} for target {target_id:?}, column {column:?}")]
    NegativeValue { target_id: String, column: String, value: f64 },

    /// The batch abort flag was raised before this layer finished.
    #[error("aborted")]
    Aborted,

    /// The layer ran past the configured per-layer timeout.
    #[error("timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },
}

impl LayerError {
    pub(crate) fn load(err: impl fmt::Display) -> Self {
        Self::LayerLoad { message: format!("{err:#}") }
    }

    pub(crate) fn projection(err: impl fmt::Display) -> Self {
        Self::Projection { message: format!("{err:#}") }
    }
}

/// Which side of the geometry/attribute join was left without a partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinSide {
    /// A block geometry had no attribute row.
    Geometry,
    /// An attribute row had no block geometry.
    Attributes,
}

/// Whether a geometry belongs to a source block or a target polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryOwner {
    Block,
    Target,
}

/// Recovered, row-level problems. These never stop a run; they are collected
/// into the loader output and the per-layer validation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Orphan block geometry or attribute row, dropped.
    InputJoin { block_id: String, side: JoinSide },

    /// A count that could not be parsed as a non-negative integer; the row is dropped.
    InvalidCount { block_id: String, column: String, raw: String },

    /// A mapped value column was absent from the attribute table and filled with zeros.
    MissingValueColumn { column: String },

    /// An invalid polygon that could not be repaired; excluded from overlay.
    GeometryRepairFailure { owner: GeometryOwner, id: String, reason: String },

    /// A block whose normalizing denominator was zero; its fragments were excluded.
    DenominatorZero { block_id: String },

    /// A target feature without an identifier; dropped from the layer.
    NullTargetId { feature_index: usize },

    /// An aggregated value that is NaN or infinite.
    NonFiniteValue { target_id: String, column: String },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::InputJoin { block_id, side: JoinSide::Geometry } =>
                write!(f, "block {block_id} has geometry but no attribute row"),
            Anomaly::InputJoin { block_id, side: JoinSide::Attributes } =>
                write!(f, "block {block_id} has an attribute row but no geometry"),
            Anomaly::InvalidCount { block_id, column, raw } =>
                write!(f, "block {block_id}: invalid count {raw:?} in column {column}"),
            Anomaly::MissingValueColumn { column } =>
                write!(f, "value column {column} missing from attributes, filled with zeros"),
            Anomaly::GeometryRepairFailure { owner, id, reason } =>
                write!(f, "{owner:?} {id}: geometry could not be repaired ({reason})"),
            Anomaly::DenominatorZero { block_id } =>
                write!(f, "block {block_id}: zero normalizing denominator"),
            Anomaly::NullTargetId { feature_index } =>
                write!(f, "target feature #{feature_index} has no identifier"),
            Anomaly::NonFiniteValue { target_id, column } =>
                write!(f, "target {target_id}: non-finite value in column {column}"),
        }
    }
}
