//! Weighting and aggregation: fragments in, one record per target out.

mod aggregate;
mod summary;
mod table;

pub(crate) use aggregate::{CompensatedSum, resolve_columns};
pub use aggregate::{Aggregation, RunStamp, aggregate};
pub use summary::{LayerSummary, RankedTarget};
pub use table::{ApportionedRecord, ApportionedTable};
