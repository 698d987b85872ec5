//! Conservation and benchmark checks over one layer's apportioned table.

mod check;
mod report;

pub use check::validate;
pub use report::{BenchmarkCheck, ConservationCheck, ValidationReport, relative_difference};
