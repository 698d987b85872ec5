mod source;
mod target;

pub use source::{DiskTargets, MemTargets, TargetSource};
pub use target::{TargetLayer, TargetPolygon};
