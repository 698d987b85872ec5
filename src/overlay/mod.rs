//! Block/target overlay: candidate search, polygon intersection, and the
//! overlap check for layers that prohibit overlapping targets.

mod fragment;
mod overlap;

pub use fragment::{OverlayFragment, OverlayOutput, overlay};
pub use overlap::check_no_overlaps;
