mod index;
mod repair;

pub(crate) use index::{EnvelopeIndex, total_bounds};
pub(crate) use repair::clean;
