//! CSV reading and writing for attribute tables and apportioned outputs.

mod read;
mod write;

pub use read::*;
pub use write::*;
