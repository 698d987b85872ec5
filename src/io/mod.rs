//! Format-specific reading and writing, at the edges of the pipeline.
//!
//! - `geojson` - polygonal feature collections (block geometries, target layers)
//! - `shp` - TIGER-style shapefiles of block geometries
//! - `csv` - block attribute tables in, apportioned tables out
//!
//! Nothing in the overlay, weighting, or validation stages touches these modules.

pub mod csv;
pub mod geojson;
pub mod shp;
