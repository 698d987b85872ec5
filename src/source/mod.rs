mod block;
mod load;

pub use block::{BlockSet, LoadedBlocks, SourceBlock};
pub use load::{join_blocks, load_blocks_geojson, load_blocks_shapefile};
