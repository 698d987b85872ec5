#![doc = "Area-weighted apportionment of census block counts onto boundary layers"]
mod apportion;
mod batch;
mod common;
mod config;
mod error;
mod geom;
mod io;
mod layer;
mod overlay;
mod source;
mod validate;

pub mod logging;

#[doc(inline)]
pub use config::{
    Benchmark, BlockConfig, CALIFORNIA_ALBERS, Config, CrsConfig, DenominatorMode, GeometryType,
    LayerConfig, LayerSchema, NAD83_LONLAT, OverlapMode,
};

#[doc(inline)]
pub use error::{Anomaly, GeometryOwner, JoinSide, LayerError};

#[doc(inline)]
pub use common::Projection;

#[doc(inline)]
pub use io::{csv::{read_attributes, read_attributes_str, write_csv, write_csv_string}, geojson::{Feature, read_features, read_features_bytes}};

#[doc(inline)]
pub use source::{BlockSet, LoadedBlocks, SourceBlock, join_blocks, load_blocks_geojson, load_blocks_shapefile};

#[doc(inline)]
pub use layer::{DiskTargets, MemTargets, TargetLayer, TargetPolygon, TargetSource};

#[doc(inline)]
pub use overlay::{OverlayFragment, OverlayOutput, check_no_overlaps, overlay};

#[doc(inline)]
pub use apportion::{Aggregation, ApportionedRecord, ApportionedTable, LayerSummary, RankedTarget, RunStamp, aggregate};

#[doc(inline)]
pub use validate::{BenchmarkCheck, ConservationCheck, ValidationReport, relative_difference, validate};

#[doc(inline)]
pub use batch::{AbortHandle, BatchSummary, LayerOutcome, LayerState, Orchestrator};
