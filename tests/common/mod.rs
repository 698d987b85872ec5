#![allow(dead_code)]

use std::sync::Arc;

use apportion::{
    BlockSet, CALIFORNIA_ALBERS, Config, CrsConfig, Feature, LayerConfig, LoadedBlocks, Orchestrator, SourceBlock,
};
use geo::{MultiPolygon, polygon};

/// Axis-aligned rectangle in equal-area meters.
pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]])
}

/// A target feature carrying its identifier under `field`.
pub fn target(field: &str, id: &str, shape: MultiPolygon<f64>) -> Feature {
    let mut properties = serde_json::Map::new();
    properties.insert(field.to_string(), id.into());
    Feature::new(properties, shape)
}

/// Config whose inputs are already in the equal-area system, apportioning
/// `pop_total` and `housing_total`.
pub fn planar_config(layers: Vec<LayerConfig>) -> Config {
    let mut config = Config::new("2020", vec![
        ("P1_001N".into(), "pop_total".into()),
        ("H1_001N".into(), "housing_total".into()),
    ]);
    config.crs = CrsConfig { source: CALIFORNIA_ALBERS.into(), equal_area: CALIFORNIA_ALBERS.into() };
    config.layers = layers;
    config
}

/// Blocks as (id, shape, [pop_total, housing_total]).
pub fn blocks(config: &Config, blocks: Vec<(&str, MultiPolygon<f64>, [u64; 2])>) -> BlockSet {
    let loaded = LoadedBlocks {
        columns: config.blocks.value_columns(),
        blocks: blocks.into_iter()
            .map(|(id, geometry, values)| SourceBlock { block_id: Arc::from(id), geometry, values: values.to_vec() })
            .collect(),
        anomalies: Vec::new(),
    };
    Orchestrator::prepare_blocks(config, loaded).unwrap()
}

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!((actual - expected).abs() <= tol, "expected {expected} ± {tol}, got {actual}");
}
