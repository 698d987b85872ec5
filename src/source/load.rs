use std::{path::Path, sync::Arc};

use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result};
use polars::frame::DataFrame;
use tracing::{info, warn};

use super::block::{LoadedBlocks, SourceBlock};
use crate::{
    config::BlockConfig,
    error::{Anomaly, JoinSide},
    io::{csv, geojson::{self, Feature}, shp},
};

/// Join block geometries to their attribute rows by block identifier.
///
/// Orphans on either side are dropped and recorded as `InputJoin` anomalies.
/// Rows with an unparseable or negative count are dropped as `InvalidCount`;
/// empty counts read as zero. Mapped columns missing from the table are filled
/// with zeros and recorded once.
pub fn join_blocks(geometries: Vec<Feature>, attributes: &DataFrame, config: &BlockConfig) -> Result<LoadedBlocks> {
    let mut anomalies = Vec::new();
    let columns = config.value_columns();

    let ids = attributes.column(&config.id_field)
        .with_context(|| format!("[source::load] attribute table has no {:?} column", config.id_field))?
        .str()
        .with_context(|| format!("[source::load] {:?} must be a string column", config.id_field))?;

    // Resolve each mapped column: provider name first, then the value column name itself.
    let mut count_columns = Vec::with_capacity(config.column_mapping.len());
    for (raw, name) in &config.column_mapping {
        let column = attributes.column(raw).or_else(|_| attributes.column(name)).ok();
        match column {
            Some(column) => count_columns.push(Some(column.str()
                .with_context(|| format!("[source::load] count column {raw:?} must be read as strings"))?)),
            None => {
                warn!(column = %name, "[source::load] value column missing from attributes, filling with zeros");
                anomalies.push(Anomaly::MissingValueColumn { column: name.clone() });
                count_columns.push(None);
            }
        }
    }

    // Parse attribute rows, keeping table order for deterministic orphan reporting.
    let mut rows: AHashMap<String, Vec<u64>> = AHashMap::with_capacity(attributes.height());
    let mut row_order = Vec::with_capacity(attributes.height());
    let mut rejected = AHashSet::new();

    'rows: for (row, id) in ids.into_iter().enumerate() {
        let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!(row, "[source::load] attribute row without block identifier skipped");
            continue;
        };

        let mut values = Vec::with_capacity(count_columns.len());
        for (col, &column) in count_columns.iter().enumerate() {
            let raw = column.and_then(|c| c.get(row));
            match parse_count(raw) {
                Some(value) => values.push(value),
                None => {
                    let column = &columns[col];
                    warn!(block_id = id, %column, raw = ?raw, "[source::load] invalid count, row dropped");
                    anomalies.push(Anomaly::InvalidCount {
                        block_id: id.to_string(),
                        column: column.clone(),
                        raw: raw.unwrap_or_default().to_string(),
                    });
                    rejected.insert(id.to_string());
                    continue 'rows;
                }
            }
        }

        if rows.contains_key(id) {
            warn!(block_id = id, "[source::load] duplicate attribute row ignored");
            continue;
        }
        row_order.push(id.to_string());
        rows.insert(id.to_string(), values);
    }

    let mut blocks = Vec::with_capacity(geometries.len());
    let mut seen = AHashSet::with_capacity(geometries.len());

    for (i, feature) in geometries.into_iter().enumerate() {
        let Some(id) = feature.property_str(&config.id_field) else {
            warn!(feature = i, "[source::load] block geometry without identifier dropped");
            anomalies.push(Anomaly::InputJoin { block_id: format!("<feature #{i}>"), side: JoinSide::Geometry });
            continue;
        };
        if rejected.contains(&id) { continue; }
        if !seen.insert(id.clone()) {
            warn!(block_id = %id, "[source::load] duplicate block geometry ignored");
            continue;
        }

        match rows.get(&id) {
            Some(values) => blocks.push(SourceBlock {
                block_id: Arc::from(id.as_str()),
                geometry: feature.geometry,
                values: values.clone(),
            }),
            None => {
                warn!(block_id = %id, "[source::load] block geometry has no attribute row, dropped");
                anomalies.push(Anomaly::InputJoin { block_id: id, side: JoinSide::Geometry });
            }
        }
    }

    for id in row_order.into_iter().filter(|id| !seen.contains(id)) {
        warn!(block_id = %id, "[source::load] attribute row has no block geometry, dropped");
        anomalies.push(Anomaly::InputJoin { block_id: id, side: JoinSide::Attributes });
    }

    info!(blocks = blocks.len(), anomalies = anomalies.len(), "[source::load] joined block geometries and attributes");

    Ok(LoadedBlocks { columns, blocks, anomalies })
}

/// Load blocks from a GeoJSON geometry file and a CSV attribute table.
pub fn load_blocks_geojson(geometry_path: &Path, attributes_path: &Path, config: &BlockConfig) -> Result<LoadedBlocks> {
    let geometries = geojson::read_features(geometry_path)?;
    let attributes = csv::read_attributes(attributes_path)?;
    join_blocks(geometries, &attributes, config)
}

/// Load blocks from a TIGER-style shapefile and a CSV attribute table.
pub fn load_blocks_shapefile(shapefile_path: &Path, attributes_path: &Path, config: &BlockConfig) -> Result<LoadedBlocks> {
    let geometries = shp::read_features(shapefile_path, &[config.id_field.as_str()])?;
    let attributes = csv::read_attributes(attributes_path)?;
    join_blocks(geometries, &attributes, config)
        .with_context(|| format!("[source::load] joining {}", shapefile_path.display()))
}

/// Empty or missing counts read as zero; anything else must be a non-negative integer.
fn parse_count(raw: Option<&str>) -> Option<u64> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Some(0);
    }
    raw.parse::<u64>().ok().or_else(|| {
        let value: f64 = raw.parse().ok()?;
        (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as u64)
    })
}
