use std::sync::Arc;

use geo::{Area, MultiPolygon};
use tracing::{info, warn};

use crate::{
    common::Projection,
    error::{Anomaly, GeometryOwner},
    geom,
};

/// The finest enumeration unit: an identifier, its polygon, and one count per value column.
#[derive(Debug, Clone)]
pub struct SourceBlock {
    pub block_id: Arc<str>,
    pub geometry: MultiPolygon<f64>,
    /// Counts aligned with the owning collection's value columns.
    pub values: Vec<u64>,
}

/// Output of the loader: joined blocks in the input coordinate system plus the
/// anomalies recorded while joining.
#[derive(Debug, Clone, Default)]
pub struct LoadedBlocks {
    pub columns: Vec<String>,
    pub blocks: Vec<SourceBlock>,
    pub anomalies: Vec<Anomaly>,
}

/// The shared, read-only block collection for a run. Geometries are held in the
/// equal-area system, already validated (and repaired where needed).
#[derive(Debug)]
pub struct BlockSet {
    columns: Vec<String>,
    blocks: Vec<SourceBlock>,
    areas: Vec<f64>,
    eligible: Vec<bool>,
    anomalies: Vec<Anomaly>,
}

impl BlockSet {
    /// Project loaded blocks into the equal-area system and clean their geometry.
    /// Blocks that cannot be projected or repaired stay in the set (their counts are
    /// still part of the snapshot) but are excluded from overlay.
    pub fn prepare(loaded: LoadedBlocks, projection: &Projection) -> Self {
        let LoadedBlocks { columns, blocks, mut anomalies } = loaded;

        let mut prepared = Vec::with_capacity(blocks.len());
        let mut areas = Vec::with_capacity(blocks.len());
        let mut eligible = Vec::with_capacity(blocks.len());
        let mut repaired = 0usize;

        for block in blocks {
            let cleaned = projection.project(&block.geometry)
                .map_err(|e| format!("{e:#}"))
                .and_then(|shape| geom::clean(shape).map_err(|e| e.to_string()));

            match cleaned {
                Ok(clean) => {
                    if clean.repaired { repaired += 1; }
                    areas.push(clean.shape.unsigned_area());
                    eligible.push(true);
                    prepared.push(SourceBlock { geometry: clean.shape, ..block });
                }
                Err(reason) => {
                    warn!(block_id = %block.block_id, %reason, "[source] block excluded from overlay");
                    anomalies.push(Anomaly::GeometryRepairFailure {
                        owner: GeometryOwner::Block,
                        id: block.block_id.to_string(),
                        reason,
                    });
                    areas.push(0.0);
                    eligible.push(false);
                    prepared.push(SourceBlock { geometry: MultiPolygon::new(Vec::new()), ..block });
                }
            }
        }

        info!(blocks = prepared.len(), repaired, excluded = eligible.iter().filter(|&&e| !e).count(),
            "[source] prepared block collection");

        Self { columns, blocks: prepared, areas, eligible, anomalies }
    }

    #[inline] pub fn len(&self) -> usize { self.blocks.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

    #[inline] pub fn columns(&self) -> &[String] { &self.columns }

    #[inline] pub fn blocks(&self) -> &[SourceBlock] { &self.blocks }

    #[inline] pub fn block(&self, idx: u32) -> &SourceBlock { &self.blocks[idx as usize] }

    /// Area of the block's geometry in the equal-area system.
    #[inline] pub fn area(&self, idx: u32) -> f64 { self.areas[idx as usize] }

    /// Whether the block's geometry survived projection and repair.
    #[inline] pub fn is_eligible(&self, idx: u32) -> bool { self.eligible[idx as usize] }

    /// Anomalies recorded while loading and preparing the blocks.
    #[inline] pub fn anomalies(&self) -> &[Anomaly] { &self.anomalies }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Sum of one column over every block in the set.
    pub fn column_total(&self, col: usize) -> u64 {
        self.blocks.iter().map(|b| b.values[col]).sum()
    }
}
