use ahash::AHashMap;
use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon};
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::debug;

use crate::{config::OverlapMode, geom::{EnvelopeIndex, total_bounds}, layer::TargetLayer, source::BlockSet};

/// The part of one block that falls inside one target, by area in the equal-area system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayFragment {
    pub block: u32,
    pub target: u32,
    pub area: f64,
}

/// Fragments of one layer overlay, grouped by block in block order.
#[derive(Debug, Clone, Default)]
pub struct OverlayOutput {
    fragments: Vec<OverlayFragment>,
    covered: AHashMap<u32, f64>,
}

impl OverlayOutput {
    #[inline] pub fn fragments(&self) -> &[OverlayFragment] { &self.fragments }

    /// Area of `block` covered by the layer, counting overlapping targets once.
    /// Zero for blocks that no target reaches.
    #[inline]
    pub fn covered_area(&self, block: u32) -> f64 {
        self.covered.get(&block).copied().unwrap_or(0.0)
    }

    /// Blocks with at least one fragment, in block order.
    pub fn footprint(&self) -> Vec<u32> {
        let mut blocks: Vec<u32> = self.covered.keys().copied().collect();
        blocks.sort_unstable();
        blocks
    }
}

/// Per-block overlay result before flattening. Most blocks fall in one or two targets.
type BlockPieces = SmallVec<[(u32, MultiPolygon<f64>, f64); 2]>;

/// Intersect every eligible block with every eligible target it may reach.
///
/// Candidate pairs come from an R-tree over target envelopes; exact areas come
/// from polygon intersection. Blocks are processed in parallel, and the output
/// keeps block order so the result does not depend on scheduling.
pub fn overlay(blocks: &BlockSet, layer: &TargetLayer, mode: OverlapMode) -> OverlayOutput {
    let Some(extent) = total_bounds(layer.eligible_shapes().map(|(_, shape)| shape)) else {
        debug!(layer = layer.name(), "[overlay] no eligible targets");
        return OverlayOutput::default();
    };
    let index = EnvelopeIndex::new(layer.eligible_shapes());
    debug!(layer = layer.name(), targets = index.len(), "[overlay] indexed target envelopes");

    let per_block: Vec<(u32, BlockPieces)> = (0..blocks.len() as u32)
        .into_par_iter()
        .filter(|&b| blocks.is_eligible(b))
        .filter_map(|b| {
            let shape = &blocks.block(b).geometry;
            let rect = shape.bounding_rect().filter(|rect| rect.intersects(&extent))?;

            let mut candidates: SmallVec<[u32; 8]> = index.candidates(&rect, 0.0).collect();
            candidates.sort_unstable();

            let pieces: BlockPieces = candidates.into_iter()
                .filter_map(|t| {
                    let piece = shape.intersection(&layer.target(t).geometry);
                    let area = piece.unsigned_area();
                    (area > 0.0).then_some((t, piece, area))
                })
                .collect();

            (!pieces.is_empty()).then_some((b, pieces))
        })
        .collect();

    let mut out = OverlayOutput {
        fragments: Vec::with_capacity(per_block.len()),
        covered: AHashMap::with_capacity(per_block.len()),
    };

    for (block, pieces) in per_block {
        let covered = match mode {
            OverlapMode::DoubleCount if pieces.len() > 1 => union_area(&pieces),
            _ => pieces.iter().map(|(_, _, area)| area).sum(),
        };
        out.covered.insert(block, covered);
        out.fragments.extend(pieces.into_iter().map(|(target, _, area)| OverlayFragment { block, target, area }));
    }

    debug!(layer = layer.name(), fragments = out.fragments.len(), blocks = out.covered.len(),
        "[overlay] computed fragments");

    out
}

/// Area of the union of a block's pieces, so overlapping targets cover a block only once.
fn union_area(pieces: &BlockPieces) -> f64 {
    let mut iter = pieces.iter();
    let Some((_, first, _)) = iter.next() else { return 0.0 };
    iter.fold(first.clone(), |acc, (_, piece, _)| acc.union(piece)).unsigned_area()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use geo::polygon;
    use serde_json::json;

    use super::*;
    use crate::{
        common::Projection,
        config::{CALIFORNIA_ALBERS, Config, LayerConfig},
        io::geojson::Feature,
        source::{LoadedBlocks, SourceBlock},
    };

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]])
    }

    fn identity() -> Projection {
        Projection::new(CALIFORNIA_ALBERS, CALIFORNIA_ALBERS).unwrap()
    }

    fn blocks(shapes: Vec<MultiPolygon<f64>>) -> BlockSet {
        let loaded = LoadedBlocks {
            columns: vec!["pop_total".into()],
            blocks: shapes.into_iter().enumerate()
                .map(|(i, geometry)| SourceBlock { block_id: Arc::from(i.to_string()), geometry, values: vec![100] })
                .collect(),
            anomalies: Vec::new(),
        };
        BlockSet::prepare(loaded, &identity())
    }

    fn layer(shapes: Vec<MultiPolygon<f64>>) -> TargetLayer {
        let config = Config::new("2020", vec![("P1_001N".into(), "pop_total".into())]);
        let features = shapes.into_iter().enumerate()
            .map(|(i, g)| Feature::new(json!({ "id": i }).as_object().cloned().unwrap(), g))
            .collect();
        TargetLayer::prepare(LayerConfig::polygon("t", "id").schema(&config), features, &identity()).unwrap()
    }

    #[test]
    fn splits_block_across_adjacent_targets() {
        let blocks = blocks(vec![rect(0., 0., 2., 1.), rect(5., 5., 6., 6.)]);
        let layer = layer(vec![rect(0., 0., 1., 1.), rect(1., 0., 2., 1.)]);

        let out = overlay(&blocks, &layer, OverlapMode::Prohibit);
        assert_eq!(out.fragments().len(), 2);
        assert_eq!((out.fragments()[0].target, out.fragments()[1].target), (0, 1));
        assert!(out.fragments().iter().all(|f| f.block == 0 && (f.area - 1.0).abs() < 1e-9));
        assert!((out.covered_area(0) - 2.0).abs() < 1e-9);
        assert_eq!(out.covered_area(1), 0.0);
        assert_eq!(out.footprint(), [0]);
    }

    #[test]
    fn touching_targets_produce_no_fragment() {
        let blocks = blocks(vec![rect(0., 0., 1., 1.)]);
        let layer = layer(vec![rect(1., 0., 2., 1.)]);
        assert!(overlay(&blocks, &layer, OverlapMode::Prohibit).fragments().is_empty());
    }

    #[test]
    fn double_count_covers_overlap_once() {
        let blocks = blocks(vec![rect(0., 0., 4., 1.)]);
        let layer = layer(vec![rect(0., 0., 3., 1.), rect(1., 0., 4., 1.)]);

        let out = overlay(&blocks, &layer, OverlapMode::DoubleCount);
        assert_eq!(out.fragments().len(), 2);
        assert!(out.fragments().iter().all(|f| (f.area - 3.0).abs() < 1e-9));
        assert!((out.covered_area(0) - 4.0).abs() < 1e-9);
    }
}
