use geo::{Area, BooleanOps, BoundingRect, Relate};
use tracing::debug;

use crate::{error::LayerError, geom::EnvelopeIndex, layer::TargetLayer};

/// Fail if any two eligible targets share interior area (or one contains the other).
/// Pure boundary touches, along an edge or at a point, are not overlaps, and
/// neither are slivers smaller than the layer's `overlap_tolerance` (a fraction
/// of the smaller target's area).
pub fn check_no_overlaps(layer: &TargetLayer) -> Result<(), LayerError> {
    let tolerance = layer.schema().overlap_tolerance;
    let index = EnvelopeIndex::new(layer.eligible_shapes());

    for (i, shape) in layer.eligible_shapes() {
        let Some(rect) = shape.bounding_rect() else { continue };

        let mut candidates: Vec<u32> = index.candidates(&rect, 0.0).filter(|&j| j > i).collect();
        candidates.sort_unstable();

        for j in candidates {
            let other = &layer.target(j).geometry;
            // One relate() call gives the full DE-9IM.
            let im = shape.relate(other);
            if !im.is_intersects() || im.is_touches() {
                continue;
            }

            let shared = shape.intersection(other).unsigned_area();
            let smaller = shape.unsigned_area().min(other.unsigned_area());
            let fraction = if smaller > 0.0 { shared / smaller } else { 0.0 };
            if fraction <= tolerance {
                debug!(layer = layer.name(), a = %layer.target(i).target_id, b = %layer.target(j).target_id,
                    shared, fraction, "[overlay] ignoring sliver overlap");
                continue;
            }

            return Err(LayerError::OverlappingTargets {
                a: layer.target(i).target_id.to_string(),
                b: layer.target(j).target_id.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, polygon};
    use serde_json::json;

    use super::*;
    use crate::{
        common::Projection,
        config::{CALIFORNIA_ALBERS, Config, LayerConfig},
        io::geojson::Feature,
    };

    fn layer(shapes: Vec<(&str, [f64; 4])>) -> TargetLayer {
        let config = Config::new("2020", vec![("P1_001N".into(), "pop_total".into())]);
        let features = shapes.into_iter()
            .map(|(id, [x0, y0, x1, y1])| Feature::new(
                json!({ "name": id }).as_object().cloned().unwrap(),
                MultiPolygon::new(vec![polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]]),
            ))
            .collect();
        let identity = Projection::new(CALIFORNIA_ALBERS, CALIFORNIA_ALBERS).unwrap();
        TargetLayer::prepare(LayerConfig::polygon("t", "name").schema(&config), features, &identity).unwrap()
    }

    #[test]
    fn edge_and_corner_touches_are_allowed() {
        let layer = layer(vec![("a", [0., 0., 1., 1.]), ("b", [1., 0., 2., 1.]), ("c", [2., 1., 3., 2.])]);
        assert!(check_no_overlaps(&layer).is_ok());
    }

    #[test]
    fn interior_overlap_names_both_targets() {
        let layer = layer(vec![("a", [0., 0., 2., 1.]), ("b", [1., 0., 3., 1.])]);
        let err = check_no_overlaps(&layer).unwrap_err();
        assert!(matches!(err, LayerError::OverlappingTargets { a, b } if a == "a" && b == "b"));
    }

    #[test]
    fn sliver_below_tolerance_is_not_an_overlap() {
        // Shared edge digitized 1 mm apart on 1 km squares: 1 m² of shared area.
        let layer = layer(vec![("a", [0., 0., 1000.001, 1000.]), ("b", [1000., 0., 2000., 1000.])]);
        assert!(check_no_overlaps(&layer).is_ok());
    }

    #[test]
    fn containment_is_an_overlap() {
        let layer = layer(vec![("outer", [0., 0., 4., 4.]), ("inner", [1., 1., 2., 2.])]);
        assert!(check_no_overlaps(&layer).is_err());
    }
}
