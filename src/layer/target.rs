use std::sync::Arc;

use ahash::AHashSet;
use geo::{Area, MultiPolygon};
use tracing::{debug, info, warn};

use crate::{
    common::Projection,
    config::LayerSchema,
    error::{Anomaly, GeometryOwner, LayerError},
    geom,
    io::geojson::Feature,
};

/// One receiving polygon of a boundary layer.
#[derive(Debug, Clone)]
pub struct TargetPolygon {
    pub target_id: Arc<str>,
    /// Geometry in the equal-area system. Empty when the target could not be repaired.
    pub geometry: MultiPolygon<f64>,
}

/// A boundary layer ready for overlay: unique target identifiers, projected and
/// validated geometry, and the anomalies recorded while preparing it.
#[derive(Debug)]
pub struct TargetLayer {
    schema: LayerSchema,
    targets: Vec<TargetPolygon>,
    eligible: Vec<bool>,
    anomalies: Vec<Anomaly>,
}

impl TargetLayer {
    /// Resolve target identifiers, reproject, and clean every target polygon.
    ///
    /// If the identifier field is absent from every feature, identifiers are
    /// synthesized from feature order. A target that cannot be repaired keeps its
    /// output row but receives nothing.
    pub fn prepare(schema: LayerSchema, features: Vec<Feature>, projection: &Projection) -> Result<Self, LayerError> {
        let layer = schema.layer_name.clone();
        let mut anomalies = Vec::new();

        let synthesize = !features.is_empty()
            && features.iter().all(|f| !f.properties.contains_key(&schema.id_field));
        if synthesize {
            warn!(layer = %layer, field = %schema.id_field,
                "[layer] identifier field absent from every feature, synthesizing target ids");
        }

        let mut seen = AHashSet::with_capacity(features.len());
        let mut targets = Vec::with_capacity(features.len());
        let mut eligible = Vec::with_capacity(features.len());

        for (i, feature) in features.into_iter().enumerate() {
            let target_id = if synthesize {
                i.to_string()
            } else {
                match feature.property_str(&schema.id_field) {
                    Some(id) => id,
                    None => {
                        warn!(layer = %layer, feature = i, "[layer] target without identifier dropped");
                        anomalies.push(Anomaly::NullTargetId { feature_index: i });
                        continue;
                    }
                }
            };

            if !seen.insert(target_id.clone()) {
                return Err(LayerError::DuplicateTarget { target_id });
            }

            let projected = projection.project(&feature.geometry).map_err(LayerError::projection)?;
            let target_id: Arc<str> = Arc::from(target_id);

            match geom::clean(projected) {
                Ok(clean) => {
                    if clean.repaired {
                        debug!(layer = %layer, target = %target_id, "[layer] repaired target geometry");
                    }
                    targets.push(TargetPolygon { target_id, geometry: clean.shape });
                    eligible.push(true);
                }
                Err(reason) => {
                    warn!(layer = %layer, target = %target_id, %reason, "[layer] target excluded from overlay");
                    anomalies.push(Anomaly::GeometryRepairFailure {
                        owner: GeometryOwner::Target,
                        id: target_id.to_string(),
                        reason: reason.to_string(),
                    });
                    targets.push(TargetPolygon { target_id, geometry: MultiPolygon::new(Vec::new()) });
                    eligible.push(false);
                }
            }
        }

        info!(layer = %layer, targets = targets.len(), anomalies = anomalies.len(), "[layer] prepared target layer");

        Ok(Self { schema, targets, eligible, anomalies })
    }

    #[inline] pub fn schema(&self) -> &LayerSchema { &self.schema }

    #[inline] pub fn name(&self) -> &str { &self.schema.layer_name }

    #[inline] pub fn len(&self) -> usize { self.targets.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.targets.is_empty() }

    #[inline] pub fn targets(&self) -> &[TargetPolygon] { &self.targets }

    #[inline] pub fn target(&self, idx: u32) -> &TargetPolygon { &self.targets[idx as usize] }

    #[inline] pub fn is_eligible(&self, idx: u32) -> bool { self.eligible[idx as usize] }

    #[inline] pub fn anomalies(&self) -> &[Anomaly] { &self.anomalies }

    /// Slots of targets that take part in overlay, paired with their geometry.
    pub(crate) fn eligible_shapes(&self) -> impl Iterator<Item = (u32, &MultiPolygon<f64>)> + '_ {
        self.targets.iter().enumerate()
            .filter(|&(i, _)| self.eligible[i])
            .map(|(i, t)| (i as u32, &t.geometry))
    }

    /// Total area of the eligible targets, counting overlaps once per target.
    pub fn total_area(&self) -> f64 {
        self.eligible_shapes().map(|(_, g)| g.unsigned_area()).sum()
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use serde_json::json;

    use super::*;
    use crate::config::{CALIFORNIA_ALBERS, Config, LayerConfig};

    fn square(x0: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![(x: x0, y: 0.), (x: x0 + 1., y: 0.), (x: x0 + 1., y: 1.), (x: x0, y: 1.)]])
    }

    fn feature(props: serde_json::Value, shape: MultiPolygon<f64>) -> Feature {
        Feature::new(props.as_object().cloned().unwrap_or_default(), shape)
    }

    fn schema() -> LayerSchema {
        let config = Config::new("2020", vec![("P1_001N".into(), "pop_total".into())]);
        LayerConfig::polygon("wards", "ward").schema(&config)
    }

    fn identity() -> Projection {
        Projection::new(CALIFORNIA_ALBERS, CALIFORNIA_ALBERS).unwrap()
    }

    #[test]
    fn duplicate_identifiers_fail_the_layer() {
        let features = vec![
            feature(json!({ "ward": "1" }), square(0.)),
            feature(json!({ "ward": 1 }), square(1.)),
        ];
        let err = TargetLayer::prepare(schema(), features, &identity()).unwrap_err();
        assert!(matches!(err, LayerError::DuplicateTarget { target_id } if target_id == "1"));
    }

    #[test]
    fn null_identifiers_are_dropped_with_an_anomaly() {
        let features = vec![
            feature(json!({ "ward": "A" }), square(0.)),
            feature(json!({ "ward": null }), square(1.)),
        ];
        let layer = TargetLayer::prepare(schema(), features, &identity()).unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.anomalies(), [Anomaly::NullTargetId { feature_index: 1 }]);
    }

    #[test]
    fn identifiers_are_synthesized_when_field_is_absent() {
        let features = vec![feature(json!({ "name": "x" }), square(0.)), feature(json!({}), square(1.))];
        let layer = TargetLayer::prepare(schema(), features, &identity()).unwrap();
        let ids: Vec<&str> = layer.targets().iter().map(|t| t.target_id.as_ref()).collect();
        assert_eq!(ids, ["0", "1"]);
        assert!((layer.total_area() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn unrepairable_targets_keep_their_row() {
        let features = vec![
            feature(json!({ "ward": "A" }), square(0.)),
            feature(json!({ "ward": "B" }), MultiPolygon::new(Vec::new())),
        ];
        let layer = TargetLayer::prepare(schema(), features, &identity()).unwrap();
        assert_eq!(layer.len(), 2);
        assert!(layer.is_eligible(0));
        assert!(!layer.is_eligible(1));
        assert_eq!(layer.eligible_shapes().count(), 1);
        assert!(matches!(&layer.anomalies()[0],
            Anomaly::GeometryRepairFailure { owner: GeometryOwner::Target, id, .. } if id == "B"));
    }
}
