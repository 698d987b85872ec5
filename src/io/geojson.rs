use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{Map, Value};
use tracing::debug;

/// One areal feature: its attribute properties and polygonal geometry.
#[derive(Debug, Clone)]
pub struct Feature {
    pub properties: Map<String, Value>,
    pub geometry: MultiPolygon<f64>,
}

impl Feature {
    pub fn new(properties: Map<String, Value>, geometry: MultiPolygon<f64>) -> Self {
        Self { properties, geometry }
    }

    /// Read a property as an identifier string. Numbers are rendered without a
    /// fractional part when they are integral; null and empty strings yield `None`.
    pub fn property_str(&self, field: &str) -> Option<String> {
        match self.properties.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => i.to_string(),
                (_, Some(u), _) => u.to_string(),
                (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
                _ => n.to_string(),
            }),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Read polygonal features from a GeoJSON FeatureCollection file.
pub fn read_features(path: &Path) -> Result<Vec<Feature>> {
    let bytes = fs::read(path)
        .with_context(|| format!("[io::geojson] Failed to read {}", path.display()))?;
    read_features_bytes(&bytes)
        .with_context(|| format!("[io::geojson] Failed to parse {}", path.display()))
}

/// Read polygonal features from GeoJSON bytes. Features whose geometry is not a
/// Polygon or MultiPolygon are skipped.
pub fn read_features_bytes(bytes: &[u8]) -> Result<Vec<Feature>> {
    let value: Value = serde_json::from_slice(bytes).context("[io::geojson] Invalid JSON")?;

    if value["type"].as_str() != Some("FeatureCollection") {
        bail!("[io::geojson] Expected a FeatureCollection, found {:?}", value["type"]);
    }
    let features = value["features"].as_array()
        .ok_or_else(|| anyhow!("[io::geojson] FeatureCollection has no features array"))?;

    let mut out = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let properties = feature["properties"].as_object().cloned().unwrap_or_default();
        let geometry = &feature["geometry"];

        let shape = match geometry["type"].as_str() {
            Some("Polygon") => {
                let rings = coords_array(&geometry["coordinates"], i)?;
                MultiPolygon::new(vec![parse_polygon(rings)?])
            }
            Some("MultiPolygon") => {
                let polygons = coords_array(&geometry["coordinates"], i)?;
                MultiPolygon::new(polygons.iter()
                    .map(|p| parse_polygon(p.as_array().ok_or_else(|| anyhow!("[io::geojson] feature {i}: polygon is not an array"))?))
                    .collect::<Result<Vec<_>>>()?)
            }
            other => {
                debug!("[io::geojson] skipping feature {i} with geometry type {other:?}");
                continue;
            }
        };

        out.push(Feature::new(properties, shape));
    }

    Ok(out)
}

fn coords_array(value: &Value, feature: usize) -> Result<&Vec<Value>> {
    value.as_array().ok_or_else(|| anyhow!("[io::geojson] feature {feature}: coordinates are not an array"))
}

/// A GeoJSON polygon is `[exterior, hole, hole, ...]`.
fn parse_polygon(rings: &[Value]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| {
        ring.as_array()
            .ok_or_else(|| anyhow!("[io::geojson] ring is not an array"))
            .and_then(|coords| parse_ring(coords))
    });

    let exterior = rings.next()
        .ok_or_else(|| anyhow!("[io::geojson] polygon has no exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;

    Ok(Polygon::new(exterior, interiors))
}

/// A ring is `[[x, y], ...]`; extra ordinates (z, m) are ignored.
fn parse_ring(coords: &[Value]) -> Result<LineString<f64>> {
    let mut points = coords.iter()
        .map(|pair| {
            let x = pair[0].as_f64().ok_or_else(|| anyhow!("[io::geojson] invalid coordinate: x must be a number"))?;
            let y = pair[1].as_f64().ok_or_else(|| anyhow!("[io::geojson] invalid coordinate: y must be a number"))?;
            Ok(Coord { x, y })
        })
        .collect::<Result<Vec<_>>>()?;

    if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
        if first != last { points.push(first); }
    }

    Ok(LineString(points))
}
