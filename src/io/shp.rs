use std::path::Path;

use anyhow::{Context, Result, bail};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{Map, Value};
use shapefile::{self as shp, Reader, Shape, dbase::FieldValue};

use super::geojson::Feature;

/// Read polygon shapes from a `.shp` file (with its `.dbf` sidecar), keeping the
/// named attribute fields as feature properties, or every field when `fields` is empty.
pub fn read_features(path: &Path, fields: &[&str]) -> Result<Vec<Feature>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("[io::shp] Failed to open shapefile: {}", path.display()))?;

    let mut features = Vec::with_capacity(reader.shape_count()?);
    for (i, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result
            .with_context(|| format!("[io::shp] Error reading shape+record #{i} in {}", path.display()))?;

        let geometry = match shape {
            Shape::Polygon(polygon) => polygon_to_geo(&polygon),
            Shape::NullShape => MultiPolygon::new(Vec::new()),
            _ => bail!("[io::shp] shape #{i} in {} is not a Polygon", path.display()),
        };

        let properties = if fields.is_empty() {
            record.into_iter()
                .map(|(field, value)| (field, field_to_json(&value)))
                .collect::<Map<_, _>>()
        } else {
            fields.iter()
                .filter_map(|&field| record.get(field).map(|value| (field.to_string(), field_to_json(value))))
                .collect::<Map<_, _>>()
        };

        features.push(Feature::new(properties, geometry));
    }

    Ok(features)
}

fn field_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(s)) => Value::String(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        FieldValue::Float(Some(n)) => serde_json::Number::from_f64(f64::from(*n)).map(Value::Number).unwrap_or(Value::Null),
        FieldValue::Integer(n) => Value::from(*n),
        FieldValue::Double(n) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        FieldValue::Logical(Some(b)) => Value::Bool(*b),
        FieldValue::Memo(s) => Value::String(s.clone()),
        _ => Value::Null,
    }
}

/// Shapefile rings arrive pre-classified as outer or inner, each outer followed by its holes.
fn polygon_to_geo(polygon: &shp::Polygon) -> MultiPolygon<f64> {
    let mut polys = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut holes = Vec::new();

    for ring in polygon.rings() {
        let mut coords: Vec<Coord<f64>> = ring.points().iter().map(|pt| Coord { x: pt.x, y: pt.y }).collect();
        if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
            if first != last { coords.push(first); }
        }
        let line = LineString(coords);

        match ring {
            shp::PolygonRing::Outer(_) => {
                if let Some(ext) = exterior.replace(line) {
                    polys.push(Polygon::new(ext, std::mem::take(&mut holes)));
                }
            }
            shp::PolygonRing::Inner(_) => holes.push(line),
        }
    }
    if let Some(ext) = exterior {
        polys.push(Polygon::new(ext, holes));
    }

    MultiPolygon::new(polys)
}

#[cfg(test)]
mod tests {
    use geo::Area;

    use super::*;

    #[test]
    fn groups_holes_with_preceding_outer_ring() {
        let pt = |x: f64, y: f64| shp::Point { x, y };
        let polygon = shp::Polygon::with_rings(vec![
            shp::PolygonRing::Outer(vec![pt(0., 0.), pt(0., 4.), pt(4., 4.), pt(4., 0.), pt(0., 0.)]),
            shp::PolygonRing::Inner(vec![pt(1., 1.), pt(2., 1.), pt(2., 2.), pt(1., 2.), pt(1., 1.)]),
            shp::PolygonRing::Outer(vec![pt(10., 0.), pt(10., 1.), pt(11., 1.), pt(11., 0.), pt(10., 0.)]),
        ]);

        let shape = polygon_to_geo(&polygon);
        assert_eq!(shape.0.len(), 2);
        assert_eq!(shape.0[0].interiors().len(), 1);
        assert!(shape.0[1].interiors().is_empty());
        assert!((shape.unsigned_area() - 16.0).abs() < 1e-12);
    }

    #[test]
    fn character_fields_are_trimmed() {
        let value = field_to_json(&FieldValue::Character(Some(" 060371234001 ".into())));
        assert_eq!(value, Value::String("060371234001".into()));
        assert_eq!(field_to_json(&FieldValue::Character(None)), Value::Null);
    }
}
