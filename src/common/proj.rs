use anyhow::{Context, Result, anyhow};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};

use crate::config::CrsConfig;

/// Moves geometries from the input coordinate system into the equal-area system
/// used for every area computation. Geographic systems are fed in degrees.
pub struct Projection {
    from: Proj4,
    to: Proj4,
    from_degrees: bool,
    to_degrees: bool,
    identity: bool,
}

impl Projection {
    /// Build a projection between two PROJ.4 definitions.
    pub fn new(source: &str, target: &str) -> Result<Self> {
        let from = Proj4::from_proj_string(source)
            .with_context(|| anyhow!("[proj] failed to build source PROJ.4: {source}"))?;
        let to = Proj4::from_proj_string(target)
            .with_context(|| anyhow!("[proj] failed to build target PROJ.4: {target}"))?;

        Ok(Self {
            from,
            to,
            from_degrees: is_geographic(source),
            to_degrees: is_geographic(target),
            identity: source.trim() == target.trim(),
        })
    }

    /// Source CRS -> equal-area CRS, as declared in the run configuration.
    pub fn from_config(crs: &CrsConfig) -> Result<Self> {
        if is_geographic(&crs.equal_area) {
            return Err(anyhow!("[proj] {:?} is geographic; areas must be computed in a projected equal-area system", crs.equal_area));
        }
        Self::new(&crs.source, &crs.equal_area)
    }

    /// True when input coordinates are already in the target system.
    #[inline] pub fn is_identity(&self) -> bool { self.identity }

    /// Reproject one shape.
    pub fn project(&self, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        if self.identity {
            return Ok(shape.clone());
        }

        shape.try_map_coords(|coord: Coord<f64>| -> Result<Coord<f64>> {
            let mut point = if self.from_degrees {
                (coord.x.to_radians(), coord.y.to_radians(), 0.0)
            } else {
                (coord.x, coord.y, 0.0)
            };
            transform(&self.from, &self.to, &mut point)
                .map_err(|e| anyhow!("[proj] CRS transform failed at ({}, {}): {e:?}", coord.x, coord.y))?;
            Ok(if self.to_degrees {
                Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
            } else {
                Coord { x: point.0, y: point.1 }
            })
        })
    }
}

/// Longitude/latitude systems take and return angles rather than meters.
fn is_geographic(proj_string: &str) -> bool {
    proj_string.split_whitespace()
        .any(|token| matches!(token, "+proj=longlat" | "+proj=latlong" | "+proj=lonlat" | "+proj=latlon"))
}

#[cfg(test)]
mod tests {
    use geo::{Area, polygon};

    use super::*;
    use crate::config::{CALIFORNIA_ALBERS, NAD83_LONLAT};

    #[test]
    fn identity_when_systems_match() {
        let proj = Projection::new(CALIFORNIA_ALBERS, CALIFORNIA_ALBERS).unwrap();
        assert!(proj.is_identity());
        let square = MultiPolygon::new(vec![polygon![(x: 0., y: 0.), (x: 2., y: 0.), (x: 2., y: 2.), (x: 0., y: 2.)]]);
        assert_eq!(proj.project(&square).unwrap(), square);
    }

    #[test]
    fn rejects_geographic_area_system() {
        let crs = CrsConfig { source: NAD83_LONLAT.into(), equal_area: NAD83_LONLAT.into() };
        assert!(Projection::from_config(&crs).is_err());
    }

    #[test]
    fn projects_lonlat_cell_to_square_meters() {
        // A 0.01 x 0.01 degree cell in downtown Los Angeles is roughly 1.02 km^2.
        let proj = Projection::new(NAD83_LONLAT, CALIFORNIA_ALBERS).unwrap();
        let cell = MultiPolygon::new(vec![polygon![
            (x: -118.25, y: 34.05), (x: -118.24, y: 34.05), (x: -118.24, y: 34.06), (x: -118.25, y: 34.06),
        ]]);
        let area = proj.project(&cell).unwrap().unsigned_area();
        assert!((0.95e6..1.1e6).contains(&area), "unexpected projected area {area}");
    }
}
