use geo::{Area, BooleanOps, CoordsIter, MultiPolygon, Validation};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum RepairError {
    #[error("geometry is empty")]
    Empty,
    #[error("geometry has non-finite coordinates")]
    NonFinite,
    #[error("geometry collapsed to zero area during repair")]
    Collapsed,
    #[error("geometry is still invalid after repair")]
    StillInvalid,
}

/// A shape that passed validation, possibly after repair.
#[derive(Debug, Clone)]
pub(crate) struct CleanShape {
    pub shape: MultiPolygon<f64>,
    pub repaired: bool,
}

/// Return `shape` unchanged if it is valid; otherwise rebuild it by running it
/// through a boolean union with the empty set, which re-nodes self-intersections
/// and drops degenerate rings (the same effect as a zero-width buffer).
pub(crate) fn clean(shape: MultiPolygon<f64>) -> Result<CleanShape, RepairError> {
    if shape.0.is_empty() {
        return Err(RepairError::Empty);
    }
    if !shape.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
        return Err(RepairError::NonFinite);
    }
    if shape.is_valid() {
        if shape.unsigned_area() <= 0.0 {
            return Err(RepairError::Collapsed);
        }
        return Ok(CleanShape { shape, repaired: false });
    }

    let fixed = shape.union(&MultiPolygon::new(Vec::new()));
    if fixed.0.is_empty() || fixed.unsigned_area() <= 0.0 {
        return Err(RepairError::Collapsed);
    }
    if !fixed.is_valid() {
        return Err(RepairError::StillInvalid);
    }

    Ok(CleanShape { shape: fixed, repaired: true })
}

#[cfg(test)]
mod tests {
    use geo::{Coord, LineString, Polygon, polygon};

    use super::*;

    #[test]
    fn valid_shape_passes_through() {
        let square = MultiPolygon::new(vec![polygon![(x: 0., y: 0.), (x: 1., y: 0.), (x: 1., y: 1.), (x: 0., y: 1.)]]);
        let clean = clean(square.clone()).unwrap();
        assert!(!clean.repaired);
        assert_eq!(clean.shape, square);
    }

    #[test]
    fn bowtie_is_repaired_into_two_lobes() {
        // Self-intersecting ring crossing at (1, 1).
        let bowtie = MultiPolygon::new(vec![polygon![(x: 0., y: 0.), (x: 2., y: 2.), (x: 2., y: 0.), (x: 0., y: 2.)]]);
        assert!(!bowtie.is_valid());

        let clean = clean(bowtie).unwrap();
        assert!(clean.repaired);
        assert!(clean.shape.is_valid());
        assert!((clean.shape.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_and_non_finite_fail() {
        assert_eq!(clean(MultiPolygon::new(vec![])).unwrap_err(), RepairError::Empty);

        let ring = LineString::from(vec![
            Coord { x: 0., y: 0. }, Coord { x: f64::NAN, y: 0. }, Coord { x: 1., y: 1. }, Coord { x: 0., y: 0. },
        ]);
        let bad = MultiPolygon::new(vec![Polygon::new(ring, vec![])]);
        assert_eq!(clean(bad).unwrap_err(), RepairError::NonFinite);
    }

    #[test]
    fn zero_area_sliver_collapses() {
        let sliver = MultiPolygon::new(vec![polygon![(x: 0., y: 0.), (x: 1., y: 0.), (x: 2., y: 0.)]]);
        assert_eq!(clean(sliver).unwrap_err(), RepairError::Collapsed);
    }
}
