use geo::{BoundingRect, Coord, MultiPolygon, Rect};
use rstar::{AABB, RTree, RTreeObject};

/// Bounding envelope of one shape, tagged with the shape's slot in its owning collection.
#[derive(Debug, Clone)]
struct Envelope {
    slot: u32,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for Envelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope { self.aabb }
}

#[inline]
fn to_aabb(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners(rect.min().into(), rect.max().into())
}

/// R-tree over shape envelopes, used as the coarse prefilter before exact geometry tests.
#[derive(Debug, Clone)]
pub(crate) struct EnvelopeIndex {
    rtree: RTree<Envelope>,
}

impl EnvelopeIndex {
    /// Index the given (slot, shape) pairs. Empty shapes have no envelope and are left out.
    pub(crate) fn new<'a>(shapes: impl IntoIterator<Item = (u32, &'a MultiPolygon<f64>)>) -> Self {
        Self {
            rtree: RTree::bulk_load(shapes.into_iter()
                .filter_map(|(slot, shape)| shape.bounding_rect()
                    .map(|rect| Envelope { slot, aabb: to_aabb(&rect) }))
                .collect()),
        }
    }

    #[inline] pub(crate) fn len(&self) -> usize { self.rtree.size() }

    /// Slots whose envelopes intersect `rect`, padded by `pad` on every side.
    pub(crate) fn candidates(&self, rect: &Rect<f64>, pad: f64) -> impl Iterator<Item = u32> + '_ {
        let search = AABB::from_corners(
            [rect.min().x - pad, rect.min().y - pad],
            [rect.max().x + pad, rect.max().y + pad],
        );
        self.rtree.locate_in_envelope_intersecting(&search).map(|env| env.slot)
    }
}

/// Smallest rectangle covering every shape, or `None` if all are empty.
pub(crate) fn total_bounds<'a>(shapes: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Option<Rect<f64>> {
    shapes.into_iter()
        .filter_map(|shape| shape.bounding_rect())
        .reduce(|a, b| Rect::new(
            Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
            Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
        ))
}
