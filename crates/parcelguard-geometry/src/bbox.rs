//! Axis-aligned bounding boxes used as the scanner's cheap reject.

use geo::{BoundingRect, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// `(min_lng, min_lat, max_lng, max_lat)` envelope of a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn of(polygon: &Polygon<f64>) -> Option<Self> {
        polygon.bounding_rect().map(Self::from)
    }

    /// True iff the boxes are separated on at least one axis.
    ///
    /// Boxes that merely touch are *not* disjoint, so this never rejects a
    /// pair whose exact intersection could be non-empty.
    pub fn disjoint(&self, other: &BoundingBox) -> bool {
        self.max_lng < other.min_lng
            || other.max_lng < self.min_lng
            || self.max_lat < other.min_lat
            || other.max_lat < self.min_lat
    }

    pub fn lower(&self) -> [f64; 2] {
        [self.min_lng, self.min_lat]
    }

    pub fn upper(&self) -> [f64; 2] {
        [self.max_lng, self.max_lat]
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            min_lng: rect.min().x,
            min_lat: rect.min().y,
            max_lng: rect.max().x,
            max_lat: rect.max().y,
        }
    }
}

pub fn bounding_box(polygon: &Polygon<f64>) -> Option<BoundingBox> {
    BoundingBox::of(polygon)
}

pub fn boxes_disjoint(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.disjoint(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn bbox(min: (f64, f64), max: (f64, f64)) -> BoundingBox {
        BoundingBox {
            min_lng: min.0,
            min_lat: min.1,
            max_lng: max.0,
            max_lat: max.1,
        }
    }

    #[test]
    fn envelope_of_triangle() {
        let tri = polygon![(x: 1.0, y: -2.0), (x: 5.0, y: 0.0), (x: 2.0, y: 3.0)];
        assert_eq!(bounding_box(&tri), Some(bbox((1.0, -2.0), (5.0, 3.0))));
    }

    #[test]
    fn separated_on_one_axis_is_disjoint() {
        let a = bbox((0.0, 0.0), (1.0, 1.0));
        assert!(boxes_disjoint(&a, &bbox((2.0, 0.0), (3.0, 1.0))));
        assert!(boxes_disjoint(&a, &bbox((0.0, 1.5), (1.0, 2.0))));
    }

    #[test]
    fn touching_boxes_are_not_disjoint() {
        let a = bbox((0.0, 0.0), (1.0, 1.0));
        assert!(!boxes_disjoint(&a, &bbox((1.0, 0.0), (2.0, 1.0))));
        assert!(!boxes_disjoint(&a, &bbox((1.0, 1.0), (2.0, 2.0))));
    }

    #[test]
    fn disjointness_is_symmetric() {
        let a = bbox((0.0, 0.0), (1.0, 1.0));
        let b = bbox((0.5, 3.0), (4.0, 4.0));
        assert_eq!(a.disjoint(&b), b.disjoint(&a));
    }
}
