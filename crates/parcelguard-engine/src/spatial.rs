//! R-tree over parcel bounding boxes for candidate pruning.

use parcelguard_geometry::BoundingBox;
use rstar::{RTree, RTreeObject, AABB};

#[derive(Debug, Clone, Copy)]
struct ParcelBox {
    idx: usize,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for ParcelBox {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

pub(crate) struct CandidateIndex {
    tree: RTree<ParcelBox>,
}

impl CandidateIndex {
    pub(crate) fn build<'a>(boxes: impl Iterator<Item = &'a BoundingBox>) -> Self {
        let entries: Vec<ParcelBox> = boxes
            .enumerate()
            .map(|(idx, bbox)| ParcelBox {
                idx,
                env: AABB::from_corners(bbox.lower(), bbox.upper()),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indices greater than `idx` whose envelope touches `bbox`, ascending.
    pub(crate) fn candidates_after(&self, idx: usize, bbox: &BoundingBox) -> Vec<usize> {
        let query = AABB::from_corners(bbox.lower(), bbox.upper());
        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|entry| entry.idx)
            .filter(|&j| j > idx)
            .collect();
        found.sort_unstable();
        found
    }
}
