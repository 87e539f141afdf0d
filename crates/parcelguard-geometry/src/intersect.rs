//! Polygon intersection.

use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};

use crate::bbox::BoundingBox;
use crate::validate::is_valid;
use crate::GeometryError;

/// Intersection of two parcel boundaries.
///
/// - `Ok(None)`: the polygons do not intersect, only touch along an edge or
///   vertex, or one of them is invalid.
/// - `Ok(Some(_))`: the non-empty intersection. Its area may still be ~0 for
///   near-touching inputs; callers clamp through `overlap_measure`.
/// - `Err(IntersectionComputationFailed)`: the boolean-op backend failed or
///   produced non-finite output.
pub fn intersect(
    a: &Polygon<f64>,
    b: &Polygon<f64>,
) -> Result<Option<MultiPolygon<f64>>, GeometryError> {
    if !is_valid(a) || !is_valid(b) {
        return Ok(None);
    }
    intersect_prepared(a, b)
}

/// [`intersect`] for boundaries that already passed [`validate`](crate::validate()).
///
/// Skips the per-call validity check, which is quadratic in the vertex count.
pub fn intersect_prepared(
    a: &Polygon<f64>,
    b: &Polygon<f64>,
) -> Result<Option<MultiPolygon<f64>>, GeometryError> {
    match (BoundingBox::of(a), BoundingBox::of(b)) {
        (Some(box_a), Some(box_b)) if !box_a.disjoint(&box_b) => {}
        _ => return Ok(None),
    }

    let result = catch_unwind(AssertUnwindSafe(|| a.intersection(b))).map_err(|panic| {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "boolean operation panicked".to_string());
        GeometryError::IntersectionComputationFailed { reason }
    })?;

    if result
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .flat_map(|ring| ring.coords())
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err(GeometryError::IntersectionComputationFailed {
            reason: "intersection produced non-finite coordinates".to_string(),
        });
    }

    if result.0.is_empty() {
        Ok(None)
    } else {
        Ok(Some(result))
    }
}

/// Same boundary up to starting vertex, winding direction and closure.
///
/// Used for the exact-duplicate fast path; only compares exteriors of
/// hole-free polygons and falls back to `false` otherwise.
pub fn polygons_equivalent(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    if !a.interiors().is_empty() || !b.interiors().is_empty() {
        return false;
    }
    let ring_a = open_ring(a.exterior());
    let ring_b = open_ring(b.exterior());
    if ring_a.len() != ring_b.len() || ring_a.is_empty() {
        return false;
    }

    let reversed: Vec<Coord<f64>> = ring_b.iter().rev().copied().collect();
    is_rotation(&ring_a, &ring_b) || is_rotation(&ring_a, &reversed)
}

fn open_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords: Vec<Coord<f64>> = ring.coords().copied().collect();
    coords.dedup();
    while coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords
}

fn is_rotation(a: &[Coord<f64>], b: &[Coord<f64>]) -> bool {
    let n = a.len();
    b.iter()
        .enumerate()
        .filter(|(_, c)| **c == a[0])
        .any(|(offset, _)| (0..n).all(|i| a[i] == b[(offset + i) % n]))
}
