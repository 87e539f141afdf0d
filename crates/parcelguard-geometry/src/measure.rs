//! Area and overlap-percentage arithmetic.
//!
//! All arithmetic is `f64`. Two coordinate spaces are supported:
//!
//! - [`CoordinateSpace::Geographic`]: vertices are `(lng, lat)` degrees and
//!   area is the spherical Chamberlain–Duquette approximation on a sphere of
//!   the WGS84 equatorial radius (6 378 137 m). Spherical, not ellipsoidal.
//! - [`CoordinateSpace::Projected`]: vertices are already metric and area is
//!   the planar shoelace area.
//!
//! Percentages are `intersection_area / min(area_a, area_b) * 100`. Float
//! artifacts are clamped: intersection areas at or below `epsilon` count as
//! 0, intersections larger than the smaller parcel are capped at its area,
//! and the percentage is clamped into `[0, 100]`.

use geo::{Area, ChamberlainDuquetteArea, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    #[default]
    Geographic,
    Projected,
}

/// Area in square metres; degenerate or non-finite results are 0.
pub fn area(polygon: &Polygon<f64>, space: CoordinateSpace) -> f64 {
    let raw = match space {
        CoordinateSpace::Geographic => polygon.chamberlain_duquette_unsigned_area(),
        CoordinateSpace::Projected => polygon.unsigned_area(),
    };
    non_degenerate(raw)
}

pub fn multi_area(geometry: &MultiPolygon<f64>, space: CoordinateSpace) -> f64 {
    let raw = match space {
        CoordinateSpace::Geographic => geometry.chamberlain_duquette_unsigned_area(),
        CoordinateSpace::Projected => geometry.unsigned_area(),
    };
    non_degenerate(raw)
}

fn non_degenerate(raw: f64) -> f64 {
    if raw.is_finite() && raw > 0.0 {
        raw
    } else {
        0.0
    }
}

/// Quantified overlap between two parcels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapMeasure {
    pub area_m2: f64,
    pub percentage: f64,
}

/// Turn an intersection area into an [`OverlapMeasure`].
///
/// Returns `None` when the smaller parcel is itself degenerate (area at or
/// below `epsilon`), since no meaningful ratio exists.
pub fn overlap_measure(
    intersection_area: f64,
    area_a: f64,
    area_b: f64,
    epsilon: f64,
) -> Option<OverlapMeasure> {
    let min_area = area_a.min(area_b);
    if !min_area.is_finite() || min_area <= epsilon {
        return None;
    }

    let area_m2 = if intersection_area.is_finite() && intersection_area > epsilon {
        intersection_area.min(min_area)
    } else {
        0.0
    };
    let percentage = (area_m2 / min_area * 100.0).clamp(0.0, 100.0);

    Some(OverlapMeasure {
        area_m2,
        percentage,
    })
}
