//! Property tests for the overlap arithmetic of the geometry kernel.
//!
//! Axis-aligned rectangles have a closed-form intersection area, so they make
//! a good oracle for the boolean-op backend:
//! - intersection area is symmetric in its arguments
//! - an identical pair always measures ~100%
//! - the measured percentage stays within `[0, 100]`
//! - the area matches the analytic overlap of the two rectangles

use approx::relative_eq;
use geo::{polygon, Polygon};
use parcelguard_geometry::{area, intersect, multi_area, overlap_measure, CoordinateSpace};
use proptest::prelude::*;

const EPS: f64 = 1e-9;

fn rect(x: f64, y: f64, w: f64, h: f64) -> Polygon<f64> {
    polygon![(x: x, y: y), (x: x + w, y: y), (x: x + w, y: y + h), (x: x, y: y + h)]
}

fn rect_strategy() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (
        -500.0..500.0f64,
        -500.0..500.0f64,
        1.0..400.0f64,
        1.0..400.0f64,
    )
}

fn measured(a: &Polygon<f64>, b: &Polygon<f64>) -> (f64, f64) {
    let inter = intersect(a, b)
        .expect("rectangles never fail")
        .map(|g| multi_area(&g, CoordinateSpace::Projected))
        .unwrap_or(0.0);
    let m = overlap_measure(
        inter,
        area(a, CoordinateSpace::Projected),
        area(b, CoordinateSpace::Projected),
        EPS,
    )
    .expect("rectangles are never degenerate");
    (m.area_m2, m.percentage)
}

fn analytic_overlap(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> f64 {
    let dx = (a.0 + a.2).min(b.0 + b.2) - a.0.max(b.0);
    let dy = (a.1 + a.3).min(b.1 + b.3) - a.1.max(b.1);
    dx.max(0.0) * dy.max(0.0)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn overlap_is_symmetric(ra in rect_strategy(), rb in rect_strategy()) {
        let a = rect(ra.0, ra.1, ra.2, ra.3);
        let b = rect(rb.0, rb.1, rb.2, rb.3);
        let (area_ab, pct_ab) = measured(&a, &b);
        let (area_ba, pct_ba) = measured(&b, &a);
        prop_assert!(relative_eq!(area_ab, area_ba, epsilon = 1e-3, max_relative = 1e-6));
        prop_assert!(relative_eq!(pct_ab, pct_ba, epsilon = 1e-3, max_relative = 1e-6));
    }

    #[test]
    fn identical_boundaries_measure_hundred_percent(r in rect_strategy()) {
        let a = rect(r.0, r.1, r.2, r.3);
        let b = a.clone();
        let (overlap_area, pct) = measured(&a, &b);
        prop_assert!(relative_eq!(pct, 100.0, max_relative = 1e-6));
        prop_assert!(relative_eq!(overlap_area, area(&a, CoordinateSpace::Projected), max_relative = 1e-6));
    }

    #[test]
    fn percentage_is_bounded(ra in rect_strategy(), rb in rect_strategy()) {
        let a = rect(ra.0, ra.1, ra.2, ra.3);
        let b = rect(rb.0, rb.1, rb.2, rb.3);
        let (overlap_area, pct) = measured(&a, &b);
        prop_assert!((0.0..=100.0).contains(&pct));
        let min_area = area(&a, CoordinateSpace::Projected).min(area(&b, CoordinateSpace::Projected));
        prop_assert!(overlap_area <= min_area);
    }

    #[test]
    fn area_matches_analytic_rectangle_overlap(ra in rect_strategy(), rb in rect_strategy()) {
        let a = rect(ra.0, ra.1, ra.2, ra.3);
        let b = rect(rb.0, rb.1, rb.2, rb.3);
        let (overlap_area, _) = measured(&a, &b);
        prop_assert!(relative_eq!(overlap_area, analytic_overlap(ra, rb), epsilon = 1e-2, max_relative = 1e-5));
    }
}
