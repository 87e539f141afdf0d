//! Best-effort validity checks.
//!
//! A boundary is accepted when every ring has finite coordinates, at least
//! three distinct vertices, a non-zero enclosed area, and no edge crossing or
//! folding back onto another edge of the same ring. Cross-ring topology
//! (holes touching the shell, holes outside the shell) is not repaired or
//! checked.

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, Coord, Line, LineString, Polygon};

use crate::GeometryError;

/// `true` when [`validate`] accepts the polygon.
pub fn is_valid(polygon: &Polygon<f64>) -> bool {
    validate(polygon).is_ok()
}

pub fn validate(polygon: &Polygon<f64>) -> Result<(), GeometryError> {
    validate_ring(polygon.exterior(), "exterior ring")?;
    for (i, hole) in polygon.interiors().iter().enumerate() {
        validate_ring(hole, &format!("interior ring {i}"))?;
    }
    Ok(())
}

fn validate_ring(ring: &LineString<f64>, label: &str) -> Result<(), GeometryError> {
    if let Some(c) = ring.coords().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(GeometryError::invalid(format!(
            "{label} has non-finite coordinate ({}, {})",
            c.x, c.y
        )));
    }

    let vertices = distinct_vertices(ring);
    if vertices.len() < 3 {
        return Err(GeometryError::invalid(format!(
            "{label} has {} distinct vertices, need at least 3",
            vertices.len()
        )));
    }

    if let Some((i, j)) = first_self_intersection(&vertices) {
        return Err(GeometryError::invalid(format!(
            "{label} self-intersects (edges {i} and {j})"
        )));
    }

    let closed = Polygon::new(LineString::new(vertices), vec![]);
    if closed.signed_area() == 0.0 {
        return Err(GeometryError::invalid(format!("{label} encloses no area")));
    }

    Ok(())
}

/// Vertices with consecutive repeats and the closing vertex removed.
fn distinct_vertices(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut vertices: Vec<Coord<f64>> = ring.coords().copied().collect();
    vertices.dedup();
    while vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    vertices
}

fn first_self_intersection(vertices: &[Coord<f64>]) -> Option<(usize, usize)> {
    let n = vertices.len();
    let edges: Vec<Line<f64>> = (0..n)
        .map(|i| Line::new(vertices[i], vertices[(i + 1) % n]))
        .collect();

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                // Neighbouring edges always share their common vertex.
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return Some((i, j)),
            }
        }
    }
    None
}
