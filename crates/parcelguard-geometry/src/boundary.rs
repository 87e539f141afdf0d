//! GeoJSON-compatible boundary interchange.
//!
//! Parcels arrive from the listing store as loosely-shaped JSON. Two shapes
//! are accepted:
//!
//! - a GeoJSON `Polygon` object: `{"type": "Polygon", "coordinates": [[[lng, lat], ...], ...]}`
//! - a bare exterior ring: `[[lng, lat], ...]`
//!
//! Rings may be explicitly closed (last position repeats the first) or not;
//! `geo::Polygon::new` closes them either way. Positions with a third
//! (altitude) component are accepted and the extra component is dropped.

use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::validate::validate;
use crate::GeometryError;

/// A single `[lng, lat, ...]` position.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoJsonKind {
    Polygon,
}

/// GeoJSON `Polygon` geometry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonPolygon {
    #[serde(rename = "type")]
    pub kind: GeoJsonKind,
    /// Exterior ring first, then holes.
    pub coordinates: Vec<Vec<Position>>,
}

/// Parcel boundary as exchanged with the surrounding system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Boundary {
    GeoJson(GeoJsonPolygon),
    Ring(Vec<Position>),
}

impl Boundary {
    /// Build a closed boundary from `(lng, lat)` pairs.
    pub fn from_ring(points: &[(f64, f64)]) -> Self {
        let mut ring: Vec<Position> = points.iter().map(|&(x, y)| vec![x, y]).collect();
        if let (Some(first), Some(last)) = (ring.first().cloned(), ring.last()) {
            if &first != last {
                ring.push(first);
            }
        }
        Boundary::GeoJson(GeoJsonPolygon {
            kind: GeoJsonKind::Polygon,
            coordinates: vec![ring],
        })
    }

    /// Convert to a `geo` polygon without checking validity.
    pub fn to_polygon_unchecked(&self) -> Result<Polygon<f64>, GeometryError> {
        let rings: Vec<&Vec<Position>> = match self {
            Boundary::GeoJson(geojson) => geojson.coordinates.iter().collect(),
            Boundary::Ring(ring) => vec![ring],
        };

        let mut rings = rings.into_iter();
        let exterior = rings
            .next()
            .ok_or_else(|| GeometryError::invalid("polygon has no exterior ring"))?;
        let exterior = ring_to_linestring(exterior)?;
        let interiors = rings
            .map(|ring| ring_to_linestring(ring))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Polygon::new(exterior, interiors))
    }

    /// Convert to a `geo` polygon, rejecting anything [`validate`] rejects.
    pub fn to_polygon(&self) -> Result<Polygon<f64>, GeometryError> {
        let polygon = self.to_polygon_unchecked()?;
        validate(&polygon)?;
        Ok(polygon)
    }

    /// Serialize a polygon back into the GeoJSON object form.
    pub fn from_polygon(polygon: &Polygon<f64>) -> Self {
        let coordinates = std::iter::once(polygon.exterior())
            .chain(polygon.interiors().iter())
            .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
            .collect();
        Boundary::GeoJson(GeoJsonPolygon {
            kind: GeoJsonKind::Polygon,
            coordinates,
        })
    }
}

fn ring_to_linestring(ring: &[Position]) -> Result<LineString<f64>, GeometryError> {
    let coords = ring
        .iter()
        .enumerate()
        .map(|(i, position)| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(GeometryError::invalid(format!(
                "position {i} has {} component(s), expected at least 2",
                position.len()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

/// `serde(with = ...)` adapter writing an optional `MultiPolygon` as a GeoJSON
/// `MultiPolygon` object.
pub mod optional_multipolygon {
    use geo::{MultiPolygon, Polygon};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Boundary, GeoJsonPolygon, Position};

    #[derive(Serialize, Deserialize)]
    struct GeoJsonMultiPolygon {
        #[serde(rename = "type")]
        kind: MultiPolygonKind,
        coordinates: Vec<Vec<Vec<Position>>>,
    }

    #[derive(Serialize, Deserialize)]
    enum MultiPolygonKind {
        MultiPolygon,
    }

    pub fn serialize<S: Serializer>(
        value: &Option<MultiPolygon<f64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let geojson = value.as_ref().map(|multi| GeoJsonMultiPolygon {
            kind: MultiPolygonKind::MultiPolygon,
            coordinates: multi
                .iter()
                .map(|polygon| match Boundary::from_polygon(polygon) {
                    Boundary::GeoJson(GeoJsonPolygon { coordinates, .. }) => coordinates,
                    Boundary::Ring(ring) => vec![ring],
                })
                .collect(),
        });
        geojson.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<MultiPolygon<f64>>, D::Error> {
        let Some(geojson) = Option::<GeoJsonMultiPolygon>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let polygons = geojson
            .coordinates
            .into_iter()
            .map(|rings| {
                Boundary::GeoJson(GeoJsonPolygon {
                    kind: super::GeoJsonKind::Polygon,
                    coordinates: rings,
                })
                .to_polygon_unchecked()
            })
            .collect::<Result<Vec<Polygon<f64>>, _>>()
            .map_err(serde::de::Error::custom)?;
        Ok(Some(MultiPolygon::new(polygons)))
    }
}
