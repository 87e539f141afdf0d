//! Parcelguard Geometry Kernel
//!
//! Pure, side-effect-free primitives over parcel boundaries:
//!
//! ```text
//! ┌──────────────┐   to_polygon   ┌──────────────┐   validate    ┌──────────────┐
//! │  Boundary    │──────────────►│ geo::Polygon │──────────────►│  valid ring  │
//! │  (GeoJSON)   │               └──────────────┘               └──────┬───────┘
//! └──────────────┘                                                     │
//!                    bounding_box / boxes_disjoint (cheap reject)      │
//!                    area (planar or spherical)                        ▼
//!                    intersect → intersection area → percentage  ┌──────────────┐
//!                                                                │ OverlapMeasure│
//!                                                                └──────────────┘
//! ```
//!
//! Nothing here logs or mutates: callers decide how to report a
//! [`GeometryError`]. The engine treats both variants as recoverable and
//! skips the parcel or pair they concern.

pub mod bbox;
pub mod boundary;
pub mod intersect;
pub mod measure;
pub mod validate;

pub use bbox::{bounding_box, boxes_disjoint, BoundingBox};
pub use boundary::{Boundary, GeoJsonKind, GeoJsonPolygon};
pub use intersect::{intersect, intersect_prepared, polygons_equivalent};
pub use measure::{area, multi_area, overlap_measure, CoordinateSpace, OverlapMeasure};
pub use validate::{is_valid, validate};

pub use geo::{MultiPolygon, Polygon};

/// Errors raised by the geometry kernel.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("intersection computation failed: {reason}")]
    IntersectionComputationFailed { reason: String },
}

impl GeometryError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }
}
