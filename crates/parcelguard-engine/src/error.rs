use parcelguard_geometry::GeometryError;

use crate::model::{OverlapId, ParcelId};

/// Failures of the external parcel/audit store collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum OverlapError {
    /// A boundary failed validity checks. Inside a scan this is recovered
    /// locally and surfaces as a warning instead.
    #[error("parcel {parcel_id}: invalid geometry: {reason}")]
    InvalidGeometry { parcel_id: ParcelId, reason: String },

    #[error("overlap {overlap_id}: intersection computation failed: {reason}")]
    IntersectionComputationFailed { overlap_id: OverlapId, reason: String },

    #[error("overlap {overlap_id} already resolved: {detail}")]
    AlreadyResolved { overlap_id: OverlapId, detail: String },

    #[error("a reason is required to delete a listing")]
    MissingReason,

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("overlap {0} not found in the current overlap set")]
    OverlapNotFound(OverlapId),

    #[error("parcel {0} not found")]
    ParcelNotFound(ParcelId),

    #[error("parcel {parcel_id} is not part of overlap {overlap_id}")]
    TargetNotInOverlap {
        overlap_id: OverlapId,
        parcel_id: ParcelId,
    },

    #[error("actor {actor_id} may not {permission}")]
    Unauthorized { actor_id: String, permission: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OverlapError {
    pub(crate) fn invalid_geometry(parcel_id: &ParcelId, err: GeometryError) -> Self {
        let reason = match err {
            GeometryError::InvalidGeometry { reason }
            | GeometryError::IntersectionComputationFailed { reason } => reason,
        };
        OverlapError::InvalidGeometry {
            parcel_id: parcel_id.clone(),
            reason,
        }
    }

    /// Conflicts the caller can display and move past.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            OverlapError::AlreadyResolved { .. } | OverlapError::TargetNotInOverlap { .. }
        )
    }
}

pub type Result<T, E = OverlapError> = std::result::Result<T, E>;
