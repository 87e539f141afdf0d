//! Domain records shared by the scanner, workflow and reporting layers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use parcelguard_geometry::boundary::optional_multipolygon;
use parcelguard_geometry::Boundary;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::classify::Severity;

/// Identifier of a user (seller, submitter, admin).
pub type UserId = String;

/// Actor id recorded on entries written by the automatic policy path.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParcelId(pub String);

impl ParcelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParcelId {
    fn from(value: &str) -> Self {
        ParcelId(value.to_string())
    }
}

impl From<String> for ParcelId {
    fn from(value: String) -> Self {
        ParcelId(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParcelStatus {
    Draft,
    Published,
    Archived,
    Closed,
}

impl ParcelStatus {
    /// Drafts and archived listings never take part in overlap scanning.
    pub fn is_scannable(self) -> bool {
        !matches!(self, ParcelStatus::Draft | ParcelStatus::Archived)
    }
}

/// A land parcel as provided by the listing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: ParcelId,
    pub owner_id: UserId,
    pub status: ParcelStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub boundary: Boundary,
    /// Area precomputed by the listing store, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<f64>,
}

impl Parcel {
    pub fn new(
        id: impl Into<ParcelId>,
        owner_id: impl Into<UserId>,
        status: ParcelStatus,
        boundary: Boundary,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            status,
            title: String::new(),
            region: None,
            boundary,
            area_m2: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Contact details of a parcel owner, read-only, for report rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

// ============================================================================
// Overlap identity
// ============================================================================

/// Canonical, order-independent key of a parcel pair (`low < high`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    low: ParcelId,
    high: ParcelId,
}

/// An overlap record is identified by the pair it describes.
pub type OverlapId = PairKey;

impl PairKey {
    /// `None` for a parcel paired with itself.
    pub fn new(a: &ParcelId, b: &ParcelId) -> Option<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Some(Self {
                low: a.clone(),
                high: b.clone(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                low: b.clone(),
                high: a.clone(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> &ParcelId {
        &self.low
    }

    pub fn high(&self) -> &ParcelId {
        &self.high
    }

    pub fn contains(&self, id: &ParcelId) -> bool {
        &self.low == id || &self.high == id
    }

    /// The other member of the pair, if `id` is a member.
    pub fn other(&self, id: &ParcelId) -> Option<&ParcelId> {
        if &self.low == id {
            Some(&self.high)
        } else if &self.high == id {
            Some(&self.low)
        } else {
            None
        }
    }
}

const PAIR_SEPARATOR: char = '|';

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PAIR_SEPARATOR}{}", self.low, self.high)
    }
}

/// Parses the `low|high` form. Ids containing the separator cannot be written
/// this way; the serde form is a `[low, high]` array and has no such limit.
impl FromStr for PairKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(PAIR_SEPARATOR);
        let (a, b) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) => (a, b),
            (_, _, Some(_)) => {
                return Err(format!(
                    "overlap id `{s}` is ambiguous: more than one `{PAIR_SEPARATOR}`"
                ))
            }
            _ => return Err(format!("expected `<parcel>{PAIR_SEPARATOR}<parcel>`, got `{s}`")),
        };
        if a.is_empty() || b.is_empty() {
            return Err(format!("empty parcel id in overlap id `{s}`"));
        }
        PairKey::new(&ParcelId::from(a), &ParcelId::from(b))
            .ok_or_else(|| format!("overlap id `{s}` pairs a parcel with itself"))
    }
}

impl Serialize for PairKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.low, &self.high).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PairKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (a, b) = <(ParcelId, ParcelId)>::deserialize(deserializer)?;
        PairKey::new(&a, &b).ok_or_else(|| {
            serde::de::Error::custom(format!("overlap pairs parcel `{a}` with itself"))
        })
    }
}

// ============================================================================
// Overlap records
// ============================================================================

/// One detected overlap between two eligible parcels.
///
/// Invariants: `overlap_percentage ∈ [0, 100]` and
/// `overlap_area_m2 ≤ min(area_a, area_b)`. `parcel_a_id` is always the
/// lower id of the pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapRecord {
    pub id: OverlapId,
    pub parcel_a_id: ParcelId,
    pub parcel_b_id: ParcelId,
    pub overlap_percentage: f64,
    pub overlap_area_m2: f64,
    #[serde(default, with = "optional_multipolygon")]
    pub intersection_geometry: Option<MultiPolygon<f64>>,
    pub same_owner: bool,
    pub severity: Severity,
    pub discovered_at: DateTime<Utc>,
}

// ============================================================================
// Resolution + audit
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    Archive,
    Delete,
    /// Overlap accepted as legitimate (adjacent parcels, same-owner subdivision).
    Resolve,
}

/// Where an overlap stands in its resolution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionState {
    Open,
    Archived,
    Deleted,
    Ignored,
}

impl ResolutionState {
    pub fn is_terminal(self) -> bool {
        self != ResolutionState::Open
    }
}

impl From<ResolutionKind> for ResolutionState {
    fn from(kind: ResolutionKind) -> Self {
        match kind {
            ResolutionKind::Archive => ResolutionState::Archived,
            ResolutionKind::Delete => ResolutionState::Deleted,
            ResolutionKind::Resolve => ResolutionState::Ignored,
        }
    }
}

/// Immutable record of a decision taken on an overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub id: Uuid,
    pub overlap_record_id: OverlapId,
    pub action: ResolutionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_parcel_id: Option<ParcelId>,
    pub actor_id: UserId,
    pub reason: String,
    pub acted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditActionType {
    AutoDeleteOverlap,
    ArchiveDuplicateListing,
    DeleteDuplicateListing,
    ResolveOverlap,
    ResolutionConflict,
    OverlapFlaggedForReview,
}

impl AuditActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditActionType::AutoDeleteOverlap => "AUTO_DELETE_OVERLAP",
            AuditActionType::ArchiveDuplicateListing => "ARCHIVE_DUPLICATE_LISTING",
            AuditActionType::DeleteDuplicateListing => "DELETE_DUPLICATE_LISTING",
            AuditActionType::ResolveOverlap => "RESOLVE_OVERLAP",
            AuditActionType::ResolutionConflict => "RESOLUTION_CONFLICT",
            AuditActionType::OverlapFlaggedForReview => "OVERLAP_FLAGGED_FOR_REVIEW",
        }
    }

    pub fn for_resolution(kind: ResolutionKind) -> Self {
        match kind {
            ResolutionKind::Archive => AuditActionType::ArchiveDuplicateListing,
            ResolutionKind::Delete => AuditActionType::DeleteDuplicateListing,
            ResolutionKind::Resolve => AuditActionType::ResolveOverlap,
        }
    }
}

impl fmt::Display for AuditActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AuditActionType::AutoDeleteOverlap,
            AuditActionType::ArchiveDuplicateListing,
            AuditActionType::DeleteDuplicateListing,
            AuditActionType::ResolveOverlap,
            AuditActionType::ResolutionConflict,
            AuditActionType::OverlapFlaggedForReview,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown audit action type `{s}`"))
    }
}

/// Append-only audit record written by both automatic and manual paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action_type: AuditActionType,
    pub actor_id: UserId,
    pub subject_ids: Vec<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        action_type: AuditActionType,
        actor_id: impl Into<UserId>,
        subject_ids: Vec<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            actor_id: actor_id.into(),
            subject_ids,
            details,
            created_at: Utc::now(),
        }
    }

    /// The resolution embedded by the manual workflow, if any.
    pub fn resolution(&self) -> serde_json::Result<Option<ResolutionAction>> {
        self.details
            .get("resolution")
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = ParcelId::from("p-2");
        let b = ParcelId::from("p-1");
        let key = PairKey::new(&a, &b).unwrap();
        assert_eq!(key, PairKey::new(&b, &a).unwrap());
        assert_eq!(key.low().as_str(), "p-1");
        assert_eq!(key.other(&a), Some(&b));
        assert!(PairKey::new(&a, &a).is_none());
    }

    #[test]
    fn pair_key_parses_the_display_form() {
        let key: PairKey = "b|a".parse().unwrap();
        assert_eq!(key.to_string(), "a|b");
        assert!("a|a".parse::<PairKey>().is_err());
        assert!("nope".parse::<PairKey>().is_err());
        assert!("lot|7|lot|8".parse::<PairKey>().is_err());
    }

    #[test]
    fn pair_key_serializes_as_an_array_so_ids_may_contain_the_separator() {
        let key = PairKey::new(&ParcelId::from("lot|8"), &ParcelId::from("lot|7")).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"["lot|7","lot|8"]"#);
        let back: PairKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<PairKey>(r#"["x","x"]"#).is_err());
        assert!(serde_json::from_str::<PairKey>(r#""a|b""#).is_err());
    }

    #[test]
    fn malformed_resolution_is_an_error_not_a_missing_one() {
        let entry = AuditLogEntry::new(
            AuditActionType::ResolveOverlap,
            "admin",
            vec![],
            serde_json::json!({"resolution": {"overlap_record_id": "a|b"}}),
        );
        assert!(entry.resolution().is_err());

        let plain = AuditLogEntry::new(
            AuditActionType::AutoDeleteOverlap,
            SYSTEM_ACTOR,
            vec![],
            serde_json::json!({}),
        );
        assert!(matches!(plain.resolution(), Ok(None)));
    }

    #[test]
    fn drafts_and_archived_are_not_scannable() {
        assert!(!ParcelStatus::Draft.is_scannable());
        assert!(!ParcelStatus::Archived.is_scannable());
        assert!(ParcelStatus::Published.is_scannable());
        assert!(ParcelStatus::Closed.is_scannable());
    }

    #[test]
    fn audit_action_types_use_screaming_snake_case() {
        let json = serde_json::to_string(&AuditActionType::AutoDeleteOverlap).unwrap();
        assert_eq!(json, "\"AUTO_DELETE_OVERLAP\"");
        assert_eq!(
            "archive_duplicate_listing".parse::<AuditActionType>(),
            Ok(AuditActionType::ArchiveDuplicateListing)
        );
    }
}
