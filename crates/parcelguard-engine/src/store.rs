//! Parcel/listing store collaborator.
//!
//! The engine reads eligible parcels and owner details from the listing
//! store and applies resolution mutations to it. [`InMemoryParcelStore`] is
//! the reference implementation used by the CLI (loaded from a JSON
//! snapshot) and by tests; production deployments put their database behind
//! [`ParcelStore`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{OwnerInfo, Parcel, ParcelId, ParcelStatus, UserId};

/// A parcel removed by a hard delete, with its dependent records, kept so a
/// failed audit write can put it back.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedParcel {
    pub parcel: Parcel,
    /// Geometry/media records that belonged to the parcel.
    pub dependents: Vec<String>,
}

pub trait ParcelStore: Send + Sync {
    /// Parcels whose status is neither draft nor archived, as one snapshot.
    fn list_eligible_parcels(&self) -> Result<Vec<Parcel>, StoreError>;

    fn get_parcel(&self, id: &ParcelId) -> Result<Option<Parcel>, StoreError>;

    /// Owner of `parcel_id`, for report rendering.
    fn get_owner(&self, parcel_id: &ParcelId) -> Result<Option<OwnerInfo>, StoreError>;

    fn insert_parcel(&self, parcel: Parcel) -> Result<(), StoreError>;

    /// Set the status, returning the previous one (`None` if the parcel is gone).
    fn set_status(
        &self,
        id: &ParcelId,
        status: ParcelStatus,
    ) -> Result<Option<ParcelStatus>, StoreError>;

    /// Hard-delete a parcel and its dependent records.
    fn remove_parcel(&self, id: &ParcelId) -> Result<Option<RemovedParcel>, StoreError>;

    /// Undo a [`ParcelStore::remove_parcel`].
    fn restore_parcel(&self, removed: RemovedParcel) -> Result<(), StoreError>;
}

/// Who gets told about automatic decisions.
pub trait UserDirectory: Send + Sync {
    fn admin_ids(&self) -> Result<Vec<UserId>, StoreError>;
}

/// On-disk JSON shape of an [`InMemoryParcelStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub parcels: Vec<Parcel>,
    pub owners: Vec<OwnerInfo>,
    pub admin_ids: Vec<UserId>,
    /// Media/geometry attachment ids per parcel.
    pub media: BTreeMap<ParcelId, Vec<String>>,
}

#[derive(Debug)]
pub struct InMemoryParcelStore {
    parcels: RwLock<BTreeMap<ParcelId, Parcel>>,
    owners: RwLock<HashMap<UserId, OwnerInfo>>,
    media: RwLock<BTreeMap<ParcelId, Vec<String>>>,
    admin_ids: RwLock<Vec<UserId>>,
    available: AtomicBool,
}

impl Default for InMemoryParcelStore {
    fn default() -> Self {
        Self::from_snapshot(StoreSnapshot::default())
    }
}

impl InMemoryParcelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            parcels: RwLock::new(
                snapshot
                    .parcels
                    .into_iter()
                    .map(|p| (p.id.clone(), p))
                    .collect(),
            ),
            owners: RwLock::new(
                snapshot
                    .owners
                    .into_iter()
                    .map(|o| (o.id.clone(), o))
                    .collect(),
            ),
            media: RwLock::new(snapshot.media),
            admin_ids: RwLock::new(snapshot.admin_ids),
            available: AtomicBool::new(true),
        }
    }

    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&contents)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut owners: Vec<OwnerInfo> = self.owners.read().values().cloned().collect();
        owners.sort_by(|a, b| a.id.cmp(&b.id));
        StoreSnapshot {
            parcels: self.parcels.read().values().cloned().collect(),
            owners,
            admin_ids: self.admin_ids.read().clone(),
            media: self.media.read().clone(),
        }
    }

    /// Write the snapshot to a temp file and rename it over `path`.
    pub fn save_json(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn add_owner(&self, owner: OwnerInfo) {
        self.owners.write().insert(owner.id.clone(), owner);
    }

    pub fn add_admin(&self, admin_id: impl Into<UserId>) {
        self.admin_ids.write().push(admin_id.into());
    }

    pub fn attach_media(&self, parcel_id: &ParcelId, media_id: impl Into<String>) {
        self.media
            .write()
            .entry(parcel_id.clone())
            .or_default()
            .push(media_id.into());
    }

    pub fn media_for(&self, parcel_id: &ParcelId) -> Vec<String> {
        self.media
            .read()
            .get(parcel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Simulate an outage: every call fails with `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("parcel store is offline".to_string()))
        }
    }
}

impl ParcelStore for InMemoryParcelStore {
    fn list_eligible_parcels(&self) -> Result<Vec<Parcel>, StoreError> {
        self.check_available()?;
        Ok(self
            .parcels
            .read()
            .values()
            .filter(|p| p.status.is_scannable())
            .cloned()
            .collect())
    }

    fn get_parcel(&self, id: &ParcelId) -> Result<Option<Parcel>, StoreError> {
        self.check_available()?;
        Ok(self.parcels.read().get(id).cloned())
    }

    fn get_owner(&self, parcel_id: &ParcelId) -> Result<Option<OwnerInfo>, StoreError> {
        self.check_available()?;
        let parcels = self.parcels.read();
        let Some(parcel) = parcels.get(parcel_id) else {
            return Ok(None);
        };
        Ok(self.owners.read().get(&parcel.owner_id).cloned())
    }

    fn insert_parcel(&self, parcel: Parcel) -> Result<(), StoreError> {
        self.check_available()?;
        self.parcels.write().insert(parcel.id.clone(), parcel);
        Ok(())
    }

    fn set_status(
        &self,
        id: &ParcelId,
        status: ParcelStatus,
    ) -> Result<Option<ParcelStatus>, StoreError> {
        self.check_available()?;
        let mut parcels = self.parcels.write();
        Ok(parcels
            .get_mut(id)
            .map(|parcel| std::mem::replace(&mut parcel.status, status)))
    }

    fn remove_parcel(&self, id: &ParcelId) -> Result<Option<RemovedParcel>, StoreError> {
        self.check_available()?;
        // Lock order: parcels, then media.
        let mut parcels = self.parcels.write();
        let Some(parcel) = parcels.remove(id) else {
            return Ok(None);
        };
        let dependents = self.media.write().remove(id).unwrap_or_default();
        Ok(Some(RemovedParcel { parcel, dependents }))
    }

    fn restore_parcel(&self, removed: RemovedParcel) -> Result<(), StoreError> {
        self.check_available()?;
        let mut parcels = self.parcels.write();
        let id = removed.parcel.id.clone();
        if !removed.dependents.is_empty() {
            self.media.write().insert(id.clone(), removed.dependents);
        }
        parcels.insert(id, removed.parcel);
        Ok(())
    }
}

impl UserDirectory for InMemoryParcelStore {
    fn admin_ids(&self) -> Result<Vec<UserId>, StoreError> {
        self.check_available()?;
        Ok(self.admin_ids.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcelguard_geometry::Boundary;

    fn parcel(id: &str, status: ParcelStatus) -> Parcel {
        Parcel::new(
            id,
            "owner-1",
            status,
            Boundary::from_ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]),
        )
    }

    fn store() -> InMemoryParcelStore {
        InMemoryParcelStore::from_snapshot(StoreSnapshot {
            parcels: vec![
                parcel("a", ParcelStatus::Published),
                parcel("b", ParcelStatus::Draft),
                parcel("c", ParcelStatus::Archived),
                parcel("d", ParcelStatus::Closed),
            ],
            owners: vec![OwnerInfo {
                id: "owner-1".to_string(),
                name: "Ada Owner".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            }],
            admin_ids: vec!["admin-1".to_string()],
            media: BTreeMap::new(),
        })
    }

    #[test]
    fn eligible_parcels_exclude_draft_and_archived() {
        let ids: Vec<String> = store()
            .list_eligible_parcels()
            .unwrap()
            .into_iter()
            .map(|p| p.id.0)
            .collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn owner_is_resolved_through_the_parcel() {
        let owner = store().get_owner(&ParcelId::from("a")).unwrap().unwrap();
        assert_eq!(owner.name, "Ada Owner");
        assert!(store().get_owner(&ParcelId::from("zzz")).unwrap().is_none());
    }

    #[test]
    fn set_status_reports_previous_status() {
        let store = store();
        let id = ParcelId::from("a");
        assert_eq!(
            store.set_status(&id, ParcelStatus::Archived).unwrap(),
            Some(ParcelStatus::Published)
        );
        assert_eq!(
            store.set_status(&ParcelId::from("missing"), ParcelStatus::Archived).unwrap(),
            None
        );
    }

    #[test]
    fn remove_takes_media_and_restore_puts_it_back() {
        let store = store();
        let id = ParcelId::from("a");
        store.attach_media(&id, "photo-1");

        let removed = store.remove_parcel(&id).unwrap().unwrap();
        assert_eq!(removed.dependents, vec!["photo-1".to_string()]);
        assert!(store.get_parcel(&id).unwrap().is_none());
        assert!(store.media_for(&id).is_empty());
        assert!(store.remove_parcel(&id).unwrap().is_none());

        store.restore_parcel(removed).unwrap();
        assert!(store.get_parcel(&id).unwrap().is_some());
        assert_eq!(store.media_for(&id), vec!["photo-1".to_string()]);
    }

    #[test]
    fn offline_store_reports_unavailable() {
        let store = store();
        store.set_available(false);
        assert!(matches!(
            store.list_eligible_parcels(),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.admin_ids().is_err());
    }

    #[test]
    fn snapshot_survives_a_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.json");
        let original = store();
        original.attach_media(&ParcelId::from("d"), "deed.pdf");
        original.save_json(&path).unwrap();

        let loaded = InMemoryParcelStore::load_json(&path).unwrap();
        assert_eq!(loaded.snapshot(), original.snapshot());
    }
}
