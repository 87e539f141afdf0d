//! Outbound notifications about automatic decisions.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{ParcelId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A submission was deleted for overlapping a live listing.
    OverlapAutoRejected {
        submitter_id: UserId,
        admin_ids: Vec<UserId>,
        overlap_percentage: f64,
        rejected_parcel_id: ParcelId,
        conflicting_parcel_id: ParcelId,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &NotificationEvent) -> Result<(), StoreError>;
}

/// Emits each event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &NotificationEvent) -> Result<(), StoreError> {
        let payload = serde_json::to_string(event)?;
        match event {
            NotificationEvent::OverlapAutoRejected {
                submitter_id,
                admin_ids,
                rejected_parcel_id,
                ..
            } => tracing::info!(
                submitter = %submitter_id,
                admins = admin_ids.len(),
                parcel_id = %rejected_parcel_id,
                %payload,
                "notification: overlap auto-rejected"
            ),
        }
        Ok(())
    }
}

/// Collects events; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, event: &NotificationEvent) -> Result<(), StoreError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = NotificationEvent::OverlapAutoRejected {
            submitter_id: "u1".to_string(),
            admin_ids: vec!["admin".to_string()],
            overlap_percentage: 42.0,
            rejected_parcel_id: ParcelId::from("new"),
            conflicting_parcel_id: ParcelId::from("old"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "overlap_auto_rejected");
        assert_eq!(value["rejected_parcel_id"], "new");

        let notifier = MemoryNotifier::new();
        notifier.notify(&event).unwrap();
        TracingNotifier.notify(&event).unwrap();
        assert_eq!(notifier.events(), vec![event]);
    }
}
