// SPDX-License-Identifier: MIT

//! Materialized state derived from replaying the WAL.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use spindle_core::{Event, Fingerprint, ItemId, ItemStatus, QueueItem};

/// In-memory view rebuilt by replaying `snapshot + trailing WAL entries`.
///
/// All `apply_event` handlers are idempotent: replaying the same event
/// twice (once for immediate in-process visibility, once during WAL
/// replay after a restart) must leave the state identical to applying it
/// once.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub items: HashMap<u64, QueueItem>,
    /// Next id the store will assign on insert. Monotonic; never reused,
    /// even across `clear_all`.
    pub next_id: u64,
}

impl MaterializedState {
    pub fn get(&self, id: ItemId) -> Option<&QueueItem> {
        self.items.get(&id.get())
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut QueueItem> {
        self.items.get_mut(&id.get())
    }

    pub fn find_by_fingerprint(&self, fp: &Fingerprint) -> Vec<&QueueItem> {
        self.items.values().filter(|it| &it.disc_fingerprint == fp).collect()
    }

    /// I-1: is there a non-terminal item already claiming this fingerprint?
    pub fn has_active_fingerprint(&self, fp: &Fingerprint) -> bool {
        self.items.values().any(|it| &it.disc_fingerprint == fp && !it.is_terminal())
    }

    pub fn active_fingerprints(&self) -> Vec<Fingerprint> {
        self.items
            .values()
            .filter(|it| !it.is_terminal())
            .map(|it| it.disc_fingerprint.clone())
            .collect()
    }

    pub fn list(&self) -> Vec<&QueueItem> {
        let mut items: Vec<&QueueItem> = self.items.values().collect();
        items.sort_by_key(|it| it.id.get());
        items
    }

    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::ItemInserted { item } => {
                self.next_id = self.next_id.max(item.id.get() + 1);
                self.items.entry(item.id.get()).or_insert_with(|| (**item).clone());
            }
            Event::StatusChanged { id, status, error_message, timestamp_ms } => {
                if let Some(item) = self.items.get_mut(&id.get()) {
                    item.status = *status;
                    item.error_message = error_message.clone();
                    item.updated_at = *timestamp_ms;
                }
            }
            Event::ProgressUpdated { id, progress, timestamp_ms } => {
                if let Some(item) = self.items.get_mut(&id.get()) {
                    item.progress = progress.clone();
                    item.updated_at = *timestamp_ms;
                }
            }
            Event::RipSpecPersisted { id, rip_spec_data, timestamp_ms } => {
                if let Some(item) = self.items.get_mut(&id.get()) {
                    item.rip_spec_data = Some(rip_spec_data.clone());
                    item.updated_at = *timestamp_ms;
                }
            }
            Event::FieldsUpdated { id, patch, timestamp_ms } => {
                if let Some(item) = self.items.get_mut(&id.get()) {
                    apply_patch(item, patch);
                    item.updated_at = *timestamp_ms;
                }
            }
            Event::ItemRemoved { id, .. } => {
                self.items.remove(&id.get());
            }
            Event::ItemsCleared { status, .. } => match status {
                Some(ItemStatus::Completed) => self.items.retain(|_, it| it.status != ItemStatus::Completed),
                Some(ItemStatus::Failed) => self.items.retain(|_, it| it.status != ItemStatus::Failed),
                Some(other) => self.items.retain(|_, it| it.status != *other),
                None => self.items.clear(),
            },
            Event::StuckItemsReset { ids, timestamp_ms } => {
                for id in ids {
                    if let Some(item) = self.items.get_mut(&id.get()) {
                        let resumed = item.status.resume_point(item.rip_spec_data.is_some(), item.active_episode_key.is_some());
                        item.status = resumed;
                        item.updated_at = *timestamp_ms;
                    }
                }
            }
        }
    }
}

fn apply_patch(item: &mut QueueItem, patch: &serde_json::Map<String, serde_json::Value>) {
    let mut value = serde_json::to_value(&*item).expect("QueueItem serializes");
    if let Some(obj) = value.as_object_mut() {
        for (k, v) in patch {
            obj.insert(k.clone(), v.clone());
        }
    }
    if let Ok(patched) = serde_json::from_value(value) {
        *item = patched;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::ProgressRecord;

    fn item(id: u64) -> QueueItem {
        QueueItem {
            id: ItemId::new(id),
            disc_title: "Disc".into(),
            source_path: None,
            disc_fingerprint: Fingerprint::new("abc"),
            status: ItemStatus::Pending,
            progress: ProgressRecord::new("queued", "waiting"),
            rip_spec_data: None,
            metadata_json: None,
            needs_review: false,
            review_reason: None,
            review_dir_override: None,
            ripped_file: None,
            encoded_file: None,
            final_file: None,
            encoding_details_json: None,
            error_message: None,
            background_log_path: None,
            created_at: 0,
            updated_at: 0,
            active_episode_key: None,
            allow_duplicate: false,
            priority: 0,
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut state = MaterializedState::default();
        let ev = Event::ItemInserted { item: Box::new(item(1)) };
        state.apply_event(&ev);
        state.apply_event(&ev);
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.next_id, 2);
    }

    #[test]
    fn status_changed_updates_in_place() {
        let mut state = MaterializedState::default();
        state.apply_event(&Event::ItemInserted { item: Box::new(item(1)) });
        state.apply_event(&Event::StatusChanged {
            id: ItemId::new(1),
            status: ItemStatus::Ripping,
            error_message: None,
            timestamp_ms: 5,
        });
        assert_eq!(state.get(ItemId::new(1)).unwrap().status, ItemStatus::Ripping);
    }

    #[test]
    fn clear_completed_only_removes_matching_status() {
        let mut state = MaterializedState::default();
        let mut it1 = item(1);
        it1.status = ItemStatus::Completed;
        let it2 = item(2);
        state.apply_event(&Event::ItemInserted { item: Box::new(it1) });
        state.apply_event(&Event::ItemInserted { item: Box::new(it2) });
        state.apply_event(&Event::ItemsCleared { status: Some(ItemStatus::Completed), timestamp_ms: 0 });
        assert_eq!(state.items.len(), 1);
        assert!(state.get(ItemId::new(2)).is_some());
    }

    #[test]
    fn has_active_fingerprint_ignores_terminal_items() {
        let mut state = MaterializedState::default();
        let mut it = item(1);
        it.status = ItemStatus::Failed;
        state.apply_event(&Event::ItemInserted { item: Box::new(it) });
        assert!(!state.has_active_fingerprint(&Fingerprint::new("abc")));
    }
}
