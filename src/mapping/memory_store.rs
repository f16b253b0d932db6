//! In-memory mapping store

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::{system_clock, Clock};

use super::store::{MappingStore, StoreError};
use super::types::{MappingKey, MappingRecord, NewMapping, PageRequest};

/// DashMap-backed store.
///
/// Writes that must check triple uniqueness serialize on `write_lock`; reads
/// go straight to the map.
pub struct MemoryMappingStore {
    records: DashMap<i64, MappingRecord>,
    next_id: AtomicI64,
    write_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
            write_lock: Mutex::new(()),
            clock,
        }
    }

    /// Number of records including soft-deleted ones
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn live_matching(&self, key: &MappingKey) -> Vec<MappingRecord> {
        self.records
            .iter()
            .filter(|entry| !entry.is_deleted() && entry.matches(key))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn taken_by_other(&self, key: &MappingKey, id: i64) -> bool {
        self.records
            .iter()
            .any(|entry| entry.id != id && !entry.is_deleted() && entry.matches(key))
    }
}

/// Newest first: created_at descending, then id descending
fn newest_first(a: &MappingRecord, b: &MappingRecord) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn find_active(&self, key: &MappingKey) -> Result<Option<MappingRecord>, StoreError> {
        let mut matches: Vec<MappingRecord> = self
            .live_matching(key)
            .into_iter()
            .filter(|record| record.is_active)
            .collect();
        matches.sort_by(newest_first);
        Ok(matches.into_iter().next())
    }

    async fn find_exact(&self, key: &MappingKey) -> Result<Option<MappingRecord>, StoreError> {
        let mut matches = self.live_matching(key);
        matches.sort_by(newest_first);
        Ok(matches.into_iter().next())
    }

    async fn get(&self, id: i64) -> Result<Option<MappingRecord>, StoreError> {
        Ok(self
            .records
            .get(&id)
            .filter(|record| !record.is_deleted())
            .map(|record| record.clone()))
    }

    async fn list(&self, page: PageRequest) -> Result<(Vec<MappingRecord>, u64), StoreError> {
        let mut live: Vec<MappingRecord> = self
            .records
            .iter()
            .filter(|entry| !entry.is_deleted())
            .map(|entry| entry.value().clone())
            .collect();
        live.sort_by(newest_first);

        let total = live.len() as u64;
        let rows = live.into_iter().skip(page.offset as usize);
        let rows = match page.limit {
            Some(limit) => rows.take(limit as usize).collect(),
            None => rows.collect(),
        };
        Ok((rows, total))
    }

    async fn insert(&self, mapping: NewMapping) -> Result<MappingRecord, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let key = mapping.key();
        if self.taken_by_other(&key, 0) {
            return Err(StoreError::conflict(&key));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = mapping.into_record(id, self.clock.now());
        self.records.insert(id, record.clone());

        tracing::debug!(mapping_id = id, key = %key, "Mapping inserted");
        Ok(record)
    }

    async fn update(&self, record: &MappingRecord) -> Result<MappingRecord, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let existing = self
            .records
            .get(&record.id)
            .filter(|existing| !existing.is_deleted())
            .map(|existing| existing.clone())
            .ok_or(StoreError::NotFound(record.id))?;

        let key = record.key();
        if self.taken_by_other(&key, record.id) {
            return Err(StoreError::conflict(&key));
        }

        let updated = MappingRecord {
            created_at: existing.created_at,
            updated_at: self.clock.now(),
            deleted_at: None,
            ..record.clone()
        };
        self.records.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn soft_delete(&self, id: i64) -> Result<MappingRecord, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut entry = self
            .records
            .get_mut(&id)
            .filter(|record| !record.is_deleted())
            .ok_or(StoreError::NotFound(id))?;

        let before = entry.clone();
        let now = self.clock.now();
        entry.deleted_at = Some(now);
        entry.updated_at = now;
        Ok(before)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn mapping(module: &str, menu: &str, task: &str) -> NewMapping {
        let mut mapping = NewMapping::new(MappingKey::new(module, menu, task));
        mapping.to = vec!["ops@example.com".to_string()];
        mapping
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryMappingStore::new();
        let record = store.insert(mapping("Sales", "Leads", "Create")).await.unwrap();

        assert_eq!(record.id, 1);
        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn test_duplicate_triple_conflicts() {
        let store = MemoryMappingStore::new();
        store.insert(mapping("Sales", "Leads", "Create")).await.unwrap();

        let err = store
            .insert(mapping("Sales", "Leads", "Create"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_soft_deleted_triple_can_be_reused() {
        let store = MemoryMappingStore::new();
        let first = store.insert(mapping("Sales", "Leads", "Create")).await.unwrap();
        store.soft_delete(first.id).await.unwrap();

        let second = store.insert(mapping("Sales", "Leads", "Create")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(store.get(first.id).await.unwrap().is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_find_active_skips_inactive() {
        let store = MemoryMappingStore::new();
        let mut inactive = mapping("Sales", "Leads", "Create");
        inactive.is_active = false;
        store.insert(inactive).await.unwrap();

        let key = MappingKey::new("Sales", "Leads", "Create");
        assert!(store.find_active(&key).await.unwrap().is_none());
        assert!(store.find_exact(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_conflicts_with_other_record() {
        let store = MemoryMappingStore::new();
        store.insert(mapping("Sales", "Leads", "Create")).await.unwrap();
        let other = store.insert(mapping("Sales", "Leads", "Update")).await.unwrap();

        let mut moved = other.clone();
        moved.task = "Create".to_string();
        assert!(matches!(
            store.update(&moved).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_refreshes_timestamp_only() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryMappingStore::with_clock(clock.clone());
        let record = store.insert(mapping("Sales", "Leads", "Create")).await.unwrap();

        clock.advance(Duration::seconds(5));
        let mut changed = record.clone();
        changed.subject = Some("Lead {name}".to_string());
        let updated = store.update(&changed).await.unwrap();

        assert_eq!(updated.created_at, record.created_at);
        assert_eq!(updated.updated_at, record.created_at + Duration::seconds(5));
        assert_eq!(updated.subject.as_deref(), Some("Lead {name}"));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginated() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryMappingStore::with_clock(clock.clone());
        for task in ["A", "B", "C"] {
            store.insert(mapping("Sales", "Leads", task)).await.unwrap();
            clock.advance(Duration::seconds(1));
        }

        let (rows, total) = store.list(PageRequest::page(2, 1)).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            rows.iter().map(|r| r.task.as_str()).collect::<Vec<_>>(),
            vec!["C", "B"]
        );

        let (rows, _) = store.list(PageRequest::page(2, 2)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].task, "A");

        let (rows, _) = store.list(PageRequest::all()).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryMappingStore::new();
        assert!(matches!(
            store.soft_delete(42).await,
            Err(StoreError::NotFound(42))
        ));
    }
}
