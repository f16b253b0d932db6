//! Administrative operations on email mappings.
//!
//! Every write evicts the cache entries of the affected triple (and of the
//! previous triple when an update moves a mapping) so the next resolution
//! reads the store.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ApiConfig;
use crate::placeholder::{contains_placeholder, is_valid_email};
use crate::resolver::MappingResolver;

use super::store::{MappingStore, StoreError};
use super::types::{
    CreateMappingRequest, MappingKey, MappingPage, MappingRecord, NewMapping, PageRequest,
    StringList, UpdateMappingRequest,
};

const MODULE_MAX_LEN: usize = 50;
const MENU_MAX_LEN: usize = 100;
const TASK_MAX_LEN: usize = 50;
const SUBJECT_MAX_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MappingError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        MappingError::Invalid {
            field,
            message: message.into(),
        }
    }
}

pub type MappingResult<T> = Result<T, MappingError>;

pub struct MappingService {
    store: Arc<dyn MappingStore>,
    resolver: Arc<MappingResolver>,
    per_page: u32,
    max_per_page: u32,
}

impl MappingService {
    pub fn new(resolver: Arc<MappingResolver>, api: &ApiConfig) -> Self {
        Self {
            store: resolver.store().clone(),
            resolver,
            per_page: api.per_page,
            max_per_page: api.max_per_page,
        }
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    /// List mappings newest first.
    ///
    /// `per_page` defaults to the configured page size and is capped at the
    /// configured maximum; zero or a negative value returns every mapping.
    pub async fn list(&self, per_page: Option<i64>, page: Option<u32>) -> MappingResult<MappingPage> {
        let per_page = per_page.unwrap_or(self.per_page as i64);

        if per_page <= 0 {
            let (data, total) = self.store.list(PageRequest::all()).await?;
            return Ok(MappingPage {
                data,
                total,
                per_page: None,
                current_page: 1,
                last_page: 1,
            });
        }

        let per_page = (per_page as u64).clamp(1, self.max_per_page.max(1) as u64) as u32;
        let page = page.unwrap_or(1).max(1);
        let (data, total) = self.store.list(PageRequest::page(per_page, page)).await?;
        let last_page = total.div_ceil(per_page as u64).max(1) as u32;

        Ok(MappingPage {
            data,
            total,
            per_page: Some(per_page),
            current_page: page,
            last_page,
        })
    }

    pub async fn get(&self, id: i64) -> MappingResult<MappingRecord> {
        Ok(self.store.get(id).await?.ok_or(StoreError::NotFound(id))?)
    }

    #[tracing::instrument(skip(self, request), fields(module = %request.module, menu = %request.menu, task = %request.task))]
    pub async fn create(
        &self,
        request: CreateMappingRequest,
        actor: Option<i64>,
    ) -> MappingResult<MappingRecord> {
        let mut mapping = NewMapping::new(MappingKey::new(
            request.module.trim(),
            request.menu.trim(),
            request.task.trim(),
        ));
        mapping.to = request.to.map(StringList::into_recipients).unwrap_or_default();
        mapping.cc = request.cc.map(StringList::into_recipients).unwrap_or_default();
        mapping.subject = request.subject;
        mapping.body = request.body;
        mapping.is_active = request.is_active.unwrap_or(true);
        mapping.meta = request.meta.map(StringList::into_meta).unwrap_or_default();
        mapping.last_updated_by = actor;

        validate_key(&mapping.key())?;
        validate_recipients("to", &mapping.to, true)?;
        validate_recipients("cc", &mapping.cc, false)?;
        validate_subject(mapping.subject.as_deref())?;

        let record = self.store.insert(mapping).await?;
        self.resolver.invalidate(&record.key()).await;

        tracing::info!(mapping_id = record.id, "Email mapping created");
        Ok(record)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i64,
        request: UpdateMappingRequest,
        actor: Option<i64>,
    ) -> MappingResult<MappingRecord> {
        let existing = self.get(id).await?;
        let previous_key = existing.key();
        let mut record = existing;

        if let Some(module) = request.module {
            record.module = module.trim().to_string();
        }
        if let Some(menu) = request.menu {
            record.menu = menu.trim().to_string();
        }
        if let Some(task) = request.task {
            record.task = task.trim().to_string();
        }
        if let Some(to) = request.to {
            record.to = to.into_recipients();
            validate_recipients("to", &record.to, true)?;
        }
        if let Some(cc) = request.cc {
            record.cc = cc.into_recipients();
            validate_recipients("cc", &record.cc, false)?;
        }
        if let Some(subject) = request.subject {
            record.subject = Some(subject);
        }
        if let Some(body) = request.body {
            record.body = Some(body);
        }
        if let Some(is_active) = request.is_active {
            record.is_active = is_active;
        }
        if let Some(meta) = request.meta {
            record.meta = meta.into_meta();
        }
        if actor.is_some() {
            record.last_updated_by = actor;
        }

        validate_key(&record.key())?;
        validate_subject(record.subject.as_deref())?;

        let updated = self.store.update(&record).await?;

        self.resolver.invalidate(&updated.key()).await;
        if previous_key != updated.key() {
            self.resolver.invalidate(&previous_key).await;
        }

        tracing::info!(mapping_id = updated.id, "Email mapping updated");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> MappingResult<()> {
        let deleted = self.store.soft_delete(id).await?;
        self.resolver.invalidate(&deleted.key()).await;

        tracing::info!(mapping_id = id, "Email mapping deleted");
        Ok(())
    }

    /// Store `meta` on the mapping registered under exactly `key` when it
    /// differs from what is there, invalidating the triple's cache entries.
    ///
    /// Returns whether a mapping was changed.
    pub async fn sync_meta(&self, key: &MappingKey, meta: &[String]) -> Result<bool, StoreError> {
        let Some(mut record) = self.store.find_exact(key).await? else {
            return Ok(false);
        };
        if record.meta.as_slice() == meta {
            return Ok(false);
        }

        record.meta = meta.to_vec();
        self.store.update(&record).await?;
        self.resolver.invalidate(key).await;

        tracing::debug!(mapping_id = record.id, key = %key, "Mapping meta updated from context");
        Ok(true)
    }
}

fn validate_key(key: &MappingKey) -> MappingResult<()> {
    for (field, value, max) in [
        ("module", &key.module, MODULE_MAX_LEN),
        ("menu", &key.menu, MENU_MAX_LEN),
        ("task", &key.task, TASK_MAX_LEN),
    ] {
        if value.is_empty() {
            return Err(MappingError::invalid(field, "is required"));
        }
        if value.chars().count() > max {
            return Err(MappingError::invalid(
                field,
                format!("must not exceed {} characters", max),
            ));
        }
    }
    Ok(())
}

/// Entries must be email addresses or carry a `{placeholder}` resolved at send time
fn validate_recipients(field: &'static str, values: &[String], required: bool) -> MappingResult<()> {
    if required && values.is_empty() {
        return Err(MappingError::invalid(field, "at least one recipient is required"));
    }
    if let Some(bad) = values
        .iter()
        .find(|value| !is_valid_email(value) && !contains_placeholder(value))
    {
        return Err(MappingError::invalid(
            field,
            format!("'{}' is not a valid email address or placeholder", bad),
        ));
    }
    Ok(())
}

fn validate_subject(subject: Option<&str>) -> MappingResult<()> {
    match subject {
        Some(subject) if subject.chars().count() > SUBJECT_MAX_LEN => Err(MappingError::invalid(
            "subject",
            format!("must not exceed {} characters", SUBJECT_MAX_LEN),
        )),
        _ => Ok(()),
    }
}
