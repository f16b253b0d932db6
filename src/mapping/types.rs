//! Mapping record and request types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Segment value matching any module, menu or task
pub const WILDCARD: &str = "*";

/// The (module, menu, task) triple a mapping is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingKey {
    pub module: String,
    pub menu: String,
    pub task: String,
}

impl MappingKey {
    pub fn new(module: impl Into<String>, menu: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            menu: menu.into(),
            task: task.into(),
        }
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module, self.menu, self.task)
    }
}

/// A persisted email template mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub id: i64,
    pub module: String,
    pub menu: String,
    pub task: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub is_active: bool,
    /// `{key}` placeholders the template has been seen with
    #[serde(default)]
    pub meta: Vec<String>,
    pub last_updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MappingRecord {
    pub fn key(&self) -> MappingKey {
        MappingKey::new(&self.module, &self.menu, &self.task)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn matches(&self, key: &MappingKey) -> bool {
        self.module == key.module && self.menu == key.menu && self.task == key.task
    }
}

/// Fields of a mapping about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewMapping {
    pub module: String,
    pub menu: String,
    pub task: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub is_active: bool,
    pub meta: Vec<String>,
    pub last_updated_by: Option<i64>,
}

impl NewMapping {
    /// An active mapping with no recipients or template text
    pub fn new(key: MappingKey) -> Self {
        Self {
            module: key.module,
            menu: key.menu,
            task: key.task,
            to: Vec::new(),
            cc: Vec::new(),
            subject: None,
            body: None,
            is_active: true,
            meta: Vec::new(),
            last_updated_by: None,
        }
    }

    pub fn key(&self) -> MappingKey {
        MappingKey::new(&self.module, &self.menu, &self.task)
    }

    /// Materialize into a stored record
    pub fn into_record(self, id: i64, now: DateTime<Utc>) -> MappingRecord {
        MappingRecord {
            id,
            module: self.module,
            menu: self.menu,
            task: self.task,
            to: self.to,
            cc: self.cc,
            subject: self.subject,
            body: self.body,
            is_active: self.is_active,
            meta: self.meta,
            last_updated_by: self.last_updated_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A list given either as a JSON array or as one delimited string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    Many(Vec<String>),
    One(String),
}

impl StringList {
    /// Recipient entries: a single string is split on `,`, `;` and whitespace
    pub fn into_recipients(self) -> Vec<String> {
        let items = match self {
            StringList::Many(items) => items,
            StringList::One(text) => text
                .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                .map(str::to_string)
                .collect(),
        };
        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }

    /// Meta entries: trimmed, braces stripped and re-wrapped as `{key}`, deduplicated
    pub fn into_meta(self) -> Vec<String> {
        let items = match self {
            StringList::Many(items) => items,
            StringList::One(text) => text.split([',', ';']).map(str::to_string).collect(),
        };
        normalize_meta(items)
    }
}

/// Canonicalize meta entries to unique `{key}` tokens, keeping first occurrence order
pub fn normalize_meta<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut meta: Vec<String> = Vec::new();
    for item in items {
        let key = item.as_ref().trim().trim_matches(|c| c == '{' || c == '}').trim();
        if key.is_empty() {
            continue;
        }
        let token = format!("{{{}}}", key);
        if !meta.contains(&token) {
            meta.push(token);
        }
    }
    meta
}

/// Body of `POST /api/v1/email-mappings`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMappingRequest {
    pub module: String,
    pub menu: String,
    pub task: String,
    pub to: Option<StringList>,
    pub cc: Option<StringList>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub is_active: Option<bool>,
    pub meta: Option<StringList>,
}

/// Body of `PUT /api/v1/email-mappings/{id}`; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMappingRequest {
    pub module: Option<String>,
    pub menu: Option<String>,
    pub task: Option<String>,
    pub to: Option<StringList>,
    pub cc: Option<StringList>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub is_active: Option<bool>,
    pub meta: Option<StringList>,
}

/// One page of mappings, newest first
#[derive(Debug, Clone, Serialize)]
pub struct MappingPage {
    pub data: Vec<MappingRecord>,
    pub total: u64,
    /// `None` when the listing was unpaginated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    pub current_page: u32,
    pub last_page: u32,
}

/// Slice of the mapping table to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// `None` returns every row
    pub limit: Option<u32>,
    pub offset: u64,
}

impl PageRequest {
    pub fn all() -> Self {
        Self {
            limit: None,
            offset: 0,
        }
    }

    pub fn page(per_page: u32, page: u32) -> Self {
        let page = page.max(1);
        Self {
            limit: Some(per_page),
            offset: (page as u64 - 1) * per_page as u64,
        }
    }
}
