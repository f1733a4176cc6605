//! Catalog item (course section) data structure.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::schedule::{Schedule, lenient_schedule};

/// Composite identity of a catalog item, e.g. `CS101-01@2026-fall`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an identity from course code, section and grouping context (term).
    pub fn compose(code: &str, section: &str, context: &str) -> Self {
        Self(format!("{code}-{section}@{context}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A trackable catalog entry with a binary open/closed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Composite identity
    pub id: ItemId,

    /// Display title (e.g. "Intro to Programming")
    #[serde(default)]
    pub title: String,

    /// Whether the item currently has availability
    pub open: bool,

    /// Key shared by "similar" items (e.g. same course in the same term)
    pub grouping_key: String,

    /// Meeting days and time; `None` when unscheduled or unparseable
    #[serde(
        default,
        deserialize_with = "lenient_schedule",
        skip_serializing_if = "Option::is_none"
    )]
    pub schedule: Option<Schedule>,

    /// When the item first became open, if ever
    #[serde(default)]
    pub first_opened_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Load a catalog snapshot from a JSON file.
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether this item belongs to the given group.
    pub fn shares_group(&self, grouping_key: &str) -> bool {
        self.grouping_key == grouping_key
    }

    /// Format item for display using a template.
    ///
    /// Supported placeholders: `{id}`, `{title}`, `{schedule}`, `{state}`
    pub fn format(&self, template: &str) -> String {
        let schedule = self
            .schedule
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "TBA".to_string());
        template
            .replace("{id}", self.id.as_str())
            .replace("{title}", &self.title)
            .replace("{schedule}", &schedule)
            .replace("{state}", if self.open { "open" } else { "closed" })
    }
}
