//! Subscribers, their watch rules, and catalog administrators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::change::Direction;
use crate::models::item::{Item, ItemId};
use crate::models::schedule::{FilterRule, filters_match};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Which channels the subscriber enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPrefs {
    #[serde(default)]
    pub email: bool,

    #[serde(default = "defaults::enabled")]
    pub web: bool,

    #[serde(default)]
    pub push: bool,
}

impl Default for ChannelPrefs {
    fn default() -> Self {
        Self {
            email: false,
            web: true,
            push: false,
        }
    }
}

/// Global notification toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyToggles {
    #[serde(default = "defaults::enabled")]
    pub on_open: bool,

    #[serde(default)]
    pub on_close: bool,

    #[serde(default = "defaults::enabled")]
    pub on_similar: bool,
}

impl Default for NotifyToggles {
    fn default() -> Self {
        Self {
            on_open: true,
            on_close: false,
            on_similar: true,
        }
    }
}

impl NotifyToggles {
    pub fn wants(&self, direction: Direction) -> bool {
        match direction {
            Direction::Opened => self.on_open,
            Direction::Closed => self.on_close,
        }
    }
}

/// A person watching catalog items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    /// Registered push device identity (FCM token)
    #[serde(default)]
    pub push_device: Option<String>,

    #[serde(default)]
    pub channels: ChannelPrefs,

    #[serde(default)]
    pub toggles: NotifyToggles,
}

impl Subscriber {
    /// Address for a batch email, if email is enabled and verified.
    pub fn email_address(&self) -> Option<&str> {
        if self.channels.email && self.email_verified {
            self.email.as_deref().filter(|e| !e.trim().is_empty())
        } else {
            None
        }
    }

    /// Device identity for push, if push is enabled and a device is registered.
    pub fn push_target(&self) -> Option<&str> {
        if self.channels.push {
            self.push_device.as_deref().filter(|d| !d.trim().is_empty())
        } else {
            None
        }
    }
}

/// A subscriber's declared interest in one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRule {
    pub id: String,

    pub subscriber_id: SubscriberId,

    /// Directly watched item
    pub item: ItemId,

    /// Similar-item filters; empty matches every schedule
    #[serde(default)]
    pub filters: Vec<FilterRule>,

    /// Whether this rule also fires for similar items
    #[serde(default)]
    pub notify_similar: bool,

    /// Only fire for items that first opened after this rule was added
    #[serde(default)]
    pub newly_opened_only: bool,

    pub added_at: DateTime<Utc>,
}

impl WatchRule {
    pub fn watches(&self, item: &ItemId) -> bool {
        &self.item == item
    }

    /// Schedule filters for a similar item.
    pub fn accepts_schedule(&self, item: &Item) -> bool {
        filters_match(&self.filters, item.schedule.as_ref())
    }

    /// Whether `item` first opened strictly after this rule was created.
    pub fn admits_newly_opened(&self, item: &Item) -> bool {
        item.first_opened_at.is_some_and(|t| t > self.added_at)
    }
}

/// Administrator receiving catalog-wide summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default)]
    pub catalog_alerts: bool,
}

impl Admin {
    /// Address for the pass summary, if opted in and verified.
    pub fn summary_address(&self) -> Option<&str> {
        if self.catalog_alerts && self.email_verified {
            self.email.as_deref().filter(|e| !e.trim().is_empty())
        } else {
            None
        }
    }
}

mod defaults {
    pub fn enabled() -> bool {
        true
    }
}
