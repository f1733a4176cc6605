// src/models/mod.rs

//! Domain models for the notifier.
//!
//! This module contains all data structures used throughout the engine,
//! organized by their primary purpose.

mod change;
mod config;
mod item;
mod schedule;
mod subscriber;

// Re-export all public types
pub use change::{
    AdminSummary, CatalogEvent, ChangeRecord, Direction, EventKind, Transition, TriggerSource,
};
pub use config::{
    CatalogConfig, Config, DedupConfig, DispatchConfig, EmailConfig, GuardConfig, PathsConfig,
    PushConfig, SchedulerConfig,
};
pub use item::{Item, ItemId};
pub use schedule::{Day, DaySet, FilterRule, Schedule, TimeRange, filters_match};
pub use subscriber::{Admin, ChannelPrefs, NotifyToggles, Subscriber, SubscriberId, WatchRule};
