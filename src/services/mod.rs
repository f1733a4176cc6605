//! External collaborators consumed by the engine.
//!
//! - Catalog providers (`JsonCatalog`, `HttpCatalog`)
//! - Subscription index backends (`FileSubscriptionIndex`, `MemorySubscriptionIndex`)

mod catalog;
mod subscriptions;

pub use catalog::{CatalogProvider, HttpCatalog, JsonCatalog};
pub use subscriptions::{
    FileSubscriptionIndex, MemorySubscriptionIndex, SubscriptionData, SubscriptionIndex,
};
