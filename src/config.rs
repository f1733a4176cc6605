// src/config.rs

//! Engine wiring.
//!
//! Builds every component from `Config` and a state directory. Channels
//! without a configured endpoint fall back to `LogChannel`.

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use url::Url;

use crate::channels::{ChannelSet, FcmPushSender, HttpEmailSender, LocalInbox};
use crate::error::Result;
use crate::models::Config;
use crate::pipeline::{Engine, EngineParts};
use crate::services::{CatalogProvider, FileSubscriptionIndex, HttpCatalog, JsonCatalog};
use crate::storage::{LocalDedupCache, LocalSnapshotStore, LocalStatusCache, LocalStorage};
use crate::utils::http::{bearer_from_env, create_async_client};

/// Wire an engine backed by files under `state_dir`.
pub fn build_engine(config: &Config, state_dir: &Path) -> Result<Engine> {
    let storage = LocalStorage::new(state_dir);
    let client = create_async_client(&config.catalog.user_agent, config.catalog.timeout_secs)?;

    let parts = EngineParts {
        catalog: build_catalog(config, state_dir, &client)?,
        status: Arc::new(LocalStatusCache::new(storage.clone())),
        dedup: Arc::new(LocalDedupCache::new(storage.clone())),
        snapshots: Arc::new(LocalSnapshotStore::new(storage.clone())),
        index: Arc::new(FileSubscriptionIndex::new(
            config.paths.subscriptions_path(state_dir),
        )),
        channels: build_channels(config, &client, storage)?,
    };

    Ok(Engine::new(config, parts))
}

fn build_catalog(
    config: &Config,
    state_dir: &Path,
    client: &Client,
) -> Result<Arc<dyn CatalogProvider>> {
    match &config.catalog.url {
        Some(url) => {
            let url = Url::parse(url)?;
            log::info!("Catalog: {}", url);
            Ok(Arc::new(HttpCatalog::new(client.clone(), url.as_str())))
        }
        None => {
            let path = config.paths.catalog_path(state_dir);
            log::info!("Catalog: {}", path.display());
            Ok(Arc::new(JsonCatalog::new(path)))
        }
    }
}

fn build_channels(config: &Config, client: &Client, storage: LocalStorage) -> Result<ChannelSet> {
    let mut channels = ChannelSet::logging();
    channels.web = Arc::new(LocalInbox::new(storage));

    if let Some(endpoint) = &config.email.endpoint {
        let endpoint = Url::parse(endpoint)?;
        let sender = Arc::new(HttpEmailSender::new(
            client.clone(),
            endpoint.as_str(),
            config.email.from.clone(),
            bearer_from_env(&config.email.api_key_env),
        ));
        channels.email = sender.clone();
        channels.admin = sender;
    } else {
        log::info!("No email endpoint configured, emails are logged only");
    }

    if let Some(endpoint) = &config.push.endpoint {
        let endpoint = Url::parse(endpoint)?;
        channels.push = Arc::new(FcmPushSender::new(
            client.clone(),
            endpoint.as_str(),
            bearer_from_env(&config.push.server_key_env),
        ));
    } else {
        log::info!("No push endpoint configured, pushes are logged only");
    }

    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use tempfile::TempDir;

    const CATALOG_CLOSED: &str = r#"[
        {"id": "CS101-1@2026FA", "title": "Intro", "open": false, "grouping_key": "CS101"}
    ]"#;

    const CATALOG_OPEN: &str = r#"[
        {"id": "CS101-1@2026FA", "title": "Intro", "open": true, "grouping_key": "CS101"}
    ]"#;

    const SUBSCRIPTIONS: &str = r#"{
        "subscribers": [{"id": "s1"}],
        "watch_rules": [
            {"id": "r1", "subscriber_id": "s1", "item": "CS101-1@2026FA",
             "added_at": "2026-01-01T00:00:00Z"}
        ]
    }"#;

    #[tokio::test]
    async fn test_local_engine_end_to_end() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        std::fs::write(config.paths.catalog_path(dir.path()), CATALOG_CLOSED).unwrap();
        std::fs::write(config.paths.subscriptions_path(dir.path()), SUBSCRIPTIONS).unwrap();

        let engine = build_engine(&config, dir.path()).unwrap();
        let first = engine.run_pass().await.unwrap();
        assert_eq!(first.bootstrapped, 1);

        std::fs::write(config.paths.catalog_path(dir.path()), CATALOG_OPEN).unwrap();
        let second = engine.run_pass().await.unwrap();
        assert_eq!(second.transitions, 1);
        assert_eq!(second.matched_subscribers, 1);

        let inbox = LocalInbox::new(LocalStorage::new(dir.path()));
        let entries = inbox.list(&"s1".into()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].read);

        assert_eq!(engine.status().len().await.unwrap(), 1);
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.email.endpoint = Some("not a url".into());

        let result = build_engine(&config, dir.path());
        assert!(matches!(result, Err(AppError::Url(_))));
    }
}
