// src/services/catalog.rs

//! Catalog providers.
//!
//! Retrieval and parsing of the catalog happen upstream; a provider only
//! hands the engine a complete snapshot of items once per pass.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::Item;

/// Source of the full catalog snapshot.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn list_all_items(&self) -> Result<Vec<Item>>;
}

/// Reads the snapshot from a JSON file written by an upstream scraper.
pub struct JsonCatalog {
    path: PathBuf,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogProvider for JsonCatalog {
    async fn list_all_items(&self) -> Result<Vec<Item>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            AppError::catalog(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let items: Vec<Item> = serde_json::from_slice(&bytes)?;
        log::debug!("Read {} items from {}", items.len(), self.path.display());
        Ok(items)
    }
}

/// Fetches the snapshot as a JSON array over HTTP.
pub struct HttpCatalog {
    client: Client,
    url: String,
}

impl HttpCatalog {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CatalogProvider for HttpCatalog {
    async fn list_all_items(&self) -> Result<Vec<Item>> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::catalog(format!(
                "GET {} returned {}",
                self.url, status
            )));
        }
        let items: Vec<Item> = response.json().await?;
        log::debug!("Fetched {} items from {}", items.len(), self.url);
        Ok(items)
    }
}
