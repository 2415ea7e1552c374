//! Remote store reader
//!
//! Read-only view of an authoritative-tier server, used by replicas to
//! bootstrap and to re-fetch state for events that arrive without a payload.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::http_upstream::{build_client, read_json};
use crate::dispatch::Endpoint;
use crate::domain::{Catalog, CatalogId, Item, ItemId, ItemPredicate, Order, StoreReader};
use crate::error::{Error, Result};

/// `StoreReader` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStoreReader {
    base: Endpoint,
    client: Client,
}

impl HttpStoreReader {
    pub fn new(base: Endpoint, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base,
            client: build_client(timeout)?,
        })
    }

    /// Base address of the source store.
    pub fn base(&self) -> &Endpoint {
        &self.base
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        not_found: impl FnOnce() -> Error,
    ) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::upstream(self.base.as_str(), e))?;
        read_json(&url, response, not_found, None).await
    }

    fn route_missing(&self, path: &str) -> impl FnOnce() -> Error {
        let endpoint = format!("{}{}", self.base, path);
        move || Error::upstream(endpoint, "route missing")
    }
}

#[async_trait]
impl StoreReader for HttpStoreReader {
    async fn read_item(&self, id: ItemId) -> Result<Item> {
        self.get(&format!("/items/{}", id), || Error::item_not_found(id.get()))
            .await
    }

    async fn read_catalog(&self, id: CatalogId) -> Result<Catalog> {
        self.get(&format!("/catalogs/{}", id), || {
            Error::catalog_not_found(id.get())
        })
        .await
    }

    async fn search_items(&self, predicate: &ItemPredicate) -> Result<Vec<Item>> {
        let path = match predicate {
            ItemPredicate::All => "/items".to_string(),
            ItemPredicate::NameEquals(name) => {
                format!("/items/search/{}", urlencoding::encode(name))
            }
            ItemPredicate::NameContains(needle) => {
                format!("/items/find?name={}", urlencoding::encode(needle))
            }
            ItemPredicate::InCatalog(id) => {
                let id = *id;
                return self
                    .get(&format!("/catalogs/{}/items", id), move || {
                        Error::catalog_not_found(id.get())
                    })
                    .await;
            }
        };
        let missing = self.route_missing(&path);
        self.get(&path, missing).await
    }

    async fn list_catalogs(&self) -> Result<Vec<Catalog>> {
        let missing = self.route_missing("/catalogs");
        self.get("/catalogs", missing).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let missing = self.route_missing("/orders");
        self.get("/orders", missing).await
    }
}
