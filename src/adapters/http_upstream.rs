//! HTTP Backend Adapter
//!
//! Implements the `Upstream` port against an authoritative-tier server
//! (see `crate::server`) reachable at each endpoint's base address.
//!
//! | Request  | HTTP call                          |
//! |----------|------------------------------------|
//! | Search   | `GET  {base}/items/search/{type}`  |
//! | Lookup   | `GET  {base}/items/{id}`           |
//! | Purchase | `POST {base}/purchase/{id}`        |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::dispatch::Endpoint;
use crate::domain::{Upstream, UpstreamRequest};
use crate::error::{Error, Result};

/// Error body written by the servers in this crate.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Translate a backend response into a value or the matching domain error.
///
/// `not_found` builds the error for a 404; a 403 is taken to mean the item is
/// out of stock. Any other non-success status is treated as the backend being
/// unusable.
pub(crate) async fn read_json<T: DeserializeOwned>(
    url: &str,
    response: Response,
    not_found: impl FnOnce() -> Error,
    stock_item: Option<u64>,
) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| Error::upstream(url, format!("malformed response: {}", e)));
    }

    let body: Option<ErrorBody> = response.json().await.ok();
    debug!(url, %status, kind = ?body.as_ref().map(|b| &b.error), "Backend returned error");

    match (status, stock_item) {
        (StatusCode::NOT_FOUND, _) => Err(not_found()),
        (StatusCode::FORBIDDEN, Some(item_id)) => Err(Error::StockExhausted { item_id }),
        (StatusCode::BAD_REQUEST, _) => Err(Error::Validation(
            body.map(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "rejected by backend".to_string()),
        )),
        _ => Err(Error::upstream(url, format!("backend answered {}", status))),
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Forwards requests to backends over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    /// Create an adapter whose calls give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn call(
        &self,
        endpoint: &Endpoint,
        request: &UpstreamRequest,
    ) -> Result<serde_json::Value> {
        let (builder, url) = match request {
            UpstreamRequest::Search { item_type } => {
                let url = format!(
                    "{}/items/search/{}",
                    endpoint,
                    urlencoding::encode(item_type)
                );
                (self.client.get(&url), url)
            }
            UpstreamRequest::Lookup { id } => {
                let url = format!("{}/items/{}", endpoint, id);
                (self.client.get(&url), url)
            }
            UpstreamRequest::Purchase { id } => {
                let url = format!("{}/purchase/{}", endpoint, id);
                (self.client.post(&url), url)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Error::upstream(endpoint.as_str(), e))?;

        match request {
            UpstreamRequest::Search { .. } => {
                let missing = || Error::upstream(url.as_str(), "search route missing");
                read_json(&url, response, missing, None).await
            }
            UpstreamRequest::Lookup { id } | UpstreamRequest::Purchase { id } => {
                let missing = || Error::item_not_found(id.get());
                read_json(&url, response, missing, Some(id.get())).await
            }
        }
    }
}
