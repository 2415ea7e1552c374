//! Front tier routes
//!
//! ```text
//! GET  /search/{item_type}   items of a type          (cached)
//! GET  /info/{id}            one item                 (cached)
//! POST /purchase/{id}        buy one unit             (never cached)
//! GET  /cached_data          cache contents as {key: payload}
//! GET  /status               cache statistics and dispatch counters
//! POST /events               inbound change event; invalidates cached entries
//! ```
//!
//! Cached reads carry an `x-cache: hit|miss` header.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::HeaderValue;
use hyper::{Method, StatusCode};
use serde::Serialize;

use super::{json_response, ok, parse_id, route_not_found, HttpResponse, RouteRequest, Routes};
use crate::cache::CacheInvalidator;
use crate::domain::ChangeEvent;
use crate::error::Result;
use crate::front::{Answer, FrontTier, Source};

#[derive(Debug, Serialize)]
struct EventAck {
    event_type: &'static str,
    removed: usize,
}

/// Routes of the dispatch-and-cache tier.
pub struct FrontRoutes {
    front: Arc<FrontTier>,
    invalidator: CacheInvalidator,
}

impl FrontRoutes {
    pub fn new(front: Arc<FrontTier>) -> Self {
        let invalidator = CacheInvalidator::new(Arc::clone(front.cache()));
        Self { front, invalidator }
    }
}

fn answer(answer: Answer) -> Result<HttpResponse> {
    let mut response = ok(&*answer.payload)?;
    let marker = match answer.source {
        Source::Cache => "hit",
        Source::Backend => "miss",
    };
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static(marker));
    Ok(response)
}

#[async_trait]
impl Routes for FrontRoutes {
    fn role(&self) -> &'static str {
        "front"
    }

    async fn route(&self, request: &RouteRequest) -> Result<HttpResponse> {
        let segments = request.segments()?;
        let segments: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();

        match (&request.method, segments.as_slice()) {
            (&Method::GET, ["search", item_type]) => answer(self.front.search(item_type).await?),
            (&Method::GET, ["info", id]) => answer(self.front.info(parse_id(id)?).await?),
            (&Method::POST, ["purchase", id]) => ok(&self.front.purchase(parse_id(id)?).await?),
            (&Method::GET, ["cached_data"]) => {
                let cached = self.front.cached_entries();
                let entries: BTreeMap<String, &serde_json::Value> = cached
                    .iter()
                    .map(|(key, value)| (key.to_string(), &**value))
                    .collect();
                ok(&entries)
            }
            (&Method::GET, ["status"]) => ok(&self.front.status()),
            (&Method::POST, ["events"]) => {
                let event: ChangeEvent = request.json()?;
                let removed = self.invalidator.invalidate_for(&event);
                json_response(
                    StatusCode::ACCEPTED,
                    &EventAck {
                        event_type: event.event_type(),
                        removed,
                    },
                )
            }
            _ => Ok(route_not_found()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryStore, LocalUpstream};
    use crate::cache::ResponseCache;
    use crate::dispatch::{Dispatcher, Endpoint, RequestClass, SelectionPolicy};
    use crate::domain::{AuthoritativeStore, CatalogId, ItemId, NewCatalog, NewItem, StoreReader};
    use crate::inventory::PurchaseService;
    use crate::server::dispatch;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn setup() -> (FrontRoutes, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_catalog(NewCatalog {
                name: "systems".into(),
            })
            .await
            .unwrap();
        store
            .create_item(NewItem {
                name: "Xen".into(),
                count: 3,
                price: 10.0,
                catalog_id: CatalogId(1),
            })
            .await
            .unwrap();

        let backend = Endpoint::new("local://store").unwrap();
        let upstream = Arc::new(LocalUpstream::new().with_store(
            backend.clone(),
            store.clone(),
            Arc::new(PurchaseService::new(store.clone())),
        ));
        let mut dispatcher = Dispatcher::new(SelectionPolicy::RoundRobin);
        for class in RequestClass::ALL {
            dispatcher = dispatcher.with_endpoints(class, vec![backend.clone()]);
        }
        let front = FrontTier::new(
            Arc::new(dispatcher),
            Arc::new(ResponseCache::new(8)),
            upstream,
        );
        (FrontRoutes::new(Arc::new(front)), store)
    }

    async fn call(routes: &FrontRoutes, request: RouteRequest) -> (StatusCode, Option<String>, Value) {
        let response = dispatch(routes, request).await;
        let status = response.status();
        let cache = response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, cache, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_cache_header_and_listing() {
        let (routes, _) = setup().await;

        let (status, cache, _) = call(&routes, RouteRequest::new(Method::GET, "/info/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("miss"));

        let (_, cache, _) = call(&routes, RouteRequest::new(Method::GET, "/info/1")).await;
        assert_eq!(cache.as_deref(), Some("hit"));

        let (_, _, found) = call(&routes, RouteRequest::new(Method::GET, "/search/Xen")).await;
        assert_eq!(found[0]["id"], 1);

        let (_, _, listing) =
            call(&routes, RouteRequest::new(Method::GET, "/cached_data")).await;
        let listing = listing.as_object().unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing["search:Xen"][0]["name"], "Xen");
        assert_eq!(listing["lookup:1"]["count"], 3);
    }

    #[tokio::test]
    async fn test_inbound_event_invalidates() {
        let (routes, store) = setup().await;
        call(&routes, RouteRequest::new(Method::GET, "/info/1")).await;

        let item = store.read_item(ItemId(1)).await.unwrap();
        let event = serde_json::to_string(&ChangeEvent::item_changed(&item)).unwrap();
        let (status, _, ack) = call(
            &routes,
            RouteRequest::new(Method::POST, "/events").with_body(event),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(ack["removed"], 1);
        let (_, cache, _) = call(&routes, RouteRequest::new(Method::GET, "/info/1")).await;
        assert_eq!(cache.as_deref(), Some("miss"));
    }

    #[tokio::test]
    async fn test_minimal_event_is_accepted() {
        let (routes, _) = setup().await;
        let (status, _, ack) = call(
            &routes,
            RouteRequest::new(Method::POST, "/events").with_body(r#"{"type":"item-changed","id":1}"#),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(ack["event_type"], "item-changed");
    }

    #[tokio::test]
    async fn test_identity_only_order_event_clears_cache() {
        let (routes, _) = setup().await;
        call(&routes, RouteRequest::new(Method::GET, "/info/1")).await;
        call(&routes, RouteRequest::new(Method::GET, "/search/Xen")).await;

        let (status, _, ack) = call(
            &routes,
            RouteRequest::new(Method::POST, "/events")
                .with_body(r#"{"type":"order-confirmed","id":3}"#),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(ack["event_type"], "order-confirmed");
        assert_eq!(ack["removed"], 2);

        let (_, cache, _) = call(&routes, RouteRequest::new(Method::GET, "/info/1")).await;
        assert_eq!(cache.as_deref(), Some("miss"));
    }

    #[tokio::test]
    async fn test_purchase_errors() {
        let (routes, _) = setup().await;

        let (status, _, body) =
            call(&routes, RouteRequest::new(Method::POST, "/purchase/42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, _, _) = call(&routes, RouteRequest::new(Method::GET, "/info/x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
