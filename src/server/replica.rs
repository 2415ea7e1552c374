//! Replica routes
//!
//! Serves the same reads as the store from the replica's copy, plus:
//!
//! ```text
//! POST /events              inbound change event, applied to the replica
//! POST /replica/bootstrap   copy the source now (no-op once done)
//! GET  /replica/status      bootstrap flag and apply mode
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Method, StatusCode};
use serde_json::json;

use super::store::read_routes;
use super::{json_response, ok, route_not_found, HttpResponse, RouteRequest, Routes};
use crate::domain::{ChangeEvent, EventSubscriber, StoreReader};
use crate::error::Result;
use crate::replica::ReplicaSynchronizer;

/// Routes of a replica service.
pub struct ReplicaRoutes {
    replica: Arc<dyn StoreReader>,
    synchronizer: Arc<ReplicaSynchronizer>,
}

impl ReplicaRoutes {
    pub fn new(replica: Arc<dyn StoreReader>, synchronizer: Arc<ReplicaSynchronizer>) -> Self {
        Self {
            replica,
            synchronizer,
        }
    }
}

#[async_trait]
impl Routes for ReplicaRoutes {
    fn role(&self) -> &'static str {
        "replica"
    }

    fn ready(&self) -> bool {
        self.synchronizer.is_bootstrapped()
    }

    async fn route(&self, request: &RouteRequest) -> Result<HttpResponse> {
        match (&request.method, request.path.trim_end_matches('/')) {
            (&Method::POST, "/events") => {
                let event: ChangeEvent = request.json()?;
                self.synchronizer.handle(&event).await?;
                return json_response(
                    StatusCode::ACCEPTED,
                    &json!({ "event_type": event.event_type(), "id": event.entity_id() }),
                );
            }
            (&Method::POST, "/replica/bootstrap") => {
                return ok(&self.synchronizer.bootstrap().await?);
            }
            (&Method::GET, "/replica/status") => {
                return ok(&json!({
                    "bootstrapped": self.synchronizer.is_bootstrapped(),
                    "mode": self.synchronizer.mode(),
                }));
            }
            _ => {}
        }

        match read_routes(self.replica.as_ref(), request).await? {
            Some(response) => Ok(response),
            None => Ok(route_not_found()),
        }
    }
}
