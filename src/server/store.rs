//! Authoritative store routes
//!
//! ```text
//! GET  /catalogs                          list catalogs
//! POST /catalogs                          create catalog   {"name"}
//! GET  /catalogs/{id}                     one catalog
//! GET  /catalogs/{id}/items               items in a catalog
//! GET  /items                             list items
//! POST /items                             create item      {"name","count","price","catalog_id"}
//! GET  /items/search/{name}               exact name match
//! GET  /items/find?name=...               substring match
//! GET  /items/{id}                        one item
//! PUT  /items/{id}/count/increase         restock          {"amount"} (default 1)
//! PUT  /items/{id}/count/decrease         remove stock     {"amount"} (default 1)
//! PUT  /items/{id}/price                  reprice          {"price"}
//! GET  /items/{id}/stock/availability     units left, 403 when none
//! POST /purchase/{id}                     buy one unit
//! GET  /orders                            list orders
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Method, StatusCode};
use serde::Deserialize;

use super::{json_response, ok, parse_id, route_not_found, HttpResponse, RouteRequest, Routes};
use crate::domain::{CatalogId, ItemId, ItemPredicate, NewCatalog, NewItem, StoreReader};
use crate::error::{Error, Result};
use crate::inventory::{InventoryService, PurchaseService};

#[derive(Debug, Deserialize)]
struct AmountBody {
    #[serde(default = "one")]
    amount: u32,
}

impl Default for AmountBody {
    fn default() -> Self {
        Self { amount: one() }
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct PriceBody {
    price: f64,
}

/// Read-only routes shared by the store and replica roles.
///
/// Returns `Ok(None)` when the request is not a read this module serves.
pub(crate) async fn read_routes(
    reader: &dyn StoreReader,
    request: &RouteRequest,
) -> Result<Option<HttpResponse>> {
    if request.method != Method::GET {
        return Ok(None);
    }

    let segments = request.segments()?;
    let segments: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();

    let response = match segments.as_slice() {
        ["catalogs"] => ok(&reader.list_catalogs().await?)?,
        ["catalogs", id] => ok(&reader.read_catalog(parse_id::<CatalogId>(id)?).await?)?,
        ["catalogs", id, "items"] => {
            let catalog = reader.read_catalog(parse_id::<CatalogId>(id)?).await?;
            ok(&reader
                .search_items(&ItemPredicate::InCatalog(catalog.id))
                .await?)?
        }
        ["items"] => ok(&reader.search_items(&ItemPredicate::All).await?)?,
        ["items", "search", name] => ok(&reader
            .search_items(&ItemPredicate::NameEquals(name.to_string()))
            .await?)?,
        ["items", "find"] => {
            let needle = request
                .query_param("name")
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| Error::Validation("query parameter 'name' is required".into()))?;
            ok(&reader
                .search_items(&ItemPredicate::NameContains(needle))
                .await?)?
        }
        ["items", id] => ok(&reader.read_item(parse_id::<ItemId>(id)?).await?)?,
        ["orders"] => ok(&reader.list_orders().await?)?,
        _ => return Ok(None),
    };
    Ok(Some(response))
}

/// Routes of the authoritative catalog/order service.
pub struct StoreRoutes {
    reader: Arc<dyn StoreReader>,
    inventory: Arc<InventoryService>,
    purchases: Arc<PurchaseService>,
}

impl StoreRoutes {
    pub fn new(
        reader: Arc<dyn StoreReader>,
        inventory: Arc<InventoryService>,
        purchases: Arc<PurchaseService>,
    ) -> Self {
        Self {
            reader,
            inventory,
            purchases,
        }
    }

    async fn write_routes(&self, request: &RouteRequest) -> Result<Option<HttpResponse>> {
        let segments = request.segments()?;
        let segments: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();

        let response = match (&request.method, segments.as_slice()) {
            (&Method::POST, ["catalogs"]) => {
                let catalog = self
                    .inventory
                    .create_catalog(request.json::<NewCatalog>()?)
                    .await?;
                json_response(StatusCode::CREATED, &catalog)?
            }
            (&Method::POST, ["items"]) => {
                let item = self.inventory.create_item(request.json::<NewItem>()?).await?;
                json_response(StatusCode::CREATED, &item)?
            }
            (&Method::PUT, ["items", id, "count", "increase"]) => {
                let body: AmountBody = request.json_or_default()?;
                ok(&self.inventory.restock(parse_id(id)?, body.amount).await?)?
            }
            (&Method::PUT, ["items", id, "count", "decrease"]) => {
                let body: AmountBody = request.json_or_default()?;
                ok(&self
                    .inventory
                    .decrease_stock(parse_id(id)?, body.amount)
                    .await?)?
            }
            (&Method::PUT, ["items", id, "price"]) => {
                let body: PriceBody = request.json()?;
                ok(&self.inventory.set_price(parse_id(id)?, body.price).await?)?
            }
            (&Method::GET, ["items", id, "stock", "availability"]) => {
                ok(&self.inventory.availability(parse_id(id)?).await?)?
            }
            (&Method::POST, ["purchase", id]) => {
                ok(&self.purchases.purchase(parse_id(id)?).await?)?
            }
            _ => return Ok(None),
        };
        Ok(Some(response))
    }
}

#[async_trait]
impl Routes for StoreRoutes {
    fn role(&self) -> &'static str {
        "store"
    }

    async fn route(&self, request: &RouteRequest) -> Result<HttpResponse> {
        if let Some(response) = self.write_routes(request).await? {
            return Ok(response);
        }
        if let Some(response) = read_routes(self.reader.as_ref(), request).await? {
            return Ok(response);
        }
        Ok(route_not_found())
    }
}
