//! HTTP surfaces
//!
//! Every role serves one hyper HTTP/1 listener. Operational routes are shared:
//!
//! | Path                   | Response                                 |
//! |------------------------|------------------------------------------|
//! | `/healthz`, `/livez`   | `ok`                                     |
//! | `/readyz`              | `ok`, or 503 until the role is ready     |
//! | `/metrics`             | Prometheus text exposition               |
//!
//! Everything else goes to the role's [`Routes`]. Errors become a JSON body
//! `{"error": <kind>, "message": <text>}` with the status from
//! [`Error::status_code`].

mod front;
mod replica;
mod store;

pub use front::FrontRoutes;
pub use replica::ReplicaRoutes;
pub use store::StoreRoutes;

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::metrics;

pub type HttpResponse = Response<Full<Bytes>>;

// =============================================================================
// Requests
// =============================================================================

/// A buffered request as seen by role routers.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
}

impl RouteRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Percent-decoded, non-empty path segments.
    pub fn segments(&self) -> Result<Vec<Cow<'_, str>>> {
        self.path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map_err(|_| Error::Validation(format!("path segment '{}' is not UTF-8", s)))
            })
            .collect()
    }

    /// First value of a query parameter, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key != name {
                return None;
            }
            let value = value.replace('+', " ");
            urlencoding::decode(&value).ok().map(Cow::into_owned)
        })
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(Error::Validation("request body must not be empty".into()));
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode the body as JSON, or `T::default()` when there is none.
    pub fn json_or_default<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Ok(T::default());
        }
        self.json()
    }
}

// =============================================================================
// Responses
// =============================================================================

pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<HttpResponse> {
    let body = serde_json::to_vec(value)?;
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

pub fn ok<T: Serialize + ?Sized>(value: &T) -> Result<HttpResponse> {
    json_response(StatusCode::OK, value)
}

fn text_response(status: StatusCode, text: &'static str) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Response for a path the role does not serve.
pub fn route_not_found() -> HttpResponse {
    text_response(StatusCode::NOT_FOUND, "not found")
}

pub fn error_response(e: &Error) -> HttpResponse {
    let body = serde_json::json!({
        "error": e.kind(),
        "message": e.to_string(),
    });
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = e.status_code();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

// =============================================================================
// Routing
// =============================================================================

/// Role-specific HTTP routes.
#[async_trait]
pub trait Routes: Send + Sync + 'static {
    /// Name used in logs.
    fn role(&self) -> &'static str;

    /// Whether `/readyz` should report ready.
    fn ready(&self) -> bool {
        true
    }

    async fn route(&self, request: &RouteRequest) -> Result<HttpResponse>;
}

/// Answer one buffered request, including the shared operational routes.
pub async fn dispatch(routes: &dyn Routes, request: RouteRequest) -> HttpResponse {
    match request.path.as_str() {
        "/healthz" | "/livez" => return text_response(StatusCode::OK, "ok"),
        "/readyz" => {
            return if routes.ready() {
                text_response(StatusCode::OK, "ok")
            } else {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready")
            };
        }
        "/metrics" => {
            return match metrics::render() {
                Ok((content_type, buffer)) => {
                    let mut response = Response::new(Full::new(Bytes::from(buffer)));
                    if let Ok(value) = HeaderValue::from_str(&content_type) {
                        response.headers_mut().insert(CONTENT_TYPE, value);
                    }
                    response
                }
                Err(e) => error_response(&e),
            };
        }
        _ => {}
    }

    match routes.route(&request).await {
        Ok(response) => response,
        Err(e) => {
            if e.status_code().is_server_error() {
                warn!(role = routes.role(), path = %request.path, error = %e, "Request failed");
            } else {
                debug!(role = routes.role(), path = %request.path, error = %e, "Request rejected");
            }
            error_response(&e)
        }
    }
}

async fn handle(
    routes: Arc<dyn Routes>,
    req: Request<Incoming>,
) -> std::result::Result<HttpResponse, std::convert::Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let e = Error::Validation(format!("failed to read request body: {}", e));
            return Ok(error_response(&e));
        }
    };

    let span = info_span!(
        "request",
        id = %Uuid::new_v4(),
        role = routes.role(),
        method = %method,
        path = %path
    );
    let request = RouteRequest {
        method,
        path,
        query,
        body,
    };
    Ok(dispatch(routes.as_ref(), request).instrument(span).await)
}

/// Serve `routes` on `addr` until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    routes: Arc<dyn Routes>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server: {}", routes.role(), e)))?;

    info!(role = routes.role(), %addr, "HTTP server listening");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!(role = routes.role(), "HTTP server stopping");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    let pause = accept_backoff(&e);
                    warn!(
                        role = routes.role(),
                        error = %e,
                        pause_ms = pause.as_millis() as u64,
                        "Accept failed; listener keeps running"
                    );
                    if !pause.is_zero() {
                        tokio::select! {
                            _ = shutdown.cancelled() => {}
                            _ = tokio::time::sleep(pause) => {}
                        }
                    }
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let routes = Arc::clone(&routes);

        tokio::spawn(async move {
            let role = routes.role();
            let service = service_fn(move |req| handle(Arc::clone(&routes), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(role, %peer, "HTTP connection error: {}", e);
            }
        });
    }
}

/// Pause before the next accept after a failed one.
///
/// A peer dropping out mid-handshake only affects that connection. Anything
/// else (descriptor exhaustion, memory pressure) would fail again at once.
fn accept_backoff(error: &std::io::Error) -> Duration {
    use std::io::ErrorKind;

    match error.kind() {
        ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::Interrupted => Duration::ZERO,
        _ => ACCEPT_ERROR_BACKOFF,
    }
}

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Parse an id path segment.
pub(crate) fn parse_id<T>(segment: &str) -> Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    segment.parse()
}
