//! catalog-tier server
//!
//! One binary, three roles:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  front    dispatch + LRU cache over N backends; /events drops    │
//! │           cached entries                                         │
//! │  store    authoritative catalog/order service; forwards change   │
//! │           events to peers                                        │
//! │  replica  mirror of a store; bootstrapped once, then fed by      │
//! │           /events                                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use catalog_tier::adapters::{
    HttpEventForwarder, HttpStoreReader, HttpUpstream, InMemoryStore, LoggingSubscriber,
};
use catalog_tier::cache::ResponseCache;
use catalog_tier::config::{Role, TierConfig};
use catalog_tier::domain::{ItemPredicate, NewCatalog, NewItem, StoreReader};
use catalog_tier::inventory::{InventoryService, PurchaseService};
use catalog_tier::propagation::{ChangePropagator, Subscription};
use catalog_tier::replica::{ApplyMode, ReplicaSynchronizer};
use catalog_tier::server::{self, FrontRoutes, ReplicaRoutes, Routes, StoreRoutes};
use catalog_tier::{Endpoint, FrontTier, SelectionPolicy};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cached, replicated catalog and order serving
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file; flags below override its values
    #[arg(long, env = "CATALOG_TIER_CONFIG")]
    config: Option<PathBuf>,

    /// Role this process serves
    #[arg(long, env = "ROLE", value_enum)]
    role: Option<Role>,

    /// HTTP bind address
    #[arg(long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Backend selection policy
    #[arg(long, env = "DISPATCH_POLICY", value_enum)]
    policy: Option<SelectionPolicy>,

    /// Backends for search requests (comma separated)
    #[arg(long, env = "SEARCH_ENDPOINTS", value_delimiter = ',')]
    search_endpoints: Vec<String>,

    /// Backends for lookup requests (comma separated)
    #[arg(long, env = "LOOKUP_ENDPOINTS", value_delimiter = ',')]
    lookup_endpoints: Vec<String>,

    /// Backends for purchase requests (comma separated)
    #[arg(long, env = "PURCHASE_ENDPOINTS", value_delimiter = ',')]
    purchase_endpoints: Vec<String>,

    /// Maximum number of cached responses
    #[arg(long, env = "CACHE_CAPACITY")]
    cache_capacity: Option<usize>,

    /// Cached response lifetime in seconds
    #[arg(long, env = "CACHE_TTL_SECS")]
    cache_ttl_secs: Option<u64>,

    /// Backend request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    /// Peers whose /events endpoint receives change events (comma separated)
    #[arg(long, env = "FORWARD_TO", value_delimiter = ',')]
    forward_to: Vec<String>,

    /// Store to mirror (replica role)
    #[arg(long, env = "SOURCE_URL")]
    source: Option<String>,

    /// How the replica uses event payloads
    #[arg(long, env = "APPLY_MODE", value_enum)]
    apply_mode: Option<ApplyMode>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = load_config(&args)?;
    config.validate().context("invalid configuration")?;
    let addr = config.listen_addr()?;

    info!("Starting catalog-tier");
    info!("  Role: {}", config.role);
    info!("  Listen: {}", addr);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal.cancel();
    });

    let (routes, subscriptions) = match config.role {
        Role::Front => (build_front(&config)?, Vec::new()),
        Role::Store => build_store(&config).await?,
        Role::Replica => (build_replica(&config).await?, Vec::new()),
    };

    server::serve(addr, routes, shutdown).await?;

    for subscription in subscriptions {
        subscription.cancel().await;
    }
    info!("catalog-tier shutdown complete");
    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<TierConfig> {
    let mut config = match &args.config {
        Some(path) => TierConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TierConfig::default(),
    };

    if let Some(role) = args.role {
        config.role = role;
    }
    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }
    if let Some(policy) = args.policy {
        config.front.policy = policy;
    }
    if !args.search_endpoints.is_empty() {
        config.front.search = parse_endpoints(&args.search_endpoints)?;
    }
    if !args.lookup_endpoints.is_empty() {
        config.front.lookup = parse_endpoints(&args.lookup_endpoints)?;
    }
    if !args.purchase_endpoints.is_empty() {
        config.front.purchase = parse_endpoints(&args.purchase_endpoints)?;
    }
    if let Some(capacity) = args.cache_capacity {
        config.front.cache_capacity = capacity;
    }
    if let Some(ttl) = args.cache_ttl_secs {
        config.front.cache_ttl_secs = Some(ttl);
    }
    if let Some(timeout) = args.request_timeout_ms {
        config.front.request_timeout_ms = timeout;
        config.replica.request_timeout_ms = timeout;
    }
    if !args.forward_to.is_empty() {
        config.propagation.forward_to = parse_endpoints(&args.forward_to)?;
    }
    if let Some(source) = &args.source {
        config.replica.source = Some(Endpoint::new(source.as_str())?);
    }
    if let Some(mode) = args.apply_mode {
        config.replica.apply_mode = mode;
    }

    Ok(config)
}

fn parse_endpoints(raw: &[String]) -> anyhow::Result<Vec<Endpoint>> {
    raw.iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| Endpoint::new(s.as_str()).with_context(|| format!("endpoint '{}'", s)))
        .collect()
}

// =============================================================================
// Role Wiring
// =============================================================================

fn build_front(config: &TierConfig) -> anyhow::Result<Arc<dyn Routes>> {
    let dispatcher = Arc::new(config.front.build_dispatcher());
    let cache = Arc::new(ResponseCache::with_config(config.front.cache_config()));
    let upstream = Arc::new(HttpUpstream::new(config.front.request_timeout())?);

    info!(
        policy = %dispatcher.policy(),
        capacity = cache.capacity(),
        "Front tier configured"
    );

    let front = Arc::new(FrontTier::new(dispatcher, cache, upstream));
    Ok(Arc::new(FrontRoutes::new(front)))
}

async fn build_store(
    config: &TierConfig,
) -> anyhow::Result<(Arc<dyn Routes>, Vec<Subscription>)> {
    let propagator = ChangePropagator::with_capacity(config.propagation.queue_depth);
    let store = Arc::new(InMemoryStore::new().with_hook(Arc::new(propagator.clone())));
    let inventory = Arc::new(InventoryService::new(store.clone()));
    let purchases = Arc::new(PurchaseService::new(store.clone()));

    for seed in &config.store.seed {
        let catalog = inventory
            .create_catalog(NewCatalog {
                name: seed.name.clone(),
            })
            .await?;
        for item in &seed.items {
            inventory
                .create_item(NewItem {
                    name: item.name.clone(),
                    count: item.count,
                    price: item.price,
                    catalog_id: catalog.id,
                })
                .await?;
        }
    }

    let mut subscriptions = Vec::new();
    if config.propagation.log_events {
        subscriptions.push(propagator.subscribe(Arc::new(LoggingSubscriber::new())));
    }
    for peer in &config.propagation.forward_to {
        let forwarder = HttpEventForwarder::new(peer, config.propagation.forward_timeout())?;
        info!(url = forwarder.url(), "Forwarding change events");
        subscriptions.push(propagator.subscribe(Arc::new(forwarder)));
    }

    let items = store.search_items(&ItemPredicate::All).await?;
    info!(
        catalogs = store.list_catalogs().await?.len(),
        items = items.len(),
        subscribers = propagator.subscriber_count(),
        "Store ready"
    );

    let routes = StoreRoutes::new(store, inventory, purchases);
    Ok((Arc::new(routes), subscriptions))
}

async fn build_replica(config: &TierConfig) -> anyhow::Result<Arc<dyn Routes>> {
    let source = config
        .replica
        .source
        .clone()
        .context("replica needs a source store address")?;
    let reader = Arc::new(HttpStoreReader::new(
        source.clone(),
        config.replica.request_timeout(),
    )?);
    let replica = Arc::new(InMemoryStore::new());
    let synchronizer = Arc::new(
        ReplicaSynchronizer::new(reader, replica.clone()).with_mode(config.replica.apply_mode),
    );

    // later events retry a failed start-up copy
    match synchronizer.bootstrap().await {
        Ok(outcome) => info!(source = %source, ?outcome, "Replica bootstrapped"),
        Err(e) => warn!(source = %source, error = %e, "Initial bootstrap failed; will retry"),
    }

    Ok(Arc::new(ReplicaRoutes::new(replica, synchronizer)))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}
