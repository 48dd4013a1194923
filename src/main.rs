use anyhow::Context;
use callcore::application::{CallCore, Repositories};
use callcore::config::Config;
use callcore::infrastructure::messaging::EventBroadcaster;
use callcore::infrastructure::metrics::Metrics;
use callcore::infrastructure::persistence::MemoryStore;
use callcore::infrastructure::protocols::ari::AriEventStream;
use callcore::infrastructure::rpc::{AriProxyClient, ServiceClient};
use callcore::interface::api::{build_router, AppState};
use callcore::interface::rpc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "postgres")]
use callcore::infrastructure::persistence::{create_pool, run_migrations, PgStore};

/// Buffered ARI events between the websocket reader and the dispatcher
const EVENT_QUEUE_SIZE: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting callcore");

    let config_path = std::env::var("CALLCORE_CONFIG").ok();
    let config = Config::load(config_path.as_deref()).context("loading configuration")?;
    info!("Configuration loaded: {:?}", config);

    let repositories = open_repositories(&config).await?;

    let (metrics, prometheus_handle) =
        Metrics::prometheus().context("building the prometheus recorder")?;
    let ari = Arc::new(AriProxyClient::new(&config.rpc)?);
    let requester = Arc::new(ServiceClient::new(&config.rpc)?);
    let broadcaster = Arc::new(EventBroadcaster::default());

    let core = Arc::new(CallCore::new(
        repositories,
        ari,
        requester,
        broadcaster.clone(),
        metrics,
        &config,
    ));

    // JSON-RPC server
    let listen: SocketAddr = config
        .rpc
        .listen
        .parse()
        .with_context(|| format!("invalid rpc listen address {}", config.rpc.listen))?;
    let module = rpc::build_module(core.clone())?;
    let rpc_handle = rpc::serve(listen, module).await?;

    // Ops HTTP server
    let app = build_router(
        AppState { core: core.clone() },
        prometheus_handle,
        broadcaster,
    );
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server failed: {}", e);
        }
    });
    info!("API server started on {}", address);

    // ARI events, one task per event
    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let stream_handle = tokio::spawn(AriEventStream::new(&config.ari).run(tx));
    let events = core.events.clone();
    let dispatch_handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let events = events.clone();
            tokio::spawn(async move {
                // failures are logged and counted by the dispatcher
                let _ = events.handle(event).await;
            });
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    stream_handle.abort();
    dispatch_handle.abort();
    api_handle.abort();
    if rpc_handle.stop().is_ok() {
        rpc_handle.stopped().await;
    }
    info!("callcore stopped");

    Ok(())
}

/// Postgres when a database URL is configured, the in-memory store otherwise
async fn open_repositories(config: &Config) -> anyhow::Result<Repositories> {
    if let Some(repositories) = open_postgres(config).await? {
        return Ok(repositories);
    }
    info!("Using the in-memory store");
    Ok(Repositories::shared(Arc::new(MemoryStore::new())))
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &Config) -> anyhow::Result<Option<Repositories>> {
    if config.database.url.is_empty() {
        return Ok(None);
    }
    let pool = create_pool(&config.database).await?;
    info!("Database connection pool created");
    run_migrations(&pool).await?;
    info!("Database migrations completed");
    Ok(Some(Repositories::shared(Arc::new(PgStore::new(pool)))))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &Config) -> anyhow::Result<Option<Repositories>> {
    Ok(None)
}
