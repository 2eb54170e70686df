//! Gateway entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use closing_doors_core::{ClockSource, SystemClock};
use closing_doors_server::network::{NetworkConfig, NetworkModule, TlsConfig};
use closing_doors_server::service::domain::{load_stops, NearestStationsFunction, TrainTimesFunction};
use closing_doors_server::service::{
    build_invocation_pipeline, build_registry, ApiKeyStore, Authenticator, CatalogBackends,
    Dispatcher, GatewayConfig, InternalTokenVerifier, ReloadTrigger, SnapshotReloader,
};
use closing_doors_server::storage::{FileDataLake, MemoryKeyValueStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "closing-doors-gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an internal bearer token signed with the gateway secret.
    IssueToken {
        /// Subject recorded in the token.
        #[arg(long, default_value = "internal")]
        subject: String,
        /// Token lifetime in seconds.
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
        #[arg(long, env = "GATEWAY_INTERNAL_SECRET", hide_env_values = true)]
        secret: String,
    },
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 8080)]
    port: u16,
    #[arg(long, env = "GATEWAY_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    #[arg(long, env = "GATEWAY_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
    /// Allowed CORS origins, comma separated. `*` allows any.
    #[arg(long, env = "GATEWAY_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,
    #[arg(long, env = "GATEWAY_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    request_timeout_ms: u64,
    #[arg(long, env = "GATEWAY_HANDLER_TIMEOUT_MS", default_value_t = 10_000)]
    handler_timeout_ms: u64,
    #[arg(long, env = "GATEWAY_MAX_CONCURRENT", default_value_t = 1000)]
    max_concurrent: u32,
    #[arg(long, env = "GATEWAY_RELOAD_INTERVAL_MS", default_value_t = 30_000)]
    reload_interval_ms: u64,
    /// Stops file (CSV with stop_id, stop_name, stop_lat, stop_lon).
    #[arg(long, env = "GATEWAY_STOPS_CSV", default_value = "data/stops.csv")]
    stops_csv: PathBuf,
    /// Key-value snapshot written by the refresh process.
    #[arg(long, env = "GATEWAY_METADATA_SNAPSHOT")]
    metadata_snapshot: Option<PathBuf>,
    /// Root directory of the feed snapshot lake.
    #[arg(long, env = "GATEWAY_LAKE_DIR", default_value = "data/lake")]
    lake_dir: PathBuf,
    /// JSON array of external API keys.
    #[arg(long, env = "GATEWAY_API_KEYS")]
    api_keys: Option<PathBuf>,
    /// Secret for internal bearer tokens. Without it bearer tokens are refused.
    #[arg(long, env = "GATEWAY_INTERNAL_SECRET", hide_env_values = true)]
    internal_secret: Option<String>,
    #[arg(long, env = "GATEWAY_JSON_LOGS")]
    json_logs: bool,
    /// Address for the Prometheus scrape endpoint.
    #[arg(long, env = "GATEWAY_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
#[allow(clippy::print_stdout)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::IssueToken {
        subject,
        ttl_secs,
        secret,
    }) = cli.command
    {
        let now_secs = SystemClock.now() / 1000;
        let token = InternalTokenVerifier::new(secret.as_bytes())
            .issue(&subject, now_secs.saturating_add(ttl_secs))?;
        println!("{token}");
        return Ok(());
    }

    serve(cli.serve).await
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    init_tracing(args.json_logs);

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "metrics endpoint listening");
    }

    let gateway_config = GatewayConfig {
        node_id: uuid::Uuid::new_v4().to_string(),
        handler_timeout_ms: args.handler_timeout_ms,
        max_concurrent_invocations: args.max_concurrent,
        metadata_reload_interval_ms: args.reload_interval_ms,
    };

    let stops = load_stops(&args.stops_csv)
        .with_context(|| format!("failed to load stops from {}", args.stops_csv.display()))?;
    let stations = NearestStationsFunction::new(stops);
    info!(stops = stations.stop_count(), "stops loaded");

    let store = Arc::new(MemoryKeyValueStore::new());
    let reloader = match &args.metadata_snapshot {
        Some(path) => {
            let reloader = SnapshotReloader::new(Arc::clone(&store), path.clone());
            let items = reloader.reload().await?;
            info!(path = %path.display(), items, "key-value snapshot loaded");
            let handle = reloader.spawn(Duration::from_millis(
                gateway_config.metadata_reload_interval_ms,
            ));
            reload_on_hangup(handle.trigger())?;
            Some(handle)
        }
        None => None,
    };

    let registry = Arc::new(build_registry(CatalogBackends {
        metadata: store,
        stations: Arc::new(stations),
        train_times: Arc::new(TrainTimesFunction::new(Arc::new(FileDataLake::new(
            args.lake_dir,
        )))),
    })?);

    let api_keys = match &args.api_keys {
        Some(path) => ApiKeyStore::load_json(path)
            .with_context(|| format!("failed to load API keys from {}", path.display()))?,
        None => ApiKeyStore::new(),
    };
    info!(api_keys = api_keys.len(), "API keys loaded");
    let verifier = args
        .internal_secret
        .as_deref()
        .map(|secret| InternalTokenVerifier::new(secret.as_bytes()));
    let authenticator = Authenticator::new(api_keys, verifier, Arc::new(SystemClock));

    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::new(authenticator),
        &gateway_config,
    );
    let pipeline = build_invocation_pipeline(dispatcher, &gateway_config);

    let network_config = NetworkConfig {
        host: args.host,
        port: args.port,
        tls: args
            .tls_cert
            .zip(args.tls_key)
            .map(|(cert_path, key_path)| TlsConfig {
                cert_path,
                key_path,
            }),
        cors_origins: args.cors_origins,
        request_timeout: Duration::from_millis(args.request_timeout_ms),
        ..NetworkConfig::default()
    };

    let mut network = NetworkModule::new(network_config, pipeline, Arc::clone(&registry));
    let port = network.start().await?;
    info!(
        node_id = %gateway_config.node_id,
        port,
        operations = registry.len(),
        "gateway ready"
    );

    network
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    if let Some(handle) = reloader {
        handle.stop().await;
    }
    info!("gateway stopped");
    Ok(())
}

/// Reloads the key-value snapshot on SIGHUP.
#[cfg(unix)]
fn reload_on_hangup(trigger: ReloadTrigger) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup()).context("failed to listen for SIGHUP")?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!("SIGHUP received, reloading key-value snapshot");
            trigger.reload_now();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn reload_on_hangup(_trigger: ReloadTrigger) -> anyhow::Result<()> {
    Ok(())
}
