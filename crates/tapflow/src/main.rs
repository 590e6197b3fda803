use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use tapflow::auth::SignatureVerifier;
use tapflow::cache::TtlCache;
use tapflow::channel::{CloudApiClient, Messenger};
use tapflow::config::Config;
use tapflow::extraction::{DocumentExtractor, HttpDocumentExtractor, StaticDocumentExtractor};
use tapflow::flows::Services;
use tapflow::idempotency::IdempotencyGate;
use tapflow::matching::{HttpMatchingEngine, MatchingEngine, StaticMatchingEngine};
use tapflow::router::{RouteTable, Router};
use tapflow::server::{self, AppState};
use tapflow::share::ShareLinks;
use tapflow::store;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server.
    Serve {
        /// Path to the YAML config file.
        #[arg(short, long, default_value = "tapflow.yaml")]
        config: PathBuf,
    },
    /// Print the list and button route tables, failing on any overlap.
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tapflow=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::Routes => print_routes(),
    }
}

async fn serve(config_path: PathBuf) -> anyhow::Result<()> {
    let mut config = Config::load(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env();

    let router = Router::new().context("route tables overlap")?;

    let store = store::open(&config.database.url, config.database.pool_size)
        .await
        .context("opening store")?;

    let messenger: Arc<dyn Messenger> = Arc::new(
        CloudApiClient::from_config(&config.whatsapp).context("building WhatsApp client")?,
    );

    let matching: Arc<dyn MatchingEngine> =
        match HttpMatchingEngine::from_config(&config.services.matching)? {
            Some(engine) => Arc::new(engine),
            None => {
                warn!("No matching engine configured, searches will return nothing");
                Arc::new(StaticMatchingEngine::new())
            }
        };
    let extractor: Arc<dyn DocumentExtractor> =
        match HttpDocumentExtractor::from_config(&config.services.extraction)? {
            Some(extractor) => Arc::new(extractor),
            None => {
                warn!("No document extractor configured, intake will skip extraction");
                Arc::new(StaticDocumentExtractor::disabled())
            }
        };

    let qr_renderer = Url::parse(&config.services.qr_renderer_url)
        .context("services.qr_renderer_url is not a valid URL")?;
    let share = ShareLinks::new(
        messenger.clone(),
        config.whatsapp.display_number.clone(),
        Duration::from_secs(config.services.identity_cache_seconds),
        qr_renderer,
    );

    let services = Services {
        store: store.clone(),
        messenger,
        matching,
        extractor,
        share,
        admins: TtlCache::new(Duration::from_secs(config.services.admin_cache_seconds)),
    };

    let verifier = SignatureVerifier::new(
        config.webhook.app_secret.clone(),
        config.webhook.allow_unsigned,
    );
    if verifier.allows_unsigned() {
        warn!("webhook.allow_unsigned is set: unverifiable deliveries will be accepted");
    }
    if config.webhook.verify_token.is_none() {
        warn!("No webhook verify token configured, subscription handshakes will be refused");
    }

    let state = AppState {
        services: Arc::new(services),
        router: Arc::new(router),
        gate: IdempotencyGate::new(store),
        verifier,
        verify_token: config.webhook.verify_token.clone(),
    };
    let request_timeout = config.request_timeout();
    if request_timeout.as_secs() > config.server.request_timeout_seconds {
        info!(
            configured_secs = config.server.request_timeout_seconds,
            effective_secs = request_timeout.as_secs_f64(),
            "Request timeout raised to cover outbound calls"
        );
    }
    let app = server::build_app(state, request_timeout);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "tapflow listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("tapflow stopped");
    Ok(())
}

fn print_routes() -> anyhow::Result<()> {
    let router = Router::new()?;
    print_table(router.lists());
    println!();
    print_table(router.buttons());
    Ok(())
}

fn print_table(table: &RouteTable) {
    println!("{} routes:", table.name());
    for route in table.routes() {
        println!("  {:<28} {}", route.pattern.to_string(), route.flow);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
