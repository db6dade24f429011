//! Slot arcade server.
//!
//! Builds the wallet, jackpot, history and diagnostics services, starts the
//! session engine and realtime hub, and serves the HTTP/WebSocket API until
//! Ctrl+C.

use std::sync::Arc;

use anyhow::{Context, Error};
use log::{info, warn};
use pico_args::Arguments;
use slot_core::{
    Database, JackpotRegistry, SessionManager, SessionServices, WalletManager, WeightedPaytable,
    diagnostics::DiagnosticsSink,
    history::{InMemorySessionHistory, PgSessionHistory, SessionHistory},
    hub::HubActor,
    jackpot::{JackpotStore, PgJackpotStore},
    wallet::{InMemoryLedgerStore, LedgerStore, PgLedgerStore},
};
use slot_server::{
    api,
    config::{Overrides, ServerConfig},
    logging, metrics,
};

const HELP: &str = "\
Run the slot arcade server

USAGE:
  slot_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7070]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --in-memory              Ignore DATABASE_URL and keep all state in memory
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  SESSION_MIN_BET          Smallest accepted bet
  SESSION_MAX_BET          Largest accepted bet
  METRICS_BIND             Prometheus exporter address
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let overrides = Overrides {
        bind: pargs
            .opt_value_from_str("--bind")
            .context("Invalid --bind address")?,
        database_url: pargs
            .opt_value_from_str("--db-url")
            .context("Invalid --db-url")?,
        in_memory: pargs.contains("--in-memory"),
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;
    info!("Starting slot server at {}", config.bind);

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus exporter listening on {}", addr);
    }

    // Storage
    let (db, ledger, history, jackpot_store): (
        Option<Arc<Database>>,
        Arc<dyn LedgerStore>,
        Arc<dyn SessionHistory>,
        Option<Arc<dyn JackpotStore>>,
    ) = match &config.database {
        Some(db_config) => {
            info!("Connecting to database");
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            if config.ensure_schema {
                db.ensure_schema()
                    .await
                    .context("Failed to apply database schema")?;
                info!("Database schema ensured");
            }
            let pool = Arc::new(db.pool().clone());
            info!("Database connected successfully");
            (
                Some(Arc::new(db)),
                Arc::new(PgLedgerStore::new(pool.clone())),
                Arc::new(PgSessionHistory::new(pool.clone())),
                Some(Arc::new(PgJackpotStore::new(pool))),
            )
        }
        None => {
            warn!("No DATABASE_URL set; wallet, history and jackpots are in memory only");
            (
                None,
                Arc::new(InMemoryLedgerStore::new()),
                Arc::new(InMemorySessionHistory::new()),
                None,
            )
        }
    };

    let hub = HubActor::spawn(config.hub_client_queue);
    let wallet = Arc::new(WalletManager::new(ledger).with_events(Arc::new(hub.clone())));

    let jackpot_configs = std::slice::from_ref(&config.jackpot);
    let jackpots = match jackpot_store {
        Some(store) => JackpotRegistry::open(&config.session.game_id, jackpot_configs, store)
            .await
            .context("Failed to load jackpot pools")?,
        None => JackpotRegistry::with_pools(&config.session.game_id, jackpot_configs)?,
    };

    let (diagnostics, diagnostics_writer) = match &config.diagnostics.path {
        Some(path) => match DiagnosticsSink::open(path, config.diagnostics.buffer).await {
            Ok((sink, writer)) => (Some(sink), Some(writer)),
            Err(e) => {
                warn!("Diagnostics disabled, cannot open {}: {}", path.display(), e);
                (None, None)
            }
        },
        None => (None, None),
    };

    let services = SessionServices {
        wallet: wallet.clone(),
        jackpots: Arc::new(jackpots),
        evaluator: Arc::new(WeightedPaytable::classic()?),
        history,
        events: Arc::new(hub.clone()),
        diagnostics,
    };

    let sessions = SessionManager::new(config.session.clone(), services);
    sessions.start_sweeper().await;
    info!(
        "Session engine ready: game={}, bets {}..={}, capacity {}",
        config.session.game_id,
        config.session.min_bet,
        config.session.max_bet,
        config.session.max_sessions
    );

    let app = api::create_router(api::AppState {
        sessions: sessions.clone(),
        wallet,
        hub: hub.clone(),
        db: db.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    sessions.shutdown().await;
    hub.shutdown().await;
    if let Some(writer) = diagnostics_writer {
        writer.finish().await;
        info!("Diagnostics trail flushed");
    }
    if let Some(db) = db.and_then(|db| Arc::try_unwrap(db).ok()) {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
