use std::sync::Arc;

use clap::Parser;
use leaddesk_core::{
    Clock, LeadDeskConfig, MemoryStore, PgStore, SignedTokenVerifier, Store, StoreBackend,
    SystemClock,
};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "leaddesk.toml")]
    config: String,

    /// Check store connectivity and exit
    #[arg(long)]
    health: bool,

    /// Print a session token for this agent and exit
    #[arg(long, value_name = "AGENT_ID")]
    issue_token: Option<Uuid>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match LeadDeskConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            run(Arc::new(MemoryStore::new()), config, args).await
        }
        StoreBackend::Postgres => {
            let pool = match leaddesk_core::db::create_pool(&config.database).await {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to connect to database: {}", e);
                    std::process::exit(1);
                }
            };
            leaddesk_core::db::run_migrations(&pool).await?;
            run(Arc::new(PgStore::new(pool)), config, args).await
        }
    }
}

async fn run<S>(store: Arc<S>, config: LeadDeskConfig, args: Args) -> anyhow::Result<()>
where
    S: Store + 'static,
{
    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ Store reachable: {}", v),
            Err(e) => {
                println!("❌ Store check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ LeadDesk health check passed");
        return Ok(());
    }

    if store.ensure_default_settings().await? {
        tracing::info!("Seeded default chat settings");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if let Some(agent_id) = args.issue_token {
        if store.find_agent(agent_id).await?.is_none() {
            anyhow::bail!("agent {} does not exist", agent_id);
        }
        let verifier = SignedTokenVerifier::new(
            config.service.token_secret.clone(),
            config.service.token_ttl_seconds,
            store.clone(),
            clock.clone(),
        )?;
        println!("{}", verifier.issue(agent_id)?);
        return Ok(());
    }

    let state = Arc::new(leaddesk_server::build_state(store, clock, &config)?);

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Missed-chat sweep
    let sweep_desk = state.desk.clone();
    let sweep_interval = config.sla.sweep_interval_seconds;
    let sweep_shutdown = tx.subscribe();
    let sweep = tokio::spawn(async move {
        leaddesk_server::subsystems::sla::run_sweep_loop(sweep_desk, sweep_interval, sweep_shutdown)
            .await;
    });

    if config.http.enabled {
        leaddesk_server::http::start_http_server(
            state,
            &config.http.host,
            config.http.port,
            tx.subscribe(),
        )
        .await?;
    } else {
        tracing::info!("HTTP API disabled; running the sweep loop only");
        let mut shutdown = tx.subscribe();
        let _ = shutdown.recv().await;
    }

    let _ = sweep.await;
    Ok(())
}
