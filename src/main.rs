use std::sync::Arc;

use efrsb_agent::config::{AgentConfig, FeedConfig};
use efrsb_agent::cycle;
use efrsb_agent::dispatch::{ExecutorAssigner, ExecutorRules};
use efrsb_agent::feed::{RegistryFeed, SoapFeedClient};
use efrsb_agent::settings;
use efrsb_agent::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AgentConfig::from_env();

    eprintln!("🤖 EFRSB agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path);
    eprintln!(
        "   Cycle interval: {} min",
        config.cycle_interval.as_secs() / 60
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(db_path).await.unwrap_or_else(|e| {
            eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        }),
    );

    // ── One-time bootstrap ──────────────────────────────────────────────
    match settings::seed_default_settings(db.as_ref()).await {
        Ok(0) => {}
        Ok(created) => eprintln!("   Seeded {} default action settings", created),
        Err(e) => eprintln!("   Warning: settings seed failed: {}", e),
    }

    // ── Registry feed ───────────────────────────────────────────────────
    let feed: Option<Arc<dyn RegistryFeed>> = match FeedConfig::from_env() {
        Some(feed_config) => {
            eprintln!("   Feed: {} (login: {})", feed_config.base_url, feed_config.login);
            Some(Arc::new(SoapFeedClient::new(feed_config)?))
        }
        None => {
            eprintln!("   Feed: disabled (set EFRSB_BASE_URL, EFRSB_LOGIN, EFRSB_PASSWORD)");
            None
        }
    };

    // ── Cycle loop ──────────────────────────────────────────────────────
    let assigner = ExecutorAssigner::new(ExecutorRules::from_env());
    let (handle, shutdown) = cycle::spawn_cycle_loop(
        Arc::clone(&db),
        feed,
        assigner,
        config.cycle_interval,
        config.initial_lookback,
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, finishing current cycle");
    shutdown.notify_one();
    handle.await?;

    Ok(())
}
