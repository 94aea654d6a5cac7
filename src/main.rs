mod accrual;
mod auth;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod middleware;
mod orders;
mod server;
mod shutdown;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting loyalty points backend");

    dotenv::dotenv().ok();
    let config = config::Config::from_cli(config::Cli::parse())
        .context("failed to load configuration")?;

    let components = bootstrap::initialize_components(&config)
        .await
        .context("failed to initialize components")?;

    let (trigger, shutdown) = shutdown::channel();

    let mut reconciler = components.reconciler.start(shutdown);

    let app = server::create_app(components.state, &config.cors_allowed_origins);
    let mut http = tokio::spawn({
        let shutdown = trigger.subscribe();
        let address = config.run_address.clone();
        async move { server::run_server(app, &address, shutdown).await }
    });
    let mut http_result = None;

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
            Ok(())
        }
        result = reconciler.wait_scheduler() => match result {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("❌ Reconciliation scheduler failed: {}", e);
                Err(anyhow::Error::new(e).context("reconciliation scheduler failed"))
            }
        },
        joined = &mut http => {
            http_result = Some(joined);
            Err(anyhow::anyhow!("HTTP server stopped unexpectedly"))
        }
    };

    trigger.trigger();

    reconciler.join().await.context("reconciler shutdown failed")?;

    let joined = match http_result {
        Some(joined) => joined,
        None => http.await,
    };
    match joined {
        Ok(result) => result.context("HTTP server failed")?,
        Err(e) => error!("HTTP server task panicked: {}", e),
    }

    info!("👋 Shutdown complete");
    outcome
}
