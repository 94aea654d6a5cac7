use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    accrual::{AccrualReconciler, HttpAccrualOracle},
    auth::AuthService,
    config::Config,
    error::AppResult,
    ledger::{OrderStore, PgLedger},
    orders::OrderService,
    server::AppState,
};

/// Everything `main` needs to run the process
pub struct Components {
    pub state: AppState,
    pub reconciler: AccrualReconciler,
}

pub async fn initialize_components(config: &Config) -> AppResult<Components> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_uri, config.database_max_connections).await?;
    let store: Arc<dyn OrderStore> = Arc::new(PgLedger::new(pool));

    let auth = Arc::new(AuthService::new(store.clone(), config.token()));
    let orders = Arc::new(OrderService::new(store.clone()));

    let oracle = Arc::new(HttpAccrualOracle::new(config.oracle())?);
    info!(
        "✅ Accrual oracle client initialized for {}",
        config.accrual_system_address
    );

    let reconciler = AccrualReconciler::new(config.reconciler(), store, oracle);

    Ok(Components {
        state: AppState { auth, orders },
        reconciler,
    })
}

async fn initialize_database(database_uri: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("🔌 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_uri)
        .await?;

    info!("✅ Database connected, running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("✅ Migrations applied");

    Ok(pool)
}
