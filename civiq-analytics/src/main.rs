//! civiq-analytics - Trust-Tier Scoring & Civic Analytics Engine
//!
//! Backend service for the CIVIQ civic-engagement platform. Records poll
//! participation events, classifies users into trust tiers, and serves
//! per-user, per-poll, and dashboard-level analytics.

use anyhow::Result;
use civiq_analytics::{build_router, AnalyticsEngine, AppState, EngineConfig};
use civiq_common::config::{prepare_root_folder, resolve_root_folder, setting_i64_or};
use civiq_common::db::{init_database, init_profile_tables};
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "civiq-analytics", about = "CIVIQ civic analytics engine")]
struct Args {
    /// Root folder holding the database (overrides CIVIQ_ROOT and config)
    #[arg(long)]
    root_folder: Option<String>,

    /// Skip the civic-profile table migration (the engine degrades profile
    /// updates to warnings until it runs)
    #[arg(long)]
    skip_profile_migration: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately, before database delays
    info!(
        "Starting CIVIQ Analytics (civiq-analytics) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let root_folder = resolve_root_folder(args.root_folder.as_deref());
    let db_path = prepare_root_folder(&root_folder)?;
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;

    if args.skip_profile_migration {
        warn!("Civic profile migration skipped; profile updates will degrade until it runs");
    } else {
        init_profile_tables(&pool).await?;
    }

    let port = setting_i64_or(&pool, "http_port", 5730).await;
    let config = EngineConfig::from_settings(&pool).await;

    let engine = AnalyticsEngine::new(pool, config);
    let state = AppState::new(engine);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port as u16)).await?;
    info!("civiq-analytics listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
