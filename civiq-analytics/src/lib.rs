//! civiq-analytics library - Trust-Tier Scoring & Civic Analytics Engine
//!
//! Converts raw verification/voting signals into a discrete trust
//! classification, maintains per-user civic profiles with an append-only
//! tier history, aggregates per-poll demographic insight tables, and
//! produces dashboard summaries and advisory bot-risk signals.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

pub mod api;
pub mod services;
pub mod store;

use services::{
    BotDetector, InsightAggregator, ParticipationRecorder, ProfileTracker, SummaryBuilder,
    TierScorer, TrendBuilder, VerificationReader,
};
use store::CivicStore;

/// Engine tuning, read from the settings table at startup
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on every backing-store call
    pub statement_timeout: Duration,
    /// Most-recent-records window for the dashboard summary
    pub summary_window: i64,
    /// Lookback for the bot heuristic
    pub bot_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::from_millis(5000),
            summary_window: 5000,
            bot_window_days: 7,
        }
    }
}

impl EngineConfig {
    /// Load tuning values from the settings table, falling back to
    /// defaults for anything missing
    pub async fn from_settings(pool: &SqlitePool) -> Self {
        let defaults = Self::default();
        Self {
            statement_timeout: Duration::from_millis(
                civiq_common::config::setting_i64_or(pool, "statement_timeout_ms", 5000).await
                    .max(1) as u64,
            ),
            summary_window: civiq_common::config::setting_i64_or(
                pool,
                "summary_window_records",
                defaults.summary_window,
            )
            .await,
            bot_window_days: civiq_common::config::setting_i64_or(
                pool,
                "bot_detection_window_days",
                defaults.bot_window_days,
            )
            .await,
        }
    }
}

/// The assembled analytics engine: constructed service objects holding
/// only the backing-store handle, no process-wide singletons
pub struct AnalyticsEngine {
    pub store: CivicStore,
    pub recorder: ParticipationRecorder,
    pub reader: VerificationReader,
    pub scorer: TierScorer,
    pub insights: Arc<InsightAggregator>,
    pub profiles: Arc<ProfileTracker>,
    pub bots: BotDetector,
    pub trends: TrendBuilder,
    pub summary: SummaryBuilder,
}

impl AnalyticsEngine {
    pub fn new(pool: SqlitePool, config: EngineConfig) -> Self {
        let store = CivicStore::new(pool, config.statement_timeout);
        let profiles = Arc::new(ProfileTracker::new(store.clone()));
        let insights = Arc::new(InsightAggregator::new(store.clone()));
        let recorder =
            ParticipationRecorder::new(store.clone(), Arc::clone(&profiles), Arc::clone(&insights));

        Self {
            recorder,
            reader: VerificationReader::new(store.clone()),
            scorer: TierScorer::new(),
            bots: BotDetector::new(store.clone(), config.bot_window_days),
            trends: TrendBuilder::new(store.clone()),
            summary: SummaryBuilder::new(store.clone(), config.summary_window),
            insights,
            profiles,
            store,
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalyticsEngine>,
}

impl AppState {
    pub fn new(engine: AnalyticsEngine) -> Self {
        Self { engine: Arc::new(engine) }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/participation", post(api::record_participation))
        .route("/api/analytics/user/:id", get(api::get_user_analytics))
        .route("/api/analytics/poll/:id", get(api::get_poll_analytics))
        .route("/api/analytics/poll/:id/bot-risk", get(api::get_bot_risk))
        .route("/api/analytics/summary", get(api::get_dashboard_summary))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
