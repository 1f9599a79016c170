//! Dashboard summary endpoint

use axum::{extract::State, Json};

use crate::AppState;
use civiq_common::db::AnalyticsSummary;

/// GET /api/analytics/summary
///
/// Dashboard-scope snapshot, recomputed on every read. Always succeeds;
/// an unreadable record set yields the zero snapshot.
pub async fn get_dashboard_summary(State(state): State<AppState>) -> Json<AnalyticsSummary> {
    Json(state.engine.summary.build().await)
}
