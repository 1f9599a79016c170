//! Per-poll analytics endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::services::DailyCount;
use crate::AppState;
use civiq_common::db::{BotDetectionResult, PollInsights, QualityDistribution};

/// GET /api/analytics/poll/:id response
#[derive(Debug, Serialize)]
pub struct PollAnalyticsResponse {
    pub poll_id: String,
    pub total_responses: u64,
    pub tier_breakdown: BTreeMap<String, u64>,
    pub insights: PollInsights,
    /// Weighted data-quality score in [0, 1]
    pub quality_score: f64,
    pub confidence_level: f64,
    pub daily_trend: Vec<DailyCount>,
}

/// GET /api/analytics/poll/:id
///
/// Always succeeds: every section degrades to its zero shape
/// independently, so a poll page renders even when aggregation is behind.
pub async fn get_poll_analytics(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Json<PollAnalyticsResponse> {
    let engine = &state.engine;

    let insights = engine.insights.insights(&poll_id).await;
    let daily_trend = engine.trends.daily_trend(&poll_id).await;

    Json(PollAnalyticsResponse {
        poll_id,
        total_responses: insights.total_responses,
        tier_breakdown: insights.trust_tier_breakdown.clone(),
        quality_score: quality_score(&insights.data_quality_distribution),
        confidence_level: insights.average_confidence_level,
        daily_trend,
        insights,
    })
}

/// GET /api/analytics/poll/:id/bot-risk query parameters
#[derive(Debug, Default, Deserialize)]
pub struct BotRiskParams {
    /// Scope the heuristic to one participant; absent means poll-wide
    pub user_id: Option<String>,
}

/// GET /api/analytics/poll/:id/bot-risk
///
/// Advisory signal; always 200, zeroed on heuristic failure.
pub async fn get_bot_risk(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Query(params): Query<BotRiskParams>,
) -> Json<BotDetectionResult> {
    Json(state.engine.bots.detect(&poll_id, params.user_id.as_deref()).await)
}

/// Collapse the quality buckets into one weighted score:
/// high counts fully, medium at 0.6, low at 0.2
fn quality_score(dist: &QualityDistribution) -> f64 {
    let total = dist.high + dist.medium + dist.low;
    if total == 0 {
        return 0.0;
    }
    (dist.high as f64 + 0.6 * dist.medium as f64 + 0.2 * dist.low as f64) / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_score_weights_buckets() {
        let dist = QualityDistribution { high: 2, medium: 1, low: 1 };
        // (2*1.0 + 1*0.6 + 1*0.2) / 4 = 0.7
        assert!((quality_score(&dist) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn quality_score_is_zero_without_data() {
        assert_eq!(quality_score(&QualityDistribution::default()), 0.0);
    }
}
