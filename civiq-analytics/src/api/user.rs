//! Per-user analytics endpoint

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::AppState;
use civiq_common::db::VerificationProfile;
use civiq_common::{Error, TrustTier};

/// GET /api/analytics/user/:id response
#[derive(Debug, Serialize)]
pub struct UserAnalyticsResponse {
    pub user_id: String,
    pub tier: TrustTier,
    pub score: f64,
    pub verification_status: VerificationStatus,
    pub engagement: UserEngagement,
    pub demographics: UserDemographics,
}

#[derive(Debug, Serialize)]
pub struct VerificationStatus {
    pub biometric_verified: bool,
    pub phone_verified: bool,
    pub identity_verified: bool,
    pub voting_history_count: u32,
}

/// Engagement counters from the civic profile; zeroed when the profile
/// storage is not yet deployed or the user has no profile
#[derive(Debug, Default, Serialize)]
pub struct UserEngagement {
    pub total_polls_participated: u32,
    pub total_votes_cast: u32,
    pub average_engagement_score: f64,
    pub current_tier: TrustTier,
    pub tier_upgrade_date: Option<String>,
}

/// Sparse self-reported demographics from the most recent record
#[derive(Debug, Default, Serialize)]
pub struct UserDemographics {
    pub age_group: Option<String>,
    pub region: Option<String>,
    pub education_level: Option<String>,
    pub income_bracket: Option<String>,
    pub political_affiliation: Option<String>,
}

/// GET /api/analytics/user/:id
///
/// The user row is the primary entity here, so an unknown id is a 404;
/// everything else degrades to defaults.
pub async fn get_user_analytics(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserAnalyticsResponse>, UserAnalyticsError> {
    let engine = &state.engine;

    let profile: VerificationProfile = match engine.reader.read(&user_id).await {
        Ok(profile) => profile,
        Err(Error::NotFound(msg)) => return Err(UserAnalyticsError::NotFound(msg)),
        Err(e) => return Err(UserAnalyticsError::Internal(e.to_string())),
    };

    // Latest persisted classification wins; fall back to a fresh local
    // score when the user has no analytics history yet
    let history = match engine.store.analytics_records_for_user(&user_id).await {
        Ok(history) => history,
        Err(e) => {
            warn!(user_id, error = %e, "analytics history unavailable");
            Vec::new()
        }
    };

    let (tier, score, demographics) = match history.last() {
        Some(latest) => (
            latest.tier,
            latest.score,
            UserDemographics {
                age_group: latest.factors.age_group.clone(),
                region: latest.factors.region.clone(),
                education_level: latest.factors.education_level.clone(),
                income_bracket: latest.factors.income_bracket.clone(),
                political_affiliation: latest.factors.political_affiliation.clone(),
            },
        ),
        None => {
            let fresh = engine.scorer.score(&profile);
            (fresh.tier, fresh.score, UserDemographics::default())
        }
    };

    // Civic profile counters; absent profile or undeployed table degrades
    // to the zero struct
    let engagement = match engine.store.civic_profile(&user_id).await {
        Ok(Some(civic)) => UserEngagement {
            total_polls_participated: civic.total_polls_participated,
            total_votes_cast: civic.total_votes_cast,
            average_engagement_score: civic.average_engagement_score,
            current_tier: civic.current_tier,
            tier_upgrade_date: civic.tier_upgrade_date,
        },
        Ok(None) => UserEngagement::default(),
        Err(e) => {
            warn!(user_id, error = %e, "civic profile unavailable");
            UserEngagement::default()
        }
    };

    Ok(Json(UserAnalyticsResponse {
        user_id,
        tier,
        score,
        verification_status: VerificationStatus {
            biometric_verified: profile.biometric_verified,
            phone_verified: profile.phone_verified,
            identity_verified: profile.identity_verified,
            voting_history_count: profile.voting_history_count,
        },
        engagement,
        demographics,
    }))
}

/// User analytics API errors
#[derive(Debug)]
pub enum UserAnalyticsError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for UserAnalyticsError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            UserAnalyticsError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            UserAnalyticsError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
