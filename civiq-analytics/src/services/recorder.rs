//! Participation Recorder
//!
//! Entry point for "a user participated in a poll". The analytics-record
//! insert is the single source-of-truth write and the only step allowed to
//! fail the call; everything after it (civic profile update, demographic
//! insight refresh) is best-effort enrichment behind its own failure
//! boundary. Losing the primary event is unacceptable; losing an aggregate
//! is recoverable on the next recompute.
//!
//! Ordering: the record insert is awaited before either enrichment step
//! starts, so the profile tracker's recompute always sees the new record.

use crate::services::insight_aggregator::InsightAggregator;
use crate::services::profile_tracker::ProfileTracker;
use crate::services::scorer::TierScorer;
use crate::services::verification_reader::VerificationReader;
use crate::store::CivicStore;
use chrono::{SecondsFormat, Utc};
use civiq_common::db::{AnalyticsRecord, TrustTierFactors, VerificationProfile};
use civiq_common::{Error, Result, TrustTier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Self-reported demographics submitted with a participation event.
/// Every field is optional; malformed fields are dropped individually.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    pub age_group: Option<String>,
    pub region: Option<String>,
    pub education_level: Option<String>,
    pub income_bracket: Option<String>,
    pub political_affiliation: Option<String>,
}

/// Result of a successful recording
#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub record_id: String,
    pub tier: TrustTier,
    pub score: f64,
    /// "store" when the backing store's scoring function produced the
    /// score, "local" when this engine's fallback scorer did
    pub score_source: &'static str,
}

pub struct ParticipationRecorder {
    store: CivicStore,
    reader: VerificationReader,
    scorer: TierScorer,
    profiles: Arc<ProfileTracker>,
    insights: Arc<InsightAggregator>,
}

impl ParticipationRecorder {
    pub fn new(
        store: CivicStore,
        profiles: Arc<ProfileTracker>,
        insights: Arc<InsightAggregator>,
    ) -> Self {
        let reader = VerificationReader::new(store.clone());
        Self { store, reader, scorer: TierScorer::new(), profiles, insights }
    }

    /// Record one participation event.
    ///
    /// Fails only when the source-of-truth write cannot be performed
    /// (`DependencyUnavailable` / database error). Unknown users are
    /// recorded at the lowest tier rather than rejected.
    pub async fn record_participation(
        &self,
        user_id: &str,
        poll_id: &str,
        demographics: Option<Demographics>,
    ) -> Result<RecordOutcome> {
        // 1. Verification profile; a missing user never blocks recording
        let profile = match self.reader.read(user_id).await {
            Ok(profile) => profile,
            Err(Error::NotFound(_)) => {
                warn!(user_id, "user not found, recording at lowest tier");
                VerificationProfile::default()
            }
            Err(e) => return Err(e),
        };

        // 2. Score: store function authoritative, local scorer as fallback
        //    with matching tier semantics
        let (score, tier, factors, score_source) = self.resolve_score(user_id, &profile).await;

        // 3. Sanitize and fold in demographics; bad fields are dropped,
        //    the rest of the event is kept
        let factors = apply_demographics(factors, demographics);

        // 4. The durable write. This is the only fatal step.
        let record = AnalyticsRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            poll_id: Some(poll_id.to_string()),
            tier,
            score,
            factors,
            calculated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        self.store.insert_analytics_record(&record).await?;
        info!(user_id, poll_id, tier = %tier, score, score_source, "participation recorded");

        // 5. Enrichment: civic profile update, isolated from the caller
        if let Err(e) = self.profiles.update(user_id, &record).await {
            warn!(user_id, error = %e, "civic profile update failed, continuing");
        }

        // 6. Enrichment: demographic insight refresh, detached
        let insights = Arc::clone(&self.insights);
        let poll = poll_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = insights.refresh(&poll).await {
                warn!(poll_id = %poll, error = %e, "insight refresh failed, will retry on next event");
            }
        });

        Ok(RecordOutcome { record_id: record.id, tier, score, score_source })
    }

    /// Resolve the score/tier pair, preferring the store's scoring function
    async fn resolve_score(
        &self,
        user_id: &str,
        profile: &VerificationProfile,
    ) -> (f64, TrustTier, TrustTierFactors, &'static str) {
        let local = self.scorer.score(profile);

        match self.store.compute_trust_score(user_id).await {
            Ok(score) => {
                let score = score.clamp(0.0, 100.0);
                // Tier progression from the store when deployed; otherwise
                // map the store score through the shared threshold function
                let tier = match self.store.compute_tier_progression(user_id).await {
                    Ok(tier) => tier,
                    Err(_) => TierScorer::tier_for_score(score),
                };
                let mut factors = local.factors;
                factors.confidence = Some(score / 100.0);
                (score, tier, factors, "store")
            }
            Err(e) => {
                if !matches!(e, Error::CapabilityNotDeployed(_)) {
                    warn!(user_id, error = %e, "store scoring failed, using local scorer");
                }
                (local.score, local.tier, local.factors, "local")
            }
        }
    }
}

/// Validate demographics field by field, dropping anything malformed and
/// keeping the rest
fn apply_demographics(
    mut factors: TrustTierFactors,
    demographics: Option<Demographics>,
) -> TrustTierFactors {
    let Some(demo) = demographics else {
        return factors;
    };

    factors.age_group = sanitize_field("age_group", demo.age_group);
    factors.region = sanitize_field("region", demo.region);
    factors.education_level = sanitize_field("education_level", demo.education_level);
    factors.income_bracket = sanitize_field("income_bracket", demo.income_bracket);
    factors.political_affiliation =
        sanitize_field("political_affiliation", demo.political_affiliation);
    factors
}

/// A demographic value is kept when it is non-empty, printable, and of
/// sane length; otherwise it is dropped with a warning
fn sanitize_field(name: &str, value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > 64 || trimmed.chars().any(char::is_control) {
        warn!(field = name, "dropping malformed demographic field");
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_fields_are_dropped_individually() {
        let demo = Demographics {
            age_group: Some("25-34".to_string()),
            region: Some("".to_string()),
            education_level: Some("x".repeat(100)),
            income_bracket: Some("mid\u{0007}dle".to_string()),
            political_affiliation: Some("independent".to_string()),
        };

        let factors = apply_demographics(TrustTierFactors::default(), Some(demo));
        assert_eq!(factors.age_group.as_deref(), Some("25-34"));
        assert!(factors.region.is_none());
        assert!(factors.education_level.is_none());
        assert!(factors.income_bracket.is_none());
        assert_eq!(factors.political_affiliation.as_deref(), Some("independent"));
    }

    #[test]
    fn absent_demographics_leave_factors_sparse() {
        let factors = apply_demographics(TrustTierFactors::default(), None);
        assert!(factors.age_group.is_none());
        assert!(factors.region.is_none());
    }

    #[test]
    fn values_are_trimmed() {
        let demo = Demographics { region: Some("  north  ".to_string()), ..Default::default() };
        let factors = apply_demographics(TrustTierFactors::default(), Some(demo));
        assert_eq!(factors.region.as_deref(), Some("north"));
    }
}
