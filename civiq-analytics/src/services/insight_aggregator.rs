//! Demographic Insight Aggregator
//!
//! Two read paths, one shape. The precomputed path returns the
//! materialized per-poll insights row (refreshed by [`InsightAggregator::refresh`],
//! typically from a periodic job); the fallback path recomputes the tier
//! breakdown from raw votes when no materialized row exists. Both paths
//! produce a structurally identical [`PollInsights`] -- every known
//! category key present, zero-defaulted -- and neither ever surfaces an
//! error to the caller: the worst case is the zero-valued shape.
//!
//! Fallback default: a vote with no recorded trust tier counts as T1.
//! This silently treats untiered legacy votes as low-but-nonzero trust;
//! changing it would change historical aggregates.

use crate::store::{CivicStore, StoredInsights};
use civiq_common::db::{zeroed_tier_breakdown, PollInsights, QualityDistribution};
use civiq_common::{Result, TrustTier};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub struct InsightAggregator {
    store: CivicStore,
}

impl InsightAggregator {
    pub fn new(store: CivicStore) -> Self {
        Self { store }
    }

    /// Demographic insights for a poll. Never fails: degrades from the
    /// precomputed row, to an on-the-fly recompute, to the zero shape.
    pub async fn insights(&self, poll_id: &str) -> PollInsights {
        match self.store.precomputed_insights(poll_id).await {
            Ok(Some(stored)) => {
                if let Some(insights) = coerce_stored(poll_id, stored) {
                    debug!(poll_id, "serving precomputed insights");
                    return insights;
                }
                warn!(poll_id, "materialized insights malformed, recomputing");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(poll_id, error = %e, "precomputed insights unavailable");
            }
        }

        self.fallback(poll_id).await
    }

    /// Fallback path: recompute total responses and the tier breakdown
    /// from raw per-vote tier values
    async fn fallback(&self, poll_id: &str) -> PollInsights {
        let votes = match self.store.votes_for_poll(poll_id).await {
            Ok(votes) => votes,
            Err(e) => {
                warn!(poll_id, error = %e, "vote recompute failed, returning zero insights");
                return PollInsights::empty(poll_id);
            }
        };

        let mut insights = PollInsights::empty(poll_id);
        insights.total_responses = votes.len() as u64;
        for vote in &votes {
            let tier = match &vote.trust_tier {
                Some(raw) => TrustTier::from_raw(raw),
                // Untiered legacy vote: counts as T1 by policy
                None => TrustTier::T1,
            };
            *insights.trust_tier_breakdown.entry(tier.as_str().to_string()).or_insert(0) += 1;
        }
        insights
    }

    /// Recompute the full insight tables for a poll and materialize them.
    ///
    /// Best-effort: called after participation recording and by periodic
    /// jobs; callers log failures and continue.
    pub async fn refresh(&self, poll_id: &str) -> Result<()> {
        let votes = self.store.votes_for_poll(poll_id).await?;
        let records = self.store.analytics_records_for_poll(poll_id, None).await?;

        let mut insights = PollInsights::empty(poll_id);
        insights.total_responses = votes.len() as u64;

        for vote in &votes {
            let tier = match &vote.trust_tier {
                Some(raw) => TrustTier::from_raw(raw),
                None => TrustTier::T1,
            };
            *insights.trust_tier_breakdown.entry(tier.as_str().to_string()).or_insert(0) += 1;
        }

        // Demographic, confidence, and quality tables come from the richer
        // analytics records
        let mut confidence_sum = 0.0;
        let mut confidence_count = 0u64;
        let mut quality = QualityDistribution::default();

        for record in &records {
            let f = &record.factors;
            bump(&mut insights.age_groups, f.age_group.as_deref());
            bump(&mut insights.regions, f.region.as_deref());
            bump(&mut insights.education_levels, f.education_level.as_deref());
            bump(&mut insights.income_brackets, f.income_bracket.as_deref());
            bump(&mut insights.political_affiliations, f.political_affiliation.as_deref());

            if f.biometric_verified {
                bump(&mut insights.verification_method_distribution, Some("biometric"));
            }
            if f.phone_verified {
                bump(&mut insights.verification_method_distribution, Some("phone"));
            }
            if f.identity_verified {
                bump(&mut insights.verification_method_distribution, Some("identity"));
            }

            if let Some(confidence) = f.confidence {
                confidence_sum += confidence;
                confidence_count += 1;
                quality.add(confidence);
            }
        }

        if confidence_count > 0 {
            insights.average_confidence_level = confidence_sum / confidence_count as f64;
        }
        insights.data_quality_distribution = quality;

        self.store.upsert_insights(&insights).await?;
        debug!(poll_id, total = insights.total_responses, "insights materialized");
        Ok(())
    }
}

fn bump(map: &mut BTreeMap<String, u64>, key: Option<&str>) {
    if let Some(key) = key {
        *map.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Coerce a materialized row into the fully-typed shape.
///
/// Returns None when the payload does not parse; the caller then falls
/// back to recomputation. A parse that succeeds is still normalized so no
/// tier key is ever missing, and the row's response count is authoritative.
fn coerce_stored(poll_id: &str, stored: StoredInsights) -> Option<PollInsights> {
    let mut insights: PollInsights = serde_json::from_value(stored.payload).ok()?;
    insights.poll_id = poll_id.to_string();
    insights.total_responses = stored.total_responses.max(0) as u64;

    let mut breakdown = zeroed_tier_breakdown();
    for (key, count) in std::mem::take(&mut insights.trust_tier_breakdown) {
        // Re-key through the shared normalizer so legacy numeric keys fold
        // into their tier names
        let tier = TrustTier::from_raw(&key);
        *breakdown.entry(tier.as_str().to_string()).or_insert(0) += count;
    }
    insights.trust_tier_breakdown = breakdown;

    Some(insights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerced_row_always_carries_all_tier_keys() {
        let stored = StoredInsights {
            total_responses: 5,
            payload: json!({
                "poll_id": "p",
                "total_responses": 5,
                "trust_tier_breakdown": { "T2": 5 },
                "age_groups": {},
                "regions": {},
                "education_levels": {},
                "income_brackets": {},
                "political_affiliations": {},
                "average_confidence_level": 0.7,
                "data_quality_distribution": { "high": 0, "medium": 5, "low": 0 },
                "verification_method_distribution": {}
            }),
        };

        let insights = coerce_stored("poll-1", stored).unwrap();
        assert_eq!(insights.trust_tier_breakdown.len(), 4);
        assert_eq!(insights.trust_tier_breakdown["T2"], 5);
        assert_eq!(insights.trust_tier_breakdown["T0"], 0);
        assert_eq!(insights.total_responses, 5);
    }

    #[test]
    fn coerce_folds_legacy_numeric_tier_keys() {
        let stored = StoredInsights {
            total_responses: 3,
            payload: json!({
                "poll_id": "p",
                "total_responses": 3,
                "trust_tier_breakdown": { "1": 2, "T1": 1 },
                "age_groups": {},
                "regions": {},
                "education_levels": {},
                "income_brackets": {},
                "political_affiliations": {},
                "average_confidence_level": 0.0,
                "data_quality_distribution": { "high": 0, "medium": 0, "low": 0 },
                "verification_method_distribution": {}
            }),
        };

        let insights = coerce_stored("poll-1", stored).unwrap();
        assert_eq!(insights.trust_tier_breakdown["T1"], 3);
    }

    #[test]
    fn malformed_payload_is_rejected_for_recompute() {
        let stored = StoredInsights { total_responses: 9, payload: json!("not an object") };
        assert!(coerce_stored("poll-1", stored).is_none());
    }
}
