//! Shared analytics models
//!
//! These are the persisted and derived shapes the engine exchanges with the
//! backing store and the dashboard API. Fixed enumerations (trust tiers,
//! quality buckets) always serialize with every key present, even at zero,
//! so dashboard clients never have to probe for missing fields.

use crate::tier::TrustTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user's verification signals plus voting history, as read from the
/// backing store. Input to the tier scorer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VerificationProfile {
    pub biometric_verified: bool,
    pub phone_verified: bool,
    pub identity_verified: bool,
    pub voting_history_count: u32,
}

/// Closed factor record stored alongside every analytics record.
///
/// Parsed defensively at the store boundary: unknown JSON fields are
/// ignored, absent optional fields default to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustTierFactors {
    #[serde(default)]
    pub biometric_verified: bool,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default)]
    pub identity_verified: bool,
    #[serde(default)]
    pub voting_history_count: u32,

    /// Confidence in the classification (0.0-1.0), used for quality buckets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<String>,

    // Sparse self-reported demographics; absent unless the participant
    // supplied (and consented to) them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_bracket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub political_affiliation: Option<String>,
}

/// Ephemeral scoring result: numeric score plus ordinal tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustTierScore {
    /// Numeric score in [0, 100]
    pub score: f64,
    pub tier: TrustTier,
    pub factors: TrustTierFactors,
}

/// One persisted participation event (append-only; corrections are new
/// records, never edits)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub id: String,
    pub user_id: String,
    pub poll_id: Option<String>,
    pub tier: TrustTier,
    pub score: f64,
    pub factors: TrustTierFactors,
    /// RFC 3339 timestamp
    pub calculated_at: String,
}

/// Immutable tier-history entry, appended when the user's current tier
/// changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTransition {
    pub tier: TrustTier,
    /// RFC 3339 timestamp
    pub upgrade_date: String,
    pub reason: String,
    pub verification_methods: Vec<String>,
}

/// Durable per-user civic profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CivicProfile {
    pub user_id: String,
    /// Salted one-way hash of `user_id`; safe to export without exposing
    /// identity
    pub user_hash: String,
    pub total_polls_participated: u32,
    pub total_votes_cast: u32,
    pub average_engagement_score: f64,
    pub current_tier: TrustTier,
    /// Append-only, ordered by `upgrade_date`
    pub tier_history: Vec<TierTransition>,
    pub tier_upgrade_date: Option<String>,
    pub consent_granted: bool,
    pub consent_date: Option<String>,
    pub consent_version: Option<String>,
}

/// Quality-bucket counts. Thresholds are fixed business rules:
/// confidence >= 0.8 high, >= 0.5 medium, else low.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityDistribution {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl QualityDistribution {
    /// Bucket one confidence value at the fixed thresholds
    pub fn add(&mut self, confidence: f64) {
        if confidence >= 0.8 {
            self.high += 1;
        } else if confidence >= 0.5 {
            self.medium += 1;
        } else {
            self.low += 1;
        }
    }
}

/// Per-poll demographic breakdown tables.
///
/// Whether read from the materialized row or recomputed on the fly, the
/// shape is identical: `trust_tier_breakdown` always carries all four tier
/// keys, and every category map is present (possibly empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollInsights {
    pub poll_id: String,
    pub total_responses: u64,
    pub trust_tier_breakdown: BTreeMap<String, u64>,
    pub age_groups: BTreeMap<String, u64>,
    pub regions: BTreeMap<String, u64>,
    pub education_levels: BTreeMap<String, u64>,
    pub income_brackets: BTreeMap<String, u64>,
    pub political_affiliations: BTreeMap<String, u64>,
    pub average_confidence_level: f64,
    pub data_quality_distribution: QualityDistribution,
    pub verification_method_distribution: BTreeMap<String, u64>,
}

impl PollInsights {
    /// Zero-valued insights: the degraded shape returned when neither the
    /// materialized row nor the raw votes are readable
    pub fn empty(poll_id: &str) -> Self {
        Self {
            poll_id: poll_id.to_string(),
            total_responses: 0,
            trust_tier_breakdown: zeroed_tier_breakdown(),
            age_groups: BTreeMap::new(),
            regions: BTreeMap::new(),
            education_levels: BTreeMap::new(),
            income_brackets: BTreeMap::new(),
            political_affiliations: BTreeMap::new(),
            average_confidence_level: 0.0,
            data_quality_distribution: QualityDistribution::default(),
            verification_method_distribution: BTreeMap::new(),
        }
    }
}

/// Tier breakdown with every tier key present at zero
pub fn zeroed_tier_breakdown() -> BTreeMap<String, u64> {
    TrustTier::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), 0u64))
        .collect()
}

/// Platform-level engagement counters, maintained separately from the
/// analytics records
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub active_users: f64,
    pub average_participation: f64,
}

/// Dashboard-scope snapshot; recomputed on every read, never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub tier_distribution: BTreeMap<String, u64>,
    pub average_confidence: f64,
    pub quality_distribution: QualityDistribution,
    pub engagement: EngagementMetrics,
    pub records_considered: u64,
}

/// Advisory bot-risk signal. Always produced: any upstream failure yields
/// the zeroed default with the error message attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotDetectionResult {
    pub risk_score: f64,
    pub suspicious_patterns: Vec<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BotDetectionResult {
    /// Zero-risk, zero-confidence default carrying the failure message
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            risk_score: 0.0,
            suspicious_patterns: Vec::new(),
            confidence: 0.0,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_buckets_use_fixed_thresholds() {
        let mut dist = QualityDistribution::default();
        dist.add(0.8); // boundary: high
        dist.add(0.79);
        dist.add(0.5); // boundary: medium
        dist.add(0.49);
        assert_eq!(dist, QualityDistribution { high: 1, medium: 2, low: 1 });
    }

    #[test]
    fn empty_insights_carry_all_tier_keys() {
        let insights = PollInsights::empty("poll-1");
        assert_eq!(insights.trust_tier_breakdown.len(), 4);
        for tier in TrustTier::ALL {
            assert_eq!(insights.trust_tier_breakdown[tier.as_str()], 0);
        }
    }

    #[test]
    fn factors_ignore_unknown_fields() {
        let json = r#"{"biometric_verified":true,"legacy_field":"x","confidence":0.9}"#;
        let factors: TrustTierFactors = serde_json::from_str(json).unwrap();
        assert!(factors.biometric_verified);
        assert_eq!(factors.confidence, Some(0.9));
        assert!(factors.age_group.is_none());
    }
}
