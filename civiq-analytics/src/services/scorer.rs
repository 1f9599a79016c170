//! Trust Tier Scorer
//!
//! Pure scoring: verification profile in, `{score, tier}` out. No I/O, no
//! hidden state; recomputing from the same inputs always yields the same
//! result. The backing store's `compute_trust_score` function is treated as
//! authoritative when deployed -- this scorer is the consistent local
//! fallback, and [`TierScorer::tier_for_score`] keeps the tier semantics
//! identical for both sources.

use civiq_common::db::{TrustTierFactors, TrustTierScore, VerificationProfile};
use civiq_common::TrustTier;

/// Trust Tier Scorer
///
/// Weighted combination of verification evidence plus voting history.
/// Every weight is nonnegative and tier thresholds apply to the combined
/// score, so adding evidence can never lower the resulting tier.
pub struct TierScorer {
    /// Biometric credential weight (default 30 points)
    biometric_weight: f64,
    /// Phone verification weight (default 20 points)
    phone_weight: f64,
    /// Identity verification weight (default 30 points)
    identity_weight: f64,
    /// Voting history weight (default 20 points, saturating at 50 votes)
    history_weight: f64,
    /// Vote count at which the history contribution saturates
    history_saturation: u32,
}

impl TierScorer {
    /// Create a scorer with the default weights:
    /// biometric 30, phone 20, identity 30, history 20 (saturating at 50
    /// votes). Tier thresholds: >=80 T3, >=50 T2, >=20 T1, else T0.
    pub fn new() -> Self {
        Self {
            biometric_weight: 30.0,
            phone_weight: 20.0,
            identity_weight: 30.0,
            history_weight: 20.0,
            history_saturation: 50,
        }
    }

    /// Score a verification profile
    pub fn score(&self, profile: &VerificationProfile) -> TrustTierScore {
        let mut score = 0.0;
        if profile.biometric_verified {
            score += self.biometric_weight;
        }
        if profile.phone_verified {
            score += self.phone_weight;
        }
        if profile.identity_verified {
            score += self.identity_weight;
        }

        let capped = profile.voting_history_count.min(self.history_saturation);
        score += self.history_weight * f64::from(capped) / f64::from(self.history_saturation);

        let score = score.clamp(0.0, 100.0);

        TrustTierScore {
            score,
            tier: Self::tier_for_score(score),
            factors: TrustTierFactors {
                biometric_verified: profile.biometric_verified,
                phone_verified: profile.phone_verified,
                identity_verified: profile.identity_verified,
                voting_history_count: profile.voting_history_count,
                confidence: Some(score / 100.0),
                ..TrustTierFactors::default()
            },
        }
    }

    /// Map a numeric score (local or store-computed) onto a tier.
    ///
    /// Shared by both scoring paths so an externally computed score lands
    /// on the same tier the local scorer would assign.
    pub fn tier_for_score(score: f64) -> TrustTier {
        if score >= 80.0 {
            TrustTier::T3
        } else if score >= 50.0 {
            TrustTier::T2
        } else if score >= 20.0 {
            TrustTier::T1
        } else {
            TrustTier::T0
        }
    }
}

impl Default for TierScorer {
    fn default() -> Self {
        Self::new()
    }
}
