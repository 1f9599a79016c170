//! Trust tier enumeration and legacy-value normalization
//!
//! Tiers are ordinal: T0 (unverified) < T1 < T2 < T3 (fully verified).
//! Historical vote rows carry the tier as free text -- sometimes a bare
//! number ("1".."3"), sometimes a symbolic name ("T2") -- so every boundary
//! that reads a raw tier value must go through [`TrustTier::from_raw`]
//! rather than parsing inline.

use serde::{Deserialize, Serialize};

/// Ordinal trust classification assigned from verification strength and
/// engagement history.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum TrustTier {
    /// No verification evidence
    #[default]
    T0,
    /// Minimal evidence (e.g. phone only, or short voting history)
    T1,
    /// Moderate evidence
    T2,
    /// Strong evidence (biometric + identity + sustained history)
    T3,
}

impl TrustTier {
    /// All tiers in ascending order. Breakdown maps must carry every key
    /// even at zero count, so aggregators iterate this instead of only the
    /// tiers they observed.
    pub const ALL: [TrustTier; 4] = [TrustTier::T0, TrustTier::T1, TrustTier::T2, TrustTier::T3];

    /// String representation used in the database and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::T0 => "T0",
            TrustTier::T1 => "T1",
            TrustTier::T2 => "T2",
            TrustTier::T3 => "T3",
        }
    }

    /// Numeric level (0..=3)
    pub fn level(&self) -> u8 {
        match self {
            TrustTier::T0 => 0,
            TrustTier::T1 => 1,
            TrustTier::T2 => 2,
            TrustTier::T3 => 3,
        }
    }

    /// Normalize a raw stored value into a tier.
    ///
    /// Accepts symbolic names ("T1", case-insensitive) and legacy numeric
    /// values ("2", "2.0", 3). Numbers above the top tier clamp to T3;
    /// anything unrecognizable falls back to T0, never to an error.
    pub fn from_raw(raw: &str) -> TrustTier {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "T0" => return TrustTier::T0,
            "T1" => return TrustTier::T1,
            "T2" => return TrustTier::T2,
            "T3" => return TrustTier::T3,
            _ => {}
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return TrustTier::from_level(n.max(0.0) as u8);
        }
        TrustTier::T0
    }

    /// Tier for a numeric level, clamping above the top tier
    pub fn from_level(level: u8) -> TrustTier {
        match level {
            0 => TrustTier::T0,
            1 => TrustTier::T1,
            2 => TrustTier::T2,
            _ => TrustTier::T3,
        }
    }
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
