//! Bot Detection Integrator
//!
//! Thin normalization layer over the store's `detect_bot_behavior`
//! heuristic. Bot detection is advisory, not a gate: the contract is that
//! a [`BotDetectionResult`] is always produced, with every field zeroed
//! and the error message attached when the heuristic is missing, times
//! out, or returns a payload we cannot understand.

use crate::store::CivicStore;
use civiq_common::db::BotDetectionResult;
use tracing::warn;

/// Raw heuristic payload shape; parsed defensively, every field optional
#[derive(serde::Deserialize)]
struct RawRiskPayload {
    #[serde(default)]
    risk_score: Option<f64>,
    #[serde(default)]
    suspicious_patterns: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<f64>,
}

pub struct BotDetector {
    store: CivicStore,
    window_days: i64,
}

impl BotDetector {
    pub fn new(store: CivicStore, window_days: i64) -> Self {
        Self { store, window_days }
    }

    /// Run the bot heuristic for a poll, optionally scoped to one
    /// participant. Never fails.
    pub async fn detect(&self, poll_id: &str, user_id: Option<&str>) -> BotDetectionResult {
        let payload = match self
            .store
            .detect_bot_behavior(poll_id, user_id, self.window_days)
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(poll_id, user_id, error = %e, "bot heuristic unavailable");
                return BotDetectionResult::degraded(e.to_string());
            }
        };

        match serde_json::from_value::<RawRiskPayload>(payload) {
            Ok(raw) => BotDetectionResult {
                risk_score: raw.risk_score.unwrap_or(0.0).clamp(0.0, 1.0),
                suspicious_patterns: raw.suspicious_patterns.unwrap_or_default(),
                confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
                error: None,
            },
            Err(e) => {
                warn!(poll_id, user_id, error = %e, "bot heuristic payload malformed");
                BotDetectionResult::degraded(format!("malformed heuristic payload: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_payload_normalizes() {
        let raw: RawRiskPayload = serde_json::from_value(json!({
            "risk_score": 0.42,
            "suspicious_patterns": ["burst_voting"],
            "confidence": 0.9
        }))
        .unwrap();
        assert_eq!(raw.risk_score, Some(0.42));
        assert_eq!(raw.suspicious_patterns.as_deref(), Some(&["burst_voting".to_string()][..]));
    }

    #[test]
    fn partial_payload_fills_zeroes() {
        let raw: RawRiskPayload = serde_json::from_value(json!({ "risk_score": 1.5 })).unwrap();
        assert_eq!(raw.risk_score, Some(1.5));
        assert!(raw.suspicious_patterns.is_none());
        assert!(raw.confidence.is_none());
    }

    #[test]
    fn degraded_result_is_zeroed_with_message() {
        let result = BotDetectionResult::degraded("heuristic offline");
        assert_eq!(result.risk_score, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert!(result.suspicious_patterns.is_empty());
        assert_eq!(result.error.as_deref(), Some("heuristic offline"));
    }
}
