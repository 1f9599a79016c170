//! Dashboard Summary Builder
//!
//! Cross-cuts the analytics record set into a single dashboard snapshot:
//! tier distribution (all four tiers always present), average confidence
//! and quality buckets over records that carry a confidence factor, and
//! platform-level engagement counters read from their own table rather
//! than recomputed from records. Recomputed on every read; never persisted.

use crate::store::CivicStore;
use civiq_common::db::{
    zeroed_tier_breakdown, AnalyticsRecord, AnalyticsSummary, EngagementMetrics,
    QualityDistribution,
};
use tracing::warn;

pub struct SummaryBuilder {
    store: CivicStore,
    /// Most-recent-records window considered per snapshot
    window: i64,
}

impl SummaryBuilder {
    pub fn new(store: CivicStore, window: i64) -> Self {
        Self { store, window }
    }

    /// Build the dashboard summary. Read-side: degrades to a zero-valued
    /// snapshot rather than failing.
    pub async fn build(&self) -> AnalyticsSummary {
        let records = match self.store.recent_analytics_records(self.window).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "summary query failed, returning zero snapshot");
                Vec::new()
            }
        };

        let mut summary = summarize(&records);

        // Engagement counters are platform-maintained, distinct from the
        // record set; absence degrades to zero
        summary.engagement = EngagementMetrics {
            active_users: self.metric_or_zero("active_users").await,
            average_participation: self.metric_or_zero("average_participation").await,
        };

        summary
    }

    async fn metric_or_zero(&self, key: &str) -> f64 {
        match self.store.platform_metric(key).await {
            Ok(Some(value)) => value,
            Ok(None) => 0.0,
            Err(e) => {
                warn!(key, error = %e, "platform metric unavailable");
                0.0
            }
        }
    }
}

/// Aggregate a record window into the summary shape (engagement metrics
/// filled in separately)
fn summarize(records: &[AnalyticsRecord]) -> AnalyticsSummary {
    let mut tier_distribution = zeroed_tier_breakdown();
    let mut quality = QualityDistribution::default();
    let mut confidence_sum = 0.0;
    let mut confidence_count = 0u64;

    for record in records {
        *tier_distribution.entry(record.tier.as_str().to_string()).or_insert(0) += 1;

        if let Some(confidence) = record.factors.confidence {
            confidence_sum += confidence;
            confidence_count += 1;
            quality.add(confidence);
        }
    }

    AnalyticsSummary {
        tier_distribution,
        average_confidence: if confidence_count > 0 {
            confidence_sum / confidence_count as f64
        } else {
            0.0
        },
        quality_distribution: quality,
        engagement: EngagementMetrics::default(),
        records_considered: records.len() as u64,
    }
}
