//! Backing-store access layer
//!
//! `CivicStore` is the narrow query/command interface the engine uses to
//! reach the shared database. Every call is bounded by a statement timeout,
//! and every driver error goes through `Error::from_store` so the
//! degrade-vs-fail policy is applied uniformly: missing tables or SQL
//! functions surface as `CapabilityNotDeployed`, connection-level failures
//! as `DependencyUnavailable`.

use civiq_common::db::{AnalyticsRecord, CivicProfile, PollInsights, TierTransition};
use civiq_common::{Error, Result, TrustTier};
use sqlx::SqlitePool;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Verification signals read from the user and credential tables
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationSignals {
    /// Number of registered biometric credentials
    pub biometric_count: u32,
    /// 0 = unverified, 1 = phone verified, 2 = identity verified
    pub tier_level: u8,
}

/// A single vote row as seen by the fallback insight recompute
#[derive(Debug, Clone)]
pub struct VoteRow {
    pub trust_tier: Option<String>,
    pub status: String,
    pub created_at: String,
}

/// Materialized insights row, before coercion into the full shape
#[derive(Debug, Clone)]
pub struct StoredInsights {
    pub total_responses: i64,
    pub payload: serde_json::Value,
}

/// Narrow backing-store client. Holds only the pool and the call bound;
/// constructed once and cloned into handlers.
#[derive(Clone)]
pub struct CivicStore {
    db: SqlitePool,
    statement_timeout: Duration,
}

impl CivicStore {
    pub fn new(db: SqlitePool, statement_timeout: Duration) -> Self {
        Self { db, statement_timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Run one store call under the statement timeout
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Ok(res) => res.map_err(Error::from_store),
            Err(_) => Err(Error::DependencyUnavailable(format!(
                "store call '{}' exceeded {}ms",
                what,
                self.statement_timeout.as_millis()
            ))),
        }
    }

    pub async fn user_exists(&self, user_id: &str) -> Result<bool> {
        self.bounded(
            "user_exists",
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
                .bind(user_id)
                .fetch_one(&self.db),
        )
        .await
    }

    /// Credential-registration and tier-level signals for one user.
    ///
    /// The two signals are fetched independently: a failure reading one
    /// defaults only that signal to unverified, with a warning, so a
    /// missing column on one table never blanks the other signal.
    pub async fn verification_signals(&self, user_id: &str) -> VerificationSignals {
        let tier_level = match self
            .bounded(
                "verification_signals.tier_level",
                sqlx::query_scalar::<_, Option<i64>>("SELECT tier_level FROM users WHERE id = ?")
                    .bind(user_id)
                    .fetch_optional(&self.db),
            )
            .await
        {
            Ok(level) => level.flatten().unwrap_or(0),
            Err(e) => {
                warn!(user_id, error = %e, "tier level unavailable, defaulting to unverified");
                0
            }
        };

        let biometric_count = match self
            .bounded(
                "verification_signals.biometric_count",
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM credentials WHERE user_id = ? AND kind = 'biometric'",
                )
                .bind(user_id)
                .fetch_one(&self.db),
            )
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id, error = %e, "biometric count unavailable, defaulting to 0");
                0
            }
        };

        VerificationSignals {
            biometric_count: biometric_count.max(0) as u32,
            tier_level: tier_level.clamp(0, 2) as u8,
        }
    }

    /// Number of counted votes a user has cast across all polls
    pub async fn count_votes(&self, user_id: &str) -> Result<u32> {
        let count: i64 = self
            .bounded(
                "count_votes",
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM votes WHERE user_id = ? AND status = 'counted'",
                )
                .bind(user_id)
                .fetch_one(&self.db),
            )
            .await?;
        Ok(count.max(0) as u32)
    }

    /// Store-side trust score via the `compute_trust_score` SQL function.
    ///
    /// Deployments that have not installed the function yet get
    /// `CapabilityNotDeployed`; callers fall back to the local scorer.
    pub async fn compute_trust_score(&self, user_id: &str) -> Result<f64> {
        self.bounded(
            "compute_trust_score",
            sqlx::query_scalar::<_, f64>("SELECT compute_trust_score(?)")
                .bind(user_id)
                .fetch_one(&self.db),
        )
        .await
    }

    /// Store-side tier progression via the `compute_tier_progression` SQL
    /// function; same degradation rule as [`Self::compute_trust_score`]
    pub async fn compute_tier_progression(&self, user_id: &str) -> Result<TrustTier> {
        let raw: String = self
            .bounded(
                "compute_tier_progression",
                sqlx::query_scalar("SELECT CAST(compute_tier_progression(?) AS TEXT)")
                    .bind(user_id)
                    .fetch_one(&self.db),
            )
            .await?;
        Ok(TrustTier::from_raw(&raw))
    }

    /// Append one analytics record. This is the engine's single
    /// source-of-truth write; callers treat failure here as fatal.
    pub async fn insert_analytics_record(&self, record: &AnalyticsRecord) -> Result<()> {
        let factors = serde_json::to_string(&record.factors)
            .map_err(|e| Error::Internal(format!("factors serialization: {}", e)))?;

        self.bounded(
            "insert_analytics_record",
            sqlx::query(
                r#"
                INSERT INTO trust_tier_analytics (id, user_id, poll_id, tier, score, factors, calculated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.user_id)
            .bind(&record.poll_id)
            .bind(record.tier.as_str())
            .bind(record.score)
            .bind(factors)
            .bind(&record.calculated_at)
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    /// Full record history for one user, oldest first
    pub async fn analytics_records_for_user(&self, user_id: &str) -> Result<Vec<AnalyticsRecord>> {
        let rows = self
            .bounded(
                "analytics_records_for_user",
                sqlx::query_as::<_, AnalyticsRow>(
                    "SELECT id, user_id, poll_id, tier, score, factors, calculated_at
                     FROM trust_tier_analytics WHERE user_id = ? ORDER BY calculated_at ASC",
                )
                .bind(user_id)
                .fetch_all(&self.db),
            )
            .await?;
        Ok(rows.into_iter().map(AnalyticsRow::into_record).collect())
    }

    /// Records for one poll, optionally bounded to timestamps at or after
    /// `since` (RFC 3339 text compares correctly)
    pub async fn analytics_records_for_poll(
        &self,
        poll_id: &str,
        since: Option<&str>,
    ) -> Result<Vec<AnalyticsRecord>> {
        let rows = match since {
            Some(since) => {
                self.bounded(
                    "analytics_records_for_poll",
                    sqlx::query_as::<_, AnalyticsRow>(
                        "SELECT id, user_id, poll_id, tier, score, factors, calculated_at
                         FROM trust_tier_analytics
                         WHERE poll_id = ? AND calculated_at >= ?
                         ORDER BY calculated_at ASC",
                    )
                    .bind(poll_id)
                    .bind(since)
                    .fetch_all(&self.db),
                )
                .await?
            }
            None => {
                self.bounded(
                    "analytics_records_for_poll",
                    sqlx::query_as::<_, AnalyticsRow>(
                        "SELECT id, user_id, poll_id, tier, score, factors, calculated_at
                         FROM trust_tier_analytics WHERE poll_id = ? ORDER BY calculated_at ASC",
                    )
                    .bind(poll_id)
                    .fetch_all(&self.db),
                )
                .await?
            }
        };
        Ok(rows.into_iter().map(AnalyticsRow::into_record).collect())
    }

    /// Most recent records across all users, newest first
    pub async fn recent_analytics_records(&self, limit: i64) -> Result<Vec<AnalyticsRecord>> {
        let rows = self
            .bounded(
                "recent_analytics_records",
                sqlx::query_as::<_, AnalyticsRow>(
                    "SELECT id, user_id, poll_id, tier, score, factors, calculated_at
                     FROM trust_tier_analytics ORDER BY calculated_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.db),
            )
            .await?;
        Ok(rows.into_iter().map(AnalyticsRow::into_record).collect())
    }

    pub async fn civic_profile(&self, user_id: &str) -> Result<Option<CivicProfile>> {
        let row = self
            .bounded(
                "civic_profile",
                sqlx::query_as::<_, ProfileRow>(
                    "SELECT user_id, user_hash, total_polls_participated, total_votes_cast,
                            average_engagement_score, current_tier, tier_history,
                            tier_upgrade_date, consent_granted, consent_date, consent_version
                     FROM civic_profiles WHERE user_id = ?",
                )
                .bind(user_id)
                .fetch_optional(&self.db),
            )
            .await?;
        Ok(row.map(ProfileRow::into_profile))
    }

    /// Upsert keyed by stable user id
    pub async fn upsert_civic_profile(&self, profile: &CivicProfile) -> Result<()> {
        let history = serde_json::to_string(&profile.tier_history)
            .map_err(|e| Error::Internal(format!("tier_history serialization: {}", e)))?;

        self.bounded(
            "upsert_civic_profile",
            sqlx::query(
                r#"
                INSERT INTO civic_profiles (
                    user_id, user_hash, total_polls_participated, total_votes_cast,
                    average_engagement_score, current_tier, tier_history,
                    tier_upgrade_date, consent_granted, consent_date, consent_version,
                    updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(user_id) DO UPDATE SET
                    user_hash = excluded.user_hash,
                    total_polls_participated = excluded.total_polls_participated,
                    total_votes_cast = excluded.total_votes_cast,
                    average_engagement_score = excluded.average_engagement_score,
                    current_tier = excluded.current_tier,
                    tier_history = excluded.tier_history,
                    tier_upgrade_date = excluded.tier_upgrade_date,
                    consent_granted = excluded.consent_granted,
                    consent_date = excluded.consent_date,
                    consent_version = excluded.consent_version,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(&profile.user_id)
            .bind(&profile.user_hash)
            .bind(profile.total_polls_participated as i64)
            .bind(profile.total_votes_cast as i64)
            .bind(profile.average_engagement_score)
            .bind(profile.current_tier.as_str())
            .bind(history)
            .bind(&profile.tier_upgrade_date)
            .bind(profile.consent_granted as i64)
            .bind(&profile.consent_date)
            .bind(&profile.consent_version)
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    /// Materialized insights row for a poll, if the periodic job has
    /// produced one
    pub async fn precomputed_insights(&self, poll_id: &str) -> Result<Option<StoredInsights>> {
        let row: Option<(i64, String)> = self
            .bounded(
                "precomputed_insights",
                sqlx::query_as(
                    "SELECT total_responses, payload FROM poll_demographic_insights WHERE poll_id = ?",
                )
                .bind(poll_id)
                .fetch_optional(&self.db),
            )
            .await?;

        Ok(row.map(|(total_responses, payload)| StoredInsights {
            total_responses,
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        }))
    }

    /// Best-effort write of a recomputed insights row
    pub async fn upsert_insights(&self, insights: &PollInsights) -> Result<()> {
        let payload = serde_json::to_string(insights)
            .map_err(|e| Error::Internal(format!("insights serialization: {}", e)))?;

        self.bounded(
            "upsert_insights",
            sqlx::query(
                r#"
                INSERT INTO poll_demographic_insights (poll_id, total_responses, payload, computed_at)
                VALUES (?, ?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(poll_id) DO UPDATE SET
                    total_responses = excluded.total_responses,
                    payload = excluded.payload,
                    computed_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(&insights.poll_id)
            .bind(insights.total_responses as i64)
            .bind(payload)
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    /// Raw per-vote rows for the fallback insight recompute
    pub async fn votes_for_poll(&self, poll_id: &str) -> Result<Vec<VoteRow>> {
        let rows: Vec<(Option<String>, String, String)> = self
            .bounded(
                "votes_for_poll",
                sqlx::query_as(
                    "SELECT trust_tier, status, created_at FROM votes
                     WHERE poll_id = ? AND status = 'counted'",
                )
                .bind(poll_id)
                .fetch_all(&self.db),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(trust_tier, status, created_at)| VoteRow { trust_tier, status, created_at })
            .collect())
    }

    /// Bot-behavior heuristic via the `detect_bot_behavior` SQL function.
    /// The user argument is NULL for poll-wide analysis; a user id scopes
    /// the heuristic to one participant. Returns the raw payload;
    /// normalization lives in the bot detector.
    pub async fn detect_bot_behavior(
        &self,
        poll_id: &str,
        user_id: Option<&str>,
        window_days: i64,
    ) -> Result<serde_json::Value> {
        let raw: String = self
            .bounded(
                "detect_bot_behavior",
                sqlx::query_scalar("SELECT detect_bot_behavior(?, ?, ?)")
                    .bind(poll_id)
                    .bind(user_id)
                    .bind(window_days)
                    .fetch_one(&self.db),
            )
            .await?;

        serde_json::from_str(&raw)
            .map_err(|e| Error::BotHeuristicFailure(format!("malformed heuristic payload: {}", e)))
    }

    /// Platform-level engagement counter (maintained by the platform, not
    /// recomputed from analytics records)
    pub async fn platform_metric(&self, key: &str) -> Result<Option<f64>> {
        self.bounded(
            "platform_metric",
            sqlx::query_scalar("SELECT value FROM platform_metrics WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.db),
        )
        .await
    }
}

/// Row shape for `trust_tier_analytics`
#[derive(sqlx::FromRow)]
struct AnalyticsRow {
    id: String,
    user_id: String,
    poll_id: Option<String>,
    tier: String,
    score: f64,
    factors: String,
    calculated_at: String,
}

impl AnalyticsRow {
    fn into_record(self) -> AnalyticsRecord {
        AnalyticsRecord {
            id: self.id,
            user_id: self.user_id,
            poll_id: self.poll_id,
            tier: TrustTier::from_raw(&self.tier),
            score: self.score,
            // Defensive parse: malformed stored factors degrade to defaults
            factors: serde_json::from_str(&self.factors).unwrap_or_default(),
            calculated_at: self.calculated_at,
        }
    }
}

/// Row shape for `civic_profiles`
#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: String,
    user_hash: String,
    total_polls_participated: i64,
    total_votes_cast: i64,
    average_engagement_score: f64,
    current_tier: String,
    tier_history: String,
    tier_upgrade_date: Option<String>,
    consent_granted: i64,
    consent_date: Option<String>,
    consent_version: Option<String>,
}

impl ProfileRow {
    fn into_profile(self) -> CivicProfile {
        let tier_history: Vec<TierTransition> =
            serde_json::from_str(&self.tier_history).unwrap_or_default();
        CivicProfile {
            user_id: self.user_id,
            user_hash: self.user_hash,
            total_polls_participated: self.total_polls_participated.max(0) as u32,
            total_votes_cast: self.total_votes_cast.max(0) as u32,
            average_engagement_score: self.average_engagement_score,
            current_tier: TrustTier::from_raw(&self.current_tier),
            tier_history,
            tier_upgrade_date: self.tier_upgrade_date,
            consent_granted: self.consent_granted != 0,
            consent_date: self.consent_date,
            consent_version: self.consent_version,
        }
    }
}
