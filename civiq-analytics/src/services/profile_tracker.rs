//! Civic Profile Tracker
//!
//! Maintains the durable per-user civic profile: cumulative engagement
//! counters, current tier, and the append-only tier-transition history.
//!
//! Counters are always recomputed from the full analytics-record history
//! rather than incremented, so repeated or out-of-order updates cannot
//! drift. Updates for the same user are serialized through a keyed async
//! mutex, which prevents two concurrent participation events from both
//! appending the same tier transition.
//!
//! If the `civic_profiles` table has not been migrated in yet, `update`
//! logs a warning and returns Ok with no side effects. The engine is
//! deployable ahead of that migration; this is required behavior.

use crate::store::CivicStore;
use civiq_common::db::{AnalyticsRecord, CivicProfile, TierTransition};
use civiq_common::{anonymize, config, Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub struct ProfileTracker {
    store: CivicStore,
    /// Per-user serialization points; entries are created on first use
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProfileTracker {
    pub fn new(store: CivicStore) -> Self {
        Self { store, user_locks: Mutex::new(HashMap::new()) }
    }

    fn lock_for(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(user_id.to_string()).or_default().clone()
    }

    /// Drop the map entry once no other updater holds this lock, so the
    /// map tracks in-flight users rather than every user ever seen
    fn release_lock(&self, user_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        // Two references: the map entry and ours. Any more means another
        // update is queued on this user and the entry must stay.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(user_id);
        }
    }

    /// Number of per-user serialization points currently in flight
    pub fn active_user_locks(&self) -> usize {
        self.user_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Update (or create) the civic profile for a user after a new
    /// analytics record has been durably written.
    ///
    /// Safe default: when the profile table or its columns are not yet
    /// deployed, the update is skipped with a warning and `Ok(())`.
    pub async fn update(&self, user_id: &str, snapshot: &AnalyticsRecord) -> Result<()> {
        let lock = self.lock_for(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.update_locked(user_id, snapshot).await
        };
        self.release_lock(user_id, lock);

        match result {
            Ok(()) => Ok(()),
            Err(Error::CapabilityNotDeployed(msg)) => {
                warn!(user_id, "civic profile storage not deployed, skipping update: {}", msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update_locked(&self, user_id: &str, snapshot: &AnalyticsRecord) -> Result<()> {
        // Recompute aggregates from the full record history
        let records = self.store.analytics_records_for_user(user_id).await?;
        let total_votes_cast = records.len() as u32;
        let total_polls_participated = {
            let mut polls: Vec<&str> =
                records.iter().filter_map(|r| r.poll_id.as_deref()).collect();
            polls.sort_unstable();
            polls.dedup();
            polls.len() as u32
        };
        let average_engagement_score = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.score).sum::<f64>() / records.len() as f64
        };

        // Fetch or create the profile entry
        let existing = self.store.civic_profile(user_id).await?;
        let mut profile = match existing {
            Some(profile) => profile,
            None => {
                let salt =
                    config::setting_or(self.store.pool(), "user_hash_salt", "civiq").await;
                CivicProfile {
                    user_id: user_id.to_string(),
                    user_hash: anonymize::user_hash(&salt, user_id),
                    total_polls_participated: 0,
                    total_votes_cast: 0,
                    average_engagement_score: 0.0,
                    current_tier: Default::default(),
                    tier_history: Vec::new(),
                    tier_upgrade_date: None,
                    consent_granted: false,
                    consent_date: None,
                    consent_version: None,
                }
            }
        };

        profile.total_polls_participated = total_polls_participated;
        profile.total_votes_cast = total_votes_cast;
        profile.average_engagement_score = average_engagement_score;

        // Append a transition iff the persisted tier changed. The history
        // is append-only: entries are never rewritten or removed.
        let had_history = !profile.tier_history.is_empty();
        if snapshot.tier != profile.current_tier || !had_history {
            let transition = TierTransition {
                tier: snapshot.tier,
                upgrade_date: snapshot.calculated_at.clone(),
                reason: if had_history {
                    format!("tier changed {} -> {}", profile.current_tier, snapshot.tier)
                } else {
                    "initial tier assignment".to_string()
                },
                verification_methods: verification_methods(snapshot),
            };
            debug!(user_id, tier = %snapshot.tier, "appending tier transition");
            profile.tier_history.push(transition);
            profile.current_tier = snapshot.tier;
            profile.tier_upgrade_date = Some(snapshot.calculated_at.clone());
        }

        self.store.upsert_civic_profile(&profile).await
    }
}

/// Verification methods that contributed to a snapshot's classification
fn verification_methods(snapshot: &AnalyticsRecord) -> Vec<String> {
    let mut methods = Vec::new();
    if snapshot.factors.biometric_verified {
        methods.push("biometric".to_string());
    }
    if snapshot.factors.phone_verified {
        methods.push("phone".to_string());
    }
    if snapshot.factors.identity_verified {
        methods.push("identity".to_string());
    }
    if snapshot.factors.voting_history_count > 0 {
        methods.push("voting_history".to_string());
    }
    methods
}
