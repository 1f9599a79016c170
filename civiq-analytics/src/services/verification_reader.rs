//! Verification Profile Reader
//!
//! Aggregates a user's verification signals from the backing store. The
//! signals are fetched independently: a failure reading one defaults that
//! signal to false/0 with a warning instead of blocking the others. Only a
//! missing user row is a hard `NotFound`.

use crate::store::CivicStore;
use civiq_common::db::VerificationProfile;
use civiq_common::{Error, Result};
use tracing::warn;

pub struct VerificationReader {
    store: CivicStore,
}

impl VerificationReader {
    pub fn new(store: CivicStore) -> Self {
        Self { store }
    }

    /// Read the verification profile for a user.
    ///
    /// Errors only when the user row itself is missing (`NotFound`) or the
    /// existence check cannot reach the store.
    pub async fn read(&self, user_id: &str) -> Result<VerificationProfile> {
        if !self.store.user_exists(user_id).await? {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }

        // Signal 1 + 2: credential registration and tier level, each
        // defaulting to unverified independently on a failed read
        let signals = self.store.verification_signals(user_id).await;

        // Signal 3: voting history, independently fetched
        let voting_history_count = match self.store.count_votes(user_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id, error = %e, "vote count unavailable, defaulting to 0");
                0
            }
        };

        Ok(VerificationProfile {
            biometric_verified: signals.biometric_count > 0,
            phone_verified: signals.tier_level >= 1,
            identity_verified: signals.tier_level >= 2,
            voting_history_count,
        })
    }
}
