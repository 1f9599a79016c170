//! Common error types for CIVIQ

use thiserror::Error;

/// Common result type for CIVIQ operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across CIVIQ services
///
/// The analytics engine distinguishes two failure classes when talking to the
/// backing store: `DependencyUnavailable` (store unreachable, fatal for the
/// calling operation) and `CapabilityNotDeployed` (a table or SQL function
/// the engine wants has not been migrated in yet, so the caller degrades to
/// a safe default and logs a warning).
#[derive(Error, Debug)]
pub enum Error {
    /// Backing store unreachable, pool exhausted, or statement timed out
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Table or SQL function not yet deployed (rollout incomplete)
    #[error("Capability not deployed: {0}")]
    CapabilityNotDeployed(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input field (demographics, identifiers)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bot-detection heuristic failed upstream (advisory only, never fatal)
    #[error("Bot heuristic failure: {0}")]
    BotHeuristicFailure(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a driver error into the engine's degrade-vs-fail taxonomy.
    ///
    /// SQLite reports a missing table or missing scalar function as a plain
    /// database error with a recognizable message; those become
    /// `CapabilityNotDeployed` so enrichment paths can log and continue.
    /// Connection-level failures become `DependencyUnavailable` so the
    /// primary recording path can fail loudly.
    pub fn from_store(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let msg = db.message();
                if msg.contains("no such table")
                    || msg.contains("no such function")
                    || msg.contains("no such column")
                {
                    Error::CapabilityNotDeployed(msg.to_string())
                } else {
                    Error::Database(err)
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                Error::DependencyUnavailable(err.to_string())
            }
            sqlx::Error::Io(_) => Error::DependencyUnavailable(err.to_string()),
            _ => Error::Database(err),
        }
    }

    /// True when the caller should degrade (log + safe default) instead of
    /// propagating the error.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Error::CapabilityNotDeployed(_) | Error::NotFound(_) | Error::BotHeuristicFailure(_)
        )
    }
}
