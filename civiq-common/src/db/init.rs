//! Database initialization
//!
//! Creates the CIVIQ schema idempotently on startup. The civic-profile
//! table is deliberately split out into [`init_profile_tables`]: the
//! analytics engine must be deployable ahead of that storage migration, so
//! the engine treats its absence as a degradable condition rather than a
//! startup failure.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Initialize database connection and create core tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while participation events are written
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    // Idempotent - safe to call on every startup
    create_schema_version_table(&pool).await?;
    create_settings_table(&pool).await?;
    create_users_table(&pool).await?;
    create_credentials_table(&pool).await?;
    create_polls_table(&pool).await?;
    create_votes_table(&pool).await?;
    create_analytics_table(&pool).await?;
    create_insights_table(&pool).await?;
    create_platform_metrics_table(&pool).await?;

    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create the civic-profile table (separate rollout step).
///
/// Deployments that have not run this yet still serve analytics; profile
/// updates degrade to a logged warning until the table exists.
pub async fn init_profile_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS civic_profiles (
            user_id TEXT PRIMARY KEY,
            user_hash TEXT NOT NULL,
            total_polls_participated INTEGER NOT NULL DEFAULT 0,
            total_votes_cast INTEGER NOT NULL DEFAULT 0,
            average_engagement_score REAL NOT NULL DEFAULT 0.0,
            current_tier TEXT NOT NULL DEFAULT 'T0',
            tier_history TEXT NOT NULL DEFAULT '[]',
            tier_upgrade_date TEXT,
            consent_granted INTEGER NOT NULL DEFAULT 0,
            consent_date TEXT,
            consent_version TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (total_polls_participated >= 0),
            CHECK (total_votes_cast >= 0),
            CHECK (current_tier IN ('T0', 'T1', 'T2', 'T3'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_civic_profiles_hash ON civic_profiles(user_hash)")
        .execute(pool)
        .await?;

    info!("Civic profile tables ready");
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    // tier_level: 0 = unverified, 1 = phone verified, 2 = identity verified
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT,
            tier_level INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (tier_level >= 0 AND tier_level <= 2)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_credentials_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS credentials (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('biometric', 'phone', 'identity')),
            registered_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_credentials_user ON credentials(user_id, kind)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_polls_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS polls (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed', 'draft')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_votes_table(pool: &SqlitePool) -> Result<()> {
    // trust_tier is free text: legacy rows carry numeric values ("1"),
    // newer rows carry symbolic names ("T1"), and some carry nothing at all.
    // Normalization happens in civiq_common::tier, never inline.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            id TEXT PRIMARY KEY,
            poll_id TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            trust_tier TEXT,
            status TEXT NOT NULL DEFAULT 'counted' CHECK (status IN ('counted', 'pending', 'rejected')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_poll ON votes(poll_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_user ON votes(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the append-only analytics record table
pub async fn create_analytics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trust_tier_analytics (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            poll_id TEXT,
            tier TEXT NOT NULL CHECK (tier IN ('T0', 'T1', 'T2', 'T3')),
            score REAL NOT NULL CHECK (score >= 0.0 AND score <= 100.0),
            factors TEXT NOT NULL DEFAULT '{}',
            calculated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analytics_user ON trust_tier_analytics(user_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analytics_poll ON trust_tier_analytics(poll_id, calculated_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_insights_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS poll_demographic_insights (
            poll_id TEXT PRIMARY KEY,
            total_responses INTEGER NOT NULL DEFAULT 0,
            payload TEXT NOT NULL DEFAULT '{}',
            computed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_platform_metrics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS platform_metrics (
            key TEXT PRIMARY KEY,
            value REAL NOT NULL DEFAULT 0.0,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // HTTP server settings
    ensure_setting(pool, "http_port", "5730").await?;
    ensure_setting(pool, "http_request_timeout_ms", "30000").await?;

    // Backing-store call bounds
    ensure_setting(pool, "statement_timeout_ms", "5000").await?;

    // Analytics engine settings
    ensure_setting(pool, "summary_window_records", "5000").await?;
    ensure_setting(pool, "bot_detection_window_days", "7").await?;

    // Per-install anonymization salt; generated once, then stable so the
    // derived user_hash stays consistent across profile updates
    let salt = Uuid::new_v4().to_string();
    ensure_setting(pool, "user_hash_salt", &salt).await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value.
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;
        tracing::warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
