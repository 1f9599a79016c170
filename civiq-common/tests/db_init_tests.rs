//! Unit tests for database initialization and the split profile migration

use civiq_common::db::{init_database, init_profile_tables};
use std::path::PathBuf;

fn temp_db(name: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/civiq-test-{}-{}.db", name, std::process::id()))
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let db_path = temp_db("create");
    let _ = std::fs::remove_file(&db_path);

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_database_init_is_idempotent() {
    let db_path = temp_db("idempotent");
    let _ = std::fs::remove_file(&db_path);

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    // Second init against the same file must succeed without error
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to re-open existing database: {:?}", pool2.err());

    drop(pool1);
    drop(pool2);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_core_schema_excludes_civic_profiles() {
    // The profile table is a separate rollout step; core init must not
    // create it, so the engine's degradation path stays exercisable.
    let db_path = temp_db("split-migration");
    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let profile_table: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'civic_profiles'",
    )
    .fetch_optional(&pool)
    .await
    .unwrap();
    assert!(profile_table.is_none(), "core init must not create civic_profiles");

    // Running the profile migration afterwards creates it
    init_profile_tables(&pool).await.unwrap();
    let profile_table: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'civic_profiles'",
    )
    .fetch_optional(&pool)
    .await
    .unwrap();
    assert!(profile_table.is_some());

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let db_path = temp_db("settings");
    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let port: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'http_port'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert_eq!(port.as_deref(), Some("5730"));

    // Salt must exist and stay stable across re-init
    let salt1: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'user_hash_salt'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert!(salt1.is_some(), "user_hash_salt not initialized");

    drop(pool);
    let pool = init_database(&db_path).await.unwrap();
    let salt2: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'user_hash_salt'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert_eq!(salt1, salt2, "re-init must not rotate the anonymization salt");

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}
