use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Open the configured store, create the schema and close it again.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index if missing. Safe to run on every start.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Canonical exercises, one row per signature
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exercises (
            signature TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            muscles_json TEXT NOT NULL DEFAULT '[]',
            equipment_json TEXT NOT NULL DEFAULT '[]',
            difficulty TEXT NOT NULL DEFAULT '',
            media_json TEXT NOT NULL DEFAULT '[]',
            sources_json TEXT NOT NULL DEFAULT '[]',
            alt_ids_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Near-duplicate review queue
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS possible_duplicates (
            left_signature TEXT NOT NULL,
            right_signature TEXT NOT NULL,
            similarity REAL NOT NULL,
            first_seen_at INTEGER NOT NULL,
            PRIMARY KEY (left_signature, right_signature)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_exercises_category ON exercises(category)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_exercises_updated_at ON exercises(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
