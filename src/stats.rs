//! Store statistics and the duplicate review listing.
//!
//! `harvest stats` gives a quick summary of what the store holds: exercise
//! counts, media coverage, and per-category and per-provider breakdowns.
//! `harvest duplicates` prints the possible-duplicate review queue.

use std::collections::BTreeMap;

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::store::sqlite::SqliteStore;
use crate::store::EntityStore;

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exercises")
        .fetch_one(&pool)
        .await?;
    let with_media: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM exercises WHERE media_json != '[]'")
            .fetch_one(&pool)
            .await?;
    let pending_review: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM possible_duplicates")
        .fetch_one(&pool)
        .await?;
    let last_update: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM exercises")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Catalog Harvest — Store Stats");
    println!("=============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Exercises:   {}", total);
    println!(
        "  With media:  {} / {} ({}%)",
        with_media,
        total,
        if total > 0 { (with_media * 100) / total } else { 0 }
    );
    println!("  To review:   {}", pending_review);
    println!(
        "  Last write:  {}",
        last_update.map(format_ts_relative).unwrap_or_else(|| "never".to_string())
    );

    let category_rows = sqlx::query(
        "SELECT category, COUNT(*) AS n FROM exercises GROUP BY category ORDER BY n DESC, category",
    )
    .fetch_all(&pool)
    .await?;
    if !category_rows.is_empty() {
        println!();
        println!("  By category:");
        for row in &category_rows {
            let category: String = row.get("category");
            let n: i64 = row.get("n");
            println!("  {:<24} {:>6}", category, n);
        }
    }

    // Sources live in a JSON array column, so count them here.
    let source_rows: Vec<String> = sqlx::query_scalar("SELECT sources_json FROM exercises")
        .fetch_all(&pool)
        .await?;
    let by_source = count_sources(&source_rows);
    if !by_source.is_empty() {
        println!();
        println!("  By provider:");
        for (source, n) in &by_source {
            println!("  {:<24} {:>6}", source, n);
        }
    }

    println!();
    pool.close().await;
    Ok(())
}

/// Print the possible-duplicate review queue, most similar first.
pub async fn list_duplicates(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let pairs = store.list_duplicates().await?;
    if pairs.is_empty() {
        println!("No possible duplicates queued.");
    } else {
        println!("{:<40} {:<40} SIMILARITY", "LEFT", "RIGHT");
        for pair in &pairs {
            println!("{:<40} {:<40} {:.3}", pair.left, pair.right, pair.similarity);
        }
    }

    store.pool().close().await;
    Ok(())
}

fn count_sources(rows: &[String]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for json in rows {
        match serde_json::from_str::<Vec<String>>(json) {
            Ok(sources) => {
                for source in sources {
                    *counts.entry(source).or_insert(0) += 1;
                }
            }
            Err(e) => tracing::warn!(error = %e, "unreadable sources_json"),
        }
    }
    counts
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
