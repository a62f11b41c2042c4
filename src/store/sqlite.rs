//! SQLite-backed [`EntityStore`] implementation.
//!
//! List and set fields are stored as JSON text columns; `difficulty` as its
//! lowercase name. The schema is created by [`crate::migrate`].

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{CanonicalEntity, Difficulty, PossibleDuplicate, UpsertOutcome};

use super::{reconcile, EntityStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SELECT_ENTITY: &str = r#"
    SELECT signature, name, description, category, muscles_json, equipment_json,
           difficulty, media_json, sources_json, alt_ids_json, created_at, updated_at
    FROM exercises
    WHERE signature = ?
"#;

fn row_to_entity(row: &SqliteRow) -> Result<CanonicalEntity> {
    let signature: String = row.get("signature");
    let json = |column: &str| -> String { row.get(column) };
    let difficulty: String = row.get("difficulty");

    Ok(CanonicalEntity {
        name: row.get("name"),
        description: row.get("description"),
        category: row.get("category"),
        muscles: serde_json::from_str(&json("muscles_json"))
            .with_context(|| format!("muscles_json of '{}'", signature))?,
        equipment: serde_json::from_str(&json("equipment_json"))
            .with_context(|| format!("equipment_json of '{}'", signature))?,
        difficulty: Difficulty::from_stored(&difficulty),
        media: serde_json::from_str(&json("media_json"))
            .with_context(|| format!("media_json of '{}'", signature))?,
        sources: serde_json::from_str(&json("sources_json"))
            .with_context(|| format!("sources_json of '{}'", signature))?,
        alt_ids: serde_json::from_str(&json("alt_ids_json"))
            .with_context(|| format!("alt_ids_json of '{}'", signature))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        signature,
    })
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn upsert_batch(&self, entities: &[CanonicalEntity], now: i64) -> Result<Vec<UpsertOutcome>> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(entities.len());

        for incoming in entities {
            let existing = match sqlx::query(SELECT_ENTITY)
                .bind(&incoming.signature)
                .fetch_optional(&mut *tx)
                .await?
            {
                Some(row) => Some(row_to_entity(&row)?),
                None => None,
            };

            let (row, outcome) = reconcile(existing.as_ref(), incoming, now);
            if outcome != UpsertOutcome::Unchanged {
                sqlx::query(
                    r#"
                    INSERT INTO exercises (signature, name, description, category,
                                           muscles_json, equipment_json, difficulty,
                                           media_json, sources_json, alt_ids_json,
                                           created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(signature) DO UPDATE SET
                        name = excluded.name,
                        description = excluded.description,
                        category = excluded.category,
                        muscles_json = excluded.muscles_json,
                        equipment_json = excluded.equipment_json,
                        difficulty = excluded.difficulty,
                        media_json = excluded.media_json,
                        sources_json = excluded.sources_json,
                        alt_ids_json = excluded.alt_ids_json,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&row.signature)
                .bind(&row.name)
                .bind(&row.description)
                .bind(&row.category)
                .bind(serde_json::to_string(&row.muscles)?)
                .bind(serde_json::to_string(&row.equipment)?)
                .bind(row.difficulty.as_str())
                .bind(serde_json::to_string(&row.media)?)
                .bind(serde_json::to_string(&row.sources)?)
                .bind(serde_json::to_string(&row.alt_ids)?)
                .bind(row.created_at)
                .bind(row.updated_at)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("writing '{}'", row.signature))?;
            }
            outcomes.push(outcome);
        }

        tx.commit().await?;
        Ok(outcomes)
    }

    async fn get(&self, signature: &str) -> Result<Option<CanonicalEntity>> {
        let row = sqlx::query(SELECT_ENTITY)
            .bind(signature)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_entity).transpose()
    }

    async fn signatures_with_media(&self) -> Result<HashSet<String>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT signature FROM exercises WHERE media_json != '[]'")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn record_duplicates(&self, pairs: &[PossibleDuplicate], now: i64) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;
        for pair in pairs {
            let result = sqlx::query(
                r#"
                INSERT INTO possible_duplicates (left_signature, right_signature, similarity, first_seen_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(left_signature, right_signature) DO NOTHING
                "#,
            )
            .bind(&pair.left)
            .bind(&pair.right)
            .bind(pair.similarity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(added)
    }

    async fn list_duplicates(&self) -> Result<Vec<PossibleDuplicate>> {
        let rows = sqlx::query(
            r#"
            SELECT left_signature, right_signature, similarity
            FROM possible_duplicates
            ORDER BY similarity DESC, left_signature, right_signature
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PossibleDuplicate {
                left: row.get("left_signature"),
                right: row.get("right_signature"),
                similarity: row.get("similarity"),
            })
            .collect())
    }
}
