//! Postgres + pgvector implementation of `PersistentStore`.
//!
//! Schema (see `migrations/`):
//!   episodic_events(id, timestamp_ms, source, raw_text, embedding vector,
//!     salience jsonb, structured_json jsonb, entity_ids uuid[], decision_path,
//!     matched_heuristic_id, response_id, response_text, llm_prompt_text,
//!     predicted_success, prediction_confidence)
//!   heuristics(id, name, condition_text, condition_embedding vector,
//!     effects jsonb, confidence, origin, origin_id, fire_count, success_count,
//!     created_at_ms, updated_at_ms, frozen)
//!   heuristic_fires(id, heuristic_id, event_id, fired_at_ms, outcome,
//!     feedback_source, episodic_event_id)

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::{Effects, EpisodicEvent, FireOutcome, Heuristic, HeuristicFire, HeuristicMatch, SalienceVector};
use crate::store::{PersistentStore, StoreError, StoreResult};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<EpisodicEvent, sqlx::Error> {
    let embedding: Option<Vector> = row.try_get("embedding")?;
    let salience_json: Option<serde_json::Value> = row.try_get("salience")?;
    let entity_ids: Vec<Uuid> = row.try_get("entity_ids")?;

    Ok(EpisodicEvent {
        id: row.try_get("id")?,
        timestamp_ms: row.try_get("timestamp_ms")?,
        source: row.try_get("source")?,
        raw_text: row.try_get("raw_text")?,
        embedding: embedding.map(|v| v.to_vec()).unwrap_or_default(),
        salience: salience_json.and_then(|v| serde_json::from_value::<SalienceVector>(v).ok()),
        structured_json: row.try_get("structured_json")?,
        entity_ids,
        decision_path: row.try_get("decision_path")?,
        matched_heuristic_id: row.try_get("matched_heuristic_id")?,
        response_id: row.try_get("response_id")?,
        response_text: row.try_get("response_text")?,
        llm_prompt_text: row.try_get("llm_prompt_text")?,
        predicted_success: row.try_get("predicted_success")?,
        prediction_confidence: row.try_get("prediction_confidence")?,
    })
}

fn row_to_heuristic(row: &sqlx::postgres::PgRow) -> Result<Heuristic, sqlx::Error> {
    let condition_embedding: Option<Vector> = row.try_get("condition_embedding")?;
    let effects_json: serde_json::Value = row.try_get("effects")?;
    let effects: Effects = serde_json::from_value(effects_json).unwrap_or(Effects {
        action_type: "suggest".into(),
        message: String::new(),
    });

    Ok(Heuristic {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        condition_text: row.try_get("condition_text")?,
        condition_embedding: condition_embedding.map(|v| v.to_vec()).unwrap_or_default(),
        effects,
        confidence: row.try_get("confidence")?,
        origin: row.try_get("origin")?,
        origin_id: row.try_get("origin_id")?,
        fire_count: row.try_get("fire_count")?,
        success_count: row.try_get("success_count")?,
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
        frozen: row.try_get("frozen")?,
    })
}

fn row_to_fire(row: &sqlx::postgres::PgRow) -> Result<HeuristicFire, sqlx::Error> {
    let outcome_str: String = row.try_get("outcome")?;
    Ok(HeuristicFire {
        id: row.try_get("id")?,
        heuristic_id: row.try_get("heuristic_id")?,
        event_id: row.try_get("event_id")?,
        fired_at_ms: row.try_get("fired_at_ms")?,
        outcome: FireOutcome::parse(&outcome_str).unwrap_or(FireOutcome::Unknown),
        feedback_source: row.try_get("feedback_source")?,
        episodic_event_id: row.try_get("episodic_event_id")?,
    })
}

fn backend_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl PersistentStore for PostgresStore {
    async fn store_event(&self, event: &EpisodicEvent) -> StoreResult<()> {
        let embedding = if event.embedding.is_empty() { None } else { Some(Vector::from(event.embedding.clone())) };
        let salience_json = event.salience.as_ref().map(|s| serde_json::to_value(s).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO episodic_events
                (id, timestamp_ms, source, raw_text, embedding, salience, structured_json,
                 entity_ids, decision_path, matched_heuristic_id, response_id, response_text,
                 llm_prompt_text, predicted_success, prediction_confidence)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
            "#,
        )
        .bind(event.id)
        .bind(event.timestamp_ms)
        .bind(&event.source)
        .bind(&event.raw_text)
        .bind(embedding)
        .bind(salience_json)
        .bind(&event.structured_json)
        .bind(&event.entity_ids)
        .bind(event.decision_path.as_deref())
        .bind(event.matched_heuristic_id.as_deref())
        .bind(&event.response_id)
        .bind(&event.response_text)
        .bind(&event.llm_prompt_text)
        .bind(event.predicted_success)
        .bind(event.prediction_confidence)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn query_by_time(
        &self,
        start_ms: i64,
        end_ms: i64,
        source_filter: Option<&str>,
        limit: i32,
    ) -> StoreResult<Vec<EpisodicEvent>> {
        let limit = if limit > 0 { limit as i64 } else { 100 };
        let rows = sqlx::query(
            r#"
            SELECT * FROM episodic_events
            WHERE timestamp_ms BETWEEN $1 AND $2
              AND ($3::text IS NULL OR source = $3)
            ORDER BY timestamp_ms DESC
            LIMIT $4
            "#,
        )
        .bind(start_ms)
        .bind(end_ms)
        .bind(source_filter)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.iter().map(row_to_event).collect::<Result<_, _>>().map_err(backend_err)
    }

    async fn query_by_similarity(
        &self,
        query_embedding: &[f32],
        similarity_threshold: f32,
        time_filter_hours: Option<i64>,
        limit: i32,
    ) -> StoreResult<Vec<EpisodicEvent>> {
        let limit = if limit > 0 { limit as i64 } else { 10 };
        let vector = Vector::from(query_embedding.to_vec());
        let cutoff_ms = time_filter_hours.map(|h| gladys_common::now_ms() - h * 3_600_000);

        let rows = sqlx::query(
            r#"
            SELECT *, 1 - (embedding <=> $1) AS similarity FROM episodic_events
            WHERE embedding IS NOT NULL
              AND ($2::bigint IS NULL OR timestamp_ms >= $2)
              AND 1 - (embedding <=> $1) >= $3
            ORDER BY embedding <=> $1
            LIMIT $4
            "#,
        )
        .bind(vector)
        .bind(cutoff_ms)
        .bind(similarity_threshold)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.iter().map(row_to_event).collect::<Result<_, _>>().map_err(backend_err)
    }

    async fn store_heuristic(&self, heuristic: &Heuristic) -> StoreResult<()> {
        let embedding = if heuristic.condition_embedding.is_empty() {
            None
        } else {
            Some(Vector::from(heuristic.condition_embedding.clone()))
        };
        let effects_json = serde_json::to_value(&heuristic.effects).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO heuristics
                (id, name, condition_text, condition_embedding, effects, confidence,
                 origin, origin_id, fire_count, success_count, created_at_ms, updated_at_ms, frozen)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                condition_text = EXCLUDED.condition_text,
                condition_embedding = EXCLUDED.condition_embedding,
                effects = EXCLUDED.effects,
                confidence = EXCLUDED.confidence,
                updated_at_ms = EXCLUDED.updated_at_ms,
                frozen = EXCLUDED.frozen
            "#,
        )
        .bind(heuristic.id)
        .bind(&heuristic.name)
        .bind(&heuristic.condition_text)
        .bind(embedding)
        .bind(effects_json)
        .bind(heuristic.confidence)
        .bind(&heuristic.origin)
        .bind(&heuristic.origin_id)
        .bind(heuristic.fire_count)
        .bind(heuristic.success_count)
        .bind(heuristic.created_at_ms)
        .bind(heuristic.updated_at_ms)
        .bind(heuristic.frozen)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn get_heuristic(&self, id: Uuid) -> StoreResult<Heuristic> {
        let row = sqlx::query("SELECT * FROM heuristics WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?
            .ok_or(StoreError::NotFound)?;
        row_to_heuristic(&row).map_err(backend_err)
    }

    async fn query_heuristics(&self, min_confidence: f32, limit: i32) -> StoreResult<Vec<HeuristicMatch>> {
        let limit = if limit > 0 { limit as i64 } else { 100 };
        let rows = sqlx::query(
            r#"
            SELECT * FROM heuristics
            WHERE NOT frozen AND confidence >= $1
            ORDER BY confidence DESC
            LIMIT $2
            "#,
        )
        .bind(min_confidence)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.iter()
            .map(|r| row_to_heuristic(r).map(|h| HeuristicMatch { similarity: 1.0, score: h.confidence, heuristic: h }))
            .collect::<Result<_, _>>()
            .map_err(backend_err)
    }

    async fn query_matching_heuristics(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        min_confidence: f32,
        min_similarity: f32,
        limit: i32,
        source_filter: Option<&str>,
    ) -> StoreResult<Vec<HeuristicMatch>> {
        let limit = if limit > 0 { limit as i64 } else { 10 };
        let source_prefix = source_filter.map(|s| format!("{s}:%"));

        if !query_embedding.is_empty() {
            let vector = Vector::from(query_embedding.to_vec());
            let rows = sqlx::query(
                r#"
                SELECT *, 1 - (condition_embedding <=> $1) AS similarity FROM heuristics
                WHERE NOT frozen AND confidence >= $2
                  AND condition_embedding IS NOT NULL
                  AND ($3::text IS NULL OR condition_text LIKE $3)
                  AND 1 - (condition_embedding <=> $1) >= $4
                ORDER BY condition_embedding <=> $1
                LIMIT $5
                "#,
            )
            .bind(&vector)
            .bind(min_confidence)
            .bind(&source_prefix)
            .bind(min_similarity)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

            if !rows.is_empty() {
                return rows
                    .iter()
                    .map(|r| {
                        let similarity: f32 = r.try_get("similarity")?;
                        row_to_heuristic(r).map(|h| HeuristicMatch { score: similarity * h.confidence, heuristic: h, similarity })
                    })
                    .collect::<Result<_, _>>()
                    .map_err(backend_err);
            }
        }

        // Transitional full-text fallback for heuristics that lack embeddings.
        let rows = sqlx::query(
            r#"
            SELECT * FROM heuristics
            WHERE NOT frozen AND confidence >= $1
              AND ($2::text IS NULL OR condition_text LIKE $2)
              AND to_tsvector('english', condition_text) @@ plainto_tsquery('english', $3)
            ORDER BY confidence DESC
            LIMIT $4
            "#,
        )
        .bind(min_confidence)
        .bind(&source_prefix)
        .bind(query_text)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.iter()
            .map(|r| row_to_heuristic(r).map(|h| HeuristicMatch { similarity: 0.0, score: h.confidence, heuristic: h }))
            .collect::<Result<_, _>>()
            .map_err(backend_err)
    }

    async fn update_heuristic_counters(&self, id: Uuid, fire_count: i64, success_count: i64, confidence: f32) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE heuristics SET fire_count = $1, success_count = $2, confidence = $3, updated_at_ms = $4 WHERE id = $5",
        )
        .bind(fire_count)
        .bind(success_count)
        .bind(confidence)
        .bind(gladys_common::now_ms())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_heuristic_fire(&self, heuristic_id: Uuid, event_id: &str, episodic_event_id: Option<&str>) -> StoreResult<Uuid> {
        let fire_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO heuristic_fires (id, heuristic_id, event_id, fired_at_ms, outcome, feedback_source, episodic_event_id)
            VALUES ($1, $2, $3, $4, 'unknown', '', $5)
            "#,
        )
        .bind(fire_id)
        .bind(heuristic_id)
        .bind(event_id)
        .bind(gladys_common::now_ms())
        .bind(episodic_event_id)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(fire_id)
    }

    async fn update_fire_outcome(&self, fire_id: Uuid, outcome: FireOutcome, feedback_source: &str) -> StoreResult<()> {
        sqlx::query("UPDATE heuristic_fires SET outcome = $1, feedback_source = $2 WHERE id = $3 AND outcome = 'unknown'")
            .bind(outcome.as_str())
            .bind(feedback_source)
            .bind(fire_id)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn latest_unknown_fire(&self, heuristic_id: Uuid) -> StoreResult<Option<HeuristicFire>> {
        let row = sqlx::query(
            "SELECT * FROM heuristic_fires WHERE heuristic_id = $1 AND outcome = 'unknown' ORDER BY fired_at_ms DESC LIMIT 1",
        )
        .bind(heuristic_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        row.as_ref().map(row_to_fire).transpose().map_err(backend_err)
    }

    async fn get_pending_fires(&self, heuristic_id: Option<Uuid>, max_age_ms: i64) -> StoreResult<Vec<HeuristicFire>> {
        let cutoff = gladys_common::now_ms() - max_age_ms;
        let rows = sqlx::query(
            r#"
            SELECT * FROM heuristic_fires
            WHERE outcome = 'unknown'
              AND fired_at_ms >= $1
              AND ($2::uuid IS NULL OR heuristic_id = $2)
            ORDER BY fired_at_ms DESC
            "#,
        )
        .bind(cutoff)
        .bind(heuristic_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.iter().map(row_to_fire).collect::<Result<_, _>>().map_err(backend_err)
    }
}
