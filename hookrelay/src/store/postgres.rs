//! PostgreSQL event store.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;

use super::{EventStore, LogQuery, StoreError};
use crate::queue::WebhookEnvelope;

/// Create a database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    info!(max_connections, "database_connecting");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    info!("database_connected");
    Ok(pool)
}

/// Create the `webhook_logs` table and its indexes if missing
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    info!("database_migrations_running");

    let migration_sql = include_str!("../../migrations/001_webhook_logs.sql");
    sqlx::raw_sql(migration_sql).execute(pool).await?;

    info!("database_migrations_complete");
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert(&self, envelope: &WebhookEnvelope) -> Result<(), StoreError> {
        let processed_at = envelope
            .processed_at
            .ok_or(StoreError::NotProcessed(envelope.log_id))?;

        sqlx::query(
            r#"
            INSERT INTO webhook_logs
                (log_id, received_at, event_type, payload, signature, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (log_id) DO UPDATE
            SET processed_at = EXCLUDED.processed_at
            "#,
        )
        .bind(envelope.log_id)
        .bind(envelope.received_at)
        .bind(&envelope.event_type)
        .bind(&envelope.payload)
        .bind(&envelope.signature)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<WebhookEnvelope>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT log_id, received_at, event_type, payload, signature, processed_at
            FROM webhook_logs
            WHERE ($1::TEXT IS NULL OR event_type = $1)
            ORDER BY received_at DESC, log_id DESC
            LIMIT $2
            "#,
        )
        .bind(query.event_type.as_deref())
        .bind(i64::from(query.limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(envelope_from_row).collect())
    }
}

fn envelope_from_row(r: &PgRow) -> WebhookEnvelope {
    WebhookEnvelope {
        log_id: r.get("log_id"),
        received_at: r.get("received_at"),
        event_type: r.get("event_type"),
        payload: r.get("payload"),
        signature: r.get("signature"),
        processed_at: r.get("processed_at"),
    }
}
