//! PostgreSQL store implementation
//!
//! All collections share one JSONB table; filters compile to JSONB
//! predicates. Queue positions come from `conductor_sequences`, which is
//! bumped atomically with an upsert.

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row as _};
use std::time::Duration;

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS conductor_records (
                id BIGSERIAL PRIMARY KEY,
                collection TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS conductor_records_collection ON conductor_records(collection);"#,
            r#"CREATE INDEX IF NOT EXISTS conductor_records_data ON conductor_records USING GIN (data);"#,
            r#"
            CREATE TABLE IF NOT EXISTS conductor_sequences (
                name TEXT PRIMARY KEY,
                value BIGINT NOT NULL
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &[Filter]) {
        for filter in filters {
            match filter {
                Filter::Eq(field, Value::Null) => {
                    builder.push(" AND COALESCE(data -> ");
                    builder.push_bind(field.clone());
                    builder.push("::text, 'null'::jsonb) = 'null'::jsonb");
                }
                Filter::Eq(field, value) => {
                    builder.push(" AND data -> ");
                    builder.push_bind(field.clone());
                    builder.push("::text = ");
                    builder.push_bind(value.clone());
                    builder.push("::jsonb");
                }
                Filter::In(field, values) => {
                    builder.push(" AND ");
                    builder.push_bind(Value::Array(values.clone()));
                    builder.push("::jsonb @> jsonb_build_array(data -> ");
                    builder.push_bind(field.clone());
                    builder.push("::text)");
                }
            }
        }
    }

    fn scoped(prefix: &str, collection: Collection) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(prefix);
        builder.push(" WHERE collection = ");
        builder.push_bind(collection.name());
        builder
    }
}

#[async_trait]
impl StoreClient for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn select(&self, collection: Collection, query: &Query) -> StorageResult<Vec<Row>> {
        let mut builder = Self::scoped("SELECT data FROM conductor_records", collection);
        Self::push_filters(&mut builder, &query.filters);

        if let Some(order) = &query.order {
            builder.push(" ORDER BY data -> ");
            builder.push_bind(order.field.clone());
            builder.push(match order.direction {
                Direction::Asc => "::text ASC",
                Direction::Desc => "::text DESC",
            });
            builder.push(", id ASC");
        } else {
            builder.push(" ORDER BY id ASC");
        }

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let data: Value = row
                    .try_get("data")
                    .map_err(|e| StorageError::Query(e.to_string()))?;
                match data {
                    Value::Object(map) => Ok(map),
                    other => Err(StorageError::InvalidData(format!(
                        "expected object row in {}, got {}",
                        collection, other
                    ))),
                }
            })
            .collect()
    }

    async fn insert(&self, collection: Collection, row: Row) -> StorageResult<()> {
        sqlx::query("INSERT INTO conductor_records (collection, data) VALUES ($1, $2)")
            .bind(collection.name())
            .bind(Value::Object(row))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> StorageResult<u64> {
        let mut builder = QueryBuilder::new("UPDATE conductor_records SET data = data || ");
        builder.push_bind(Value::Object(patch));
        builder.push("::jsonb WHERE collection = ");
        builder.push_bind(collection.name());
        Self::push_filters(&mut builder, filters);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> StorageResult<u64> {
        let mut builder = Self::scoped("DELETE FROM conductor_records", collection);
        Self::push_filters(&mut builder, filters);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn next_sequence(&self, collection: Collection, field: &str) -> StorageResult<i64> {
        let name = format!("{}.{}", collection.name(), field);
        let row = sqlx::query(
            r#"
            INSERT INTO conductor_sequences (name, value)
            VALUES (
                $1,
                COALESCE(
                    (SELECT MAX((data ->> $3)::bigint) FROM conductor_records WHERE collection = $2),
                    0
                ) + 1
            )
            ON CONFLICT (name) DO UPDATE SET value = conductor_sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .bind(collection.name())
        .bind(field)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.try_get("value")
            .map_err(|e| StorageError::Query(e.to_string()))
    }
}
