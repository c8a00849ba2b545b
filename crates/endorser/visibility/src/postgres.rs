//! PostgreSQL visibility store.

use crate::traits::VisibilityStore;
use crate::{VisibilityError, VisibilityResult};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::BTreeSet;

#[derive(Clone)]
pub struct PostgresVisibilityStore {
    pool: PgPool,
}

impl PostgresVisibilityStore {
    pub async fn connect(database_url: &str) -> VisibilityResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> VisibilityResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| VisibilityError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> VisibilityResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> VisibilityResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS endorser_visibility_edges (
                granter TEXT NOT NULL,
                grantee TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (granter, grantee)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS endorser_visibility_by_grantee ON endorser_visibility_edges (grantee)",
        ];
        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| VisibilityError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn column_set(
        &self,
        sql: &str,
        key: &str,
        column: &str,
    ) -> VisibilityResult<BTreeSet<String>> {
        let rows = sqlx::query(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VisibilityError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>(column)
                    .map_err(|e| VisibilityError::Backend(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl VisibilityStore for PostgresVisibilityStore {
    async fn edges_from(&self, granter: &str) -> VisibilityResult<BTreeSet<String>> {
        self.column_set(
            "SELECT grantee FROM endorser_visibility_edges WHERE granter = $1",
            granter,
            "grantee",
        )
        .await
    }

    async fn edges_to(&self, grantee: &str) -> VisibilityResult<BTreeSet<String>> {
        self.column_set(
            "SELECT granter FROM endorser_visibility_edges WHERE grantee = $1",
            grantee,
            "granter",
        )
        .await
    }

    async fn add_edge(&self, granter: &str, grantee: &str) -> VisibilityResult<bool> {
        let result = sqlx::query(
            "INSERT INTO endorser_visibility_edges (granter, grantee) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(granter)
        .bind(grantee)
        .execute(&self.pool)
        .await
        .map_err(|e| VisibilityError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_edge(&self, granter: &str, grantee: &str) -> VisibilityResult<bool> {
        let result = sqlx::query(
            "DELETE FROM endorser_visibility_edges WHERE granter = $1 AND grantee = $2",
        )
        .bind(granter)
        .bind(grantee)
        .execute(&self.pool)
        .await
        .map_err(|e| VisibilityError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
