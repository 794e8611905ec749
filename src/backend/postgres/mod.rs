//! PostgreSQL/PostGIS implementation of [`StorageBackend`](crate::backend::StorageBackend).

mod attr_groups;
mod extents;
mod read;
mod retention;
pub mod schema;
mod upsert;

use crate::config::BackendConfig;
use crate::errors::{StoreError, StoreResult};
use crate::model::{
    Extents, GetExtentsRequest, GetObsRequest, GetTsAttrGroupsRequest, Metadata2, Observation,
    TsMdataGroup,
};
use crate::time_window::ValidityWindowConfig;
use async_trait::async_trait;
use schema::TsSchema;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::StorageBackend;

/// The PostgreSQL/PostGIS-backed [`StorageBackend`]. Holds the connection pool, the
/// schema facts discovered at construction, and the retention task's rate-limiting
/// clock, all as instance state rather than process-wide globals.
pub struct PostgresBackend {
    pool: PgPool,
    schema: TsSchema,
    window: ValidityWindowConfig,
    cleanup_interval: Duration,
    put_obs_limit: usize,
    last_cleanup: Mutex<Instant>,
}

impl PostgresBackend {
    /// Connects and introspects the schema, sizing the pool for concurrent
    /// writers and readers sharing a single backend instance.
    pub async fn connect(config: &BackendConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(25)
            .min_connections(25)
            .max_lifetime(Duration::from_secs(5 * 60))
            .idle_timeout(Duration::from_secs(5 * 60))
            .connect(&config.db.connection_string())
            .await
            .map_err(StoreError::Database)?;

        Self::from_pool(pool, config).await
    }

    /// Builds a backend from an already-open pool (used by `#[sqlx::test]` fixtures,
    /// which hand back a pool pointed at a fresh migrated database).
    pub async fn from_pool(pool: PgPool, config: &BackendConfig) -> StoreResult<Self> {
        let schema = TsSchema::introspect(&pool).await?;
        tracing::info!(
            unique_cols = ?schema.unique_cols,
            "time_series unique constraint introspected"
        );

        Ok(Self {
            pool,
            schema,
            window: ValidityWindowConfig::from_env(),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(0) as u64),
            put_obs_limit: config.put_obs_limit,
            last_cleanup: Mutex::new(Instant::now()),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn put_observations(&self, observations: Vec<Observation>) -> StoreResult<()> {
        upsert::put_observations(self, observations).await
    }

    async fn get_observations(&self, request: GetObsRequest) -> StoreResult<Vec<Metadata2>> {
        read::get_observations(self, request).await
    }

    async fn get_ts_attr_groups(
        &self,
        request: GetTsAttrGroupsRequest,
    ) -> StoreResult<Vec<TsMdataGroup>> {
        attr_groups::get_ts_attr_groups(self, request).await
    }

    async fn get_extents(&self, request: GetExtentsRequest) -> StoreResult<Extents> {
        extents::get_extents(self, request).await
    }
}
