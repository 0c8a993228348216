use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;
use crate::reports::store::{PgReportStore, ReportStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ReportStore>,
    /// Serialised report payloads keyed by report name and normalized filter.
    pub report_cache: Cache<String, Value>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = match config.database_url.as_deref() {
            Some(url) => Some(
                PgPoolOptions::new()
                    .max_connections(config.db_pool_max_connections)
                    .min_connections(config.db_pool_min_connections)
                    .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
                    .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
                    .connect_lazy(url)?,
            ),
            None => {
                tracing::warn!("DATABASE_URL is not set; report endpoints will fail until it is configured");
                None
            }
        };

        Ok(Self::with_store(config, Arc::new(PgReportStore::new(db_pool))))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn ReportStore>) -> Self {
        let report_cache = Cache::builder()
            .max_capacity(config.report_response_cache_max_entries)
            .time_to_live(Duration::from_secs(
                config.report_response_cache_ttl_seconds.max(1),
            ))
            .build();

        Self {
            config: Arc::new(config),
            store,
            report_cache,
        }
    }
}
