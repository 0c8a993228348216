use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ActivityLog, NewActivityLog, Portfolio, PortfolioAsset, Transaction, User, Wallet};
use crate::reports::filters::{DateRange, RecordKind, ReportFilter};
use crate::repository::table_service::{create_row, delete_rows, list_all_rows, Predicate};

/// What to read from one record set: a creation-time window, column equality
/// constraints and an optional row ceiling. `limit: None` reads every match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub range: DateRange,
    pub columns: Vec<(&'static str, String)>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Records created inside the filter's window.
    pub fn window(filter: &ReportFilter, kind: RecordKind, limit: Option<usize>) -> Self {
        Self::within(filter, kind, filter.range, limit)
    }

    /// Records created inside `range`, with the filter's criteria.
    pub fn within(
        filter: &ReportFilter,
        kind: RecordKind,
        range: DateRange,
        limit: Option<usize>,
    ) -> Self {
        Self {
            range,
            columns: filter.columns_for(kind),
            limit,
        }
    }

    /// Current state of every matching record, regardless of creation time.
    pub fn snapshot(filter: &ReportFilter, kind: RecordKind, limit: Option<usize>) -> Self {
        Self::within(filter, kind, DateRange::default(), limit)
    }
}

/// Persistence reads and the few writes the reporting service performs.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn deposits(&self, query: &RecordQuery) -> AppResult<Vec<Transaction>>;
    async fn withdrawals(&self, query: &RecordQuery) -> AppResult<Vec<Transaction>>;
    async fn wallets(&self, query: &RecordQuery) -> AppResult<Vec<Wallet>>;
    async fn portfolios(&self, query: &RecordQuery) -> AppResult<Vec<Portfolio>>;
    async fn users(&self, query: &RecordQuery) -> AppResult<Vec<User>>;
    async fn activity_logs(&self, query: &RecordQuery) -> AppResult<Vec<ActivityLog>>;
    async fn delete_activity_logs_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
    async fn record_activity(&self, entry: &NewActivityLog) -> AppResult<()>;
    async fn ping(&self) -> bool;
}

pub struct PgReportStore {
    pool: Option<PgPool>,
}

impl PgReportStore {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> AppResult<&PgPool> {
        self.pool.as_ref().ok_or_else(|| {
            AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
        })
    }

    async fn load<T: DeserializeOwned>(&self, table: &str, query: &RecordQuery) -> AppResult<Vec<T>> {
        let rows = list_all_rows(
            self.pool()?,
            table,
            &predicates(query),
            query.limit,
            "created_at",
            false,
        )
        .await?;
        decode_rows(table, rows)
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn deposits(&self, query: &RecordQuery) -> AppResult<Vec<Transaction>> {
        self.load("deposits", query).await
    }

    async fn withdrawals(&self, query: &RecordQuery) -> AppResult<Vec<Transaction>> {
        self.load("withdrawals", query).await
    }

    async fn wallets(&self, query: &RecordQuery) -> AppResult<Vec<Wallet>> {
        self.load("wallets", query).await
    }

    async fn portfolios(&self, query: &RecordQuery) -> AppResult<Vec<Portfolio>> {
        let mut portfolios: Vec<Portfolio> = self.load("portfolios", query).await?;
        if portfolios.is_empty() {
            return Ok(portfolios);
        }

        let portfolio_ids = portfolios
            .iter()
            .filter_map(|portfolio| Uuid::parse_str(&portfolio.id).ok())
            .collect::<Vec<_>>();
        let rows = list_all_rows(
            self.pool()?,
            "portfolio_assets",
            &[Predicate::AnyOf("portfolio_id", portfolio_ids)],
            None,
            "portfolio_id",
            true,
        )
        .await?;
        let assets: Vec<PortfolioAsset> = decode_rows("portfolio_assets", rows)?;

        for asset in assets {
            if let Some(portfolio) = portfolios
                .iter_mut()
                .find(|portfolio| portfolio.id == asset.portfolio_id)
            {
                portfolio.assets.push(asset);
            }
        }
        Ok(portfolios)
    }

    async fn users(&self, query: &RecordQuery) -> AppResult<Vec<User>> {
        self.load("users", query).await
    }

    async fn activity_logs(&self, query: &RecordQuery) -> AppResult<Vec<ActivityLog>> {
        self.load("activity_logs", query).await
    }

    async fn delete_activity_logs_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        delete_rows(
            self.pool()?,
            "activity_logs",
            &[Predicate::CreatedBefore(cutoff)],
        )
        .await
    }

    async fn record_activity(&self, entry: &NewActivityLog) -> AppResult<()> {
        let payload = match serde_json::to_value(entry) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect::<Map<String, Value>>(),
            _ => return Err(AppError::Internal("Could not encode activity log.".to_string())),
        };
        create_row(self.pool()?, "activity_logs", &payload).await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        let Some(pool) = &self.pool else {
            // no database configured; nothing to check
            return true;
        };
        match tokio::time::timeout(
            std::time::Duration::from_secs(3),
            sqlx::query("SELECT 1").fetch_one(pool),
        )
        .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(error)) => {
                tracing::error!(error = %error, "Health check DB query failed");
                false
            }
            Err(_) => {
                tracing::error!("Health check DB query timed out (3s)");
                false
            }
        }
    }
}

fn predicates(query: &RecordQuery) -> Vec<Predicate> {
    let mut predicates = Vec::new();
    if let Some(start) = query.range.start {
        predicates.push(Predicate::CreatedFrom(start));
    }
    if let Some(end) = query.range.end {
        predicates.push(Predicate::CreatedBefore(end));
    }
    for (column, value) in &query.columns {
        predicates.push(Predicate::equals(*column, value));
    }
    predicates
}

fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> AppResult<Vec<T>> {
    rows.into_iter()
        .map(serde_json::from_value::<T>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| {
            tracing::error!(table, error = %error, "Could not decode row");
            AppError::Internal(format!("Could not decode {table} row: {error}"))
        })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{decode_rows, predicates, RecordQuery};
    use crate::models::Wallet;
    use crate::reports::filters::{DateRange, RecordKind, RawReportQuery, ReportFilter, WALLET_SORT_KEYS};
    use crate::repository::table_service::{ColumnValue, Predicate};

    #[test]
    fn window_query_translates_to_column_filters() {
        let raw = RawReportQuery {
            start_date: Some("2026-03-01".into()),
            status: Some("frozen".into()),
            ..RawReportQuery::default()
        };
        let filter = ReportFilter::from_query(&raw, WALLET_SORT_KEYS).expect("filter");
        let query = RecordQuery::window(&filter, RecordKind::Wallets, Some(500));

        assert_eq!(
            predicates(&query),
            vec![
                Predicate::CreatedFrom(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
                Predicate::Equals("status", ColumnValue::Text("FROZEN".to_string())),
            ]
        );
    }

    #[test]
    fn snapshot_ignores_the_window() {
        let range = DateRange::new(
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
        )
        .expect("range");
        let filter = ReportFilter {
            range,
            ..ReportFilter::from_query(&RawReportQuery::default(), WALLET_SORT_KEYS)
                .expect("filter")
        };
        let query = RecordQuery::snapshot(&filter, RecordKind::Wallets, None);
        assert_eq!(query.range, DateRange::default());
        assert!(predicates(&query).is_empty());
    }

    #[test]
    fn undecodable_rows_fail_the_whole_read() {
        let rows = vec![
            json!({"id": "w1", "balance": 10, "status": "ACTIVE", "created_at": "2026-01-01T00:00:00Z"}),
            json!({"id": "w2", "balance": "n/a", "status": "ACTIVE", "created_at": "2026-01-01T00:00:00Z"}),
        ];
        assert!(decode_rows::<Wallet>("wallets", rows).is_err());
    }
}

/// In-memory store used by the assembler and router tests.
#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::{RecordQuery, ReportStore};
    use crate::error::{AppError, AppResult};
    use crate::models::{ActivityLog, NewActivityLog, Portfolio, Transaction, User, Wallet};

    #[derive(Default)]
    pub struct MemoryStore {
        pub deposits: Vec<Transaction>,
        pub withdrawals: Vec<Transaction>,
        pub wallets: Vec<Wallet>,
        pub portfolios: Vec<Portfolio>,
        pub users: Vec<User>,
        pub activity: Mutex<Vec<ActivityLog>>,
        pub fail_reads: bool,
    }

    impl MemoryStore {
        fn select<T: Clone>(
            &self,
            records: &[T],
            query: &RecordQuery,
            created_at: impl Fn(&T) -> DateTime<Utc>,
            column: impl Fn(&T, &str) -> Option<String>,
        ) -> AppResult<Vec<T>> {
            if self.fail_reads {
                return Err(AppError::Dependency("store offline".to_string()));
            }
            let mut selected: Vec<T> = records
                .iter()
                .filter(|record| query.range.contains(created_at(record)))
                .filter(|record| {
                    query.columns.iter().all(|(name, expected)| {
                        column(record, name).is_some_and(|value| value == *expected)
                    })
                })
                .cloned()
                .collect();
            selected.sort_by_key(|record| std::cmp::Reverse(created_at(record)));
            if let Some(limit) = query.limit {
                selected.truncate(limit);
            }
            Ok(selected)
        }
    }

    fn transaction_column(record: &Transaction, name: &str) -> Option<String> {
        match name {
            "status" => Some(record.status.as_str().to_string()),
            "user_id" => record.user_id.clone(),
            _ => None,
        }
    }

    #[async_trait]
    impl ReportStore for MemoryStore {
        async fn deposits(&self, query: &RecordQuery) -> AppResult<Vec<Transaction>> {
            self.select(&self.deposits, query, |row| row.created_at, transaction_column)
        }

        async fn withdrawals(&self, query: &RecordQuery) -> AppResult<Vec<Transaction>> {
            self.select(&self.withdrawals, query, |row| row.created_at, transaction_column)
        }

        async fn wallets(&self, query: &RecordQuery) -> AppResult<Vec<Wallet>> {
            self.select(&self.wallets, query, |row| row.created_at, |row, name| match name {
                "status" => Some(row.status.as_str().to_string()),
                "user_id" => row.user_id.clone(),
                _ => None,
            })
        }

        async fn portfolios(&self, query: &RecordQuery) -> AppResult<Vec<Portfolio>> {
            self.select(&self.portfolios, query, |row| row.created_at, |row, name| match name {
                "user_id" => row.user_id.clone(),
                _ => None,
            })
        }

        async fn users(&self, query: &RecordQuery) -> AppResult<Vec<User>> {
            self.select(&self.users, query, |row| row.created_at, |row, name| match name {
                "id" => Some(row.id.clone()),
                "role" => row.role.clone(),
                "status" => row.status.clone(),
                _ => None,
            })
        }

        async fn activity_logs(&self, query: &RecordQuery) -> AppResult<Vec<ActivityLog>> {
            let logs = self
                .activity
                .lock()
                .map_err(|_| AppError::Internal("poisoned".to_string()))?
                .clone();
            self.select(&logs, query, |row| row.created_at, |row, name| match name {
                "user_id" => row.user_id.clone(),
                "module" => row.module.clone(),
                "status" => row.status.clone(),
                "action" => Some(row.action.clone()),
                _ => None,
            })
        }

        async fn delete_activity_logs_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
            let mut logs = self
                .activity
                .lock()
                .map_err(|_| AppError::Internal("poisoned".to_string()))?;
            let before = logs.len();
            logs.retain(|log| log.created_at >= cutoff);
            Ok((before - logs.len()) as u64)
        }

        async fn record_activity(&self, entry: &NewActivityLog) -> AppResult<()> {
            let mut logs = self
                .activity
                .lock()
                .map_err(|_| AppError::Internal("poisoned".to_string()))?;
            logs.push(ActivityLog {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: entry.user_id.clone(),
                action: entry.action.clone(),
                module: Some(entry.module.clone()),
                status: Some(entry.status.clone()),
                description: Some(entry.description.clone()),
                duration_ms: None,
                error_message: None,
                created_at: Utc::now(),
            });
            Ok(())
        }

        async fn ping(&self) -> bool {
            !self.fail_reads
        }
    }
}
