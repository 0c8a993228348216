use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::AppError;

/// Hard ceiling on rows returned by a single list query, and the page size
/// [`list_all_rows`] reads with.
pub const MAX_LIST_LIMIT: usize = 10_000;

const ALLOWED_TABLES: &[&str] = &[
    "activity_logs",
    "deposits",
    "portfolio_assets",
    "portfolios",
    "users",
    "wallets",
    "withdrawals",
];

/// One typed `WHERE` condition. Columns are checked against
/// the identifier rules when the query is built.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    CreatedFrom(DateTime<Utc>),
    CreatedBefore(DateTime<Utc>),
    Equals(&'static str, ColumnValue),
    AnyOf(&'static str, Vec<Uuid>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    Uuid(Uuid),
}

impl Predicate {
    /// Equality on `column`. Id columns compare as uuids when the value parses
    /// as one; everything else compares as text.
    pub fn equals(column: &'static str, value: &str) -> Self {
        let trimmed = value.trim();
        let is_id_column = column == "id" || column.ends_with("_id");
        match Uuid::parse_str(trimmed) {
            Ok(id) if is_id_column => Self::Equals(column, ColumnValue::Uuid(id)),
            _ => Self::Equals(column, ColumnValue::Text(trimmed.to_string())),
        }
    }

    fn push(&self, query: &mut QueryBuilder<'_, Postgres>) -> Result<(), AppError> {
        match self {
            Self::CreatedFrom(instant) => {
                query.push(" AND t.created_at >= ").push_bind(*instant);
            }
            Self::CreatedBefore(instant) => {
                query.push(" AND t.created_at < ").push_bind(*instant);
            }
            Self::Equals(column, ColumnValue::Text(text)) => {
                query
                    .push(" AND t.")
                    .push(validate_identifier(column)?)
                    .push("::text = ")
                    .push_bind(text.clone());
            }
            Self::Equals(column, ColumnValue::Uuid(id)) => {
                query
                    .push(" AND t.")
                    .push(validate_identifier(column)?)
                    .push(" = ")
                    .push_bind(*id);
            }
            Self::AnyOf(column, ids) => {
                query
                    .push(" AND t.")
                    .push(validate_identifier(column)?)
                    .push(" = ANY(")
                    .push_bind(ids.clone())
                    .push(")");
            }
        }
        Ok(())
    }
}

async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    predicates: &[Predicate],
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let mut query = build_list_query(table, predicates, limit, offset, order_by, ascending)?;
    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

/// Every matching row, read in pages of [`MAX_LIST_LIMIT`]. `limit` caps the
/// total when given.
pub async fn list_all_rows(
    pool: &sqlx::PgPool,
    table: &str,
    predicates: &[Predicate],
    limit: Option<usize>,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    collect_pages(limit, move |page_size, offset| {
        list_rows(
            pool,
            table,
            predicates,
            page_size as i64,
            offset as i64,
            order_by,
            ascending,
        )
    })
    .await
}

async fn collect_pages<F, Fut>(limit: Option<usize>, mut fetch: F) -> Result<Vec<Value>, AppError>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<Value>, AppError>>,
{
    let mut rows = Vec::new();
    loop {
        let page_size = limit
            .map_or(MAX_LIST_LIMIT, |limit| limit.saturating_sub(rows.len()))
            .min(MAX_LIST_LIMIT);
        if page_size == 0 {
            break;
        }
        let page = fetch(page_size, rows.len()).await?;
        let exhausted = page.len() < page_size;
        rows.extend(page);
        if exhausted {
            break;
        }
    }
    Ok(rows)
}

fn build_list_query<'a>(
    table: &str,
    predicates: &'a [Predicate],
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<QueryBuilder<'a, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(order_by)?
    };
    let direction = if ascending { " ASC" } else { " DESC" };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    for predicate in predicates {
        predicate.push(&mut query)?;
    }

    // id breaks ties so consecutive pages never overlap
    query
        .push(" ORDER BY t.")
        .push(order_name)
        .push(direction)
        .push(", t.id")
        .push(direction);
    query
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, MAX_LIST_LIMIT as i64))
        .push(" OFFSET ")
        .push_bind(offset.max(0));
    Ok(query)
}

pub async fn create_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }

    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }

    // jsonb_populate_record lets PostgreSQL resolve column types (uuid, enum,
    // numeric, ...) from the table definition.
    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(validate_identifier(key)?);
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(validate_identifier(key)?);
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {table_name} record.")))
}

/// Deletes every row matching `predicates` and returns how many went. An
/// empty predicate list is refused so a bad call can never truncate a table.
pub async fn delete_rows(
    pool: &sqlx::PgPool,
    table: &str,
    predicates: &[Predicate],
) -> Result<u64, AppError> {
    let mut query = build_delete_query(table, predicates)?;
    let result = query.build().execute(pool).await.map_err(map_db_error)?;
    Ok(result.rows_affected())
}

fn build_delete_query<'a>(
    table: &str,
    predicates: &'a [Predicate],
) -> Result<QueryBuilder<'a, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    if predicates.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Refusing to delete from {table_name} without a filter."
        )));
    }

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    for predicate in predicates {
        predicate.push(&mut query)?;
    }
    Ok(query)
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::BadRequest(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    if !trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    }) {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    if trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit())
    {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::{build_delete_query, build_list_query, collect_pages, Predicate, MAX_LIST_LIMIT};
    use crate::error::AppError;

    const USER: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn list_query_binds_typed_predicates() {
        let predicates = vec![
            Predicate::CreatedFrom(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
            Predicate::CreatedBefore(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()),
            Predicate::equals("user_id", USER),
            Predicate::equals("status", "APPROVED"),
        ];
        let query = build_list_query("deposits", &predicates, 50, 100, "created_at", false)
            .expect("query");
        assert_eq!(
            query.sql(),
            "SELECT row_to_json(t) AS row FROM deposits t WHERE 1=1 \
             AND t.created_at >= $1 AND t.created_at < $2 AND t.user_id = $3 \
             AND t.status::text = $4 ORDER BY t.created_at DESC, t.id DESC LIMIT $5 OFFSET $6"
        );
    }

    #[test]
    fn non_uuid_ids_compare_as_text() {
        assert!(matches!(
            Predicate::equals("user_id", "admin-1"),
            Predicate::Equals("user_id", super::ColumnValue::Text(_))
        ));
        assert!(matches!(
            Predicate::equals("status", USER),
            Predicate::Equals("status", super::ColumnValue::Text(_))
        ));
    }

    #[test]
    fn uuid_sets_use_any() {
        let predicates = vec![Predicate::AnyOf(
            "portfolio_id",
            vec![uuid::Uuid::parse_str(USER).expect("uuid")],
        )];
        let query = build_list_query("portfolio_assets", &predicates, 10, 0, "portfolio_id", true)
            .expect("query");
        assert!(query.sql().contains("t.portfolio_id = ANY($1)"));
        assert!(query.sql().contains("ORDER BY t.portfolio_id ASC, t.id ASC"));
    }

    #[test]
    fn bad_identifiers_are_refused() {
        let predicates = vec![Predicate::equals("status; DROP TABLE users", "x")];
        assert!(build_list_query("deposits", &predicates, 10, 0, "", false).is_err());
        assert!(build_list_query("deposits", &[], 10, 0, "amount desc", false).is_err());
    }

    #[test]
    fn delete_requires_a_filter() {
        let error = build_delete_query("activity_logs", &[]).err();
        assert!(matches!(error, Some(AppError::BadRequest(_))));

        let predicates = vec![Predicate::CreatedBefore(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )];
        let query = build_delete_query("activity_logs", &predicates).expect("query");
        assert_eq!(
            query.sql(),
            "DELETE FROM activity_logs t WHERE 1=1 AND t.created_at < $1"
        );
    }

    #[test]
    fn unknown_tables_are_refused() {
        let predicates = vec![Predicate::equals("id", "x")];
        assert!(build_delete_query("pg_authid", &predicates).is_err());
        assert!(build_list_query("pg_authid", &predicates, 1, 0, "", false).is_err());
    }

    fn table(rows: usize) -> Vec<Value> {
        (0..rows).map(|index| json!({ "n": index })).collect()
    }

    async fn page_through(
        source: Vec<Value>,
        limit: Option<usize>,
    ) -> (Vec<Value>, Vec<(usize, usize)>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = Arc::new(source);
        let rows = collect_pages(limit, |page_size, offset| {
            let calls = Arc::clone(&calls);
            let source = Arc::clone(&source);
            async move {
                calls.lock().expect("calls").push((page_size, offset));
                Ok(source.iter().skip(offset).take(page_size).cloned().collect())
            }
        })
        .await
        .expect("rows");
        let calls = calls.lock().expect("calls").clone();
        (rows, calls)
    }

    #[tokio::test]
    async fn unbounded_reads_walk_every_page() {
        let (rows, calls) = page_through(table(MAX_LIST_LIMIT * 2 + 5), None).await;
        assert_eq!(rows.len(), MAX_LIST_LIMIT * 2 + 5);
        assert_eq!(rows.last(), Some(&json!({ "n": MAX_LIST_LIMIT * 2 + 4 })));
        assert_eq!(
            calls,
            vec![
                (MAX_LIST_LIMIT, 0),
                (MAX_LIST_LIMIT, MAX_LIST_LIMIT),
                (MAX_LIST_LIMIT, MAX_LIST_LIMIT * 2),
            ]
        );
    }

    #[tokio::test]
    async fn an_exact_multiple_needs_one_empty_page() {
        let (rows, calls) = page_through(table(MAX_LIST_LIMIT), None).await;
        assert_eq!(rows.len(), MAX_LIST_LIMIT);
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn capped_reads_stop_at_the_cap() {
        let (rows, calls) = page_through(table(MAX_LIST_LIMIT + 500), Some(MAX_LIST_LIMIT + 10)).await;
        assert_eq!(rows.len(), MAX_LIST_LIMIT + 10);
        assert_eq!(calls, vec![(MAX_LIST_LIMIT, 0), (10, MAX_LIST_LIMIT)]);

        let (rows, calls) = page_through(table(3), Some(0)).await;
        assert!(rows.is_empty());
        assert!(calls.is_empty());
    }
}
