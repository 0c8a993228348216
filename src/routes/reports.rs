use std::future::Future;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    auth::{require_role, AUDIT_ROLES, REPORT_VIEWER_ROLES},
    error::{AppError, AppResult},
    reports::{
        assembler::{self, TransactionKind},
        filters::{
            RawReportQuery, ReportFilter, ACTIVITY_SORT_KEYS, PORTFOLIO_SORT_KEYS,
            TRANSACTION_SORT_KEYS, USER_SORT_KEYS, WALLET_SORT_KEYS,
        },
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports/deposits", get(deposits_report))
        .route("/reports/withdrawals", get(withdrawals_report))
        .route("/reports/wallets", get(wallets_report))
        .route("/reports/portfolios", get(portfolios_report))
        .route("/reports/users", get(users_report))
        .route("/reports/activity", get(activity_report))
        .route("/reports/summary", get(summary_report))
        .route("/reports/trends", get(trends_report))
}

async fn deposits_report(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, REPORT_VIEWER_ROLES)?;
    let filter = ReportFilter::from_query(&query, TRANSACTION_SORT_KEYS)?;
    cached_report(&state, "deposits", &filter, || {
        assembler::transaction_report(state.store.as_ref(), TransactionKind::Deposit, &filter)
    })
    .await
}

async fn withdrawals_report(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, REPORT_VIEWER_ROLES)?;
    let filter = ReportFilter::from_query(&query, TRANSACTION_SORT_KEYS)?;
    cached_report(&state, "withdrawals", &filter, || {
        assembler::transaction_report(state.store.as_ref(), TransactionKind::Withdrawal, &filter)
    })
    .await
}

async fn wallets_report(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, REPORT_VIEWER_ROLES)?;
    let filter = ReportFilter::from_query(&query, WALLET_SORT_KEYS)?;
    cached_report(&state, "wallets", &filter, || {
        assembler::wallet_report(state.store.as_ref(), &filter)
    })
    .await
}

async fn portfolios_report(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, REPORT_VIEWER_ROLES)?;
    let filter = ReportFilter::from_query(&query, PORTFOLIO_SORT_KEYS)?;
    cached_report(&state, "portfolios", &filter, || {
        assembler::portfolio_report(state.store.as_ref(), &filter)
    })
    .await
}

async fn users_report(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, REPORT_VIEWER_ROLES)?;
    let filter = ReportFilter::from_query(&query, USER_SORT_KEYS)?;
    cached_report(&state, "users", &filter, || {
        assembler::user_report(state.store.as_ref(), &filter)
    })
    .await
}

async fn activity_report(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, AUDIT_ROLES)?;
    let filter = ReportFilter::from_query(&query, ACTIVITY_SORT_KEYS)?;
    cached_report(&state, "activity", &filter, || {
        assembler::activity_report(state.store.as_ref(), &filter)
    })
    .await
}

async fn summary_report(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, REPORT_VIEWER_ROLES)?;
    let filter = ReportFilter::from_query(&query, TRANSACTION_SORT_KEYS)?;
    cached_report(&state, "summary", &filter, || {
        assembler::summary_report(state.store.as_ref(), &filter)
    })
    .await
}

async fn trends_report(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, REPORT_VIEWER_ROLES)?;
    let filter = ReportFilter::from_query(&query, TRANSACTION_SORT_KEYS)?;
    cached_report(&state, "trends", &filter, || {
        assembler::trends_report(state.store.as_ref(), &filter)
    })
    .await
}

/// Serves a report from the response cache, building and storing it on a miss.
async fn cached_report<T, F, Fut>(
    state: &AppState,
    report: &'static str,
    filter: &ReportFilter,
    build: F,
) -> AppResult<Json<Value>>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let cache_key = format!("{report}|{}", filter.cache_key());
    if let Some(data) = state.report_cache.get(&cache_key).await {
        tracing::debug!(report, "Report served from cache");
        return Ok(envelope(data));
    }

    let started = std::time::Instant::now();
    let data = serde_json::to_value(build().await?).map_err(|error| {
        AppError::Internal(format!("Could not serialize {report} report: {error}"))
    })?;
    tracing::info!(
        report,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Report generated"
    );
    state.report_cache.insert(cache_key, data.clone()).await;
    Ok(envelope(data))
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data,
        "generatedAt": Utc::now().to_rfc3339(),
    }))
}
