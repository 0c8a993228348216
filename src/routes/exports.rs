use axum::{
    body::Body,
    extract::{Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, HeaderValue, Response, StatusCode,
    },
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};

use crate::{
    auth::{require_role, AUDIT_ROLES},
    error::{AppError, AppResult},
    reports::{
        assembler::{
            build_summary_report, generation_failed, load_report_data, TransactionKind,
            TransactionSummary, WalletMetrics,
        },
        filters::{RawReportQuery, RecordKind, ReportFilter, TRANSACTION_SORT_KEYS, WALLET_SORT_KEYS},
        scratch::attachment_filename,
        store::RecordQuery,
        workbook::{comprehensive_export, render_export, transaction_export, wallet_export, WorkbookSpec},
    },
    state::AppState,
};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports/export/deposits", get(export_deposits))
        .route("/reports/export/withdrawals", get(export_withdrawals))
        .route("/reports/export/wallets", get(export_wallets))
        .route("/reports/export/comprehensive", get(export_comprehensive))
}

async fn export_deposits(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    let user = require_role(&state, &headers, AUDIT_ROLES)?;
    let filter = ReportFilter::from_query(&query, TRANSACTION_SORT_KEYS)?;
    tracing::info!(user_id = %user.id, "Deposits export requested");
    export_transactions(&state, TransactionKind::Deposit, &filter).await
}

async fn export_withdrawals(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    let user = require_role(&state, &headers, AUDIT_ROLES)?;
    let filter = ReportFilter::from_query(&query, TRANSACTION_SORT_KEYS)?;
    tracing::info!(user_id = %user.id, "Withdrawals export requested");
    export_transactions(&state, TransactionKind::Withdrawal, &filter).await
}

async fn export_transactions(
    state: &AppState,
    kind: TransactionKind,
    filter: &ReportFilter,
) -> AppResult<Response<Body>> {
    let query = RecordQuery::window(filter, kind.record_kind(), Some(state.config.export_row_limit));
    let records = match kind {
        TransactionKind::Deposit => state.store.deposits(&query).await,
        TransactionKind::Withdrawal => state.store.withdrawals(&query).await,
    }
    .map_err(generation_failed(kind.label()))?;

    let summary = TransactionSummary::build(kind, &records);
    let generated_at = Utc::now();
    let layout = transaction_export(kind, &summary, &records, &filter.range, generated_at);
    attachment(state, layout, kind.label(), generated_at).await
}

async fn export_wallets(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    let user = require_role(&state, &headers, AUDIT_ROLES)?;
    let filter = ReportFilter::from_query(&query, WALLET_SORT_KEYS)?;
    tracing::info!(user_id = %user.id, "Wallets export requested");

    let wallets = state
        .store
        .wallets(&RecordQuery::window(
            &filter,
            RecordKind::Wallets,
            Some(state.config.export_row_limit),
        ))
        .await
        .map_err(generation_failed("wallets"))?;

    let generated_at = Utc::now();
    let layout = wallet_export(&WalletMetrics::build(&wallets), &wallets, generated_at);
    attachment(&state, layout, "wallets", generated_at).await
}

async fn export_comprehensive(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    let user = require_role(&state, &headers, AUDIT_ROLES)?;
    let filter = ReportFilter::from_query(&query, TRANSACTION_SORT_KEYS)?;
    tracing::info!(user_id = %user.id, "Comprehensive export requested");

    let data = load_report_data(state.store.as_ref(), &filter, Some(state.config.export_row_limit)).await?;
    let summary = build_summary_report(&data, &filter);
    let generated_at = Utc::now();
    let layout = comprehensive_export(&summary, &data, &filter.range, generated_at);
    attachment(&state, layout, "comprehensive", generated_at).await
}

async fn attachment(
    state: &AppState,
    layout: WorkbookSpec,
    report: &'static str,
    generated_at: DateTime<Utc>,
) -> AppResult<Response<Body>> {
    let started = std::time::Instant::now();
    let bytes = render_export(layout, state.config.export_scratch_dir.clone(), report).await?;
    tracing::info!(
        report,
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Export rendered"
    );

    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment_filename(report, generated_at)
    );
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .body(Body::from(bytes))
        .map_err(|error| {
            tracing::error!(error = %error, "Could not build export response");
            AppError::Internal("Could not build export response.".to_string())
        })?;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
