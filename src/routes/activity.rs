use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    routing::{delete, get},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::{
    auth::{require_role, AUDIT_ROLES, RETENTION_ROLES},
    error::{AppError, AppResult},
    models::NewActivityLog,
    reports::{
        assembler::activity_page,
        filters::{RawReportQuery, RecordKind, ReportFilter, ACTIVITY_SORT_KEYS},
        store::RecordQuery,
    },
    schemas::{validate_input, ActivityCleanupInput},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/activity", get(list_activity))
        .route("/activity/cleanup", delete(cleanup_activity))
}

async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<RawReportQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_role(&state, &headers, AUDIT_ROLES)?;
    let filter = ReportFilter::from_query(&query, ACTIVITY_SORT_KEYS)?;
    let logs = state
        .store
        .activity_logs(&RecordQuery::window(&filter, RecordKind::ActivityLogs, None))
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": activity_page(logs, &filter),
    })))
}

async fn cleanup_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ActivityCleanupInput>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let user = require_role(&state, &headers, RETENTION_ROLES)?;
    let Json(input) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    validate_input(&input)?;

    let cutoff = Utc::now()
        .checked_sub_signed(Duration::days(i64::from(input.older_than_days)))
        .ok_or_else(|| {
            AppError::BadRequest("olderThanDays reaches past the earliest supported date.".to_string())
        })?;
    let deleted = state.store.delete_activity_logs_before(cutoff).await?;
    state.report_cache.invalidate_all();
    tracing::info!(
        user_id = %user.id,
        older_than_days = input.older_than_days,
        deleted,
        "Old activity logs deleted"
    );

    let audit = NewActivityLog {
        user_id: uuid::Uuid::parse_str(&user.id).ok().map(|id| id.to_string()),
        action: "DELETE_OLD_LOGS".to_string(),
        module: "ACTIVITY".to_string(),
        status: "SUCCESS".to_string(),
        description: format!(
            "Deleted {deleted} activity logs older than {} days",
            input.older_than_days
        ),
    };
    // The deletion is already committed; a failed audit write is reported, not retried.
    let audit_recorded = match state.store.record_activity(&audit).await {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(error = %error, "Could not record cleanup audit entry");
            false
        }
    };

    Ok(Json(json!({
        "success": true,
        "data": {
            "deletedCount": deleted,
            "olderThanDays": input.older_than_days,
            "cutoff": cutoff.to_rfc3339(),
            "auditRecorded": audit_recorded,
        },
    })))
}
