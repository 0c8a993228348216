use axum::{routing::get, Router};

use crate::error::AppError;
use crate::state::AppState;

pub mod activity;
pub mod exports;
pub mod health;
pub mod reports;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(reports::router())
        .merge(exports::router())
        .merge(activity::router())
        .fallback(route_not_found)
}

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found.".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use chrono::{Duration, Utc};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::v1_router;
    use crate::auth::mint_token;
    use crate::config::AppConfig;
    use crate::models::{ActivityLog, TransactionStatus};
    use crate::reports::assembler::tests::transaction;
    use crate::reports::store::memory::MemoryStore;
    use crate::state::AppState;

    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
        secret: String,
    }

    fn harness(store: MemoryStore) -> Harness {
        let config = AppConfig::for_tests();
        let secret = config.jwt_secret.clone().unwrap_or_default();
        let store = Arc::new(store);
        let state = AppState::with_store(config, store.clone());
        Harness {
            app: Router::new().nest("/v1", v1_router()).with_state(state),
            store,
            secret,
        }
    }

    fn old_log(days_ago: i64) -> ActivityLog {
        ActivityLog {
            id: format!("log-{days_ago}"),
            user_id: None,
            action: "LOGIN".to_string(),
            module: Some("AUTH".to_string()),
            status: Some("SUCCESS".to_string()),
            description: None,
            duration_ms: None,
            error_message: None,
            created_at: Utc::now() - Duration::days(days_ago),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>, header::HeaderMap) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, bytes.to_vec(), headers)
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).expect("request")
    }

    fn cleanup(token: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::DELETE)
            .uri("/v1/activity/cleanup")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).expect("json")
    }

    #[tokio::test]
    async fn health_is_public() {
        let harness = harness(MemoryStore::default());
        let (status, body, _) = send(&harness.app, get("/v1/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn reports_require_a_token() {
        let harness = harness(MemoryStore::default());
        let (status, body, _) = send(&harness.app, get("/v1/reports/deposits", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json(&body)["error"]["code"], "AUTHENTICATION_REQUIRED");
    }

    #[tokio::test]
    async fn plain_users_are_forbidden() {
        let harness = harness(MemoryStore::default());
        let token = mint_token(&harness.secret, "u-1", "USER");
        let (status, body, _) = send(&harness.app, get("/v1/reports/summary", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let body = json(&body);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_ROLE");
        assert_eq!(body["error"]["requiredRoles"][2], "MANAGER");
    }

    #[tokio::test]
    async fn trends_and_summary_serve_over_http() {
        let harness = harness(MemoryStore {
            deposits: vec![transaction("d1", 1000.0, TransactionStatus::Approved, 2)],
            withdrawals: vec![transaction("w1", 400.0, TransactionStatus::Approved, 2)],
            ..MemoryStore::default()
        });
        let token = mint_token(&harness.secret, "u-9", "ADMIN");

        let (status, body, _) =
            send(&harness.app, get("/v1/reports/trends?period=monthly", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["data"]["buckets"][0]["period"], "2026-03");
        assert_eq!(body["data"]["buckets"][0]["netFlow"], 600.0);

        let (status, _, _) = send(
            &harness.app,
            get(
                "/v1/reports/summary?startDate=-200000-01-01&endDate=%2B200000-01-01",
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn managers_read_reports_but_not_exports() {
        let harness = harness(MemoryStore {
            deposits: vec![
                transaction("d1", 1000.0, TransactionStatus::Approved, 2),
                transaction("d2", 500.0, TransactionStatus::Pending, 3),
                transaction("d3", 200.0, TransactionStatus::Rejected, 4),
            ],
            ..MemoryStore::default()
        });
        let token = mint_token(&harness.secret, "u-2", "MANAGER");

        let (status, body, _) =
            send(&harness.app, get("/v1/reports/deposits?period=weekly", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["summary"]["totalAmount"], 1700.0);
        assert_eq!(body["data"]["summary"]["averageDeposit"], 566.67);
        assert!(body["generatedAt"].is_string());

        let (status, _, _) =
            send(&harness.app, get("/v1/reports/export/deposits", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_dates_are_validation_errors() {
        let harness = harness(MemoryStore::default());
        let token = mint_token(&harness.secret, "u-3", "ADMIN");
        let (status, body, _) = send(
            &harness.app,
            get("/v1/reports/wallets?startDate=yesterday", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn store_failures_become_report_errors() {
        let harness = harness(MemoryStore {
            fail_reads: true,
            ..MemoryStore::default()
        });
        let token = mint_token(&harness.secret, "u-4", "SUPER_ADMIN");
        let (status, body, _) = send(&harness.app, get("/v1/reports/summary", Some(&token))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(&body);
        assert_eq!(body["error"]["code"], "REPORT_GENERATION_FAILED");
        assert_eq!(body["error"]["message"], "Failed to generate report.");
    }

    #[tokio::test]
    async fn export_returns_an_xlsx_attachment() {
        let harness = harness(MemoryStore::default());
        let token = mint_token(&harness.secret, "u-5", "ADMIN");
        let (status, body, headers) =
            send(&harness.app, get("/v1/reports/export/comprehensive", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with(b"PK"));
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().expect("ascii");
        assert!(disposition.starts_with("attachment; filename=\"comprehensive_report_"));
        assert!(disposition.ends_with(".xlsx\""));
    }

    #[tokio::test]
    async fn cleanup_refuses_windows_under_thirty_days() {
        let harness = harness(MemoryStore {
            activity: Mutex::new(vec![old_log(40)]),
            ..MemoryStore::default()
        });
        let token = mint_token(&harness.secret, "u-6", "SUPER_ADMIN");
        let (status, body, _) = send(&harness.app, cleanup(&token, r#"{"olderThanDays": 29}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(harness.store.activity.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn cleanup_has_no_upper_retention_bound() {
        let harness = harness(MemoryStore {
            activity: Mutex::new(vec![old_log(5000), old_log(90)]),
            ..MemoryStore::default()
        });
        let token = mint_token(&harness.secret, "u-8", "SUPER_ADMIN");
        let (status, body, _) = send(&harness.app, cleanup(&token, r#"{"olderThanDays": 4000}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["data"]["deletedCount"], 1);

        let body = format!(r#"{{"olderThanDays": {}}}"#, u32::MAX);
        let (status, body, _) = send(&harness.app, cleanup(&token, &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn cleanup_is_super_admin_only() {
        let harness = harness(MemoryStore::default());
        let token = mint_token(&harness.secret, "u-7", "ADMIN");
        let (status, _, _) = send(&harness.app, cleanup(&token, r#"{"olderThanDays": 60}"#)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn cleanup_deletes_old_logs_and_leaves_an_audit_entry() {
        let harness = harness(MemoryStore {
            activity: Mutex::new(vec![old_log(90), old_log(45), old_log(5)]),
            ..MemoryStore::default()
        });
        let admin_id = uuid::Uuid::new_v4().to_string();
        let token = mint_token(&harness.secret, &admin_id, "SUPER_ADMIN");
        let (status, body, _) = send(&harness.app, cleanup(&token, r#"{"olderThanDays": 30}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["data"]["deletedCount"], 2);
        assert_eq!(body["data"]["auditRecorded"], true);

        let logs = harness.store.activity.lock().expect("lock");
        assert_eq!(logs.len(), 2);
        let audit = logs.iter().find(|log| log.action == "DELETE_OLD_LOGS").expect("audit");
        assert_eq!(audit.module.as_deref(), Some("ACTIVITY"));
        assert_eq!(audit.user_id.as_deref(), Some(admin_id.as_str()));
    }

    #[tokio::test]
    async fn unknown_routes_return_json_not_found() {
        let harness = harness(MemoryStore::default());
        let (status, body, _) = send(&harness.app, get("/v1/reports/unknown/thing", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["error"]["code"], "NOT_FOUND");
    }
}
