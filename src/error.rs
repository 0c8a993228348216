use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Unauthorized { code: &'static str, message: String },
    #[error("{message}")]
    Forbidden {
        message: String,
        required_roles: Vec<String>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Dependency(String),
    #[error("report generation failed: {0}")]
    ReportGeneration(String),
    #[error("workbook rendering failed: {0}")]
    Render(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: "AUTHENTICATION_REQUIRED",
            message: message.into(),
        }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: "INVALID_TOKEN",
            message: message.into(),
        }
    }

    pub fn forbidden_role(role: &str, required_roles: &[&str]) -> Self {
        Self::Forbidden {
            message: format!("Forbidden: role '{role}' is not allowed for this action."),
            required_roles: required_roles.iter().map(|role| role.to_string()).collect(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ReportGeneration(_) | Self::Render(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "VALIDATION_ERROR",
            Self::Unauthorized { code, .. } => *code,
            Self::Forbidden { .. } => "INSUFFICIENT_ROLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Dependency(_) => "DEPENDENCY_UNAVAILABLE",
            Self::ReportGeneration(_) => "REPORT_GENERATION_FAILED",
            Self::Render(_) => "RENDER_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the caller. Server-side failures never expose their detail.
    fn public_message(&self) -> String {
        match self {
            Self::Dependency(_) => "A required service is unavailable.".to_string(),
            Self::ReportGeneration(_) => "Failed to generate report.".to_string(),
            Self::Render(_) => "Failed to generate export file.".to_string(),
            Self::Internal(_) => "Internal server error.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let mut error = Map::new();
        error.insert("code".to_string(), Value::String(self.code().to_string()));
        error.insert("message".to_string(), Value::String(self.public_message()));
        if let Self::Forbidden { required_roles, .. } = &self {
            error.insert("requiredRoles".to_string(), json!(required_roles));
        }

        let body = Json(json!({
            "success": false,
            "error": Value::Object(error),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use serde_json::Value;

    use super::AppError;

    async fn body_json(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn forbidden_lists_required_roles() {
        let (status, body) =
            body_json(AppError::forbidden_role("USER", &["SUPER_ADMIN", "ADMIN"])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_ROLE");
        assert_eq!(body["error"]["requiredRoles"][0], "SUPER_ADMIN");
        assert_eq!(body["error"]["requiredRoles"][1], "ADMIN");
    }

    #[tokio::test]
    async fn server_errors_hide_internal_detail() {
        let (status, body) = body_json(AppError::ReportGeneration(
            "relation \"deposits\" does not exist".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "REPORT_GENERATION_FAILED");
        assert_eq!(body["error"]["message"], "Failed to generate report.");
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests() {
        let (status, body) = body_json(AppError::BadRequest("Invalid startDate.".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "Invalid startDate.");
    }
}
