use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const REPORT_VIEWER_ROLES: &[&str] = &["SUPER_ADMIN", "ADMIN", "MANAGER"];
pub const AUDIT_ROLES: &[&str] = &["SUPER_ADMIN", "ADMIN"];
pub const RETENTION_ROLES: &[&str] = &["SUPER_ADMIN"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn require_user(state: &AppState, headers: &HeaderMap) -> AppResult<AuthUser> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user) = dev_override_user(headers) {
            return Ok(user);
        }
    }

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::unauthorized("Unauthorized: missing bearer token."))?;

    let Some(secret) = state.config.jwt_secret.as_deref() else {
        tracing::error!("JWT_SECRET is not configured; bearer tokens cannot be verified");
        return Err(AppError::Dependency(
            "JWT_SECRET is not configured.".to_string(),
        ));
    };

    let validation = Validation::new(Algorithm::HS256);
    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|error| {
            let message = match error.kind() {
                ErrorKind::ExpiredSignature => "Unauthorized: token has expired.",
                _ => "Unauthorized: invalid token.",
            };
            tracing::debug!(error = %error, "Rejected bearer token");
            AppError::invalid_token(message)
        })?;

    if claims.sub.trim().is_empty() {
        return Err(AppError::invalid_token("Unauthorized: token has no subject."));
    }
    Ok(AuthUser {
        id: claims.sub,
        role: claims.role.trim().to_ascii_uppercase(),
    })
}

pub fn require_role(
    state: &AppState,
    headers: &HeaderMap,
    allowed_roles: &[&str],
) -> AppResult<AuthUser> {
    let user = require_user(state, headers)?;
    if allowed_roles.contains(&user.role.as_str()) {
        return Ok(user);
    }
    tracing::warn!(user_id = %user.id, role = %user.role, "Role not allowed for this action");
    Err(AppError::forbidden_role(&user.role, allowed_roles))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}

fn dev_override_user(headers: &HeaderMap) -> Option<AuthUser> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let id = header("x-user-id")?;
    Some(AuthUser {
        id: id.to_string(),
        role: header("x-user-role").unwrap_or("USER").to_ascii_uppercase(),
    })
}

/// Signs a token the way the identity service does; tests use it to call the router.
#[cfg(test)]
pub fn mint_token(secret: &str, sub: &str, role: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("token")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{HeaderMap, HeaderValue};

    use super::*;
    use crate::config::AppConfig;
    use crate::reports::store::memory::MemoryStore;

    fn state(config: AppConfig) -> AppState {
        AppState::with_store(config, Arc::new(MemoryStore::default()))
    }

    fn with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    #[test]
    fn valid_token_yields_user_and_role() {
        let config = AppConfig::for_tests();
        let secret = config.jwt_secret.clone().unwrap_or_default();
        let state = state(config);
        let user = require_role(&state, &with_bearer(&mint_token(&secret, "u-1", "admin")), AUDIT_ROLES)
            .expect("user");
        assert_eq!(user.id, "u-1");
        assert_eq!(user.role, "ADMIN");
    }

    #[test]
    fn missing_and_forged_tokens_are_unauthorized() {
        let state = state(AppConfig::for_tests());
        let missing = require_user(&state, &HeaderMap::new()).unwrap_err();
        assert!(matches!(missing, AppError::Unauthorized { code: "AUTHENTICATION_REQUIRED", .. }));

        let forged = mint_token("some-other-secret", "u-1", "SUPER_ADMIN");
        let error = require_user(&state, &with_bearer(&forged)).unwrap_err();
        assert!(matches!(error, AppError::Unauthorized { code: "INVALID_TOKEN", .. }));
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let config = AppConfig::for_tests();
        let secret = config.jwt_secret.clone().unwrap_or_default();
        let state = state(config);
        let token = mint_token(&secret, "u-2", "MANAGER");
        let error = require_role(&state, &with_bearer(&token), RETENTION_ROLES).unwrap_err();
        match error {
            AppError::Forbidden { required_roles, .. } => {
                assert_eq!(required_roles, vec!["SUPER_ADMIN".to_string()]);
            }
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[test]
    fn dev_overrides_are_ignored_in_production() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("dev-user"));
        headers.insert("x-user-role", HeaderValue::from_static("super_admin"));

        let mut config = AppConfig::for_tests();
        config.dev_auth_overrides_enabled = true;
        let user = require_user(&state(config.clone()), &headers).expect("dev user");
        assert_eq!(user.role, "SUPER_ADMIN");

        config.environment = "production".to_string();
        assert!(require_user(&state(config), &headers).is_err());
    }
}
