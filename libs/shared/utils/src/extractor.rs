use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use shared_models::access::Capability;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::state::AppState;

/// Resolves the bearer token into a [`User`] and stores it in the request
/// extensions. Every protected router is wrapped in this layer.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;

    let user = state
        .tokens
        .verify(token)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Route-layer guard. Must run inside [`auth_middleware`].
pub async fn authorize(
    State(capability): State<Capability>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = extract_user(&request)?;

    if !user.can(capability) {
        debug!("User {} ({}) denied {:?}", user.id, user.role, capability);
        return Err(AppError::Forbidden(format!(
            "Role '{}' is not allowed to perform this action",
            user.role
        )));
    }

    Ok(next.run(request).await)
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    auth_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))
}

pub fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    use crate::test_utils::{JwtTestUtils, TestConfig, TestUser};

    fn app() -> (Router, TestConfig) {
        let config = TestConfig::default();
        let state = Arc::new(AppState::in_memory(config.to_app_config()));

        let router = Router::new()
            .route(
                "/staff-only",
                get(|Extension(user): Extension<User>| async move { user.role.to_string() }),
            )
            .route_layer(from_fn_with_state(Capability::ManageStaff, authorize))
            .merge(Router::new().route("/open", get(|| async { "ok" })))
            .layer(from_fn_with_state(state.clone(), auth_middleware));

        (router, config)
    }

    fn request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let (app, _) = app();
        let response = app.oneshot(request("/open", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_tokens_are_unauthorized() {
        let (app, config) = app();
        let user = TestUser::admin("admin@hopital.test");

        for token in [
            JwtTestUtils::create_malformed_token(),
            JwtTestUtils::create_invalid_signature_token(&user),
            JwtTestUtils::create_expired_token(&user, &config.jwt_secret),
        ] {
            let response = app.clone().oneshot(request("/open", Some(&token))).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn capability_is_enforced_per_role() {
        let (app, config) = app();
        let admin = TestUser::admin("admin@hopital.test");
        let nurse = TestUser::nurse("nurse@hopital.test");

        let admin_token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, None);
        let nurse_token = JwtTestUtils::create_test_token(&nurse, &config.jwt_secret, None);

        let allowed = app
            .clone()
            .oneshot(request("/staff-only", Some(&admin_token)))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let denied = app
            .clone()
            .oneshot(request("/staff-only", Some(&nurse_token)))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let open = app.oneshot(request("/open", Some(&nurse_token))).await.unwrap();
        assert_eq!(open.status(), StatusCode::OK);
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }
}
