//! Authorization middleware の axum アダプタ。
//!
//! - `Authorization: Bearer <token>` を request scope の `BearerToken` に変換
//! - `AuthorizationFilter` に委譲し、halt は 401 + 固定メッセージへ
//! - 成功時は `AuthInfo` が extensions に入った状態で後続へ

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::middleware::auth::filter::{AuthorizationFilter, BearerToken};
use crate::state::AppState;

/// 認証を掛けたい Router に適用する。
///
/// 例：
/// ```ignore
/// let v1 = api::v1::routes(state.clone());
/// let v1 = middleware::auth::access::apply(v1, state.clone());
/// app = app.nest("/api/v1", v1);
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // A missing or non-bearer Authorization header means no credential was
    // supplied; the filter reports that distinctly from a failing one.
    if let Some(token) = bearer_token(&req) {
        req.extensions_mut().insert(BearerToken(token));
    }

    let filter = AuthorizationFilter::new(state.verifier.clone());
    filter.execute(req.extensions_mut()).await?;

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::test_support as support;

    async fn send(token: Option<&str>) -> (StatusCode, Value) {
        let app = support::test_router();
        let mut builder = Request::builder().uri("/api/v1/records").method("POST");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(r#"{"document":{"title":"A"}}"#))
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn no_token_gets_the_missing_message() {
        let (status, body) = send(None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Auth token is missing");
    }

    #[tokio::test]
    async fn bad_token_gets_the_coarse_invalid_message() {
        let (status, body) = send(Some("invalid.token.")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"]["message"],
            "Auth token and/or Environment variable is invalid"
        );
    }

    #[tokio::test]
    async fn expired_token_gets_the_same_message_as_a_malformed_one() {
        let token = support::mint_token_with(
            support::claims(&support::trust_config(), "user-1", &["editor"], -120),
            support::TEST_RSA_PRIVATE_PEM,
            None,
        );
        let (status, body) = send(Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"]["message"],
            "Auth token and/or Environment variable is invalid"
        );
    }

    #[tokio::test]
    async fn valid_token_reaches_the_handler() {
        let token = support::mint_token(&support::trust_config(), "user-1", &["editor"]);
        let (status, body) = send(Some(&token)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["document"]["state"], "DRAFT");
    }

    #[tokio::test]
    async fn health_stays_public() {
        let app = support::test_router();
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
