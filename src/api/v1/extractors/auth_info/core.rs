use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};

use crate::services::auth::AuthInfo;
use crate::state::AppState;

/// Handler で検証済み Identity を受け取るための extractor。
/// middleware が AuthInfo を request.extensions() に insert 済みである前提。
/// 見つからない場合は 401 を返す（認証がかかってない・ミドルウェア未設定）。
pub struct AuthInfoExtractor(pub AuthInfo);

impl FromRequestParts<AppState> for AuthInfoExtractor
where
    AppState: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthInfo>()
            .cloned()
            .map(AuthInfoExtractor)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
