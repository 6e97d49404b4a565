/*
 * Responsibility
 * - 認可フィルタ本体: request scope の token → verifier → AuthInfo を格納
 * - 失敗は MiddlewareHalt (固定メッセージ 2 種) でパイプラインを止める
 * - HTTP 層 (ヘッダ抽出・ステータス) は access.rs 側の責務
 */
use std::fmt;
use std::sync::Arc;

use axum::http::Extensions;

use crate::services::auth::TokenVerifier;

pub const TOKEN_MISSING_MESSAGE: &str = "Auth token is missing";
pub const TOKEN_INVALID_MESSAGE: &str = "Auth token and/or Environment variable is invalid";

/// Raw bearer credential placed into the request scope under this type,
/// the well-known "token" entry of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// No credential was supplied at all. Checked before verification.
    TokenMissing,
    /// The token or the locally configured trust material failed
    /// verification. Deliberately indistinguishable from the outside.
    TokenInvalid,
}

/// Typed halt condition: the pipeline stops here, no downstream stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiddlewareHalt {
    pub reason: HaltReason,
}

impl fmt::Display for MiddlewareHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for MiddlewareHalt {}

impl MiddlewareHalt {
    pub fn token_missing() -> Self {
        Self {
            reason: HaltReason::TokenMissing,
        }
    }

    pub fn token_invalid() -> Self {
        Self {
            reason: HaltReason::TokenInvalid,
        }
    }

    pub fn message(&self) -> &'static str {
        match self.reason {
            HaltReason::TokenMissing => TOKEN_MISSING_MESSAGE,
            HaltReason::TokenInvalid => TOKEN_INVALID_MESSAGE,
        }
    }
}

/// Pipeline stage gating every mutating registry route.
///
/// PENDING -> AUTHORIZED (AuthInfo inserted into the scope) or HALTED.
/// The verifier is shared; the scope and the produced identity belong to
/// one request.
#[derive(Clone)]
pub struct AuthorizationFilter {
    verifier: Arc<TokenVerifier>,
}

impl AuthorizationFilter {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    pub async fn execute(&self, scope: &mut Extensions) -> Result<(), MiddlewareHalt> {
        let Some(token) = scope.get::<BearerToken>().cloned() else {
            return Err(MiddlewareHalt::token_missing());
        };

        match self.verifier.verify(&token.0).await {
            Ok(info) => {
                scope.insert(info);
                Ok(())
            }
            Err(err) => {
                // Internal detail stays in the log; callers must not be able
                // to tell a bad token from bad trust configuration.
                tracing::warn!(error = %err, "token verification failed");
                Err(MiddlewareHalt::token_invalid())
            }
        }
    }
}
