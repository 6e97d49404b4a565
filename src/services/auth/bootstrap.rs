/*
 * Responsibility
 * - password grant で SSO からトークンを取得する (テスト/セットアップ専用)
 * - 本番のリクエスト処理はこのフローを一切使わない
 */
use serde::Deserialize;
use thiserror::Error;

use crate::config::TrustConfig;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap credentials are not configured")]
    NoCredentials,

    #[error("token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
}

/// Obtain an access token from the realm's token endpoint using the
/// configured bootstrap credentials.
pub async fn fetch_token(trust: &TrustConfig) -> Result<String, BootstrapError> {
    let credentials = trust.bootstrap.as_ref().ok_or(BootstrapError::NoCredentials)?;

    let client = reqwest::Client::builder()
        .timeout(trust.key_fetch_timeout)
        .build()?;

    let form = [
        ("client_id", trust.client_id.as_str()),
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
        ("grant_type", "password"),
    ];

    let grant: TokenGrant = client
        .post(trust.token_url())
        .header("cache-control", "no-cache")
        .form(&form)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(grant.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support as support;

    #[tokio::test]
    async fn missing_credentials_fail_fast() {
        let trust = support::trust_config();
        assert!(matches!(
            fetch_token(&trust).await,
            Err(BootstrapError::NoCredentials)
        ));
    }

    // Requires a live SSO reachable via AUTH_* environment variables.
    #[tokio::test]
    #[ignore]
    async fn obtains_a_token_from_a_live_realm() {
        let trust = crate::config::TrustConfig::from_env().unwrap();
        let token = fetch_token(&trust).await.unwrap();
        assert!(!token.is_empty());
    }
}
