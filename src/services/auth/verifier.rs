/*
 * Responsibility
 * - bearer token の署名/クレーム検証 (RS256, iss/aud/exp)
 * - 検証済み Identity (AuthInfo) の組み立て
 * - 失敗理由の内部分類 (middleware が外向けには丸める)
 */
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use thiserror::Error;

use crate::config::TrustConfig;
use crate::services::auth::keys::{HttpKeySource, KeyCache, KeyFetchError, KeySource};

/// Internal verification failure. The middleware collapses every variant
/// into one coarse externally visible condition; the detail here is for
/// logs and tests only.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token is empty")]
    Empty,

    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// Signature, expiry, issuer or audience rejection from the JWT layer.
    #[error("token rejected: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("missing or invalid '{0}' claim")]
    BadClaim(&'static str),

    /// The locally configured trust material is unusable. Manifests exactly
    /// like a bad token at the middleware boundary.
    #[error("unusable trust material: {0}")]
    Trust(&'static str),

    #[error(transparent)]
    KeyFetch(#[from] KeyFetchError),
}

/// Verified identity of the caller, extracted verbatim from the token.
///
/// Immutable once constructed, scoped to a single request, never persisted.
/// Travels through request extensions; nothing downstream may replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub sub: String,
    pub aud: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    aud: serde_json::Value,
    #[allow(dead_code)]
    exp: u64,
    #[allow(dead_code)]
    iss: String,
    #[serde(default)]
    realm_access: Option<RealmAccess>,
}

enum KeyMaterial {
    /// Statically configured PEM. Parsed per verification so that broken
    /// trust configuration surfaces as a verification failure, not a crash
    /// at startup.
    Static(String),
    Fetched(KeyCache),
}

/// RS256 token verifier bound to one realm's trust configuration.
pub struct TokenVerifier {
    trust: TrustConfig,
    keys: KeyMaterial,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.trust.issuer())
            .field("client_id", &self.trust.client_id)
            .finish()
    }
}

/// A JWT is three dot-separated base64url segments; the first two must be
/// JSON. Checked up front so garbage input is classified as malformed before
/// any cryptography runs.
fn shape_check(token: &str) -> Result<(), VerifyError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(VerifyError::Malformed("expected three token segments"));
    };
    if segments.next().is_some() || signature.is_empty() {
        return Err(VerifyError::Malformed("expected three token segments"));
    }
    for segment in [header, payload] {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| VerifyError::Malformed("segment is not base64url"))?;
        serde_json::from_slice::<serde_json::Value>(&bytes)
            .map_err(|_| VerifyError::Malformed("segment is not JSON"))?;
    }
    Ok(())
}

/// Audience extraction: `aud` may be a string or an array. Prefer the
/// configured client when it is listed, otherwise the first non-empty entry.
fn audience_of(aud: &serde_json::Value, client_id: &str) -> Option<String> {
    match aud {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let strings: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            strings
                .iter()
                .find(|s| **s == client_id)
                .or_else(|| strings.iter().find(|s| !s.trim().is_empty()))
                .map(|s| s.to_string())
        }
        _ => None,
    }
}

impl TokenVerifier {
    /// Build a verifier from trust configuration. Uses the static key when
    /// one is configured, the realm's certs endpoint otherwise.
    pub fn new(trust: TrustConfig) -> Result<Self, KeyFetchError> {
        let keys = match &trust.public_key_pem {
            Some(pem) => KeyMaterial::Static(pem.clone()),
            None => {
                let source = Arc::new(HttpKeySource::new(&trust)?);
                KeyMaterial::Fetched(KeyCache::new(source))
            }
        };
        Ok(Self { trust, keys })
    }

    /// Build a verifier over an explicit key source (tests, alternate
    /// transports).
    pub fn with_key_source(trust: TrustConfig, source: Arc<dyn KeySource>) -> Self {
        Self {
            trust,
            keys: KeyMaterial::Fetched(KeyCache::new(source)),
        }
    }

    /// Verify a bearer token and extract the caller's identity.
    ///
    /// Checks, in order: token shape, signing algorithm, signature under the
    /// configured trust material, expiry (with leeway), issuer, audience
    /// (when enabled), then claim completeness.
    pub async fn verify(&self, token: &str) -> Result<AuthInfo, VerifyError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VerifyError::Empty);
        }
        shape_check(token)?;

        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::Malformed("unexpected signing algorithm"));
        }

        let key = self.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.trust.issuer()]);
        if self.trust.audience_check {
            validation.set_audience(&[&self.trust.client_id]);
        } else {
            validation.validate_aud = false;
        }
        validation.leeway = self.trust.leeway_seconds;

        let data = decode::<Claims>(token, &key, &validation)?;
        self.auth_info(data.claims)
    }

    /// Drop any cached fetched keys (key rotation at the issuer).
    pub fn invalidate_keys(&self) {
        if let KeyMaterial::Fetched(cache) = &self.keys {
            cache.invalidate();
        }
    }

    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, VerifyError> {
        match &self.keys {
            KeyMaterial::Static(pem) => DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|_| VerifyError::Trust("configured public key is not a usable RSA PEM")),
            KeyMaterial::Fetched(cache) => {
                let set = cache.key_set().await?;
                let jwk = set.find(kid).ok_or_else(|| KeyFetchError::NoKey {
                    kid: kid.map(str::to_string),
                })?;
                Ok(jwk.decoding_key()?)
            }
        }
    }

    fn auth_info(&self, claims: Claims) -> Result<AuthInfo, VerifyError> {
        if claims.sub.trim().is_empty() {
            return Err(VerifyError::BadClaim("sub"));
        }
        let aud = audience_of(&claims.aud, &self.trust.client_id)
            .ok_or(VerifyError::BadClaim("aud"))?;
        let roles = claims.realm_access.map(|ra| ra.roles).unwrap_or_default();

        Ok(AuthInfo {
            sub: claims.sub,
            aud,
            roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support as support;
    use async_trait::async_trait;
    use base64::Engine;
    use jsonwebtoken::errors::ErrorKind;
    use serde_json::json;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(support::trust_config()).unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_identity_verbatim() {
        let token = support::mint_token(
            &support::trust_config(),
            "874ed8a5-782e-4f6c-8f36-e0288455901e",
            &["editor", "offline_access"],
        );

        let info = verifier().verify(&token).await.unwrap();
        assert_eq!(info.sub, "874ed8a5-782e-4f6c-8f36-e0288455901e");
        assert_eq!(info.aud, "registry-frontend");
        assert_eq!(info.roles, vec!["editor", "offline_access"]);
    }

    #[tokio::test]
    async fn empty_and_malformed_inputs_are_distinguished() {
        let v = verifier();
        assert!(matches!(v.verify("").await, Err(VerifyError::Empty)));
        assert!(matches!(v.verify("   ").await, Err(VerifyError::Empty)));
        assert!(matches!(
            v.verify("invalid.token.").await,
            Err(VerifyError::Malformed(_))
        ));
        assert!(matches!(
            v.verify("just-a-string").await,
            Err(VerifyError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let token = support::mint_token_with(
            support::claims(&support::trust_config(), "user-1", &["editor"], -120),
            support::TEST_RSA_PRIVATE_PEM,
            None,
        );

        match verifier().verify(&token).await {
            Err(VerifyError::Jwt(err)) => {
                assert!(matches!(err.kind(), ErrorKind::ExpiredSignature))
            }
            other => panic!("expected expiry rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tampered_payload_fails_signature_validation() {
        let trust = support::trust_config();
        let token = support::mint_token(&trust, "user-1", &["editor"]);

        // Swap the payload for a re-encoded one claiming a different subject.
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&support::claims(&trust, "someone-else", &["admin"], 300))
                .unwrap(),
        );
        parts[1] = &forged;
        let forged_token = parts.join(".");

        match verifier().verify(&forged_token).await {
            Err(VerifyError::Jwt(err)) => {
                assert!(matches!(err.kind(), ErrorKind::InvalidSignature))
            }
            other => panic!("expected signature rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_issuer_and_wrong_audience_are_rejected() {
        let trust = support::trust_config();

        let mut claims = support::claims(&trust, "user-1", &["editor"], 300);
        claims["iss"] = json!("https://sso.example.org/realms/other");
        let token = support::mint_token_with(claims, support::TEST_RSA_PRIVATE_PEM, None);
        assert!(matches!(
            verifier().verify(&token).await,
            Err(VerifyError::Jwt(_))
        ));

        let mut claims = support::claims(&trust, "user-1", &["editor"], 300);
        claims["aud"] = json!("another-client");
        let token = support::mint_token_with(claims, support::TEST_RSA_PRIVATE_PEM, None);
        assert!(matches!(
            verifier().verify(&token).await,
            Err(VerifyError::Jwt(_))
        ));
    }

    #[tokio::test]
    async fn audience_check_can_be_disabled() {
        let mut trust = support::trust_config();
        trust.audience_check = false;

        let mut claims = support::claims(&trust, "user-1", &["editor"], 300);
        claims["aud"] = json!("another-client");
        let token = support::mint_token_with(claims, support::TEST_RSA_PRIVATE_PEM, None);

        let info = TokenVerifier::new(trust)
            .unwrap()
            .verify(&token)
            .await
            .unwrap();
        assert_eq!(info.aud, "another-client");
    }

    #[tokio::test]
    async fn same_token_fails_under_swapped_trust_config() {
        let good_trust = support::trust_config();
        let token = support::mint_token(&good_trust, "user-1", &["editor"]);
        assert!(verifier().verify(&token).await.is_ok());

        // Different public key.
        let mut trust = support::trust_config();
        trust.public_key_pem = Some(support::OTHER_RSA_PUBLIC_PEM.to_string());
        assert!(matches!(
            TokenVerifier::new(trust).unwrap().verify(&token).await,
            Err(VerifyError::Jwt(_))
        ));

        // Unusable public key material.
        let mut trust = support::trust_config();
        trust.public_key_pem = Some("invalid.public.key".to_string());
        assert!(matches!(
            TokenVerifier::new(trust).unwrap().verify(&token).await,
            Err(VerifyError::Trust(_))
        ));

        // Different realm: the expected issuer no longer matches.
        let mut trust = support::trust_config();
        trust.realm = "invalid.realm".to_string();
        assert!(matches!(
            TokenVerifier::new(trust).unwrap().verify(&token).await,
            Err(VerifyError::Jwt(_))
        ));

        // Different client id: audience check fails.
        let mut trust = support::trust_config();
        trust.client_id = "invalid.clientId".to_string();
        assert!(matches!(
            TokenVerifier::new(trust).unwrap().verify(&token).await,
            Err(VerifyError::Jwt(_))
        ));
    }

    #[tokio::test]
    async fn roles_default_to_empty_when_claim_is_absent() {
        let trust = support::trust_config();
        let mut claims = support::claims(&trust, "user-1", &[], 300);
        claims.as_object_mut().unwrap().remove("realm_access");
        let token = support::mint_token_with(claims, support::TEST_RSA_PRIVATE_PEM, None);

        let info = verifier().verify(&token).await.unwrap();
        assert!(info.roles.is_empty());
    }

    #[tokio::test]
    async fn fetched_keys_are_used_and_cached() {
        struct StaticJwks;

        #[async_trait]
        impl KeySource for StaticJwks {
            async fn fetch_keys(&self) -> Result<crate::services::auth::keys::KeySet, KeyFetchError>
            {
                Ok(serde_json::from_str(support::TEST_JWKS_JSON).unwrap())
            }
        }

        let mut trust = support::trust_config();
        trust.public_key_pem = None;
        let token = support::mint_token_with(
            support::claims(&trust, "user-1", &["editor"], 300),
            support::TEST_RSA_PRIVATE_PEM,
            Some(support::TEST_KID),
        );

        let v = TokenVerifier::with_key_source(trust, Arc::new(StaticJwks));
        let info = v.verify(&token).await.unwrap();
        assert_eq!(info.sub, "user-1");

        // Invalidation drops the cached set; the next verify refetches.
        v.invalidate_keys();
        assert!(v.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_key_endpoint_surfaces_as_key_fetch_failure() {
        struct DownSource;

        #[async_trait]
        impl KeySource for DownSource {
            async fn fetch_keys(&self) -> Result<crate::services::auth::keys::KeySet, KeyFetchError>
            {
                Err(KeyFetchError::Transport("connection refused".to_string()))
            }
        }

        let mut trust = support::trust_config();
        trust.public_key_pem = None;
        let token = support::mint_token_with(
            support::claims(&trust, "user-1", &["editor"], 300),
            support::TEST_RSA_PRIVATE_PEM,
            Some(support::TEST_KID),
        );

        let v = TokenVerifier::with_key_source(trust, Arc::new(DownSource));
        assert!(matches!(
            v.verify(&token).await,
            Err(VerifyError::KeyFetch(_))
        ));
    }

    #[test]
    fn audience_extraction_handles_both_shapes() {
        assert_eq!(
            audience_of(&json!("registry-frontend"), "registry-frontend"),
            Some("registry-frontend".to_string())
        );
        assert_eq!(
            audience_of(&json!(["account", "registry-frontend"]), "registry-frontend"),
            Some("registry-frontend".to_string())
        );
        assert_eq!(
            audience_of(&json!(["account"]), "registry-frontend"),
            Some("account".to_string())
        );
        assert_eq!(audience_of(&json!(null), "registry-frontend"), None);
        assert_eq!(audience_of(&json!(""), "registry-frontend"), None);
    }
}
