/*
 * Responsibility
 * - 検証鍵の取得 (realm の certs エンドポイント) とプロセス内キャッシュ
 * - 一時的な取得失敗は backoff 付きでリトライ
 * - 同時キャッシュミスは single-flight (fetch は常に 1 本)
 */
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use thiserror::Error;

use crate::config::TrustConfig;

const FETCH_ATTEMPTS: u32 = 3;
const FETCH_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("key endpoint request failed: {0}")]
    Transport(String),

    #[error("key endpoint returned unusable material: {0}")]
    BadMaterial(String),

    #[error("no usable signing key for kid {kid:?}")]
    NoKey { kid: Option<String> },
}

/// One JWK as published by the realm. Only RSA signing keys are used.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeySet {
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// Key selection: exact kid match when the token names one, otherwise the
    /// first signing key in the set.
    pub fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
        match kid {
            Some(kid) => self.keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
            None => self
                .keys
                .iter()
                .find(|k| k.key_use.as_deref() == Some("sig") || k.key_use.is_none()),
        }
    }
}

impl Jwk {
    pub fn decoding_key(&self) -> Result<DecodingKey, KeyFetchError> {
        if self.kty != "RSA" {
            return Err(KeyFetchError::BadMaterial(format!(
                "unsupported key type: {}",
                self.kty
            )));
        }
        let n = self
            .n
            .as_deref()
            .ok_or_else(|| KeyFetchError::BadMaterial("missing RSA modulus".to_string()))?;
        let e = self
            .e
            .as_deref()
            .ok_or_else(|| KeyFetchError::BadMaterial("missing RSA exponent".to_string()))?;

        DecodingKey::from_rsa_components(n, e)
            .map_err(|err| KeyFetchError::BadMaterial(err.to_string()))
    }
}

/// Where verification keys come from. The HTTP source is the production
/// implementation; tests substitute their own.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_keys(&self) -> Result<KeySet, KeyFetchError>;
}

/// Fetches the realm's published keys over HTTP, bounded by the configured
/// deadline per attempt.
pub struct HttpKeySource {
    client: reqwest::Client,
    certs_url: String,
}

impl HttpKeySource {
    pub fn new(trust: &TrustConfig) -> Result<Self, KeyFetchError> {
        let client = reqwest::Client::builder()
            .timeout(trust.key_fetch_timeout)
            .build()
            .map_err(|err| KeyFetchError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            certs_url: trust.certs_url(),
        })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch_keys(&self) -> Result<KeySet, KeyFetchError> {
        tracing::debug!(url = %self.certs_url, "fetching verification keys");

        let response = self
            .client
            .get(&self.certs_url)
            .send()
            .await
            .map_err(|err| KeyFetchError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| KeyFetchError::Transport(err.to_string()))?;

        response
            .json::<KeySet>()
            .await
            .map_err(|err| KeyFetchError::BadMaterial(err.to_string()))
    }
}

/// Process-lifetime cache over a [`KeySource`].
///
/// Population is single-flight: concurrent misses line up on `fetch_gate`
/// and re-check the cache before fetching, so one fetch serves them all.
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    cached: RwLock<Option<Arc<KeySet>>>,
    fetch_gate: tokio::sync::Mutex<()>,
}

impl KeyCache {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            fetch_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn key_set(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        if let Some(keys) = self.read_cached() {
            return Ok(keys);
        }

        let _gate = self.fetch_gate.lock().await;

        // Another task may have populated the cache while we waited.
        if let Some(keys) = self.read_cached() {
            return Ok(keys);
        }

        let keys = Arc::new(self.fetch_with_retry().await?);
        *self.cached.write().expect("key cache lock poisoned") = Some(keys.clone());
        Ok(keys)
    }

    /// Drop the cached keys; the next lookup fetches fresh material.
    pub fn invalidate(&self) {
        *self.cached.write().expect("key cache lock poisoned") = None;
    }

    fn read_cached(&self) -> Option<Arc<KeySet>> {
        self.cached.read().expect("key cache lock poisoned").clone()
    }

    async fn fetch_with_retry(&self) -> Result<KeySet, KeyFetchError> {
        let mut backoff = FETCH_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.source.fetch_keys().await {
                Ok(keys) => return Ok(keys),
                Err(err) if attempt < FETCH_ATTEMPTS => {
                    tracing::warn!(attempt, error = %err, "key fetch failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "key fetch failed, giving up");
                    return Err(err);
                }
            }
        }
    }
}
