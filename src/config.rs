/*
 * Responsibility
 * - 環境変数や設定の読み込み (PORT, Auth/SSO 設定など)
 * - 設定値のバリデーション (不足なら起動失敗)
 * - TrustConfig は verifier に注入する「信頼マテリアル」のスナップショット
 *   (テストは環境変数を触らず、この struct を直接組み立てる)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Credentials for the password-grant bootstrap flow (test/tooling only).
///
/// Production request handling never needs these; they exist so that
/// `services::auth::bootstrap` can obtain a real token from the SSO.
#[derive(Clone)]
pub struct BootstrapCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BootstrapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the password
        f.debug_struct("BootstrapCredentials")
            .field("username", &self.username)
            .finish()
    }
}

/// Trust material for token verification, read once at startup and shared
/// read-only by all request workers.
///
/// The verifier receives this struct explicitly; nothing reads the process
/// environment at verification time.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub sso_url: Url,
    pub realm: String,
    pub client_id: String,

    /// Static verification key. When absent, keys are fetched from the
    /// realm's certs endpoint and cached.
    pub public_key_pem: Option<String>,

    pub audience_check: bool,
    pub leeway_seconds: u64,
    pub key_fetch_timeout: Duration,

    pub bootstrap: Option<BootstrapCredentials>,
}

impl TrustConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let sso_url =
            std::env::var("AUTH_SSO_URL").map_err(|_| ConfigError::Missing("AUTH_SSO_URL"))?;
        let sso_url = Url::parse(&sso_url).map_err(|_| ConfigError::Invalid("AUTH_SSO_URL"))?;

        let realm = std::env::var("AUTH_REALM").map_err(|_| ConfigError::Missing("AUTH_REALM"))?;

        let client_id =
            std::env::var("AUTH_CLIENT_ID").map_err(|_| ConfigError::Missing("AUTH_CLIENT_ID"))?;

        let public_key_pem = std::env::var("AUTH_PUBLIC_KEY_PEM")
            .ok()
            .map(|pem| pem.replace("\\n", "\n"));

        let audience_check = match std::env::var("AUTH_AUDIENCE_CHECK") {
            Ok(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => true,
                "false" | "0" | "off" => false,
                _ => return Err(ConfigError::Invalid("AUTH_AUDIENCE_CHECK")),
            },
            Err(_) => true,
        };

        let leeway_seconds = std::env::var("AUTH_LEEWAY_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);

        let key_fetch_timeout = std::env::var("AUTH_KEY_FETCH_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let bootstrap = match (
            std::env::var("AUTH_BOOTSTRAP_USERNAME").ok(),
            std::env::var("AUTH_BOOTSTRAP_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => Some(BootstrapCredentials { username, password }),
            (None, None) => None,
            _ => return Err(ConfigError::Invalid("AUTH_BOOTSTRAP_USERNAME/PASSWORD")),
        };

        Ok(Self {
            sso_url,
            realm,
            client_id,
            public_key_pem,
            audience_check,
            leeway_seconds,
            key_fetch_timeout,
            bootstrap,
        })
    }

    /// Expected `iss` claim for tokens issued by this realm.
    pub fn issuer(&self) -> String {
        format!(
            "{}/realms/{}",
            self.sso_url.as_str().trim_end_matches('/'),
            self.realm
        )
    }

    /// Key-publishing endpoint of the realm.
    pub fn certs_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }

    /// Token endpoint of the realm (bootstrap flow only).
    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer())
    }
}

pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub trust: TrustConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();
        let trust = TrustConfig::from_env()?;

        Ok(Self {
            addr,
            app_env,
            trust,
        })
    }
}
