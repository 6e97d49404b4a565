/// Factory: build the shared `TokenVerifier` from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::services::auth::TokenVerifier;

pub fn build_verifier(config: &Config) -> Result<Arc<TokenVerifier>, AppError> {
    let verifier = TokenVerifier::new(config.trust.clone()).map_err(|err| {
        tracing::error!(error = %err, "failed to build token verifier");
        AppError::Internal
    })?;

    Ok(Arc::new(verifier))
}
