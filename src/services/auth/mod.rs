pub mod bootstrap;
pub mod factory;
pub mod keys;
pub mod verifier;

pub use factory::build_verifier;
pub use verifier::{AuthInfo, TokenVerifier};
