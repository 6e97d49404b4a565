pub mod access;
pub mod filter;

pub use filter::{AuthorizationFilter, BearerToken, MiddlewareHalt};
