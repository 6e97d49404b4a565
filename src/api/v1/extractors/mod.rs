mod auth_info;

pub use auth_info::AuthInfoExtractor;
