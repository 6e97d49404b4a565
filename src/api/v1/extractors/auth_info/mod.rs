mod core;

pub use core::AuthInfoExtractor;
