pub mod config;
pub mod status;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
