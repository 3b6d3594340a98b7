#[allow(clippy::module_inception)] mod config;
mod error;


pub use config::Config;
pub use error::ConfigError;
