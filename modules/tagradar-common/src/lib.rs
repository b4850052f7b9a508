pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LogFormat, DEFAULT_STATIC_OUTPUT};
pub use error::TagRadarError;
pub use types::*;
