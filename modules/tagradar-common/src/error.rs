use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagRadarError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TagRadarError {
    /// Message safe to hand back to an API client.
    pub fn public_message(&self) -> &str {
        match self {
            TagRadarError::Validation(msg) | TagRadarError::Config(msg) => msg,
        }
    }
}
