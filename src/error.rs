use axum::http::StatusCode;

/// Custom error type for all stand operations
#[derive(Debug, thiserror::Error)]
pub enum StandError {
    #[error("Required environment variable '{0}' is not set")]
    MissingEnv(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("GitLab rejected the access token (401/403)")]
    AuthenticationFailed,

    #[error("Template project {0} not found")]
    TemplateNotFound(u64),

    #[error("A project named '{0}' already exists")]
    NameConflict(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GitLab API error: {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StandError {
    /// Classify a non-success GitLab response by status code.
    /// `template_id` and `name` give the 404/409 variants something useful to say.
    pub fn from_status(status: StatusCode, message: String, template_id: u64, name: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StandError::AuthenticationFailed,
            StatusCode::NOT_FOUND => StandError::TemplateNotFound(template_id),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                StandError::NameConflict(name.to_string())
            }
            _ => StandError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

/// Helper type for Results that use StandError
pub type Result<T> = std::result::Result<T, StandError>;
