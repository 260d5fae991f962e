use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvguardError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Fetch error: {message}")]
    Fetch { message: String, status: Option<u16> },
    #[error("Unauthorized: the session was cleared")]
    Unauthorized,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
}

pub type Result<T> = std::result::Result<T, InvguardError>;

// Helper conversions
impl From<config::ConfigError> for InvguardError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for InvguardError {
    fn from(e: serde_json::Error) -> Self { Self::Decode(e.to_string()) }
}
impl From<std::io::Error> for InvguardError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}
impl From<reqwest::Error> for InvguardError {
    fn from(e: reqwest::Error) -> Self {
        Self::Fetch { message: e.to_string(), status: e.status().map(|s| s.as_u16()) }
    }
}
