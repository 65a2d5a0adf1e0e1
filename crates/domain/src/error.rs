/// Shared error type used across all CodeAssist crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("policy service: {0}")]
    PolicyUnavailable(String),

    #[error("completion backend: {0}")]
    BackendUnavailable(String),

    #[error("tester service: {0}")]
    TesterUnavailable(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is worth retrying against a remote service.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Http(_) | Error::TesterUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
