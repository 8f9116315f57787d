//! REST client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid profile URL: {0}")]
    InvalidUrl(String),
}

pub type RestResult<T> = Result<T, RestError>;
