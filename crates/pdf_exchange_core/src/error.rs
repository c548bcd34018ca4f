//! crates/pdf_exchange_core/src/error.rs
//!
//! The error taxonomy every exchange component reports through.

use crate::ports::PortError;

/// Human-readable text of [`ExchangeError::AlreadyUploaded`]. Existing clients
/// look for the phrase "only upload one PDF", so it must not change.
pub const ALREADY_UPLOADED_DETAIL: &str = "You can only upload one PDF per session";

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid or unauthorized user token")]
    Unauthorized,

    #[error("{}", ALREADY_UPLOADED_DETAIL)]
    AlreadyUploaded,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Message must not be empty")]
    EmptyMessage,

    /// Every generated session code collided with an existing one.
    #[error("Could not allocate a unique session code after {0} attempts")]
    CodeSpaceExhausted(usize),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl ExchangeError {
    /// A stable, machine-readable reason for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::SessionNotFound | ExchangeError::NotFound(_) => "not_found",
            ExchangeError::Unauthorized => "unauthorized",
            ExchangeError::AlreadyUploaded => "already_uploaded",
            ExchangeError::InvalidFormat(_) => "invalid_format",
            ExchangeError::EmptyMessage => "empty_message",
            ExchangeError::CodeSpaceExhausted(_) => "code_space_exhausted",
            ExchangeError::Port(PortError::NotFound(_)) => "not_found",
            ExchangeError::Port(_) => "internal",
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_upload_text_is_stable() {
        let text = ExchangeError::AlreadyUploaded.to_string();
        assert!(text.contains("only upload one PDF"));
    }

    #[test]
    fn port_not_found_keeps_its_code() {
        let err = ExchangeError::from(PortError::NotFound("PDF".into()));
        assert_eq!(err.code(), "not_found");
        let err = ExchangeError::from(PortError::Unexpected("disk".into()));
        assert_eq!(err.code(), "internal");
    }
}
