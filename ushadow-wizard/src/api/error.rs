// Backend API errors
//
// Typed at the HTTP seam so callers can tell "log in again" apart from "try again later".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Request failed with status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Worth retrying on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Short text for the UI. Never includes response bodies beyond the backend's
    /// own `detail` message.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Your session has expired. Please log in again.".to_string(),
            ApiError::Status { detail, .. } if !detail.trim().is_empty() => detail.clone(),
            ApiError::Status { status, .. } => format!("Request failed ({})", status),
            ApiError::Network(e) if e.is_timeout() => "The backend did not respond in time.".to_string(),
            ApiError::Network(_) => "Could not reach the uShadow backend.".to_string(),
            ApiError::Decode(_) => "The backend sent an unexpected response.".to_string(),
            ApiError::InvalidRequest(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_detail_is_shown_verbatim() {
        let e = ApiError::Status {
            status: 404,
            detail: "Service 'speaker' not found".to_string(),
        };
        assert_eq!(e.user_message(), "Service 'speaker' not found");
        assert!(!e.is_transient());
        assert!(!e.is_unauthorized());
    }

    #[test]
    fn empty_detail_falls_back_to_status_code() {
        let e = ApiError::Status {
            status: 503,
            detail: String::new(),
        };
        assert_eq!(e.user_message(), "Request failed (503)");
        assert!(e.is_transient());
    }

    #[test]
    fn unauthorized_is_flagged() {
        assert!(ApiError::Unauthorized.is_unauthorized());
        assert!(ApiError::Unauthorized.user_message().contains("log in"));
    }
}
