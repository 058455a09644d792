//! Error types for rootly-incidents

use thiserror::Error;

/// Failures surfaced by the incidents API.
///
/// `Display` renders the stable tag callers match on
/// (`UNAUTHORIZED`, `BAD_REQUEST: <message>`, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IncidentsError {
    /// Session missing or expired (401)
    #[error("UNAUTHORIZED")]
    Unauthorized,

    /// Repository unknown or not owned by the session user (404)
    #[error("PROJECT_NOT_FOUND")]
    ProjectNotFound,

    /// Request rejected by validation (400)
    #[error("BAD_REQUEST: {0}")]
    BadRequest(String),

    /// Any other non-2xx status
    #[error("HTTP_ERROR: {0}")]
    Http(u16),

    /// Connection, timeout or response decoding failure
    #[error("NETWORK_ERROR: {0}")]
    Network(String),
}

impl IncidentsError {
    /// Tag without the detail suffix.
    pub fn tag(&self) -> &'static str {
        match self {
            IncidentsError::Unauthorized => "UNAUTHORIZED",
            IncidentsError::ProjectNotFound => "PROJECT_NOT_FOUND",
            IncidentsError::BadRequest(_) => "BAD_REQUEST",
            IncidentsError::Http(_) => "HTTP_ERROR",
            IncidentsError::Network(_) => "NETWORK_ERROR",
        }
    }
}

impl From<reqwest::Error> for IncidentsError {
    fn from(err: reqwest::Error) -> Self {
        IncidentsError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_tags() {
        assert_eq!(IncidentsError::Unauthorized.to_string(), "UNAUTHORIZED");
        assert_eq!(IncidentsError::ProjectNotFound.to_string(), "PROJECT_NOT_FOUND");
        assert_eq!(
            IncidentsError::BadRequest("repo query parameter is required".into()).to_string(),
            "BAD_REQUEST: repo query parameter is required"
        );
        assert_eq!(IncidentsError::Http(502).to_string(), "HTTP_ERROR: 502");
        assert_eq!(
            IncidentsError::Network("connection refused".into()).to_string(),
            "NETWORK_ERROR: connection refused"
        );
    }

    #[test]
    fn tag_strips_detail() {
        assert_eq!(IncidentsError::BadRequest("x".into()).tag(), "BAD_REQUEST");
        assert_eq!(IncidentsError::Http(500).tag(), "HTTP_ERROR");
    }
}
