use thiserror::Error;

/// Errors that can occur while checking for an update.
#[derive(Error, Debug)]
pub enum UpdateCheckError {
    /// Error making the HTTP request to the lookup service.
    #[error("Failed to reach the lookup service: {0}")]
    Http(#[from] reqwest::Error),

    /// The lookup service answered with a non-success status.
    #[error("Lookup service error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// The response body was not valid JSON or did not have the expected shape.
    #[error("Failed to parse lookup response: {0}")]
    Json(#[from] serde_json::Error),

    /// The response parsed but carried unusable data.
    #[error("Malformed lookup response: {0}")]
    MalformedResponse(String),

    /// The lookup succeeded but no application has this identifier.
    #[error("No application found for id {0}")]
    NotFound(u64),

    /// The running application's version is not a dotted-numeric version.
    #[error("Invalid current version: '{0}'")]
    InvalidCurrentVersion(String),

    /// Another check is already in flight on this checker.
    #[error("An update check is already in progress")]
    Busy,

    /// Invalid base URL.
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The HTTP client could not be created.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// No tokio runtime was available to run background checks on.
    #[error("No tokio runtime available to run update checks")]
    NoRuntime,
}

impl UpdateCheckError {
    /// Whether the check failed before a response body could be obtained.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::ApiError { .. })
    }

    /// Whether the response arrived but could not be understood.
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, Self::Json(_) | Self::MalformedResponse(_))
    }

    /// Whether the lookup succeeded but named no application.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for update check operations.
pub type Result<T> = std::result::Result<T, UpdateCheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_build_error_is_not_transport() {
        let source = reqwest::Client::new().get("not a url").build().unwrap_err();
        let err = UpdateCheckError::ClientBuild(source);

        assert!(err.to_string().starts_with("Failed to build HTTP client"));
        assert!(!err.is_transport());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_classification() {
        assert!(UpdateCheckError::NotFound(1).is_not_found());
        assert!(UpdateCheckError::MalformedResponse("x".into()).is_malformed_response());
        assert!(UpdateCheckError::ApiError {
            status: 500,
            message: String::new()
        }
        .is_transport());
        assert!(!UpdateCheckError::Busy.is_transport());
        assert!(!UpdateCheckError::Busy.is_not_found());
    }
}
