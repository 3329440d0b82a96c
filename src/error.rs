//! Error types for the Port provider.

use serde::Deserialize;
use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors that can occur while reconciling Port objects.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested remote object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal provider error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An HTTP transport error occurred while talking to the Portal.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Quota or rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Service temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation timed out.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// The Portal rejected the request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A user supplied JSON string could not be parsed.
    #[error("Invalid JSON in '{attribute}': {source}")]
    InvalidJson {
        /// Attribute path holding the malformed JSON.
        attribute: String,
        /// The raw parse diagnostic.
        source: serde_json::Error,
    },

    /// The operation was cancelled by the host.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Error body returned by the Portal.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// Returns a reference to the error message for any variant.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Sdk(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Http(_err) => "http error (see Debug output)",
            Self::AlreadyExists(msg) => msg,
            Self::PermissionDenied(msg) => msg,
            Self::ResourceExhausted(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::DeadlineExceeded(msg) => msg,
            Self::FailedPrecondition(msg) => msg,
            Self::Unimplemented(msg) => msg,
            Self::InvalidRequest(msg) => msg,
            Self::InvalidJson { attribute, .. } => attribute,
            Self::Cancelled(msg) => msg,
        }
    }

    /// Build an error from a non-2xx Portal response.
    ///
    /// The server's `message` field is carried verbatim; when the body is not the
    /// usual error envelope the raw body is used instead.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| body.trim().to_string());
        let message = if message.is_empty() {
            format!("status {}", status)
        } else {
            message
        };

        match status {
            400 | 422 => Self::InvalidRequest(message),
            401 | 403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            429 => Self::ResourceExhausted(message),
            503 => Self::Unavailable(message),
            504 => Self::DeadlineExceeded(message),
            _ => Self::Sdk(format!("status {}: {}", status, message)),
        }
    }

    /// Wrap a JSON parse failure of a user supplied string attribute.
    pub fn invalid_json(attribute: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidJson {
            attribute: attribute.into(),
            source,
        }
    }

    /// Whether this error is a remote 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Convert into an error diagnostic for the host.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.to_string());
        match self {
            Self::InvalidJson { attribute, .. } => diagnostic.with_attribute(attribute.clone()),
            _ => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("blueprint-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: blueprint-123");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("port_widget".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: port_widget");

        let err = ProviderError::Cancelled("migration poll".to_string());
        assert_eq!(format!("{}", err), "Cancelled: migration poll");
    }

    #[test]
    fn test_from_status_uses_server_message() {
        let err = ProviderError::from_status(
            409,
            r#"{"ok":false,"error":"identifier_taken","message":"Blueprint with identifier \"svc\" already exists"}"#,
        );
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
        assert_eq!(err.message(), "Blueprint with identifier \"svc\" already exists");
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(ProviderError::from_status(404, "").is_not_found());
        assert!(matches!(
            ProviderError::from_status(422, "{}"),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            ProviderError::from_status(401, "nope"),
            ProviderError::PermissionDenied(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, ""),
            ProviderError::ResourceExhausted(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, ""),
            ProviderError::Unavailable(_)
        ));

        let err = ProviderError::from_status(500, "boom");
        assert_eq!(format!("{}", err), "SDK error: status 500: boom");
    }

    #[test]
    fn test_from_status_falls_back_to_error_field() {
        let err = ProviderError::from_status(400, r#"{"error":"bad_filter"}"#);
        assert_eq!(err.message(), "bad_filter");

        let err = ProviderError::from_status(400, "");
        assert_eq!(err.message(), "status 400");
    }

    #[test]
    fn test_invalid_json_diagnostic() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = ProviderError::invalid_json("permissions.execute.policy", source);

        let diagnostic = err.to_diagnostic();
        assert!(diagnostic.summary.starts_with("Invalid JSON in 'permissions.execute.policy'"));
        assert_eq!(
            diagnostic.attribute,
            Some("permissions.execute.policy".to_string())
        );
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::NotFound("blueprint-123".to_string());
        assert_eq!(err.message(), "blueprint-123");

        let err = ProviderError::Configuration("invalid config".to_string());
        assert_eq!(err.message(), "invalid config");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }
}
