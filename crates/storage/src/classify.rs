//! Transient / terminal / cancelled classification of failures.
//!
//! Errors that know their own nature report it through [`Classify`]. Everything
//! else falls back to an [`ErrorClassifier`] table of S3 error codes and
//! message fragments. Cancellation is only ever structural: rendered messages
//! carry object keys and paths, so no message makes an error [`ErrorClass::Cancelled`].

use std::fmt::Display;

/// How a failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeout, throttling, connection reset, service unavailable. Retried.
    Transient,
    /// Authentication, validation, not-found. Surfaced immediately.
    Terminal,
    /// Cancellation or deadline. Never retried.
    Cancelled,
}

/// Structural classification provided by an error type.
pub trait Classify: Display {
    /// The class of this error, or `None` to defer to the message table.
    fn error_class(&self) -> Option<ErrorClass>;
}

/// S3 error codes that indicate a transient condition.
pub const DEFAULT_RETRYABLE_CODES: &[&str] = &[
    "RequestTimeout",
    "RequestTimeTooSkewed",
    "InternalError",
    "SlowDown",
    "OperationAborted",
    "ConnectionError",
    "NetworkingError",
    "ThrottlingException",
    "ServiceUnavailable",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "IDPCommunicationError",
    "KMSTemporaryFailure",
    "KMSThrottlingException",
];

/// Lower-case message fragments that indicate a transient condition.
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "reset",
    "broken pipe",
    "network",
    "unavailable",
    "throttl",
    "too many requests",
];

/// Code and message table used for errors without a structural class.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    /// Case-sensitive error codes searched for in the message.
    retryable_codes: Vec<String>,
    /// Lower-case fragments searched for in the lower-cased message.
    transient_patterns: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            retryable_codes: DEFAULT_RETRYABLE_CODES.iter().map(|s| s.to_string()).collect(),
            transient_patterns: DEFAULT_TRANSIENT_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ErrorClassifier {
    /// Create a classifier with the default S3 tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error code that should be retried.
    ///
    /// # Arguments
    /// * `code` - Service error code, matched case-sensitively
    pub fn with_retryable_code(mut self, code: impl Into<String>) -> Self {
        self.retryable_codes.push(code.into());
        self
    }

    /// Add a message fragment that should be retried.
    ///
    /// # Arguments
    /// * `pattern` - Fragment, matched case-insensitively
    pub fn with_transient_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.transient_patterns.push(pattern.into().to_lowercase());
        self
    }

    /// Classify an error.
    ///
    /// # Arguments
    /// * `err` - The failure to classify
    ///
    /// # Returns
    /// The structural class if the error has one, otherwise the table result.
    pub fn classify<E: Classify + ?Sized>(&self, err: &E) -> ErrorClass {
        if let Some(class) = err.error_class() {
            return class;
        }
        self.classify_message(&err.to_string())
    }

    /// Classify a bare error message as transient or terminal.
    ///
    /// # Arguments
    /// * `message` - Rendered error message
    pub fn classify_message(&self, message: &str) -> ErrorClass {
        let lower: String = message.to_lowercase();

        if self.retryable_codes.iter().any(|code| message.contains(code.as_str())) {
            return ErrorClass::Transient;
        }

        if self
            .transient_patterns
            .iter()
            .any(|pattern| lower.contains(pattern.as_str()))
        {
            return ErrorClass::Transient;
        }

        ErrorClass::Terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn test_structural_class_wins() {
        let classifier: ErrorClassifier = ErrorClassifier::new();
        let err: StorageError = StorageError::AccessDenied {
            bucket: "b".into(),
            key: "k".into(),
            message: "connection reset while checking policy".into(),
        };
        assert_eq!(classifier.classify(&err), ErrorClass::Terminal);
    }

    #[test]
    fn test_service_code_is_transient() {
        let classifier: ErrorClassifier = ErrorClassifier::new();
        let err: StorageError = StorageError::Service {
            code: "SlowDown".into(),
            message: "Please reduce your request rate".into(),
        };
        assert_eq!(classifier.classify(&err), ErrorClass::Transient);
    }

    #[test]
    fn test_unknown_service_code_is_terminal() {
        let classifier: ErrorClassifier = ErrorClassifier::new();
        let err: StorageError = StorageError::Service {
            code: "InvalidArgument".into(),
            message: "Bad metadata header".into(),
        };
        assert_eq!(classifier.classify(&err), ErrorClass::Terminal);
    }

    #[test]
    fn test_message_patterns() {
        let classifier: ErrorClassifier = ErrorClassifier::new();
        assert_eq!(
            classifier.classify_message("read: Connection reset by peer"),
            ErrorClass::Transient
        );
        assert_eq!(
            classifier.classify_message("operation timed out"),
            ErrorClass::Transient
        );
        assert_eq!(
            classifier.classify_message("context canceled"),
            ErrorClass::Terminal
        );
        assert_eq!(
            classifier.classify_message("signature does not match"),
            ErrorClass::Terminal
        );
    }

    #[test]
    fn test_custom_pattern() {
        let classifier: ErrorClassifier = ErrorClassifier::new().with_transient_pattern("Flaky");
        assert_eq!(classifier.classify_message("flaky backend"), ErrorClass::Transient);
    }

    #[test]
    fn test_path_words_do_not_cancel() {
        let classifier: ErrorClassifier = ErrorClassifier::new();
        let err: StorageError = StorageError::IoError {
            path: "Trips/canceled flight/IMG_0001.jpg".into(),
            message: "Connection reset by peer (os error 104)".into(),
        };
        assert_eq!(classifier.classify(&err), ErrorClass::Transient);

        let err: StorageError = StorageError::Other {
            message: "upload of Cancelled Plans/clip.mov rejected".into(),
        };
        assert_eq!(classifier.classify(&err), ErrorClass::Terminal);
    }

    #[test]
    fn test_cancelled_variant() {
        let classifier: ErrorClassifier = ErrorClassifier::new();
        assert_eq!(classifier.classify(&StorageError::Cancelled), ErrorClass::Cancelled);
    }
}
