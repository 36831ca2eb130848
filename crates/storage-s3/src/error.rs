//! Translation of AWS SDK errors into [`StorageError`].

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use media_relay_storage::StorageError;

const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound"];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "Forbidden",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
];

/// Map an SDK failure for `bucket`/`key` onto the storage error taxonomy.
///
/// Transport failures are retryable network errors. Service errors are mapped
/// by error code, falling back to the HTTP status when the response carried no
/// body (as with `HEAD`).
pub(crate) fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) => StorageError::NetworkError {
            message: format!("request timed out: {}", DisplayErrorContext(&err)),
            retryable: true,
        },
        SdkError::DispatchFailure(failure) => StorageError::NetworkError {
            message: format!("connection error: {}", DisplayErrorContext(&err)),
            retryable: !failure.is_user(),
        },
        SdkError::ResponseError(_) => StorageError::NetworkError {
            message: format!("malformed response: {}", DisplayErrorContext(&err)),
            retryable: true,
        },
        SdkError::ConstructionFailure(_) => StorageError::InvalidConfig {
            message: DisplayErrorContext(&err).to_string(),
        },
        SdkError::ServiceError(context) => {
            let service_err: &E = context.err();
            let status: u16 = context.raw().status().as_u16();
            let message: String = service_err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

            match service_err.code() {
                Some(code) if NOT_FOUND_CODES.contains(&code) => StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                Some(code) if ACCESS_DENIED_CODES.contains(&code) => StorageError::AccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: format!("{}: {}", code, message),
                },
                Some(code) => StorageError::Service {
                    code: code.to_string(),
                    message,
                },
                None => from_status(status, message, bucket, key),
            }
        }
        _ => StorageError::Other {
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

fn from_status(status: u16, message: String, bucket: &str, key: &str) -> StorageError {
    match status {
        404 => StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        401 | 403 => StorageError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: format!("HTTP {}", status),
        },
        429 => StorageError::Service {
            code: "SlowDown".into(),
            message,
        },
        500..=599 => StorageError::NetworkError {
            message: format!("HTTP {}: {}", status, message),
            retryable: true,
        },
        _ => StorageError::Other {
            message: format!("HTTP {}: {}", status, message),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_fallbacks() {
        assert!(matches!(
            from_status(404, String::new(), "b", "k"),
            StorageError::NotFound { .. }
        ));
        assert!(matches!(
            from_status(403, String::new(), "b", "k"),
            StorageError::AccessDenied { .. }
        ));
        assert!(matches!(
            from_status(503, "unavailable".into(), "b", "k"),
            StorageError::NetworkError { retryable: true, .. }
        ));
        assert!(matches!(
            from_status(429, String::new(), "b", "k"),
            StorageError::Service { .. }
        ));
    }
}
