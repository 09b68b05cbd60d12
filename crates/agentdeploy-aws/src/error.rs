//! AWS error classification
//!
//! Every SDK failure is mapped onto the engine's taxonomy from the service
//! error code returned by `.code()`. Message text is carried along for the
//! user but never inspected.

use agentdeploy_cloud::CloudError;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};

/// Codes meaning the named entity does not exist
const NOT_FOUND_CODES: &[&str] = &[
    "RepositoryNotFoundException",
    "NoSuchEntity",
    "ResourceNotFoundException",
    "UserPoolNotFound",
];

/// Codes meaning an identical entity already exists
const ALREADY_EXISTS_CODES: &[&str] = &[
    "RepositoryAlreadyExistsException",
    "EntityAlreadyExists",
    "ResourceAlreadyExistsException",
    "UsernameExistsException",
];

/// Codes meaning the name is taken by something this call cannot reuse
const CONFLICT_CODES: &[&str] = &["ConflictException", "ResourceConflictException"];

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ServiceUnavailableException",
    "ServiceUnavailable",
    "InternalServerException",
    "InternalFailure",
];

const VALIDATION_CODES: &[&str] = &[
    "ValidationException",
    "InvalidParameterValueException",
    "InvalidParameterException",
    "InvalidInput",
    "MalformedPolicyDocument",
];

/// Classify a service error code
pub fn classify_code(code: Option<&str>, message: impl Into<String>) -> CloudError {
    let message = message.into();
    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => CloudError::NotFound(message),
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => CloudError::AlreadyExists(message),
        Some(c) if CONFLICT_CODES.contains(&c) => CloudError::NamingConflict(message),
        Some(c) if THROTTLING_CODES.contains(&c) => CloudError::Transient(message),
        Some(c) if VALIDATION_CODES.contains(&c) => CloudError::Validation(message),
        Some(c) => CloudError::Fatal(format!("{} ({})", message, c)),
        None => CloudError::Fatal(message),
    }
}

/// Classify any SDK operation failure
///
/// Timeouts, dispatch failures and unparseable responses are transient.
/// Service errors go through [`classify_code`].
pub fn from_sdk<E, R>(operation: &str, err: SdkError<E, R>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            CloudError::Transient(format!("{}: {}", operation, DisplayErrorContext(&err)))
        }
        SdkError::ServiceError(service) => {
            let inner = service.err();
            let message = format!(
                "{}: {}",
                operation,
                inner.message().unwrap_or("no message from service")
            );
            classify_code(inner.code(), message)
        }
        _ => CloudError::Fatal(format!("{}: {}", operation, DisplayErrorContext(&err))),
    }
}

/// Builder validation failure for a request shape
pub fn build_error(what: &str, err: impl std::fmt::Display) -> CloudError {
    CloudError::Validation(format!("invalid {} request: {}", what, err))
}

/// Convert an SDK timestamp, required or optional
pub fn timestamp<'a>(
    dt: impl Into<Option<&'a aws_sdk_iam::primitives::DateTime>>,
) -> Option<DateTime<Utc>> {
    dt.into()
        .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
}

/// Accept both required (`&str`) and optional (`Option<&str>`) SDK accessors
pub fn text<'a>(value: impl Into<Option<&'a str>>) -> String {
    value.into().unwrap_or_default().to_string()
}
