use crate::response::reason;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error response from a resource store.
#[derive(Error, Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[error("{message}: {reason}")]
pub struct ErrorResponse {
    /// The status, always `Failure` for errors
    pub status: String,
    /// A message about the error
    #[serde(default)]
    pub message: String,
    /// The reason for the error, see [`reason`](crate::response::reason)
    #[serde(default)]
    pub reason: String,
    /// The error code
    pub code: u16,
}

impl ErrorResponse {
    /// Build a failure with an explicit reason and code
    pub fn new(reason: &str, code: u16, message: impl Into<String>) -> Self {
        Self {
            status: "Failure".to_string(),
            message: message.into(),
            reason: reason.to_string(),
            code,
        }
    }

    /// The object `name` of kind `plural` does not exist
    pub fn not_found(plural: &str, name: &str) -> Self {
        Self::new(reason::NOT_FOUND, 404, format!("{plural} \"{name}\" not found"))
    }

    /// A write to `name` of kind `plural` raced with another writer
    pub fn conflict(plural: &str, name: &str) -> Self {
        Self::new(
            reason::CONFLICT,
            409,
            format!(
                "Operation cannot be fulfilled on {plural} \"{name}\": the object has been modified; \
                 please apply your changes to the latest version and try again"
            ),
        )
    }

    /// The object `name` of kind `plural` was created twice
    pub fn already_exists(plural: &str, name: &str) -> Self {
        Self::new(reason::ALREADY_EXISTS, 409, format!("{plural} \"{name}\" already exists"))
    }
}

/// Possible errors when talking to a resource store
#[derive(Error, Debug)]
pub enum Error {
    /// The store rejected the request
    ///
    /// Inspect [`ErrorResponse::reason`] or use [`Error::is_not_found`] and
    /// [`Error::is_conflict`] to classify it.
    #[error("ApiError: {0} ({0:?})")]
    Api(#[source] ErrorResponse),

    /// An object or patch could not be (de)serialized
    #[error("Error serializing object: {0}")]
    SerdeError(#[source] serde_json::Error),

    /// The transport to the store failed
    #[error("ServiceError: {0}")]
    Service(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The request was abandoned before the store answered
    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the store reported that the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api(resp) if resp.reason == reason::NOT_FOUND)
    }

    /// Whether the store rejected a write because of a stale `resourceVersion`
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Api(resp) if resp.reason == reason::CONFLICT)
    }
}

impl From<ErrorResponse> for Error {
    fn from(resp: ErrorResponse) -> Self {
        Error::Api(resp)
    }
}
