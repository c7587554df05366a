//! Machine-readable reasons attached to store failures.

/// Reasons a store may report alongside a failed request.
///
/// Each reason maps to a single HTTP-style status code, but several reasons
/// may share a code.
pub mod reason {
    /// One or more resources required for this operation could not be found.
    ///
    /// Status code 404
    pub const NOT_FOUND: &str = "NotFound";

    /// The resource being created already exists.
    ///
    /// Status code 409
    pub const ALREADY_EXISTS: &str = "AlreadyExists";

    /// The write carried a stale `resourceVersion`.
    ///
    /// The client should re-read the object and try again.
    /// Status code 409
    pub const CONFLICT: &str = "Conflict";

    /// The caller is not allowed to perform the operation.
    ///
    /// Status code 403
    pub const FORBIDDEN: &str = "Forbidden";

    /// The submitted object or patch failed validation.
    ///
    /// Status code 422
    pub const INVALID: &str = "Invalid";

    /// An unexpected error occurred inside the store.
    ///
    /// Status code 500
    pub const INTERNAL_ERROR: &str = "InternalError";

    /// The store is temporarily unable to serve the request.
    ///
    /// Status code 503
    pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";
}
