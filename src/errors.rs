//! Error taxonomy for the storage backend.
//!
//! Every storage operation returns one of three outcomes: success, an expected
//! client-caused failure (`InvalidArgument`, `NotFound`), or an unexpected internal
//! failure (`Internal`). No exceptions cross the component boundary; failures are
//! values propagated with `?`.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The caller supplied a structurally or semantically invalid request: unknown
    /// field names, out-of-range coordinates, a batch over `PUTOBSLIMIT`, an obstime
    /// outside the validity window, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request was well-formed but matched no data (e.g. extents over an empty
    /// result set).
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything the caller could not have prevented: SQL/driver errors, schema
    /// introspection failures, type-assignment errors in the column↔field registry.
    #[error("internal error: {0}")]
    Internal(String),

    /// SQL/driver errors, converted automatically via `?`. Classified as
    /// `StoreErrorKind::Internal`. Parameter values are never included in the
    /// formatted message.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Documents the mapping a future RPC layer would apply to transport status
    /// codes. Not wired to any transport here (HTTP/gRPC are out of scope for the
    /// core), but kept alongside the enum so that mapping lives in one place.
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::InvalidArgument(_) => StoreErrorKind::InvalidArgument,
            StoreError::NotFound(_) => StoreErrorKind::NotFound,
            StoreError::Internal(_) | StoreError::Database(_) => StoreErrorKind::Internal,
        }
    }
}

/// Transport-agnostic error class. A gRPC layer would map these to
/// `codes::{InvalidArgument, NotFound, Internal}`; an HTTP layer to 400/404/500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    InvalidArgument,
    NotFound,
    Internal,
}

pub type StoreResult<T> = Result<T, StoreError>;
