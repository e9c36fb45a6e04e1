//! Error types for shelf operations

use thiserror::Error;

/// Transport layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Request to {path} failed with status {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl TransportError {
    /// HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Credential and session errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Handled internally by the refresh coordinator; only escapes when a
    /// renewal was abandoned before it resolved.
    #[error("Access credential expired")]
    CredentialExpired,

    /// Renewal failed. Terminal for the session: credentials are cleared.
    #[error("Session invalid: {reason}")]
    SessionInvalid { reason: String },

    #[error("Not signed in")]
    NotSignedIn,
}

/// Local cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Entity not cached: {key}")]
    EntityNotCached { key: String },

    #[error("Stale read ignored for {key}: ticket {ticket} is older than write {newer}")]
    StaleReadIgnored { key: String, ticket: u64, newer: u64 },

    #[error("Persistence failed: {reason}")]
    Persistence { reason: String },
}

/// Optimistic mutation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    /// The remote call failed; local state has already been rolled back.
    #[error("Mutation of {key} rejected: {reason}")]
    Rejected { key: String, reason: String },
}

/// Master error type for all shelf errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShelfError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),
}

impl ShelfError {
    /// True when the session is gone and the caller must treat the user as
    /// logged out.
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, ShelfError::Auth(AuthError::SessionInvalid { .. }))
    }

    /// True for a plain 401 that was not absorbed by credential renewal.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ShelfError::Transport(e) if e.status() == Some(401))
    }

    /// True when the error is a rolled-back optimistic mutation.
    pub fn is_rejected_mutation(&self) -> bool {
        matches!(self, ShelfError::Mutation(MutationError::Rejected { .. }))
    }
}

/// Result type alias for shelf operations.
pub type ShelfResult<T> = Result<T, ShelfError>;

// =============================================================================
// TESTS
// =============================================================================
