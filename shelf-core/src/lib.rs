//! Shelf Core - Entity Types
//!
//! Pure data structures shared by every other crate: identities, library and
//! social entities, the error taxonomy, and the two collaborator interfaces
//! the client is built against (`Transport`, `CredentialStore`).

pub mod credentials;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod social;
pub mod transport;

pub use credentials::{CredentialStore, Credentials, TokenKind};
pub use entities::{Book, ProgressUpdate, TrackRequest, TrackedBook};
pub use enums::{ReadingStatus, ReadingStatusParseError};
pub use error::{
    AuthError, CacheError, MutationError, ShelfError, ShelfResult, TransportError,
};
pub use identity::{BookId, ListId, ReviewId, Timestamp, UserId};
pub use social::{
    FollowCounts, ListCounts, ListSummary, ReviewCounts, ReviewSummary, UserProfile,
};
pub use transport::{ApiRequest, ApiResponse, Method, Transport};
