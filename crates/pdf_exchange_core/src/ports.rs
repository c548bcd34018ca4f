//! crates/pdf_exchange_core/src/ports.rs
//!
//! Defines the service contracts (traits) the exchange core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete metadata database and file storage.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::domain::{
    Assignment, Membership, Message, NewMessage, PdfAsset, PdfId, Session, SessionCode,
    SessionStats, UserToken,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness rule rejected the write; the existing row wins.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A stream of file chunks read back from the blob store.
pub type BlobStream = Pin<Box<dyn Stream<Item = Result<Bytes, PortError>> + Send>>;

/// Outcome of an atomic claim on the `(session, token)` assignment slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// This call committed the assignment.
    Created(Assignment),
    /// Another call had already committed; this is its assignment.
    Existing(Assignment),
}

impl Claim {
    pub fn into_assignment(self) -> Assignment {
        match self {
            Claim::Created(assignment) | Claim::Existing(assignment) => assignment,
        }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Sessions ---
    /// Fails with `PortError::Conflict` when the code is already taken.
    async fn insert_session(&self, session: &Session) -> PortResult<()>;

    async fn get_session(&self, code: &SessionCode) -> PortResult<Session>;

    async fn session_stats(&self, code: &SessionCode) -> PortResult<SessionStats>;

    // --- Memberships ---
    async fn insert_membership(&self, membership: &Membership) -> PortResult<()>;

    async fn get_membership(&self, token: &UserToken) -> PortResult<Membership>;

    // --- PDF assets ---
    /// Fails with `PortError::Conflict` when the uploader already has an asset
    /// in the session.
    async fn insert_asset(&self, asset: &PdfAsset) -> PortResult<()>;

    async fn get_asset(&self, id: PdfId) -> PortResult<PdfAsset>;

    async fn find_asset_by_uploader(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> PortResult<Option<PdfAsset>>;

    /// All assets of a session in upload order.
    async fn list_assets(&self, code: &SessionCode) -> PortResult<Vec<PdfAsset>>;

    // --- Assignments ---
    async fn get_assignment(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> PortResult<Option<Assignment>>;

    /// Inserts the assignment unless one already exists for its
    /// `(session_code, user_token)`. Must be atomic: concurrent callers for the
    /// same key all observe the single committed row.
    async fn claim_assignment(&self, assignment: &Assignment) -> PortResult<Claim>;

    // --- Messages ---
    /// Stores a message. The store assigns the id and a `created_at` strictly
    /// later than any earlier message of the same session.
    async fn insert_message(&self, message: NewMessage) -> PortResult<Message>;

    /// The most recent `limit` messages of one PDF thread, oldest first.
    async fn list_messages(
        &self,
        code: &SessionCode,
        pdf_id: PdfId,
        limit: usize,
    ) -> PortResult<Vec<Message>>;
}

#[async_trait]
pub trait BlobStoreService: Send + Sync {
    /// Stores the bytes under `key`, replacing nothing: keys are never reused.
    async fn put(&self, key: &str, content: Bytes) -> PortResult<()>;

    /// Opens the stored bytes as a chunked stream.
    async fn open(&self, key: &str) -> PortResult<BlobStream>;

    /// Removes the bytes. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> PortResult<()>;
}
