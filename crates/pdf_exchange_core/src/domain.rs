//! crates/pdf_exchange_core/src/domain.rs
//!
//! Defines the pure, core data structures for the PDF exchange.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;
use uuid::Uuid;

/// Identifier of an uploaded PDF.
pub type PdfId = Uuid;

/// Identifier of a chat message. Ids grow with insertion order within the store.
pub type MessageId = i64;

/// Characters a generated session code is drawn from.
pub const SESSION_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// The length of a generated session code unless configured otherwise.
pub const DEFAULT_SESSION_CODE_LENGTH: usize = 6;

//=========================================================================================
// Identifiers
//=========================================================================================

/// A short, human-enterable session identifier such as `AB12CD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionCode(String);

impl SessionCode {
    /// Draws a fresh code of `length` characters from [`SESSION_CODE_ALPHABET`].
    pub fn random<R: Rng + ?Sized>(rng: &mut R, length: usize) -> Self {
        let code = (0..length)
            .map(|_| {
                let idx = rng.gen_range(0..SESSION_CODE_ALPHABET.len());
                char::from(SESSION_CODE_ALPHABET[idx])
            })
            .collect();
        Self(code)
    }

    /// Normalizes a code typed by a person: surrounding whitespace is dropped
    /// and letters are upper-cased, so `" ab12cd "` finds session `AB12CD`.
    pub fn from_user_input(input: &str) -> Self {
        Self(input.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionCode {
    /// Wraps a code that is already in canonical form, e.g. read back from storage.
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The opaque per-join credential. It is the only thing that identifies a member.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UserToken(String);

impl UserToken {
    /// Mints a new unguessable token (128 random bits, hex encoded).
    pub fn mint() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix that is safe to put in logs.
    pub fn redacted(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl From<String> for UserToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UserToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// Tokens are credentials; keep them out of debug output.
impl fmt::Debug for UserToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserToken({}..)", self.redacted())
    }
}

//=========================================================================================
// Entities
//=========================================================================================

/// A short-lived group of anonymous members exchanging PDFs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub code: SessionCode,
    pub created_at: DateTime<Utc>,
}

/// Counters shown on the session overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub members: u64,
    pub uploads: u64,
}

/// Binds a token to the one session it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub session_code: SessionCode,
    pub user_token: UserToken,
    pub joined_at: DateTime<Utc>,
}

/// Metadata of the single PDF a member contributed. The bytes live in the
/// blob store under `storage_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfAsset {
    pub id: PdfId,
    pub session_code: SessionCode,
    pub uploader_token: UserToken,
    pub filename: String,
    pub storage_key: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Points a member at the PDF they were given. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub session_code: SessionCode,
    pub user_token: UserToken,
    pub pdf_id: PdfId,
    pub assigned_at: DateTime<Utc>,
}

/// A single entry in the discussion thread of one PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub session_code: SessionCode,
    pub pdf_id: PdfId,
    pub sender_token: UserToken,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A message that has not been stored yet; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_code: SessionCode,
    pub pdf_id: PdfId,
    pub sender_token: UserToken,
    pub text: String,
}
