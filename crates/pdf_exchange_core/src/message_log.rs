//! crates/pdf_exchange_core/src/message_log.rs
//!
//! Append-only discussion threads, one per PDF in a session. Writing to a
//! thread requires an assignment to its PDF; reading follows [`ThreadReadPolicy`].

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{Membership, Message, NewMessage, PdfId, SessionCode, UserToken};
use crate::error::{ExchangeError, ExchangeResult};
use crate::ports::{DatabaseService, PortError};
use crate::token_issuer::TokenIssuer;

/// Number of messages returned when the caller does not ask for a limit.
pub const DEFAULT_MESSAGE_LIMIT: usize = 100;
/// Largest limit a caller may request.
pub const MAX_MESSAGE_LIMIT: usize = 500;
/// Longest accepted message, in characters, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Who may read a PDF's thread besides the members assigned to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThreadReadPolicy {
    /// Only members holding an assignment to the PDF.
    #[default]
    AssignedOnly,
    /// Assigned members and the member who uploaded the PDF.
    AssignedOrUploader,
}

pub struct MessageLog {
    db: Arc<dyn DatabaseService>,
    issuer: Arc<TokenIssuer>,
    read_policy: ThreadReadPolicy,
}

impl MessageLog {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        issuer: Arc<TokenIssuer>,
        read_policy: ThreadReadPolicy,
    ) -> Self {
        Self {
            db,
            issuer,
            read_policy,
        }
    }

    pub async fn append(
        &self,
        code: &SessionCode,
        pdf_id: PdfId,
        sender: &UserToken,
        text: &str,
    ) -> ExchangeResult<Message> {
        let membership = self.issuer.validate(code, sender).await?;
        let text = normalize_text(text)?;

        if !self.is_assigned(&membership, pdf_id).await? {
            debug!(code = %code, %pdf_id, token = sender.redacted(), "Rejected message to unassigned thread");
            return Err(ExchangeError::Unauthorized);
        }

        let message = self
            .db
            .insert_message(NewMessage {
                session_code: membership.session_code,
                pdf_id,
                sender_token: membership.user_token,
                text,
            })
            .await?;
        info!(code = %code, %pdf_id, message_id = message.id, "Message appended");
        Ok(message)
    }

    /// The most recent messages of one thread, oldest first.
    pub async fn list(
        &self,
        code: &SessionCode,
        pdf_id: PdfId,
        reader: &UserToken,
        limit: Option<usize>,
    ) -> ExchangeResult<Vec<Message>> {
        let membership = self.issuer.validate(code, reader).await?;
        if !self.may_read(&membership, pdf_id).await? {
            return Err(ExchangeError::Unauthorized);
        }
        let limit = resolve_limit(limit)?;
        Ok(self.db.list_messages(code, pdf_id, limit).await?)
    }

    /// Lists `pdf_id`'s thread, or the thread of the reader's own assignment
    /// when no PDF is named. A reader without an assignment gets an empty list.
    pub async fn list_for_reader(
        &self,
        code: &SessionCode,
        reader: &UserToken,
        pdf_id: Option<PdfId>,
        limit: Option<usize>,
    ) -> ExchangeResult<Vec<Message>> {
        if let Some(pdf_id) = pdf_id {
            return self.list(code, pdf_id, reader, limit).await;
        }
        let limit = resolve_limit(limit)?;
        self.issuer.validate(code, reader).await?;
        match self.db.get_assignment(code, reader).await? {
            Some(assignment) => Ok(self.db.list_messages(code, assignment.pdf_id, limit).await?),
            None => Ok(Vec::new()),
        }
    }

    async fn is_assigned(&self, membership: &Membership, pdf_id: PdfId) -> ExchangeResult<bool> {
        Ok(self
            .db
            .get_assignment(&membership.session_code, &membership.user_token)
            .await?
            .is_some_and(|a| a.pdf_id == pdf_id))
    }

    async fn may_read(&self, membership: &Membership, pdf_id: PdfId) -> ExchangeResult<bool> {
        if self.is_assigned(membership, pdf_id).await? {
            return Ok(true);
        }
        if self.read_policy == ThreadReadPolicy::AssignedOnly {
            return Ok(false);
        }
        let asset = match self.db.get_asset(pdf_id).await {
            Ok(asset) => asset,
            Err(PortError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(asset.session_code == membership.session_code
            && asset.uploader_token == membership.user_token)
    }
}

/// Trims the text and enforces the length rules.
pub fn normalize_text(text: &str) -> ExchangeResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ExchangeError::EmptyMessage);
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ExchangeError::InvalidFormat(format!(
            "messages are limited to {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(text.to_string())
}

/// Applies the default limit. A requested limit is used as given, so `0`
/// yields no messages; anything above `MAX_MESSAGE_LIMIT` is rejected.
pub fn resolve_limit(limit: Option<usize>) -> ExchangeResult<usize> {
    match limit {
        None => Ok(DEFAULT_MESSAGE_LIMIT),
        Some(n) if n > MAX_MESSAGE_LIMIT => Err(ExchangeError::InvalidFormat(format!(
            "limit must be at most {MAX_MESSAGE_LIMIT}"
        ))),
        Some(n) => Ok(n),
    }
}
