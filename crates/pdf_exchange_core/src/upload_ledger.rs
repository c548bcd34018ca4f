//! crates/pdf_exchange_core/src/upload_ledger.rs
//!
//! Records the single PDF each member contributes to a session and hands the
//! bytes back out to members allowed to read them.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{PdfAsset, PdfId, SessionCode, UserToken};
use crate::error::{ExchangeError, ExchangeResult};
use crate::ports::{BlobStoreService, BlobStream, DatabaseService, PortError};
use crate::token_issuer::TokenIssuer;

/// Longest filename kept in metadata.
pub const MAX_FILENAME_LEN: usize = 255;

pub struct UploadLedger {
    db: Arc<dyn DatabaseService>,
    blobs: Arc<dyn BlobStoreService>,
    issuer: Arc<TokenIssuer>,
}

impl UploadLedger {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        blobs: Arc<dyn BlobStoreService>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self { db, blobs, issuer }
    }

    /// Accepts the member's one PDF for this session.
    ///
    /// The existing-asset check runs before any bytes are written. If two
    /// uploads from the same token still race past it, the metadata insert
    /// decides the winner and the loser's bytes are removed again.
    pub async fn upload(
        &self,
        code: &SessionCode,
        token: &UserToken,
        filename: &str,
        content: Bytes,
    ) -> ExchangeResult<PdfAsset> {
        let membership = self.issuer.validate(code, token).await?;
        let filename = sanitize_filename(filename)?;
        if content.is_empty() {
            return Err(ExchangeError::InvalidFormat("the uploaded file is empty".to_string()));
        }

        if self.db.find_asset_by_uploader(code, token).await?.is_some() {
            debug!(code = %code, token = token.redacted(), "Rejected second upload");
            return Err(ExchangeError::AlreadyUploaded);
        }

        let id = Uuid::new_v4();
        let asset = PdfAsset {
            id,
            session_code: membership.session_code,
            uploader_token: membership.user_token,
            filename,
            storage_key: format!("{code}_{id}.pdf"),
            size_bytes: content.len() as u64,
            uploaded_at: Utc::now(),
        };

        self.blobs.put(&asset.storage_key, content).await?;

        match self.db.insert_asset(&asset).await {
            Ok(()) => {
                info!(
                    code = %code,
                    pdf_id = %asset.id,
                    size_bytes = asset.size_bytes,
                    "PDF uploaded"
                );
                Ok(asset)
            }
            Err(PortError::Conflict(_)) => {
                if let Err(e) = self.blobs.delete(&asset.storage_key).await {
                    warn!(key = %asset.storage_key, "Failed to remove orphaned upload: {e}");
                }
                Err(ExchangeError::AlreadyUploaded)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&asset.storage_key).await {
                    warn!(key = %asset.storage_key, "Failed to remove orphaned upload: {cleanup}");
                }
                Err(e.into())
            }
        }
    }

    pub async fn get(&self, id: PdfId) -> ExchangeResult<PdfAsset> {
        self.db.get_asset(id).await.map_err(|e| match e {
            PortError::NotFound(_) => ExchangeError::NotFound("PDF".to_string()),
            other => other.into(),
        })
    }

    /// Every asset of the session, for a caller who is a member of it.
    pub async fn list_by_session(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> ExchangeResult<Vec<PdfAsset>> {
        self.issuer.validate(code, token).await?;
        Ok(self.db.list_assets(code).await?)
    }

    /// The asset the token uploaded in this session, if any.
    pub async fn own_upload(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> ExchangeResult<Option<PdfAsset>> {
        self.issuer.validate(code, token).await?;
        Ok(self.db.find_asset_by_uploader(code, token).await?)
    }

    /// Opens the bytes of a PDF. Only its uploader and members assigned to it
    /// may read it.
    pub async fn open(&self, id: PdfId, token: &UserToken) -> ExchangeResult<(PdfAsset, BlobStream)> {
        let asset = self.get(id).await?;
        self.issuer.validate(&asset.session_code, token).await?;

        if asset.uploader_token != *token {
            let assigned = self
                .db
                .get_assignment(&asset.session_code, token)
                .await?
                .is_some_and(|a| a.pdf_id == asset.id);
            if !assigned {
                return Err(ExchangeError::Unauthorized);
            }
        }

        let stream = self.blobs.open(&asset.storage_key).await.map_err(|e| match e {
            PortError::NotFound(_) => ExchangeError::NotFound("File".to_string()),
            other => other.into(),
        })?;
        Ok((asset, stream))
    }
}

/// Reduces a client supplied filename to its last path segment and checks
/// that it names a PDF.
pub fn sanitize_filename(raw: &str) -> ExchangeResult<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() {
        return Err(ExchangeError::InvalidFormat("a filename is required".to_string()));
    }
    if name.chars().count() > MAX_FILENAME_LEN {
        return Err(ExchangeError::InvalidFormat("the filename is too long".to_string()));
    }
    let is_pdf = name.len() > 4
        && name
            .get(name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf"));
    if !is_pdf {
        return Err(ExchangeError::InvalidFormat("only .pdf files are accepted".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a.pdf", "a.pdf")]
    #[case("Report.PDF", "Report.PDF")]
    #[case("  notes.pdf ", "notes.pdf")]
    #[case("../../etc/evil.pdf", "evil.pdf")]
    #[case("C:\\Users\\me\\paper.pdf", "paper.pdf")]
    fn accepts_pdf_names(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_filename(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".pdf")]
    #[case("image.png")]
    #[case("archive.pdf.zip")]
    #[case("folder/")]
    #[case("résumé")]
    fn rejects_everything_else(#[case] raw: &str) {
        assert!(matches!(
            sanitize_filename(raw),
            Err(ExchangeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn rejects_overlong_names() {
        let raw = format!("{}.pdf", "a".repeat(MAX_FILENAME_LEN));
        assert!(sanitize_filename(&raw).is_err());
    }
}
