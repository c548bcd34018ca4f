//! crates/pdf_exchange_core/src/allocation.rs
//!
//! Hands each member one PDF written by somebody else.
//!
//! A member's assignment is claimed exactly once: the first successful request
//! picks uniformly at random among the eligible PDFs and commits through
//! [`DatabaseService::claim_assignment`]. Every later request, including
//! requests that lost a concurrent race, returns that same committed PDF.
//! Several members may be given the same PDF.

use chrono::Utc;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{Assignment, PdfAsset, SessionCode, UserToken};
use crate::error::{ExchangeError, ExchangeResult};
use crate::ports::{Claim, DatabaseService, PortError};
use crate::token_issuer::TokenIssuer;

/// Result of an allocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// This request committed a new assignment.
    Assigned(PdfAsset),
    /// The member already held an assignment; it is returned unchanged.
    AlreadyAssigned(PdfAsset),
    /// Nothing is eligible yet. The member should try again later.
    NoneAvailable,
}

impl Allocation {
    pub fn pdf(&self) -> Option<&PdfAsset> {
        match self {
            Allocation::Assigned(pdf) | Allocation::AlreadyAssigned(pdf) => Some(pdf),
            Allocation::NoneAvailable => None,
        }
    }

    pub fn into_pdf(self) -> Option<PdfAsset> {
        match self {
            Allocation::Assigned(pdf) | Allocation::AlreadyAssigned(pdf) => Some(pdf),
            Allocation::NoneAvailable => None,
        }
    }
}

pub struct AllocationEngine {
    db: Arc<dyn DatabaseService>,
    issuer: Arc<TokenIssuer>,
}

impl AllocationEngine {
    pub fn new(db: Arc<dyn DatabaseService>, issuer: Arc<TokenIssuer>) -> Self {
        Self { db, issuer }
    }

    pub async fn request_allocation(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> ExchangeResult<Allocation> {
        self.issuer.validate(code, token).await?;

        let current = self.db.get_assignment(code, token).await?;
        if let Some(assignment) = current {
            return Ok(Allocation::AlreadyAssigned(self.asset_of(&assignment).await?));
        }

        let assets = self.db.list_assets(code).await?;
        let Some(choice) = pick(&eligible(&assets, token)) else {
            debug!(code = %code, token = token.redacted(), "No PDF available for allocation");
            return Ok(Allocation::NoneAvailable);
        };

        let candidate = Assignment {
            session_code: code.clone(),
            user_token: token.clone(),
            pdf_id: choice.id,
            assigned_at: Utc::now(),
        };
        match self.db.claim_assignment(&candidate).await? {
            Claim::Created(assignment) => {
                info!(
                    code = %code,
                    token = token.redacted(),
                    pdf_id = %assignment.pdf_id,
                    "PDF assigned"
                );
                Ok(Allocation::Assigned(choice))
            }
            Claim::Existing(assignment) => {
                debug!(
                    code = %code,
                    token = token.redacted(),
                    "Concurrent allocation already committed, returning it"
                );
                Ok(Allocation::AlreadyAssigned(self.asset_of(&assignment).await?))
            }
        }
    }

    /// The member's current assignment and its PDF, without allocating.
    pub async fn my_assignment(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> ExchangeResult<Option<(Assignment, PdfAsset)>> {
        self.issuer.validate(code, token).await?;
        match self.db.get_assignment(code, token).await? {
            Some(assignment) => {
                let asset = self.asset_of(&assignment).await?;
                Ok(Some((assignment, asset)))
            }
            None => Ok(None),
        }
    }

    async fn asset_of(&self, assignment: &Assignment) -> ExchangeResult<PdfAsset> {
        self.db.get_asset(assignment.pdf_id).await.map_err(|e| match e {
            PortError::NotFound(_) => ExchangeError::NotFound("Assigned PDF".to_string()),
            other => other.into(),
        })
    }
}

/// PDFs the requester may be given: everything but their own upload.
///
/// Only members without an assignment get here, and assignments never change,
/// so there is no previously held PDF to exclude.
pub fn eligible<'a>(assets: &'a [PdfAsset], requester: &UserToken) -> Vec<&'a PdfAsset> {
    assets
        .iter()
        .filter(|asset| asset.uploader_token != *requester)
        .collect()
}

fn pick(candidates: &[&PdfAsset]) -> Option<PdfAsset> {
    candidates
        .choose(&mut rand::thread_rng())
        .map(|asset| (*asset).clone())
}
