//! crates/pdf_exchange_core/src/token_issuer.rs
//!
//! Mints the per-join credential and checks it on every later call.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{Membership, SessionCode, UserToken};
use crate::error::{ExchangeError, ExchangeResult};
use crate::ports::{DatabaseService, PortError};
use crate::session_store::session_lookup;

pub struct TokenIssuer {
    db: Arc<dyn DatabaseService>,
}

impl TokenIssuer {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Joins the session under a brand new token. Joining twice yields two
    /// independent memberships; nothing ties them together.
    pub async fn join(&self, code: &SessionCode) -> ExchangeResult<Membership> {
        self.db.get_session(code).await.map_err(session_lookup)?;

        let membership = Membership {
            session_code: code.clone(),
            user_token: UserToken::mint(),
            joined_at: Utc::now(),
        };
        self.db
            .insert_membership(&membership)
            .await
            .map_err(session_lookup)?;

        info!(
            code = %code,
            token = membership.user_token.redacted(),
            "Member joined session"
        );
        Ok(membership)
    }

    /// Resolves `token` to its membership, provided it was issued under `code`.
    pub async fn validate(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> ExchangeResult<Membership> {
        self.db.get_session(code).await.map_err(session_lookup)?;

        let membership = match self.db.get_membership(token).await {
            Ok(membership) => membership,
            Err(PortError::NotFound(_)) => return Err(ExchangeError::Unauthorized),
            Err(e) => return Err(e.into()),
        };

        if membership.session_code != *code {
            debug!(
                code = %code,
                token = token.redacted(),
                "Token presented to a session it was not issued for"
            );
            return Err(ExchangeError::Unauthorized);
        }
        Ok(membership)
    }
}
