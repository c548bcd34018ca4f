//! crates/pdf_exchange_core/src/session_store.rs
//!
//! Creates sessions under fresh, human-enterable codes and answers lookups.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{Session, SessionCode, SessionStats, DEFAULT_SESSION_CODE_LENGTH};
use crate::error::{ExchangeError, ExchangeResult};
use crate::ports::{DatabaseService, PortError};

/// How many freshly generated codes are tried before giving up.
pub const CODE_RETRY_BUDGET: usize = 16;

/// Supplies candidate session codes.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> SessionCode;
}

/// Draws codes uniformly at random from the session code alphabet.
#[derive(Debug, Clone)]
pub struct RandomCodes {
    length: usize,
}

impl RandomCodes {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CODE_LENGTH)
    }
}

impl CodeSource for RandomCodes {
    fn next_code(&self) -> SessionCode {
        SessionCode::random(&mut rand::thread_rng(), self.length)
    }
}

pub struct SessionStore {
    db: Arc<dyn DatabaseService>,
    codes: Box<dyn CodeSource>,
}

impl SessionStore {
    pub fn new(db: Arc<dyn DatabaseService>, code_length: usize) -> Self {
        Self::with_code_source(db, RandomCodes::new(code_length))
    }

    pub fn with_code_source(db: Arc<dyn DatabaseService>, codes: impl CodeSource + 'static) -> Self {
        Self {
            db,
            codes: Box::new(codes),
        }
    }

    /// Creates a session under a new code. Collisions are retried internally;
    /// the caller only sees an error once the retry budget is spent.
    pub async fn create_session(&self) -> ExchangeResult<Session> {
        for attempt in 1..=CODE_RETRY_BUDGET {
            let session = Session {
                code: self.codes.next_code(),
                created_at: Utc::now(),
            };
            match self.db.insert_session(&session).await {
                Ok(()) => {
                    info!(code = %session.code, "Session created");
                    return Ok(session);
                }
                Err(PortError::Conflict(_)) => {
                    debug!(attempt, code = %session.code, "Session code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(attempts = CODE_RETRY_BUDGET, "Session code space exhausted");
        Err(ExchangeError::CodeSpaceExhausted(CODE_RETRY_BUDGET))
    }

    pub async fn get_session(&self, code: &SessionCode) -> ExchangeResult<Session> {
        self.db.get_session(code).await.map_err(session_lookup)
    }

    /// The session together with its member and upload counters.
    pub async fn overview(&self, code: &SessionCode) -> ExchangeResult<(Session, SessionStats)> {
        let session = self.get_session(code).await?;
        let stats = self.db.session_stats(code).await.map_err(session_lookup)?;
        Ok((session, stats))
    }
}

/// Maps a storage miss on a session lookup to [`ExchangeError::SessionNotFound`].
pub(crate) fn session_lookup(err: PortError) -> ExchangeError {
    match err {
        PortError::NotFound(_) => ExchangeError::SessionNotFound,
        other => ExchangeError::Port(other),
    }
}
