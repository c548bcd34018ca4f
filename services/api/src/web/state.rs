//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use pdf_exchange_core::ports::{BlobStoreService, DatabaseService};
use pdf_exchange_core::{AllocationEngine, MessageLog, SessionStore, TokenIssuer, UploadLedger};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub tokens: Arc<TokenIssuer>,
    pub uploads: Arc<UploadLedger>,
    pub allocations: Arc<AllocationEngine>,
    pub messages: Arc<MessageLog>,
}

impl AppState {
    /// Wires the exchange components over the given storage adapters.
    pub fn new(
        config: Arc<Config>,
        db: Arc<dyn DatabaseService>,
        blobs: Arc<dyn BlobStoreService>,
    ) -> Self {
        let tokens = Arc::new(TokenIssuer::new(db.clone()));
        Self {
            sessions: Arc::new(SessionStore::new(db.clone(), config.session_code_length)),
            uploads: Arc::new(UploadLedger::new(db.clone(), blobs, tokens.clone())),
            allocations: Arc::new(AllocationEngine::new(db.clone(), tokens.clone())),
            messages: Arc::new(MessageLog::new(db, tokens.clone(), config.thread_read_policy)),
            tokens,
            config,
        }
    }
}
