pub mod allocation;
pub mod domain;
pub mod error;
pub mod message_log;
pub mod ports;
pub mod session_store;
pub mod token_issuer;
pub mod upload_ledger;

pub use allocation::{Allocation, AllocationEngine};
pub use domain::{
    Assignment, Membership, Message, MessageId, NewMessage, PdfAsset, PdfId, Session,
    SessionCode, SessionStats, UserToken,
};
pub use error::{ExchangeError, ExchangeResult};
pub use message_log::{MessageLog, ThreadReadPolicy};
pub use ports::{BlobStoreService, BlobStream, Claim, DatabaseService, PortError, PortResult};
pub use session_store::{CodeSource, RandomCodes, SessionStore};
pub use token_issuer::TokenIssuer;
pub use upload_ledger::UploadLedger;
