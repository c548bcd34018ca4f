//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port.
//!
//! State is split into one bucket per session, each behind its own lock, so a
//! burst of polling reads in one session never waits on writers elsewhere.
//! The global indexes (token -> session, pdf -> session) are only held long
//! enough to clone a bucket handle.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pdf_exchange_core::domain::{
    Assignment, Membership, Message, NewMessage, PdfAsset, PdfId, Session, SessionCode,
    SessionStats, UserToken,
};
use pdf_exchange_core::ports::{Claim, DatabaseService, PortError, PortResult};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Default)]
pub struct InMemoryDatabase {
    sessions: RwLock<HashMap<SessionCode, Arc<SessionBucket>>>,
    tokens: RwLock<HashMap<UserToken, SessionCode>>,
    pdfs: RwLock<HashMap<PdfId, SessionCode>>,
    next_message_id: AtomicI64,
}

struct SessionBucket {
    session: Session,
    data: RwLock<SessionData>,
}

#[derive(Default)]
struct SessionData {
    members: HashMap<UserToken, Membership>,
    /// Upload order.
    assets: Vec<PdfAsset>,
    assignments: HashMap<UserToken, Assignment>,
    /// Insertion order, which is also `created_at` order.
    messages: Vec<Message>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    async fn bucket(&self, code: &SessionCode) -> PortResult<Arc<SessionBucket>> {
        self.sessions
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Session {code} not found")))
    }

    async fn bucket_of_pdf(&self, id: PdfId) -> PortResult<Arc<SessionBucket>> {
        let code = self
            .pdfs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("PDF {id} not found")))?;
        self.bucket(&code).await
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn insert_session(&self, session: &Session) -> PortResult<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(session.code.clone()) {
            Entry::Occupied(_) => Err(PortError::Conflict(format!(
                "Session code {} is taken",
                session.code
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(SessionBucket {
                    session: session.clone(),
                    data: RwLock::new(SessionData::default()),
                }));
                Ok(())
            }
        }
    }

    async fn get_session(&self, code: &SessionCode) -> PortResult<Session> {
        Ok(self.bucket(code).await?.session.clone())
    }

    async fn session_stats(&self, code: &SessionCode) -> PortResult<SessionStats> {
        let bucket = self.bucket(code).await?;
        let data = bucket.data.read().await;
        Ok(SessionStats {
            members: data.members.len() as u64,
            uploads: data.assets.len() as u64,
        })
    }

    async fn insert_membership(&self, membership: &Membership) -> PortResult<()> {
        let bucket = self.bucket(&membership.session_code).await?;
        {
            let mut tokens = self.tokens.write().await;
            if tokens.contains_key(&membership.user_token) {
                return Err(PortError::Conflict("Token already issued".to_string()));
            }
            tokens.insert(
                membership.user_token.clone(),
                membership.session_code.clone(),
            );
        }
        bucket
            .data
            .write()
            .await
            .members
            .insert(membership.user_token.clone(), membership.clone());
        Ok(())
    }

    async fn get_membership(&self, token: &UserToken) -> PortResult<Membership> {
        let code = self
            .tokens
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Membership not found".to_string()))?;
        let bucket = self.bucket(&code).await?;
        let data = bucket.data.read().await;
        data.members
            .get(token)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Membership not found".to_string()))
    }

    async fn insert_asset(&self, asset: &PdfAsset) -> PortResult<()> {
        let bucket = self.bucket(&asset.session_code).await?;
        let mut data = bucket.data.write().await;
        if data
            .assets
            .iter()
            .any(|existing| existing.uploader_token == asset.uploader_token)
        {
            return Err(PortError::Conflict(
                "Uploader already has a PDF in this session".to_string(),
            ));
        }
        // Index first, so the asset is resolvable by id as soon as it is listed.
        self.pdfs
            .write()
            .await
            .insert(asset.id, asset.session_code.clone());
        data.assets.push(asset.clone());
        Ok(())
    }

    async fn get_asset(&self, id: PdfId) -> PortResult<PdfAsset> {
        let bucket = self.bucket_of_pdf(id).await?;
        let data = bucket.data.read().await;
        data.assets
            .iter()
            .find(|asset| asset.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("PDF {id} not found")))
    }

    async fn find_asset_by_uploader(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> PortResult<Option<PdfAsset>> {
        let bucket = self.bucket(code).await?;
        let data = bucket.data.read().await;
        Ok(data
            .assets
            .iter()
            .find(|asset| asset.uploader_token == *token)
            .cloned())
    }

    async fn list_assets(&self, code: &SessionCode) -> PortResult<Vec<PdfAsset>> {
        let bucket = self.bucket(code).await?;
        let data = bucket.data.read().await;
        Ok(data.assets.clone())
    }

    async fn get_assignment(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> PortResult<Option<Assignment>> {
        let bucket = self.bucket(code).await?;
        let data = bucket.data.read().await;
        Ok(data.assignments.get(token).cloned())
    }

    async fn claim_assignment(&self, assignment: &Assignment) -> PortResult<Claim> {
        let bucket = self.bucket(&assignment.session_code).await?;
        let mut data = bucket.data.write().await;
        match data.assignments.entry(assignment.user_token.clone()) {
            Entry::Occupied(existing) => Ok(Claim::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(assignment.clone());
                Ok(Claim::Created(assignment.clone()))
            }
        }
    }

    async fn insert_message(&self, message: NewMessage) -> PortResult<Message> {
        let bucket = self.bucket(&message.session_code).await?;
        let mut data = bucket.data.write().await;

        let created_at = next_timestamp(data.messages.last().map(|m| m.created_at));
        let stored = Message {
            id: self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1,
            session_code: message.session_code,
            pdf_id: message.pdf_id,
            sender_token: message.sender_token,
            text: message.text,
            created_at,
        };
        data.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        code: &SessionCode,
        pdf_id: PdfId,
        limit: usize,
    ) -> PortResult<Vec<Message>> {
        let bucket = self.bucket(code).await?;
        let data = bucket.data.read().await;
        let mut recent: Vec<Message> = data
            .messages
            .iter()
            .rev()
            .filter(|m| m.pdf_id == pdf_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }
}

/// The current time, nudged forward if needed so it is strictly after `previous`.
fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session(code: &str) -> Session {
        Session {
            code: SessionCode::from_user_input(code),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_session_codes_conflict() {
        let db = InMemoryDatabase::new();
        db.insert_session(&session("AAAAAA")).await.unwrap();
        let err = db.insert_session(&session("AAAAAA")).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn claims_are_first_writer_wins() {
        let db = InMemoryDatabase::new();
        let s = session("AAAAAA");
        db.insert_session(&s).await.unwrap();
        let token = UserToken::mint();

        let first = Assignment {
            session_code: s.code.clone(),
            user_token: token.clone(),
            pdf_id: Uuid::new_v4(),
            assigned_at: Utc::now(),
        };
        let second = Assignment {
            pdf_id: Uuid::new_v4(),
            ..first.clone()
        };

        assert_eq!(
            db.claim_assignment(&first).await.unwrap(),
            Claim::Created(first.clone())
        );
        assert_eq!(
            db.claim_assignment(&second).await.unwrap(),
            Claim::Existing(first.clone())
        );
        assert_eq!(db.get_assignment(&s.code, &token).await.unwrap(), Some(first));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn listed_assets_are_always_resolvable_by_id() {
        let db = Arc::new(InMemoryDatabase::new());
        let s = session("AAAAAA");
        db.insert_session(&s).await.unwrap();

        let reader = {
            let (db, code) = (db.clone(), s.code.clone());
            tokio::spawn(async move {
                let mut seen = 0;
                while seen < 40 {
                    let assets = db.list_assets(&code).await.unwrap();
                    for asset in &assets {
                        assert_eq!(db.get_asset(asset.id).await.unwrap().id, asset.id);
                    }
                    seen = assets.len();
                    tokio::task::yield_now().await;
                }
            })
        };

        for i in 0..40 {
            let id = Uuid::new_v4();
            db.insert_asset(&PdfAsset {
                id,
                session_code: s.code.clone(),
                uploader_token: UserToken::mint(),
                filename: format!("{i}.pdf"),
                storage_key: format!("{}_{id}.pdf", s.code),
                size_bytes: 1,
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap();
            tokio::task::yield_now().await;
        }
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn message_timestamps_strictly_increase() {
        let db = InMemoryDatabase::new();
        let s = session("AAAAAA");
        db.insert_session(&s).await.unwrap();
        let pdf_id = Uuid::new_v4();
        let sender = UserToken::mint();

        let mut stored = Vec::new();
        for i in 0..50 {
            stored.push(
                db.insert_message(NewMessage {
                    session_code: s.code.clone(),
                    pdf_id,
                    sender_token: sender.clone(),
                    text: format!("m{i}"),
                })
                .await
                .unwrap(),
            );
        }
        assert!(stored
            .windows(2)
            .all(|w| w[0].created_at < w[1].created_at && w[0].id < w[1].id));

        let tail = db.list_messages(&s.code, pdf_id, 3).await.unwrap();
        let texts: Vec<_> = tail.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m47", "m48", "m49"]);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let future = Utc::now() + Duration::seconds(60);
        assert_eq!(next_timestamp(Some(future)), future + Duration::microseconds(1));
    }
}
