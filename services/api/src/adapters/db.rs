//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The exchange invariants are carried by the schema: `UNIQUE (session_code,
//! uploader_token)` allows one upload per member, and the primary key of
//! `assignments` is the claim-once slot for each member.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pdf_exchange_core::domain::{
    Assignment, Membership, Message, NewMessage, PdfAsset, PdfId, Session, SessionCode,
    SessionStats, UserToken,
};
use pdf_exchange_core::ports::{Claim, DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Translates driver errors into port errors. Missing rows and foreign key
/// failures both mean the referenced entity does not exist.
fn port_error(e: sqlx::Error, what: &str) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{what} not found")),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(format!("{what} already exists"))
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::NotFound(format!("{what} references a missing row"))
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    code: String,
    created_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            code: SessionCode::from(self.code),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StatsRecord {
    members: i64,
    uploads: i64,
}

#[derive(FromRow)]
struct MembershipRecord {
    user_token: String,
    session_code: String,
    joined_at: DateTime<Utc>,
}
impl MembershipRecord {
    fn to_domain(self) -> Membership {
        Membership {
            session_code: SessionCode::from(self.session_code),
            user_token: UserToken::from(self.user_token),
            joined_at: self.joined_at,
        }
    }
}

#[derive(FromRow)]
struct AssetRecord {
    id: Uuid,
    session_code: String,
    uploader_token: String,
    filename: String,
    storage_key: String,
    size_bytes: i64,
    uploaded_at: DateTime<Utc>,
}
impl AssetRecord {
    fn to_domain(self) -> PdfAsset {
        PdfAsset {
            id: self.id,
            session_code: SessionCode::from(self.session_code),
            uploader_token: UserToken::from(self.uploader_token),
            filename: self.filename,
            storage_key: self.storage_key,
            size_bytes: self.size_bytes.max(0) as u64,
            uploaded_at: self.uploaded_at,
        }
    }
}

#[derive(FromRow)]
struct AssignmentRecord {
    session_code: String,
    user_token: String,
    pdf_id: Uuid,
    assigned_at: DateTime<Utc>,
}
impl AssignmentRecord {
    fn to_domain(self) -> Assignment {
        Assignment {
            session_code: SessionCode::from(self.session_code),
            user_token: UserToken::from(self.user_token),
            pdf_id: self.pdf_id,
            assigned_at: self.assigned_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: i64,
    session_code: String,
    pdf_id: Uuid,
    sender_token: String,
    body: String,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> Message {
        Message {
            id: self.id,
            session_code: SessionCode::from(self.session_code),
            pdf_id: self.pdf_id,
            sender_token: UserToken::from(self.sender_token),
            text: self.body,
            created_at: self.created_at,
        }
    }
}

const ASSET_COLUMNS: &str =
    "id, session_code, uploader_token, filename, storage_key, size_bytes, uploaded_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn insert_session(&self, session: &Session) -> PortResult<()> {
        sqlx::query("INSERT INTO sessions (code, created_at) VALUES ($1, $2)")
            .bind(session.code.as_str())
            .bind(session.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| port_error(e, "Session"))?;
        Ok(())
    }

    async fn get_session(&self, code: &SessionCode) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT code, created_at FROM sessions WHERE code = $1",
        )
        .bind(code.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| port_error(e, "Session"))?;
        Ok(record.to_domain())
    }

    async fn session_stats(&self, code: &SessionCode) -> PortResult<SessionStats> {
        let record = sqlx::query_as::<_, StatsRecord>(
            "SELECT \
                (SELECT COUNT(*) FROM memberships m WHERE m.session_code = s.code) AS members, \
                (SELECT COUNT(*) FROM pdf_assets p WHERE p.session_code = s.code) AS uploads \
             FROM sessions s WHERE s.code = $1",
        )
        .bind(code.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| port_error(e, "Session"))?;
        Ok(SessionStats {
            members: record.members.max(0) as u64,
            uploads: record.uploads.max(0) as u64,
        })
    }

    async fn insert_membership(&self, membership: &Membership) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO memberships (user_token, session_code, joined_at) VALUES ($1, $2, $3)",
        )
        .bind(membership.user_token.as_str())
        .bind(membership.session_code.as_str())
        .bind(membership.joined_at)
        .execute(&self.pool)
        .await
        .map_err(|e| port_error(e, "Membership"))?;
        Ok(())
    }

    async fn get_membership(&self, token: &UserToken) -> PortResult<Membership> {
        let record = sqlx::query_as::<_, MembershipRecord>(
            "SELECT user_token, session_code, joined_at FROM memberships WHERE user_token = $1",
        )
        .bind(token.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| port_error(e, "Membership"))?;
        Ok(record.to_domain())
    }

    async fn insert_asset(&self, asset: &PdfAsset) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO pdf_assets \
                (id, session_code, uploader_token, filename, storage_key, size_bytes, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(asset.id)
        .bind(asset.session_code.as_str())
        .bind(asset.uploader_token.as_str())
        .bind(&asset.filename)
        .bind(&asset.storage_key)
        .bind(i64::try_from(asset.size_bytes).unwrap_or(i64::MAX))
        .bind(asset.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| port_error(e, "PDF"))?;
        Ok(())
    }

    async fn get_asset(&self, id: PdfId) -> PortResult<PdfAsset> {
        let record = sqlx::query_as::<_, AssetRecord>(&format!(
            "SELECT {ASSET_COLUMNS} FROM pdf_assets WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| port_error(e, "PDF"))?;
        Ok(record.to_domain())
    }

    async fn find_asset_by_uploader(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> PortResult<Option<PdfAsset>> {
        let record = sqlx::query_as::<_, AssetRecord>(&format!(
            "SELECT {ASSET_COLUMNS} FROM pdf_assets WHERE session_code = $1 AND uploader_token = $2"
        ))
        .bind(code.as_str())
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| port_error(e, "PDF"))?;
        Ok(record.map(AssetRecord::to_domain))
    }

    async fn list_assets(&self, code: &SessionCode) -> PortResult<Vec<PdfAsset>> {
        let records = sqlx::query_as::<_, AssetRecord>(&format!(
            "SELECT {ASSET_COLUMNS} FROM pdf_assets WHERE session_code = $1 \
             ORDER BY uploaded_at ASC, id ASC"
        ))
        .bind(code.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| port_error(e, "PDF"))?;

        let assets = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(assets)
    }

    async fn get_assignment(
        &self,
        code: &SessionCode,
        token: &UserToken,
    ) -> PortResult<Option<Assignment>> {
        let record = sqlx::query_as::<_, AssignmentRecord>(
            "SELECT session_code, user_token, pdf_id, assigned_at FROM assignments \
             WHERE session_code = $1 AND user_token = $2",
        )
        .bind(code.as_str())
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| port_error(e, "Assignment"))?;
        Ok(record.map(AssignmentRecord::to_domain))
    }

    async fn claim_assignment(&self, assignment: &Assignment) -> PortResult<Claim> {
        // ON CONFLICT waits for a concurrent inserter of the same key to
        // commit, so the follow-up read always finds the winning row.
        let inserted = sqlx::query_as::<_, AssignmentRecord>(
            "INSERT INTO assignments (session_code, user_token, pdf_id, assigned_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (session_code, user_token) DO NOTHING \
             RETURNING session_code, user_token, pdf_id, assigned_at",
        )
        .bind(assignment.session_code.as_str())
        .bind(assignment.user_token.as_str())
        .bind(assignment.pdf_id)
        .bind(assignment.assigned_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| port_error(e, "Assignment"))?;

        if let Some(record) = inserted {
            return Ok(Claim::Created(record.to_domain()));
        }

        self.get_assignment(&assignment.session_code, &assignment.user_token)
            .await?
            .map(Claim::Existing)
            .ok_or_else(|| {
                PortError::Unexpected("Assignment conflict without a committed row".to_string())
            })
    }

    async fn insert_message(&self, message: NewMessage) -> PortResult<Message> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| port_error(e, "Message"))?;

        // Serializes appends within one session so timestamps strictly increase.
        sqlx::query("SELECT code FROM sessions WHERE code = $1 FOR NO KEY UPDATE")
            .bind(message.session_code.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| port_error(e, "Session"))?;

        let record = sqlx::query_as::<_, MessageRecord>(
            "INSERT INTO messages (session_code, pdf_id, sender_token, body, created_at) \
             VALUES ($1, $2, $3, $4, GREATEST( \
                clock_timestamp(), \
                (SELECT MAX(created_at) + INTERVAL '1 microsecond' \
                   FROM messages WHERE session_code = $1))) \
             RETURNING id, session_code, pdf_id, sender_token, body, created_at",
        )
        .bind(message.session_code.as_str())
        .bind(message.pdf_id)
        .bind(message.sender_token.as_str())
        .bind(&message.text)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| port_error(e, "Message"))?;

        tx.commit().await.map_err(|e| port_error(e, "Message"))?;
        Ok(record.to_domain())
    }

    async fn list_messages(
        &self,
        code: &SessionCode,
        pdf_id: PdfId,
        limit: usize,
    ) -> PortResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT * FROM ( \
                SELECT id, session_code, pdf_id, sender_token, body, created_at \
                  FROM messages WHERE session_code = $1 AND pdf_id = $2 \
                 ORDER BY id DESC LIMIT $3 \
             ) recent ORDER BY id ASC",
        )
        .bind(code.as_str())
        .bind(pdf_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| port_error(e, "Message"))?;

        let messages = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(messages)
    }
}
