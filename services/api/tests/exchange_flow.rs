//! Integration tests for the exchange components over the in-memory adapters.
//!
//! Tests cover:
//! - Session creation, code collisions and the retry budget
//! - Token scoping to the issuing session
//! - The one-upload-per-member rule, including racing uploads
//! - Allocation: no self-assignment, idempotence, fan-out, concurrent claims
//! - Message threads: authorization, ordering, limits, read policy
//! - Download authorization

use api_lib::adapters::{InMemoryDatabase, MemoryBlobStore};
use bytes::Bytes;
use futures::future::join_all;
use futures::TryStreamExt;
use pdf_exchange_core::ports::{BlobStoreService, DatabaseService};
use pdf_exchange_core::message_log::MAX_MESSAGE_LIMIT;
use pdf_exchange_core::session_store::CODE_RETRY_BUDGET;
use pdf_exchange_core::{
    Allocation, AllocationEngine, CodeSource, ExchangeError, MessageLog, PdfAsset, RandomCodes,
    SessionCode, SessionStore, ThreadReadPolicy, TokenIssuer, UploadLedger, UserToken,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

//=========================================================================================
// Test Harness
//=========================================================================================

/// Hands out a fixed list of codes, repeating the last one forever.
struct ScriptedCodes {
    codes: Mutex<VecDeque<&'static str>>,
    last: &'static str,
}

impl ScriptedCodes {
    fn new(codes: &[&'static str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().copied().collect()),
            last: codes.last().copied().unwrap_or("AAAAAA"),
        }
    }
}

impl CodeSource for ScriptedCodes {
    fn next_code(&self) -> SessionCode {
        let next = self.codes.lock().unwrap().pop_front().unwrap_or(self.last);
        SessionCode::from_user_input(next)
    }
}

struct Exchange {
    db: Arc<InMemoryDatabase>,
    blobs: Arc<MemoryBlobStore>,
    sessions: SessionStore,
    tokens: Arc<TokenIssuer>,
    uploads: Arc<UploadLedger>,
    allocations: Arc<AllocationEngine>,
    messages: MessageLog,
}

fn exchange_with(codes: impl CodeSource + 'static, policy: ThreadReadPolicy) -> Exchange {
    let db = Arc::new(InMemoryDatabase::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let dyn_db: Arc<dyn DatabaseService> = db.clone();
    let dyn_blobs: Arc<dyn BlobStoreService> = blobs.clone();

    let tokens = Arc::new(TokenIssuer::new(dyn_db.clone()));
    Exchange {
        sessions: SessionStore::with_code_source(dyn_db.clone(), codes),
        uploads: Arc::new(UploadLedger::new(dyn_db.clone(), dyn_blobs, tokens.clone())),
        allocations: Arc::new(AllocationEngine::new(dyn_db.clone(), tokens.clone())),
        messages: MessageLog::new(dyn_db, tokens.clone(), policy),
        tokens,
        db,
        blobs,
    }
}

fn exchange() -> Exchange {
    exchange_with(RandomCodes::default(), ThreadReadPolicy::AssignedOnly)
}

fn pdf_bytes(label: &str) -> Bytes {
    Bytes::from(format!("%PDF-1.4\n% {label}\n"))
}

impl Exchange {
    async fn session_with_members(&self, members: usize) -> (SessionCode, Vec<UserToken>) {
        let session = self.sessions.create_session().await.unwrap();
        let mut tokens = Vec::new();
        for _ in 0..members {
            tokens.push(self.tokens.join(&session.code).await.unwrap().user_token);
        }
        (session.code, tokens)
    }

    async fn upload(&self, code: &SessionCode, token: &UserToken, name: &str) -> PdfAsset {
        self.uploads
            .upload(code, token, name, pdf_bytes(name))
            .await
            .unwrap()
    }

    async fn allocate(&self, code: &SessionCode, token: &UserToken) -> Allocation {
        self.allocations.request_allocation(code, token).await.unwrap()
    }
}

//=========================================================================================
// Walkthrough
//=========================================================================================

#[tokio::test]
async fn two_members_swap_pdfs_and_discuss() {
    let ex = exchange_with(ScriptedCodes::new(&["AB12CD"]), ThreadReadPolicy::AssignedOnly);

    let session = ex.sessions.create_session().await.unwrap();
    assert_eq!(session.code.as_str(), "AB12CD");

    let t1 = ex.tokens.join(&session.code).await.unwrap().user_token;
    let t2 = ex.tokens.join(&session.code).await.unwrap().user_token;
    assert_ne!(t1, t2);

    let a = ex.upload(&session.code, &t1, "a.pdf").await;
    let b = ex.upload(&session.code, &t2, "b.pdf").await;

    let first = ex.allocate(&session.code, &t1).await;
    assert_eq!(first, Allocation::Assigned(b.clone()));
    let second = ex.allocate(&session.code, &t2).await;
    assert_eq!(second, Allocation::Assigned(a.clone()));
    let again = ex.allocate(&session.code, &t1).await;
    assert_eq!(again, Allocation::AlreadyAssigned(b.clone()));

    let sent = ex
        .messages
        .append(&session.code, b.id, &t1, "hi")
        .await
        .unwrap();
    assert_eq!(sent.text, "hi");
    assert_eq!(sent.pdf_id, b.id);

    let err = ex
        .messages
        .append(&session.code, a.id, &t1, "not my thread")
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Unauthorized));

    let (_, stats) = ex.sessions.overview(&session.code).await.unwrap();
    assert_eq!((stats.members, stats.uploads), (2, 2));
}

//=========================================================================================
// Sessions and Tokens
//=========================================================================================

#[tokio::test]
async fn code_collisions_are_retried_invisibly() {
    let ex = exchange_with(
        ScriptedCodes::new(&["AAAAAA", "AAAAAA", "AAAAAA", "BBBBBB"]),
        ThreadReadPolicy::AssignedOnly,
    );
    let first = ex.sessions.create_session().await.unwrap();
    let second = ex.sessions.create_session().await.unwrap();
    assert_eq!(first.code.as_str(), "AAAAAA");
    assert_eq!(second.code.as_str(), "BBBBBB");
}

#[tokio::test]
async fn exhausted_code_space_is_reported() {
    let ex = exchange_with(ScriptedCodes::new(&["AAAAAA"]), ThreadReadPolicy::AssignedOnly);
    ex.sessions.create_session().await.unwrap();
    let err = ex.sessions.create_session().await.unwrap_err();
    assert!(matches!(err, ExchangeError::CodeSpaceExhausted(n) if n == CODE_RETRY_BUDGET));
}

#[tokio::test]
async fn joining_an_unknown_session_fails() {
    let ex = exchange();
    let err = ex
        .tokens
        .join(&SessionCode::from_user_input("NOPE42"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::SessionNotFound));
}

#[tokio::test]
async fn tokens_only_validate_against_their_session() {
    let ex = exchange();
    let (s1, t1) = ex.session_with_members(1).await;
    let (s2, t2) = ex.session_with_members(1).await;

    assert!(ex.tokens.validate(&s1, &t1[0]).await.is_ok());
    assert!(ex.tokens.validate(&s2, &t2[0]).await.is_ok());
    assert!(matches!(
        ex.tokens.validate(&s2, &t1[0]).await,
        Err(ExchangeError::Unauthorized)
    ));
    assert!(matches!(
        ex.tokens.validate(&s1, &UserToken::mint()).await,
        Err(ExchangeError::Unauthorized)
    ));
}

#[tokio::test]
async fn lowercase_codes_find_the_session() {
    let ex = exchange_with(ScriptedCodes::new(&["AB12CD"]), ThreadReadPolicy::AssignedOnly);
    ex.sessions.create_session().await.unwrap();
    let typed = SessionCode::from_user_input(" ab12cd ");
    assert!(ex.tokens.join(&typed).await.is_ok());
}

//=========================================================================================
// Uploads
//=========================================================================================

#[tokio::test]
async fn second_upload_is_rejected() {
    let ex = exchange();
    let (code, members) = ex.session_with_members(1).await;
    ex.upload(&code, &members[0], "first.pdf").await;

    let err = ex
        .uploads
        .upload(&code, &members[0], "second.pdf", pdf_bytes("second"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::AlreadyUploaded));
    assert!(err.to_string().contains("only upload one PDF"));

    let assets = ex.uploads.list_by_session(&code, &members[0]).await.unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].filename, "first.pdf");

    let own = ex.uploads.own_upload(&code, &members[0]).await.unwrap();
    assert_eq!(own.map(|a| a.id), Some(assets[0].id));
}

#[tokio::test]
async fn non_pdf_and_empty_uploads_are_rejected() {
    let ex = exchange();
    let (code, members) = ex.session_with_members(1).await;

    let err = ex
        .uploads
        .upload(&code, &members[0], "photo.png", pdf_bytes("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::InvalidFormat(_)));

    let err = ex
        .uploads
        .upload(&code, &members[0], "empty.pdf", Bytes::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::InvalidFormat(_)));

    // A rejected attempt does not use up the member's upload.
    ex.upload(&code, &members[0], "real.pdf").await;
}

#[tokio::test]
async fn upload_requires_membership_of_the_session() {
    let ex = exchange();
    let (code, _) = ex.session_with_members(1).await;
    let (_, outsiders) = ex.session_with_members(1).await;

    let err = ex
        .uploads
        .upload(&code, &outsiders[0], "a.pdf", pdf_bytes("a"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Unauthorized));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_uploads_store_exactly_one_asset() {
    let ex = Arc::new(exchange());
    let (code, members) = ex.session_with_members(1).await;
    let token = members[0].clone();

    let attempts = (0..12).map(|i| {
        let (ex, code, token) = (ex.clone(), code.clone(), token.clone());
        tokio::spawn(async move {
            let name = format!("copy-{i}.pdf");
            ex.uploads.upload(&code, &token, &name, pdf_bytes(&name)).await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ExchangeError::AlreadyUploaded)));
    assert_eq!(ex.db.list_assets(&code).await.unwrap().len(), 1);
    // Bytes of the losing attempts are cleaned up.
    assert_eq!(ex.blobs.len().await, 1);
}

//=========================================================================================
// Allocation
//=========================================================================================

#[tokio::test]
async fn nothing_eligible_yields_none_available_without_a_phantom_assignment() {
    let ex = exchange();
    let (code, members) = ex.session_with_members(2).await;

    // Nobody uploaded yet.
    assert_eq!(ex.allocate(&code, &members[0]).await, Allocation::NoneAvailable);

    // Only the requester's own upload exists.
    ex.upload(&code, &members[0], "mine.pdf").await;
    assert_eq!(ex.allocate(&code, &members[0]).await, Allocation::NoneAvailable);
    assert!(ex
        .allocations
        .my_assignment(&code, &members[0])
        .await
        .unwrap()
        .is_none());

    // Once someone else uploads, the request succeeds.
    let theirs = ex.upload(&code, &members[1], "theirs.pdf").await;
    assert_eq!(
        ex.allocate(&code, &members[0]).await,
        Allocation::Assigned(theirs)
    );
}

#[tokio::test]
async fn members_never_receive_their_own_upload() {
    let ex = exchange();
    let (code, members) = ex.session_with_members(10).await;
    for (i, token) in members.iter().enumerate() {
        ex.upload(&code, token, &format!("doc-{i}.pdf")).await;
    }

    for token in &members {
        let pdf = ex
            .allocate(&code, token)
            .await
            .into_pdf()
            .expect("nine other PDFs are eligible");
        assert_ne!(pdf.uploader_token, *token);
    }
}

#[tokio::test]
async fn allocation_is_stable_across_later_uploads() {
    let ex = exchange();
    let (code, members) = ex.session_with_members(4).await;
    ex.upload(&code, &members[1], "one.pdf").await;

    let first = ex.allocate(&code, &members[0]).await.into_pdf().unwrap();
    ex.upload(&code, &members[2], "two.pdf").await;
    ex.upload(&code, &members[3], "three.pdf").await;

    for _ in 0..10 {
        let again = ex.allocate(&code, &members[0]).await;
        assert_eq!(again, Allocation::AlreadyAssigned(first.clone()));
    }
    let (assignment, pdf) = ex
        .allocations
        .my_assignment(&code, &members[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assignment.pdf_id, first.id);
    assert_eq!(pdf, first);
}

#[tokio::test]
async fn one_pdf_can_fan_out_to_many_readers() {
    let ex = exchange();
    let (code, members) = ex.session_with_members(6).await;
    let shared = ex.upload(&code, &members[0], "shared.pdf").await;

    for reader in &members[1..] {
        assert_eq!(
            ex.allocate(&code, reader).await,
            Allocation::Assigned(shared.clone())
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_commit_one_assignment() {
    let ex = Arc::new(exchange());
    let (code, members) = ex.session_with_members(9).await;
    for (i, token) in members[1..].iter().enumerate() {
        ex.upload(&code, token, &format!("doc-{i}.pdf")).await;
    }
    let requester = members[0].clone();

    let requests = (0..32).map(|_| {
        let (ex, code, token) = (ex.clone(), code.clone(), requester.clone());
        tokio::spawn(async move { ex.allocations.request_allocation(&code, &token).await })
    });
    let results: Vec<Allocation> = join_all(requests)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let created = results
        .iter()
        .filter(|a| matches!(a, Allocation::Assigned(_)))
        .count();
    assert_eq!(created, 1);

    let ids: HashSet<_> = results
        .iter()
        .map(|a| a.pdf().expect("PDFs are available").id)
        .collect();
    assert_eq!(ids.len(), 1);

    let committed = ex
        .db
        .get_assignment(&code, &requester)
        .await
        .unwrap()
        .unwrap();
    assert!(ids.contains(&committed.pdf_id));
}

//=========================================================================================
// Messages
//=========================================================================================

/// A session where member 0 uploaded and member 1 is assigned to that PDF.
async fn thread_fixture(ex: &Exchange) -> (SessionCode, UserToken, UserToken, PdfAsset) {
    let (code, members) = ex.session_with_members(2).await;
    let pdf = ex.upload(&code, &members[0], "topic.pdf").await;
    assert_eq!(
        ex.allocate(&code, &members[1]).await,
        Allocation::Assigned(pdf.clone())
    );
    (code, members[0].clone(), members[1].clone(), pdf)
}

#[tokio::test]
async fn messages_are_ordered_and_limited() {
    let ex = exchange();
    let (code, _, reader, pdf) = thread_fixture(&ex).await;

    for i in 0..5 {
        ex.messages
            .append(&code, pdf.id, &reader, &format!("message {i}"))
            .await
            .unwrap();
    }

    let all = ex.messages.list(&code, pdf.id, &reader, None).await.unwrap();
    assert_eq!(all.len(), 5);
    assert!(all.windows(2).all(|w| w[0].created_at < w[1].created_at));

    let recent = ex
        .messages
        .list(&code, pdf.id, &reader, Some(3))
        .await
        .unwrap();
    let texts: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["message 2", "message 3", "message 4"]);
}

#[tokio::test]
async fn limit_is_honoured_exactly() {
    let ex = exchange();
    let (code, _, reader, pdf) = thread_fixture(&ex).await;
    for i in 0..3 {
        ex.messages
            .append(&code, pdf.id, &reader, &format!("message {i}"))
            .await
            .unwrap();
    }

    let none = ex
        .messages
        .list(&code, pdf.id, &reader, Some(0))
        .await
        .unwrap();
    assert!(none.is_empty());

    let none = ex
        .messages
        .list_for_reader(&code, &reader, None, Some(0))
        .await
        .unwrap();
    assert!(none.is_empty());

    let err = ex
        .messages
        .list(&code, pdf.id, &reader, Some(MAX_MESSAGE_LIMIT + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::InvalidFormat(_)));
}

#[tokio::test]
async fn blank_messages_are_rejected() {
    let ex = exchange();
    let (code, _, reader, pdf) = thread_fixture(&ex).await;
    let err = ex
        .messages
        .append(&code, pdf.id, &reader, "   \n")
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::EmptyMessage));
}

#[tokio::test]
async fn uploader_access_follows_the_read_policy() {
    let strict = exchange();
    let (code, uploader, reader, pdf) = thread_fixture(&strict).await;
    strict
        .messages
        .append(&code, pdf.id, &reader, "thoughts?")
        .await
        .unwrap();
    assert!(matches!(
        strict.messages.list(&code, pdf.id, &uploader, None).await,
        Err(ExchangeError::Unauthorized)
    ));

    let lenient = exchange_with(RandomCodes::default(), ThreadReadPolicy::AssignedOrUploader);
    let (code, uploader, reader, pdf) = thread_fixture(&lenient).await;
    lenient
        .messages
        .append(&code, pdf.id, &reader, "thoughts?")
        .await
        .unwrap();
    let seen = lenient
        .messages
        .list(&code, pdf.id, &uploader, None)
        .await
        .unwrap();
    assert_eq!(seen.len(), 1);

    // Reading is not writing: the uploader still cannot post without an assignment.
    assert!(matches!(
        lenient.messages.append(&code, pdf.id, &uploader, "hi").await,
        Err(ExchangeError::Unauthorized)
    ));
}

#[tokio::test]
async fn default_thread_is_the_readers_assignment() {
    let ex = exchange();
    let (code, uploader, reader, pdf) = thread_fixture(&ex).await;
    ex.messages
        .append(&code, pdf.id, &reader, "hello")
        .await
        .unwrap();

    let mine = ex
        .messages
        .list_for_reader(&code, &reader, None, None)
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);

    // The uploader holds no assignment, so there is no default thread.
    let none = ex
        .messages
        .list_for_reader(&code, &uploader, None, None)
        .await
        .unwrap();
    assert!(none.is_empty());
}

//=========================================================================================
// Downloads
//=========================================================================================

#[tokio::test]
async fn downloads_are_limited_to_uploader_and_assigned_readers() {
    let ex = exchange();
    let (code, uploader, reader, pdf) = thread_fixture(&ex).await;
    let bystander = ex.tokens.join(&code).await.unwrap().user_token;
    let (_, outsiders) = ex.session_with_members(1).await;

    for token in [&uploader, &reader] {
        let (asset, stream) = ex.uploads.open(pdf.id, token).await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(asset.id, pdf.id);
        assert_eq!(chunks.concat(), pdf_bytes("topic.pdf").to_vec());
    }

    for token in [&bystander, &outsiders[0]] {
        assert!(matches!(
            ex.uploads.open(pdf.id, token).await,
            Err(ExchangeError::Unauthorized)
        ));
    }

    assert!(matches!(
        ex.uploads.open(uuid::Uuid::new_v4(), &reader).await,
        Err(ExchangeError::NotFound(_))
    ));
}
