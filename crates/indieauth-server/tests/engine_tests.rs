//! Engine tests: the authorization and token steps over the memory and document stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use indieauth_server::credentials::PasswordTable;
use indieauth_server::engine::{
    APPROVE, AuthorizationForm, AuthorizationOutcome, AuthorizationRequest, Engine, JwtSigner, ResponseType,
    TokenMinter, TokenRequest,
};
use indieauth_server::error::{AuthError, StoreError, StoreResult};
use indieauth_server::store::{CredentialStore, DocumentStore, Expiry, MemoryStore, Record, Table};

const ME: &str = "https://example.com";
const CLIENT_ID: &str = "https://app.example";
const REDIRECT_URI: &str = "https://app.example/cb";

fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(Expiry::new(Duration::from_secs(120), None)))
}

fn stateless(store: Arc<dyn CredentialStore>) -> Engine {
    Engine::new(store, TokenMinter::Stateless(JwtSigner::new("HS256", b"secret", None).unwrap()))
}

fn stateful(store: Arc<dyn CredentialStore>) -> Engine {
    Engine::new(store, TokenMinter::Stateful)
}

fn approval(response_type: ResponseType) -> AuthorizationForm {
    AuthorizationForm {
        me: Some(ME.into()),
        client_id: CLIENT_ID.into(),
        redirect_uri: REDIRECT_URI.into(),
        state: Some("xyz".into()),
        response_type,
        approve: Some(APPROVE.into()),
        ..Default::default()
    }
}

fn token_request(code: &str) -> TokenRequest {
    TokenRequest {
        code: code.into(),
        me: ME.into(),
        redirect_uri: REDIRECT_URI.into(),
        client_id: CLIENT_ID.into(),
    }
}

/// Approve and return the issued code.
async fn approve(engine: &Engine, form: AuthorizationForm) -> String {
    match engine.authorize(form).await.unwrap() {
        AuthorizationOutcome::Redirect { code, .. } => code,
        other => panic!("expected redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_prompt_normalizes_me() {
    let engine = stateless(memory_store());
    let request = AuthorizationRequest {
        me: ME.into(),
        client_id: CLIENT_ID.into(),
        redirect_uri: REDIRECT_URI.into(),
        state: None,
        response_type: ResponseType::Id,
        scope: "create".into(),
    };

    let prompt = engine.prompt(request.clone()).unwrap();
    assert_eq!(prompt.me, "https://example.com/");
    assert_eq!(prompt.client_id, request.client_id);
    assert_eq!(prompt.redirect_uri, request.redirect_uri);
    assert_eq!(prompt.scope, "create");
}

#[tokio::test]
async fn test_prompt_rejects_relative_urls() {
    let engine = stateless(memory_store());
    let request = AuthorizationRequest {
        me: "example.com".into(),
        client_id: CLIENT_ID.into(),
        redirect_uri: REDIRECT_URI.into(),
        state: None,
        response_type: ResponseType::Id,
        scope: "create".into(),
    };
    assert!(matches!(engine.prompt(request), Err(AuthError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_example_scenario() {
    let mut passwords = PasswordTable::new("salt");
    passwords.insert_password(ME, "hunter2");
    let engine = stateless(memory_store()).with_passwords(passwords);

    let mut form = approval(ResponseType::Code);
    form.state = None;
    form.password = Some("hunter2".into());

    let AuthorizationOutcome::Redirect { location, code } = engine.authorize(form).await.unwrap() else {
        panic!("expected redirect");
    };
    assert_eq!(code.len(), 36);
    assert!(uuid::Uuid::parse_str(&code).is_ok());
    assert_eq!(location, format!("{REDIRECT_URI}?code={code}&state="));

    let issued = engine.redeem(token_request(&code)).await.unwrap();
    assert_eq!(issued.me, "https://example.com/");
    assert_eq!(issued.scope, "create");
    assert!(!issued.access_token.is_empty());

    let again = engine.redeem(token_request(&code)).await;
    assert!(matches!(again, Err(AuthError::InvalidCode)));
    assert_eq!(again.unwrap_err().status_code(), 401);
}

#[tokio::test]
async fn test_verify_code_is_read_only() {
    let engine = stateless(memory_store());
    let code = approve(&engine, approval(ResponseType::Id)).await;

    let verify = AuthorizationForm {
        client_id: CLIENT_ID.into(),
        redirect_uri: REDIRECT_URI.into(),
        code: Some(code.clone()),
        ..Default::default()
    };
    for _ in 0..2 {
        let outcome = engine.authorize(verify.clone()).await.unwrap();
        assert_eq!(
            outcome,
            AuthorizationOutcome::Verified(indieauth_server::engine::Identity { me: "https://example.com/".into() })
        );
    }
}

#[tokio::test]
async fn test_unknown_code_rejected_at_both_steps() {
    let engine = stateless(memory_store());

    let err = engine.verify_code("nope", REDIRECT_URI, CLIENT_ID).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCode));

    let err = engine.redeem(token_request("nope")).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCode));
}

#[tokio::test]
async fn test_composite_key_isolation() {
    let engine = stateless(memory_store());
    let code = approve(&engine, approval(ResponseType::Code)).await;

    let err = engine.verify_code(&code, "https://app.example/other", CLIENT_ID).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCode));

    let err = engine.verify_code(&code, REDIRECT_URI, "https://evil.example").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCode));

    let mut request = token_request(&code);
    request.client_id = "https://evil.example".into();
    assert!(matches!(engine.redeem(request).await, Err(AuthError::InvalidCode)));

    // The mismatched attempts did not consume the grant.
    assert!(engine.redeem(token_request(&code)).await.is_ok());
}

#[tokio::test]
async fn test_wrong_password_leaves_store_untouched() {
    let store = memory_store();
    let mut passwords = PasswordTable::new("salt");
    passwords.insert_password(ME, "hunter2");
    let engine = stateless(store.clone()).with_passwords(passwords);

    let mut form = approval(ResponseType::Code);
    form.password = Some("wrong".into());
    let err = engine.authorize(form.clone()).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(err.status_code(), 403);

    form.password = None;
    assert!(matches!(engine.authorize(form).await, Err(AuthError::InvalidCredentials)));

    assert_eq!(store.len(Table::AuthCodes).await, 0);
}

#[tokio::test]
async fn test_post_without_code_or_approval_is_bad_request() {
    let engine = stateless(memory_store());
    let mut form = approval(ResponseType::Code);
    form.approve = Some("Deny".into());

    let err = engine.authorize(form).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest(_)));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_stateless_token_scope_fidelity() {
    let engine = stateless(memory_store());
    let mut form = approval(ResponseType::Code);
    form.scope = Some("create update".into());
    let code = approve(&engine, form).await;

    let issued = engine.redeem(token_request(&code)).await.unwrap();
    assert_eq!(issued.scope, "create update");

    let info = engine.verify(Some(&format!("Bearer {}", issued.access_token))).await.unwrap();
    assert_eq!(info.me, "https://example.com/");
    assert_eq!(info.client_id, CLIENT_ID);
    assert_eq!(info.scope, "create update");
}

#[tokio::test]
async fn test_stateful_token_roundtrip() {
    let store = memory_store();
    let engine = stateful(store.clone());
    let code = approve(&engine, approval(ResponseType::Code)).await;

    let issued = engine.redeem(token_request(&code)).await.unwrap();
    assert_eq!(issued.access_token.len(), 64);
    assert_eq!(store.len(Table::Tokens).await, 1);
    assert_eq!(store.len(Table::AuthCodes).await, 0);

    let info = engine.verify(Some(&format!("bearer {}", issued.access_token))).await.unwrap();
    assert_eq!(info.me, "https://example.com/");
    assert_eq!(info.scope, "create");

    assert!(matches!(engine.verify(Some("Bearer unknown")).await, Err(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_identification_tokens_rejected() {
    let engine = stateless(memory_store());
    let code = approve(&engine, approval(ResponseType::Id)).await;

    let issued = engine.redeem(token_request(&code)).await.unwrap();
    let err = engine.verify(Some(&format!("Bearer {}", issued.access_token))).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
}

#[tokio::test]
async fn test_stateful_identification_tokens_rejected() {
    let store = memory_store();
    let engine = stateful(store.clone());
    let code = approve(&engine, approval(ResponseType::Id)).await;

    let issued = engine.redeem(token_request(&code)).await.unwrap();
    assert_eq!(store.len(Table::Tokens).await, 1);

    let err = engine.verify(Some(&format!("Bearer {}", issued.access_token))).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn test_stateful_tokens_on_document_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path().join("indieauth.db"), Expiry::new(Duration::from_secs(120), None))
        .unwrap();
    let engine = stateful(Arc::new(store));
    let code = approve(&engine, approval(ResponseType::Code)).await;

    let issued = engine.redeem(token_request(&code)).await.unwrap();
    assert_eq!(issued.access_token.len(), 64);

    let info = engine.verify(Some(&format!("Bearer {}", issued.access_token))).await.unwrap();
    assert_eq!(info.me, "https://example.com/");
    assert_eq!(info.client_id, CLIENT_ID);
    assert_eq!(info.scope, "create");

    assert!(matches!(engine.redeem(token_request(&code)).await, Err(AuthError::InvalidCode)));
}

#[tokio::test]
async fn test_malformed_authorization_headers() {
    let engine = stateless(memory_store());
    for header in [None, Some(""), Some("Bearer"), Some("Basic dXNlcjpwYXNz"), Some("Bearer not.a.jwt")] {
        let err = engine.verify(header).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken), "{header:?}");
        assert_eq!(err.status_code(), 403);
    }
}

#[tokio::test]
async fn test_subject_mismatch_leaves_grant_intact() {
    let engine = stateless(memory_store());
    let code = approve(&engine, approval(ResponseType::Code)).await;

    let mut request = token_request(&code);
    request.me = "https://someone-else.example".into();
    assert!(matches!(engine.redeem(request).await, Err(AuthError::InvalidCode)));

    // Normalization makes the trailing slash irrelevant.
    let mut request = token_request(&code);
    request.me = "https://example.com/".into();
    assert!(engine.redeem(request).await.is_ok());
}

#[tokio::test]
async fn test_subject_match_can_be_disabled() {
    let engine = stateless(memory_store()).with_subject_match(false);
    let code = approve(&engine, approval(ResponseType::Code)).await;

    let mut request = token_request(&code);
    request.me = "https://someone-else.example".into();
    let issued = engine.redeem(request).await.unwrap();
    assert_eq!(issued.me, "https://example.com/");
}

#[tokio::test]
async fn test_concurrent_redemption_single_winner() {
    let engine = Arc::new(stateful(memory_store()));
    let code = approve(&engine, approval(ResponseType::Code)).await;

    let (a, b) = tokio::join!(engine.redeem(token_request(&code)), engine.redeem(token_request(&code)));
    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_code_expires() {
    let engine = stateless(memory_store());
    let code = approve(&engine, approval(ResponseType::Code)).await;

    tokio::time::advance(Duration::from_secs(121)).await;

    assert!(matches!(engine.redeem(token_request(&code)).await, Err(AuthError::InvalidCode)));
}

/// Memory store whose `remove` can be made to fail for authorization codes.
struct FlakyStore {
    inner: MemoryStore,
    fail_code_removal: AtomicBool,
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn put(&self, table: Table, key: &str, record: Record) -> StoreResult<()> {
        self.inner.put(table, key, record).await
    }

    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Record>> {
        self.inner.get(table, key).await
    }

    async fn remove(&self, table: Table, key: &str) -> StoreResult<()> {
        if table == Table::AuthCodes && self.fail_code_removal.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("disk full"));
        }
        self.inner.remove(table, key).await
    }

    fn backend(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test]
async fn test_failed_consumption_rolls_back_token() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(Expiry::new(Duration::from_secs(120), None)),
        fail_code_removal: AtomicBool::new(true),
    });
    let engine = stateful(store.clone());
    let code = approve(&engine, approval(ResponseType::Code)).await;

    let err = engine.redeem(token_request(&code)).await.unwrap_err();
    assert!(matches!(err, AuthError::StoreUnavailable(_)));
    assert_eq!(err.status_code(), 500);
    assert_eq!(store.inner.len(Table::Tokens).await, 0);

    store.fail_code_removal.store(false, Ordering::SeqCst);
    assert!(engine.redeem(token_request(&code)).await.is_ok());
}
