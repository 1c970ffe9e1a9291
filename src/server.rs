//!
//! skeletonkey HTTP server
//! -----------------------
//! Axum router exposing the skeleton key flows.
//!
//! Responsibilities:
//! - Operator (admin realm) password login/logout with a session cookie + CSRF token model.
//! - Issuance endpoint for operators and the eligible-targets query.
//! - Site entry point that runs verification before looking at the site session.
//! - Background sweeping of expired credentials and sessions.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::SkeletonKeyConfig;
use crate::cookies::{CookieJar, CookieSpec, RequestCookies};
use crate::error::{AppError, AppResult};
use crate::identity::{
    AuthProvider, Identity, IdentityId, LocalAuthProvider, LoginRequest, MemoryDirectory, Realm,
    Session, SessionManager, SharedDirectory,
};
use crate::service::SkeletonKey;
use crate::storage::FileCredentialStore;
use crate::verification::Outcome;

pub const ADMIN_SESSION_COOKIE: &str = "skeletonkey_admin_session";
pub const SITE_SESSION_COOKIE: &str = "skeletonkey_site_session";
pub const CREDENTIALS_FILE: &str = "credentials.bin";
pub const IDENTITIES_FILE: &str = "identities.json";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<SkeletonKey>,
    pub directory: SharedDirectory,
    pub sessions: SessionManager,
    pub provider: Arc<dyn AuthProvider>,
}

impl AppState {
    /// `directory` must be the one `keys` was built with.
    pub fn new(keys: Arc<SkeletonKey>, directory: SharedDirectory, sessions: SessionManager) -> Self {
        let provider = Arc::new(LocalAuthProvider::new(directory.clone(), sessions.clone()));
        Self { keys, directory, sessions, provider }
    }
}

/// Everything `run` needs; assembled by the binary from flags, env and the config file.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub directory_path: Option<PathBuf>,
    pub config: SkeletonKeyConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(site_entry))
        .route("/logout", post(site_logout))
        .route("/health", get(|| async { "skeletonkey ok" }))
        .route("/admin/login", post(admin_login))
        .route("/admin/logout", post(admin_logout))
        .route("/admin/csrf", get(get_csrf))
        .route("/admin/skeletonkey", get(issue_skeleton_key))
        .route("/admin/skeletonkey/targets", post(login_targets))
        .with_state(state)
}

/// Background sweep period; `None` when the sweeper is switched off.
fn sweep_period(secs: u64) -> Option<Duration> { (secs > 0).then(|| Duration::from_secs(secs)) }

/// Start the HTTP server: open the credential store and directory, run the startup
/// maintenance, spawn the sweeper and serve until the listener fails.
pub async fn run(settings: ServerSettings) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "skeletonkey starting: http_port={}, data_dir={:?}, directory={:?}, enabled={}",
        settings.http_port, settings.data_dir, settings.directory_path, settings.config.enabled
    );
    std::fs::create_dir_all(&settings.data_dir)
        .with_context(|| format!("Failed to create or access data dir: {}", settings.data_dir.display()))?;

    let store_path = settings.data_dir.join(CREDENTIALS_FILE);
    let store = FileCredentialStore::open(&store_path)
        .with_context(|| format!("While opening credential store: {}", store_path.display()))?;
    let directory = Arc::new(load_directory(settings.directory_path.as_deref(), &settings.data_dir)?);
    info!(target: "startup", identities = directory.len(), "identity directory loaded");

    let sweep_every = sweep_period(settings.config.sweep_interval_secs);
    let keys = Arc::new(SkeletonKey::with_defaults(settings.config, Arc::new(store), directory.clone()));
    let removed = keys.startup().context("While running credential startup maintenance")?;
    info!(target: "startup", removed, "credential store ready");

    let sessions = SessionManager::default();
    if let Some(sweep_every) = sweep_every {
        let keys = keys.clone();
        let sessions = sessions.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(sweep_every).await;
                match keys.sweep() {
                    Ok(n) if n > 0 => debug!(target: "skeletonkey::store", removed = n, "credential_sweep"),
                    Ok(_) => {}
                    Err(e) => warn!(target: "skeletonkey::store", "credential sweep failed: {}", e),
                }
                let expired = sessions.sweep();
                if expired > 0 { debug!(target: "skeletonkey::session", expired, "session_sweep"); }
            }
        });
    } else {
        info!(target: "startup", "background sweeper disabled; expired credentials are purged during verification");
    }

    let app = router(AppState::new(keys, directory, sessions));
    let addr: SocketAddr = format!("0.0.0.0:{}", settings.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Explicit directory file, else `<data_dir>/identities.json`, else a seeded default.
fn load_directory(path: Option<&Path>, data_dir: &Path) -> anyhow::Result<MemoryDirectory> {
    if let Some(p) = path {
        return MemoryDirectory::load(p);
    }
    let default_path = data_dir.join(IDENTITIES_FILE);
    if default_path.exists() {
        return MemoryDirectory::load(&default_path);
    }
    let seeded = MemoryDirectory::new(vec![
        Identity {
            id: 1,
            username: "admin".into(),
            name: "Administrator".into(),
            password_hash: crate::security::hash_secret("skeletonkey")?,
            groups: vec![8],
            ..Default::default()
        },
        Identity {
            id: 2,
            username: "demo".into(),
            name: "Demo User".into(),
            password_hash: crate::security::hash_secret("demo")?,
            groups: vec![2],
            ..Default::default()
        },
    ]);
    seeded.save(&default_path)?;
    warn!(target: "startup", "no identity directory found; created {} with default accounts", default_path.display());
    Ok(seeded)
}

#[derive(Debug, Deserialize)]
struct LoginPayload { username: String, password: String }

#[derive(Debug, Deserialize)]
struct TargetsPayload {
    #[serde(default)]
    candidates: Vec<IdentityId>,
}

fn user_agent(headers: &HeaderMap) -> String {
    headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("").to_string()
}

fn with_cookies(mut resp: Response, jar: &RequestCookies) -> Response {
    if let Err(e) = jar.write_set_cookie(resp.headers_mut()) {
        warn!("failed to write Set-Cookie headers: {}", e);
    }
    resp
}

fn session_from(state: &AppState, jar: &RequestCookies, realm: Realm) -> Option<Session> {
    let name = match realm { Realm::Admin => ADMIN_SESSION_COOKIE, Realm::Site => SITE_SESSION_COOKIE };
    let sid = jar.get(name)?;
    state.sessions.validate(realm, &sid)
}

fn csrf_ok(session: &Session, headers: &HeaderMap) -> bool {
    headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .map(|provided| provided == session.csrf_token)
        .unwrap_or(false)
}

/// Admin session plus a matching CSRF header.
fn require_operator(state: &AppState, jar: &RequestCookies, headers: &HeaderMap) -> AppResult<Session> {
    let session = session_from(state, jar, Realm::Admin)
        .ok_or_else(|| AppError::auth("unauthorized", "login required"))?;
    if !csrf_ok(&session, headers) {
        return Err(AppError::csrf("invalid_csrf", "invalid csrf"));
    }
    Ok(session)
}

/// Current directory entry for a session's principal.
fn requester_of(state: &AppState, session: &Session) -> AppResult<Identity> {
    state
        .directory
        .find_by_username(&session.principal.username)?
        .ok_or_else(|| AppError::auth("unauthorized", "account no longer exists"))
}

async fn admin_login(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<LoginPayload>) -> AppResult<Response> {
    let provider = state.provider.clone();
    let req = LoginRequest { username: payload.username, password: payload.password, ip: None };
    let result = tokio::task::spawn_blocking(move || provider.login(&req))
        .await
        .map_err(|e| AppError::internal("internal_error".to_string(), e.to_string()))?;
    let login = match result {
        Ok(l) => l,
        Err(e) => {
            info!(target: "skeletonkey::auth", "login refused: {}", e);
            return Err(AppError::auth("invalid_credentials", "invalid username or password"));
        }
    };

    let mut jar = RequestCookies::from_headers(&headers);
    if let Some(old) = jar.get(ADMIN_SESSION_COOKIE) { state.sessions.logout(&old); }
    jar.set(CookieSpec::scoped(ADMIN_SESSION_COOKIE, login.session.session_id.clone(), None, state.keys.config()))?;
    let body = Json(json!({"status": "ok", "csrf": login.session.csrf_token, "user": login.session.principal}));
    Ok(with_cookies(body.into_response(), &jar))
}

async fn admin_logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let mut jar = RequestCookies::from_headers(&headers);
    let session = require_operator(&state, &jar, &headers)?;
    state.sessions.logout(&session.session_id);
    jar.set(CookieSpec::removal(ADMIN_SESSION_COOKIE, state.keys.config()))?;
    Ok(with_cookies(Json(json!({"status": "ok"})).into_response(), &jar))
}

async fn get_csrf(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let jar = RequestCookies::from_headers(&headers);
    let session = session_from(&state, &jar, Realm::Admin)
        .ok_or_else(|| AppError::auth("unauthorized", "login required"))?;
    Ok(Json(json!({"status": "ok", "csrf": session.csrf_token})).into_response())
}

/// `GET /admin/skeletonkey?user_id=N`. Any unparsable id is refused like an unknown one.
async fn issue_skeleton_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> AppResult<Response> {
    let jar = RequestCookies::from_headers(&headers);
    let session = require_operator(&state, &jar, &headers)?;
    let requester = requester_of(&state, &session)?;
    let target_id: IdentityId = params.get("user_id").and_then(|v| v.trim().parse().ok()).unwrap_or(0);
    let client = state.keys.client_context(&user_agent(&headers));

    let keys = state.keys.clone();
    let (issued, jar) = tokio::task::spawn_blocking(move || {
        let mut jar = jar;
        let issued = keys.issuance().issue(&requester, target_id, &client, &mut jar);
        (issued, jar)
    })
    .await
    .map_err(|e| AppError::internal("internal_error".to_string(), e.to_string()))?;

    Ok(with_cookies(Json(json!({"data": [issued]})).into_response(), &jar))
}

async fn login_targets(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<TargetsPayload>) -> AppResult<Response> {
    let jar = RequestCookies::from_headers(&headers);
    let session = session_from(&state, &jar, Realm::Admin)
        .ok_or_else(|| AppError::auth("unauthorized", "login required"))?;
    let requester = requester_of(&state, &session)?;
    let ids = state.keys.eligible_targets(&requester, &payload.candidates)?;
    Ok(Json(json!({"loginUsers": ids})).into_response())
}

/// Site entry. A presented skeleton key always wins over an existing site session.
async fn site_entry(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let jar = RequestCookies::from_headers(&headers);
    let client = state.keys.client_context(&user_agent(&headers));

    let keys = state.keys.clone();
    let (outcome, mut jar) = tokio::task::spawn_blocking(move || {
        let mut jar = jar;
        let outcome = keys.verification().verify(&client, &mut jar);
        (outcome, jar)
    })
    .await
    .map_err(|e| AppError::internal("internal_error".to_string(), e.to_string()))?;

    match outcome {
        Outcome::Authenticated(principal) => {
            if let Some(old) = jar.get(SITE_SESSION_COOKIE) { state.sessions.logout(&old); }
            let session = state.sessions.issue(Realm::Site, principal, true)?;
            jar.set(CookieSpec::scoped(SITE_SESSION_COOKIE, session.session_id.clone(), None, state.keys.config()))?;
            let body = Json(json!({"status": "ok", "user": session.principal, "delegated": true}));
            Ok(with_cookies(body.into_response(), &jar))
        }
        Outcome::Rejected => {
            Ok(with_cookies(AppError::auth("login_failed", "login failed").into_response(), &jar))
        }
        Outcome::NoCredential => {
            let body = match session_from(&state, &jar, Realm::Site) {
                Some(session) if still_valid(&state, &session) => {
                    json!({"status": "ok", "user": session.principal, "delegated": session.delegated})
                }
                Some(session) => {
                    state.sessions.logout(&session.session_id);
                    jar.set(CookieSpec::removal(SITE_SESSION_COOKIE, state.keys.config()))?;
                    json!({"status": "anonymous"})
                }
                None => json!({"status": "anonymous"}),
            };
            Ok(with_cookies(Json(body).into_response(), &jar))
        }
    }
}

/// A site session dies with its owner's account, a credential reset or a password change.
fn still_valid(state: &AppState, session: &Session) -> bool {
    match state.directory.find_by_username(&session.principal.username) {
        Ok(Some(current)) => !current.require_reset && current.password_hash == session.principal.password_hash,
        Ok(None) => false,
        Err(e) => {
            warn!(target: "skeletonkey::session", "directory lookup failed: {}", e);
            false
        }
    }
}

async fn site_logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let mut jar = RequestCookies::from_headers(&headers);
    if let Some(sid) = jar.get(SITE_SESSION_COOKIE) {
        state.sessions.logout(&sid);
        jar.set(CookieSpec::removal(SITE_SESSION_COOKIE, state.keys.config()))?;
    }
    let client = state.keys.client_context(&user_agent(&headers));
    let discarded = state.keys.verification().discard(&client, &mut jar);
    if discarded { debug!(target: "skeletonkey::verify", "leftover skeleton key discarded at logout"); }
    Ok(with_cookies(Json(json!({"status": "ok"})).into_response(), &jar))
}
