use crate::{
    config::Config,
    dispatch::{Dispatcher, Reply},
    errors::{into_response, AppError},
    page::{self, Entry, PageView},
    repl::BANNER,
    security,
    session::{DeclinePrompter, Session},
};
use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use uuid::Uuid;

const SESSION_COOKIE: &str = "burrow_session";
/// Rate-limit bucket shared by every request without a live session cookie.
const ANONYMOUS: &str = "anonymous";

/// A browser's shell session plus what its page shows.
pub struct WebSession {
    pub session: Session,
    pub transcript: Vec<Entry>,
}

impl WebSession {
    fn new(session: Session) -> Self {
        Self { session, transcript: vec![banner()] }
    }
}

type SharedSession = Arc<Mutex<WebSession>>;

const SWEEP_EVERY: Duration = Duration::from_secs(60);

struct Slot {
    shared: SharedSession,
    last_seen: Instant,
    // breaks ties between equal instants
    seq: u64,
}

/// Live web sessions by cookie id. Idle entries are swept periodically and
/// the oldest is evicted once `max` is reached.
pub struct SessionTable {
    entries: HashMap<Uuid, Slot>,
    idle: Duration,
    max: usize,
    last_sweep: Instant,
    seq: u64,
}

impl SessionTable {
    fn new(idle: Duration, max: usize) -> Self {
        Self { entries: HashMap::new(), idle, max, last_sweep: Instant::now(), seq: 0 }
    }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    fn is_live(&self, id: &Uuid, now: Instant) -> bool {
        self.entries.get(id).is_some_and(|s| now.duration_since(s.last_seen) < self.idle)
    }

    /// Returns the session for `id` if it is still live, refreshing its idle clock.
    fn touch(&mut self, id: &Uuid, now: Instant) -> Option<SharedSession> {
        if !self.is_live(id, now) {
            self.entries.remove(id);
            return None;
        }
        self.seq += 1;
        let slot = self.entries.get_mut(id)?;
        slot.last_seen = now;
        slot.seq = self.seq;
        Some(slot.shared.clone())
    }

    fn insert(&mut self, id: Uuid, shared: SharedSession, now: Instant) {
        if self.entries.len() >= self.max {
            let oldest = self.entries.iter().min_by_key(|(_, s)| (s.last_seen, s.seq)).map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                tracing::debug!(session = %oldest, "web session evicted");
            }
        }
        self.seq += 1;
        self.entries.insert(id, Slot { shared, last_seen: now, seq: self.seq });
    }

    /// True when a sweep ran.
    fn sweep(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_sweep) < SWEEP_EVERY {
            return false;
        }
        let idle = self.idle;
        let before = self.entries.len();
        self.entries.retain(|_, s| now.duration_since(s.last_seen) < idle);
        self.last_sweep = now;
        tracing::debug!(dropped = before - self.entries.len(), live = self.entries.len(), "web sessions swept");
        true
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub root: PathBuf,
    pub dispatcher: Dispatcher,
    pub sessions: Arc<Mutex<SessionTable>>,
    pub rls: security::RateLimiters,
}

impl AppState {
    pub fn new(cfg: Config, root: PathBuf) -> Self {
        let rls = security::RateLimiters::from_limits(&cfg.limits);
        let sessions = SessionTable::new(Duration::from_secs(cfg.limits.session_idle_secs), cfg.limits.max_sessions);
        Self {
            cfg: Arc::new(cfg),
            root,
            dispatcher: Dispatcher::new(),
            sessions: Arc::new(Mutex::new(sessions)),
            rls,
        }
    }

    fn table(&self) -> Result<std::sync::MutexGuard<'_, SessionTable>, AppError> {
        self.sessions.lock().map_err(|_| AppError::Internal("session table poisoned".into()))
    }

    /// The caller's cookie id, if it names a live session.
    fn known_session(&self, headers: &HeaderMap) -> Result<Option<Uuid>, AppError> {
        let table = self.table()?;
        Ok(session_cookie(headers).filter(|id| table.is_live(id, Instant::now())))
    }

    /// Looks up the caller's session by cookie, creating one if the cookie is
    /// missing or stale. The bool is true when a cookie must be set.
    fn session_for(&self, headers: &HeaderMap) -> Result<(Uuid, SharedSession, bool), AppError> {
        let now = Instant::now();
        let mut table = self.table()?;
        if table.sweep(now) {
            self.rls.retain_recent();
        }
        if let Some(id) = session_cookie(headers) {
            if let Some(s) = table.touch(&id, now) {
                return Ok((id, s, false));
            }
        }
        let session = Session::from_config(&self.cfg, &self.root, Box::new(DeclinePrompter))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let id = Uuid::new_v4();
        let shared = Arc::new(Mutex::new(WebSession::new(session)));
        table.insert(id, shared.clone(), now);
        tracing::info!(session = %id, live = table.len(), "web session started");
        Ok((id, shared, true))
    }
}

pub async fn serve(cfg: Config, root: PathBuf) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = format!("{}:{}", cfg.server.bind_addr, cfg.server.port)
        .parse()
        .context("parsing bind address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_on(listener, AppState::new(cfg, root)).await
}

pub async fn serve_on(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

pub fn build_router(shared: AppState) -> Router {
    let limit_bytes = shared.cfg.limits.max_request_kb * 1024;
    Router::new()
        .route("/", get(index))
        .route("/run", post(run_form))
        .route("/clear", post(clear))
        .route("/api/run", post(api_run))
        .route("/healthz", get(health))
        .layer(RequestBodyLimitLayer::new(limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

#[derive(Debug, Deserialize)]
pub struct RunForm {
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    #[serde(flatten)]
    pub reply: Reply,
    pub cwd: String,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status":"ok"})))
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = state.rls.check(None) {
        return into_response(e).into_response();
    }
    let (id, ws, fresh) = match state.session_for(&headers) {
        Ok(s) => s,
        Err(e) => return into_response(e).into_response(),
    };
    let Ok(guard) = ws.lock() else {
        return into_response(AppError::Internal("session lock poisoned".into())).into_response();
    };
    let cwd = guard.session.display_cwd();
    let html = page::render(&PageView {
        transcript: &guard.transcript,
        history: guard.session.history(),
        cwd: &cwd,
        browser: page::browse(&state.root),
    });
    drop(guard);
    with_cookie(Html(html).into_response(), id, fresh)
}

async fn run_form(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<RunForm>) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4();
    let (id, ws, fresh) = match guard_form(&state, &headers) {
        Ok(s) => s,
        Err(e) => {
            audit(&request_id, None, &form.command, "deny", e.code(), started);
            return into_response(e).into_response();
        }
    };
    let command = form.command.trim().to_string();
    if !command.is_empty() {
        match execute(&state, ws, command.clone()).await {
            Ok(out) => audit(&request_id, Some(&id), &command, "allow", first_code(&out.reply), started),
            Err(e) => {
                audit(&request_id, Some(&id), &command, "error", e.code(), started);
                return into_response(e).into_response();
            }
        }
    }
    with_cookie(Redirect::to("/").into_response(), id, fresh)
}

async fn clear(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, ws, fresh) = match guard_form(&state, &headers) {
        Ok(s) => s,
        Err(e) => return into_response(e).into_response(),
    };
    match ws.lock() {
        Ok(mut guard) => guard.transcript = vec![banner()],
        Err(_) => return into_response(AppError::Internal("session lock poisoned".into())).into_response(),
    }
    with_cookie(Redirect::to("/").into_response(), id, fresh)
}

async fn api_run(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<RunRequest>) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4();
    if let Err(e) = authorize_api(&state, &headers) {
        audit(&request_id, None, &req.command, "deny", e.code(), started);
        return into_response(e).into_response();
    }
    let (id, ws, fresh) = match guard_form(&state, &headers) {
        Ok(s) => s,
        Err(e) => {
            audit(&request_id, None, &req.command, "deny", e.code(), started);
            return into_response(e).into_response();
        }
    };
    match execute(&state, ws, req.command.clone()).await {
        Ok(out) => {
            audit(&request_id, Some(&id), &req.command, "allow", first_code(&out.reply), started);
            with_cookie((StatusCode::OK, Json(out)).into_response(), id, fresh)
        }
        Err(e) => {
            audit(&request_id, Some(&id), &req.command, "error", e.code(), started);
            into_response(e).into_response()
        }
    }
}

/// Checks shared by every state-changing route, then resolves the session.
fn guard_form(state: &AppState, headers: &HeaderMap) -> Result<(Uuid, SharedSession, bool), AppError> {
    security::check_origin(headers, &state.cfg.auth.allowed_origins)?;
    security::content_length_ok(headers, state.cfg.limits.max_request_kb)?;
    // charged before a session exists, so dropping the cookie buys no fresh bucket
    let key = state.known_session(headers)?.map_or_else(|| ANONYMOUS.to_string(), |id| id.to_string());
    state.rls.check(Some(&key))?;
    state.session_for(headers)
}

fn authorize_api(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    match &state.cfg.auth.bearer_token {
        Some(token) => security::require_bearer(headers, token),
        None => Ok(()),
    }
}

/// Commands block on the filesystem, so they run on the blocking pool while
/// holding only their own session's lock.
async fn execute(state: &AppState, ws: SharedSession, command: String) -> Result<RunResponse, AppError> {
    let dispatcher = state.dispatcher.clone();
    tokio::task::spawn_blocking(move || -> Result<RunResponse, AppError> {
        let mut guard = ws.lock().map_err(|_| AppError::Internal("session lock poisoned".into()))?;
        let web = &mut *guard;
        let reply = dispatcher.execute(&mut web.session, &command);
        let mut shown = reply.render();
        if reply.exit {
            shown.push_str("exit\n");
        }
        web.transcript.push(Entry { command: Some(command), output: shown });
        Ok(RunResponse { reply, cwd: web.session.display_cwd() })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

fn banner() -> Entry {
    Entry { command: None, output: format!("{BANNER}\n") }
}

fn session_cookie(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find_map(|v| Uuid::parse_str(v).ok())
}

fn with_cookie(mut resp: Response, id: Uuid, fresh: bool) -> Response {
    if fresh {
        let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Strict");
        if let Ok(v) = HeaderValue::from_str(&cookie) {
            resp.headers_mut().insert(header::SET_COOKIE, v);
        }
    }
    resp
}

fn first_code(reply: &Reply) -> &'static str {
    if reply.is_ok() {
        return "OK";
    }
    reply.codes.first().copied().unwrap_or("Error")
}

fn audit(request_id: &Uuid, session: Option<&Uuid>, command: &str, decision: &str, code: &str, started: Instant) {
    tracing::info!(
        request_id = %request_id,
        session = ?session.map(|s| s.to_string()),
        command = command,
        decision = decision,
        code = code,
        duration_ms = started.elapsed().as_millis() as u64,
        "audit"
    );
}
