// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted mock backend, an in-memory
//! session slot, and assertion helpers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;

use crate::session::{SessionRecord, SessionSlot};

/// One request as the mock backend saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub query: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
enum Responder {
    /// Answer the n-th call with the n-th entry, repeating the last.
    Script(Vec<(u16, String)>),
    /// Accept only `Bearer {token}`.
    Bearer { token: String, ok: (u16, String), denied: (u16, String) },
}

#[derive(Debug)]
struct RouteState {
    responder: Responder,
    delay: Duration,
    seen: Vec<Seen>,
}

type RouteKey = (Method, String);

/// Scripted HTTP backend bound to `127.0.0.1:0`.
///
/// Unknown routes answer 404. Every call is recorded for assertions.
#[derive(Clone, Default)]
pub struct MockBackend {
    routes: Arc<Mutex<HashMap<RouteKey, RouteState>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` from a fixed script.
    pub fn route(self, method: Method, path: &str, script: Vec<(u16, serde_json::Value)>) -> Self {
        let script = script.into_iter().map(|(s, v)| (s, v.to_string())).collect();
        self.insert(method, path, Responder::Script(script))
    }

    /// Answer with `ok` when the caller presents `token`, `denied` otherwise.
    pub fn guarded(
        self,
        method: Method,
        path: &str,
        token: &str,
        ok: (u16, serde_json::Value),
        denied: (u16, serde_json::Value),
    ) -> Self {
        let responder = Responder::Bearer {
            token: token.to_owned(),
            ok: (ok.0, ok.1.to_string()),
            denied: (denied.0, denied.1.to_string()),
        };
        self.insert(method, path, responder)
    }

    /// Hold every response on `method path` for `delay`.
    pub fn delay(self, method: Method, path: &str, delay: Duration) -> Self {
        if let Some(route) = self.routes.lock().get_mut(&(method, path.to_owned())) {
            route.delay = delay;
        }
        self
    }

    fn insert(self, method: Method, path: &str, responder: Responder) -> Self {
        self.routes.lock().insert(
            (method, path.to_owned()),
            RouteState { responder, delay: Duration::ZERO, seen: Vec::new() },
        );
        self
    }

    /// Serve on a random local port. Returns the base URL.
    pub async fn spawn(&self) -> anyhow::Result<String> {
        let router = Router::new().fallback(mock_handler).with_state(self.clone());
        let (addr, _handle) = spawn_router(router).await?;
        Ok(format!("http://{addr}"))
    }

    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.seen(method, path).len()
    }

    pub fn seen(&self, method: Method, path: &str) -> Vec<Seen> {
        let routes = self.routes.lock();
        routes.get(&(method, path.to_owned())).map(|r| r.seen.clone()).unwrap_or_default()
    }
}

async fn mock_handler(
    State(backend): State<MockBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let text = |name: header::HeaderName| {
        headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
    };
    let seen = Seen {
        authorization: text(header::AUTHORIZATION),
        content_type: text(header::CONTENT_TYPE),
        query: uri.query().map(str::to_owned),
        body,
    };

    let picked = {
        let mut routes = backend.routes.lock();
        routes.get_mut(&(method, uri.path().to_owned())).map(|route| {
            let reply = match route.responder {
                Responder::Script(ref script) => {
                    let idx = route.seen.len().min(script.len().saturating_sub(1));
                    script.get(idx).cloned().unwrap_or((500, "{}".to_owned()))
                }
                Responder::Bearer { ref token, ref ok, ref denied } => {
                    if seen.authorization.as_deref() == Some(format!("Bearer {token}").as_str()) {
                        ok.clone()
                    } else {
                        denied.clone()
                    }
                }
            };
            route.seen.push(seen);
            (reply, route.delay)
        })
    };

    let Some(((status, body), delay)) = picked else {
        return (StatusCode::NOT_FOUND, r#"{"error":"not found"}"#).into_response();
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Spawn an axum router on a random port for integration testing.
pub async fn spawn_router(
    router: Router,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}

/// A base URL nothing is listening on.
pub fn dead_url() -> anyhow::Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Session slot held in memory.
#[derive(Default)]
pub struct MemorySlot {
    record: Mutex<Option<SessionRecord>>,
}

impl MemorySlot {
    pub fn with(record: SessionRecord) -> Self {
        Self { record: Mutex::new(Some(record)) }
    }
}

impl SessionSlot for MemorySlot {
    fn load(&self) -> anyhow::Result<Option<SessionRecord>> {
        Ok(self.record.lock().clone())
    }

    fn save(&self, record: &SessionRecord) -> anyhow::Result<()> {
        *self.record.lock() = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.record.lock() = None;
        Ok(())
    }
}

/// A complete record that expires far in the future.
pub fn fresh_record(access_token: &str, refresh_token: &str) -> SessionRecord {
    SessionRecord {
        access_token: access_token.to_owned(),
        refresh_token: refresh_token.to_owned(),
        expires_at: "2099-01-01T00:00:00Z".to_owned(),
        session_id: None,
        account_id: None,
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
