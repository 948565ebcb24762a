#![allow(dead_code)]

use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, Router};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use telemetry_forwarder::{
    build_http_client, HttpClientSettings, InstantSleeper, RetryPolicy, RetryingSender,
};

#[derive(Default)]
struct BackendState {
    statuses: Vec<u16>,
    hits: AtomicUsize,
    bodies: Mutex<Vec<Value>>,
    teams: Mutex<Vec<String>>,
    paths: Mutex<Vec<String>>,
}

/// In-process destination answering every request with a scripted status sequence.
///
/// The last status repeats once the script runs out.
pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
}

async fn record(
    State(state): State<Arc<BackendState>>,
    uri: axum::http::Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
    state.paths.lock().unwrap().push(uri.path().to_string());
    if let Some(team) = headers.get("x-honeycomb-team").and_then(|v| v.to_str().ok()) {
        state.teams.lock().unwrap().push(team.to_string());
    }
    if let Ok(value) = serde_json::from_slice(&body) {
        state.bodies.lock().unwrap().push(value);
    }
    let code = state.statuses.get(hit).or_else(|| state.statuses.last()).copied().unwrap_or(200);
    StatusCode::from_u16(code).unwrap()
}

impl MockBackend {
    pub async fn start(statuses: &[u16]) -> Self {
        let state = Arc::new(BackendState { statuses: statuses.to_vec(), ..Default::default() });
        let app = Router::new().fallback(record).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.state.bodies.lock().unwrap().clone()
    }

    pub fn teams(&self) -> Vec<String> {
        self.state.teams.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.paths.lock().unwrap().clone()
    }
}

/// Address that accepts connections but never answers.
pub async fn start_black_hole() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

pub fn instant_sender(max_attempts: usize) -> RetryingSender {
    let client = build_http_client(&HttpClientSettings::default()).unwrap();
    RetryingSender::new(
        client,
        RetryPolicy::new(max_attempts, Duration::from_secs(5), Default::default()),
    )
    .with_sleeper(InstantSleeper)
}
