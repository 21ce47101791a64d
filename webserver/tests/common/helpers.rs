//! Fakes and request helpers for webserver tests

use super::fixtures::TestFixtures;
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use shared::ProcessState;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use supervisor::{
    MemoryStats, MockHostProbe, ProcessControl, ResourceArbiter, SpawnedSweep, SupervisorError, SupervisorResult,
    SweepSupervisor,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use webserver::{AppState, StreamBroadcaster, WebServer};

#[derive(Debug, Default)]
struct SweepState {
    next_pid: u32,
    current: Option<u32>,
    sender: Option<mpsc::Sender<Vec<u8>>>,
    spawn_args: Vec<Vec<String>>,
    kills: u32,
}

/// Sweep subprocess stand-in: spawns always succeed and stay alive until
/// killed
#[derive(Debug, Clone, Default)]
pub struct FakeSweep {
    state: Arc<Mutex<SweepState>>,
}

impl FakeSweep {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.lock().next_pid = TestFixtures::FIRST_PID;
        fake
    }

    fn lock(&self) -> MutexGuard<'_, SweepState> {
        self.state.lock().unwrap()
    }

    pub async fn emit(&self, data: &str) {
        let sender = self.lock().sender.clone();
        if let Some(sender) = sender {
            sender.send(data.as_bytes().to_vec()).await.unwrap();
        }
    }

    pub fn spawn_args(&self) -> Vec<Vec<String>> {
        self.lock().spawn_args.clone()
    }

    pub fn kill_count(&self) -> u32 {
        self.lock().kills
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.lock().current
    }
}

#[async_trait]
impl ProcessControl for FakeSweep {
    async fn spawn(&self, args: Vec<String>) -> SupervisorResult<SpawnedSweep> {
        let mut state = self.lock();
        state.spawn_args.push(args);
        if state.current.is_some() {
            return Err(SupervisorError::AlreadyRunning { pid: state.current });
        }
        let pid = state.next_pid;
        state.next_pid += 1;
        let (sender, output) = mpsc::channel(16);
        state.sender = Some(sender);
        state.current = Some(pid);

        Ok(SpawnedSweep {
            state: ProcessState {
                running: true,
                pid: Some(pid),
                process_group_id: Some(pid as i32),
                started_at: Some(Utc::now()),
            },
            output,
        })
    }

    fn state(&self) -> ProcessState {
        let state = self.lock();
        ProcessState {
            running: state.current.is_some(),
            pid: state.current,
            process_group_id: state.current.map(|pid| pid as i32),
            started_at: None,
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.lock().current == Some(pid)
    }

    async fn force_kill(&self) -> SupervisorResult<()> {
        let mut state = self.lock();
        state.kills += 1;
        state.current = None;
        state.sender = None;
        Ok(())
    }

    async fn cleanup(&self) {}
}

pub type TestState = AppState<FakeSweep, MockHostProbe>;

/// A router over fakes, plus handles on the pieces behind it
pub struct ApiHarness {
    pub router: Router,
    pub state: TestState,
    pub process: FakeSweep,
}

impl ApiHarness {
    pub fn new() -> Self {
        let process = FakeSweep::new();
        let broadcaster = StreamBroadcaster::new(TestFixtures::broadcaster_config());
        let arbiter = Arc::new(ResourceArbiter::new().with_events(broadcaster.clone()));

        let mut probe = MockHostProbe::new();
        probe
            .expect_memory_stats()
            .returning(|| Ok(MemoryStats { total_mb: 8000, available_mb: 4000 }))
            .times(0..);
        probe.expect_find_processes().returning(|_| Ok(vec![])).times(0..);

        let supervisor = SweepSupervisor::new(
            process.clone(),
            probe,
            broadcaster.clone(),
            arbiter,
            TestFixtures::supervisor_config(),
        );
        let state = AppState::new(supervisor, broadcaster);
        let server = WebServer::new(state.clone(), SocketAddr::from(([127, 0, 0, 1], 0)));

        Self {
            router: server.build_router(),
            state,
            process,
        }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<&Value>) -> axum::response::Response {
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Issue a request and decode the JSON reply; an empty body is `Null`
    pub async fn request(&self, method: Method, uri: &str, body: Option<&Value>) -> (StatusCode, Value) {
        let response = self.send(method, uri, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::POST, uri, None).await
    }

    /// Open the event stream
    pub async fn stream(&self) -> (axum::response::Response<()>, SseReader) {
        let response = self.send(Method::GET, "/api/sweep/stream", None).await;
        let (parts, body) = response.into_parts();
        let reader = SseReader {
            body: body.into_data_stream().boxed(),
            buffer: String::new(),
        };
        (axum::response::Response::from_parts(parts, ()), reader)
    }
}

/// Incremental reader over an SSE response body
pub struct SseReader {
    body: BoxStream<'static, Result<Bytes, axum::Error>>,
    buffer: String,
}

impl SseReader {
    /// Read until an `event: <kind>` frame is complete and return its data
    /// line parsed as JSON
    pub async fn next_event(&mut self, kind: &str) -> Value {
        let marker = format!("event: {kind}\n");
        loop {
            if let Some(start) = self.buffer.find(&marker) {
                if let Some(end) = self.buffer[start..].find("\n\n") {
                    let frame = self.buffer[start..start + end].to_string();
                    self.buffer.drain(..start + end + 2);
                    let data = frame
                        .lines()
                        .find_map(|line| line.strip_prefix("data: "))
                        .unwrap();
                    return serde_json::from_str(data).unwrap();
                }
            }
            let chunk = tokio::time::timeout(Duration::from_secs(2), self.body.next())
                .await
                .expect("timed out waiting for an SSE frame")
                .expect("stream ended")
                .unwrap();
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}
