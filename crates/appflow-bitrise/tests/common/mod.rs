use appflow_bitrise::{AppSpec, BitriseConfig};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TEST_TOKEN: &str = "test-token";

pub const FINISH_BODY: &str = r#"{"status":"ok","build_trigger_token":"tok","branch_name":"main","is_webhook_auto_reg_supported":true,"default_workflow_id":"wf1"}"#;

/// One request as seen by the stub
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

type Responder = dyn Fn(&RecordedRequest, usize) -> (StatusCode, String) + Send + Sync;

#[derive(Clone)]
struct StubState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Arc<Responder>,
    delay: Duration,
}

/// In-process stand-in for the Bitrise API
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

#[allow(dead_code)]
impl StubServer {
    /// Answer every request with `responder(request, index)`
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest, usize) -> (StatusCode, String) + Send + Sync + 'static,
    {
        Self::start_with_delay(Duration::ZERO, responder).await
    }

    /// Like `start`, but sleeps before answering
    pub async fn start_with_delay<F>(delay: Duration, responder: F) -> Self
    where
        F: Fn(&RecordedRequest, usize) -> (StatusCode, String) + Send + Sync + 'static,
    {
        init_tracing();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            requests: requests.clone(),
            responder: Arc::new(responder),
            delay,
        };

        let app = Router::new().fallback(record).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            task,
        }
    }

    /// Answer the n-th request with the n-th canned response, 404 afterwards
    pub async fn sequence(responses: Vec<(StatusCode, &str)>) -> Self {
        let responses: Vec<(StatusCode, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();
        Self::start(move |_, index| {
            responses
                .get(index)
                .cloned()
                .unwrap_or((StatusCode::NOT_FOUND, r#"{"message":"no more responses"}"#.to_string()))
        })
        .await
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Method and path of every recorded request
    pub fn calls(&self) -> Vec<(String, String)> {
        self.requests()
            .into_iter()
            .map(|r| (r.method, r.path))
            .collect()
    }

    pub fn config(&self) -> BitriseConfig {
        BitriseConfig::new(TEST_TOKEN).with_base_url(&self.base_url)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn record(
    State(stub): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    };

    let index = {
        let mut requests = stub.requests.lock().unwrap();
        requests.push(request.clone());
        requests.len() - 1
    };

    if !stub.delay.is_zero() {
        tokio::time::sleep(stub.delay).await;
    }

    let (status, body) = (stub.responder)(&request, index);
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}

/// Base URL of a port nothing listens on
#[allow(dead_code)]
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// iOS app used by the end-to-end scenarios
#[allow(dead_code)]
pub fn ios_spec() -> AppSpec {
    AppSpec::new("https://github.com/x/y", "y", "ios", "osx-1", "default")
        .with_organization("org1")
        .with_owner("x")
        .with_title("")
        .public(false)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
