use super::expectation::{Expectation, MockResponse, Times};
use super::matcher::RequestMatcher;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// A mock HTTP server
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct ServerState {
    expectations: Vec<Expectation>,
    received: Vec<RecordedRequest>,
    unmatched: Vec<RecordedRequest>,
}

fn lock(state: &Mutex<ServerState>) -> MutexGuard<'_, ServerState> {
    // A panicking test thread must not hide the recorded requests
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A request as seen by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: http::Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Body parsed as JSON, `Value::Null` when it is not JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

impl MockServer {
    /// Start a new mock server on a random local port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock server failed to bind");
        let addr = listener
            .local_addr()
            .expect("mock server has no local address");

        let state = Arc::new(Mutex::new(ServerState::default()));
        let state_clone = state.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let state = state_clone.clone();

                                tokio::spawn(async move {
                                    if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                                        .serve_connection(io, service_fn(move |req| handle_request(req, state.clone())))
                                        .await
                                    {
                                        tracing::debug!(error = ?err, "Mock connection closed with error");
                                    }
                                });
                            }
                            Err(e) => tracing::debug!(error = %e, "Mock accept error"),
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Add an expectation; later expectations take precedence over earlier ones
    pub fn expect(&self, matcher: RequestMatcher) -> ExpectationBuilder {
        ExpectationBuilder {
            server: self.state.clone(),
            expectation: Some(Expectation::new(matcher)),
        }
    }

    /// Every request received so far, in arrival order
    pub fn received_requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).received.clone()
    }

    /// Requests received on `path`, in arrival order
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        lock(&self.state)
            .received
            .iter()
            .filter(|req| req.path == path)
            .cloned()
            .collect()
    }

    /// Requests that didn't match any expectation
    pub fn unmatched_requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).unmatched.clone()
    }

    /// Panic unless every expectation was called the expected number of times
    pub fn verify(&self) {
        let state = lock(&self.state);
        let failures: Vec<String> = state
            .expectations
            .iter()
            .filter_map(|exp| exp.check().err())
            .collect();
        assert!(failures.is_empty(), "{}", failures.join("\n"));
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Registers its expectation on the server when dropped
pub struct ExpectationBuilder {
    server: Arc<Mutex<ServerState>>,
    expectation: Option<Expectation>,
}

impl ExpectationBuilder {
    pub fn respond_with(mut self, response: MockResponse) -> Self {
        if let Some(exp) = self.expectation.as_mut() {
            exp.response = response;
        }
        self
    }

    pub fn times(self, n: usize) -> Self {
        self.with_times(Times::Exactly(n))
    }

    pub fn once(self) -> Self {
        self.with_times(Times::Once)
    }

    pub fn at_least_once(self) -> Self {
        self.with_times(Times::AtLeast(1))
    }

    pub fn never(self) -> Self {
        self.with_times(Times::Exactly(0))
    }

    fn with_times(mut self, times: Times) -> Self {
        if let Some(exp) = self.expectation.as_mut() {
            exp.times = times;
        }
        self
    }
}

impl Drop for ExpectationBuilder {
    fn drop(&mut self) {
        if let Some(exp) = self.expectation.take() {
            lock(&self.server).expectations.push(exp);
        }
    }
}

impl ServerState {
    /// Record `request` and pick the response of the newest matching expectation
    fn answer(&mut self, request: RecordedRequest) -> Response<Full<Bytes>> {
        self.received.push(request.clone());

        let hit = self.expectations.iter_mut().rev().find(|exp| {
            exp.matcher.matches(
                &request.method,
                &request.path,
                request.query.as_deref(),
                &request.headers,
                &request.body,
            )
        });

        let Some(exp) = hit else {
            self.unmatched.push(request);
            let mut response = Response::new(Full::new(Bytes::from_static(b"No expectation matched")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            return response;
        };

        exp.call_count += 1;
        let mut response = Response::new(Full::new(exp.response.body.clone()));
        *response.status_mut() = exp.response.status;
        response.headers_mut().extend(exp.response.headers.clone());
        response
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<Mutex<ServerState>>,
) -> Result<Response<Full<Bytes>>, GenericError> {
    let (parts, body) = req.into_parts();
    let recorded = RecordedRequest {
        body: body.collect().await?.to_bytes(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        method: parts.method,
        headers: parts.headers,
    };
    Ok(lock(&state).answer(recorded))
}
