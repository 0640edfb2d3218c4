//! HTTP API for shipwright.
//!
//! Trigger endpoints (`/api/build`, `/api/deploy`, `/api/build-and-deploy`)
//! answer `202 Accepted` with an operation id right away and leave the work to
//! the [`OperationRunner`]; callers poll `/api/operations/{id}`. Component and
//! cluster status reads go straight to the executor (through its gate) and
//! block their request thread until it answers.
//!
//! Routing is transport-independent ([`route`]); [`run_server`] serves it on a
//! `tiny_http` listener and handles every request on its own thread, so a
//! status read waiting for the executor never holds up triggers or polls.
//! The [`TestServer`] helper starts a server on a random port for integration
//! testing.

use serde_json::{json, Map, Value};
use shipwright_config::{BuilderConfig, ConfigError};
use shipwright_core::{
    shutdown_requested, CoreError, Launch, OperationId, OperationParams, OperationRunner,
};
use shipwright_executor::{BuildExecutor, ExecutorError, MockExecutor};
use std::any::Any;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const OPERATIONS_PREFIX: &str = "/api/operations/";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Everything a request handler needs.
pub struct ApiState {
    runner: OperationRunner,
    default_provider: String,
    version: String,
}

impl ApiState {
    pub fn new(runner: OperationRunner, default_provider: impl Into<String>) -> Self {
        Self {
            runner,
            default_provider: default_provider.into(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    pub fn from_config(config: &BuilderConfig, executor: Box<dyn BuildExecutor>) -> Self {
        Self::new(
            OperationRunner::new(executor),
            config.kubernetes.default_provider.clone(),
        )
    }

    pub fn runner(&self) -> &OperationRunner {
        &self.runner
    }
}

/// A routed response. For accepted operations it also holds the [`Launch`],
/// which must be dropped only after the response has been written.
pub struct Reply {
    pub status: u16,
    pub body: Value,
    hold: Option<Launch>,
}

impl Reply {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            hold: None,
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, json!({ "error": message.into() }))
    }

    fn not_found() -> Self {
        Self::error(404, "Not Found")
    }

    fn method_not_allowed() -> Self {
        Self::error(405, "Method Not Allowed")
    }

    fn accepted(launch: Launch, message: String) -> Self {
        Self {
            status: 202,
            body: json!({
                "operation_id": launch.id().as_str(),
                "status": "pending",
                "message": message,
            }),
            hold: Some(launch),
        }
    }

    pub fn into_parts(self) -> (u16, Value, Option<Launch>) {
        (self.status, self.body, self.hold)
    }
}

/// Route one request. `url` is the raw request target including any query.
pub fn route(state: &ApiState, method: &Method, url: &str, body: &[u8]) -> Reply {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));

    if let Some(id) = path.strip_prefix(OPERATIONS_PREFIX) {
        if id.is_empty() || id.contains('/') {
            return Reply::not_found();
        }
        return match *method {
            Method::Get => operation_status(state, id),
            _ => Reply::method_not_allowed(),
        };
    }

    match (path, method) {
        ("/api/status", Method::Get) => status(state),
        ("/api/components", Method::Get) => component_status(state, query),
        ("/api/kubernetes", Method::Get) => cluster_status(state, query),
        ("/api/build", Method::Post) => with_body(body, |b| build(state, b)),
        ("/api/deploy", Method::Post) => with_body(body, |b| deploy(state, b)),
        ("/api/build-and-deploy", Method::Post) => {
            with_body(body, |b| build_and_deploy(state, b))
        }
        (
            "/api/status" | "/api/components" | "/api/kubernetes" | "/api/build" | "/api/deploy"
            | "/api/build-and-deploy",
            _,
        ) => Reply::method_not_allowed(),
        _ => Reply::not_found(),
    }
}

fn status(state: &ApiState) -> Reply {
    Reply::json(
        200,
        json!({
            "status": "running",
            "version": state.version,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "operations": state.runner.count(),
        }),
    )
}

fn operation_status(state: &ApiState, id: &str) -> Reply {
    match state.runner.get(&OperationId::from(id)) {
        Ok(op) => match serde_json::to_value(&op) {
            Ok(body) => Reply::json(200, body),
            Err(e) => Reply::error(500, format!("Internal Server Error: {e}")),
        },
        Err(_) => Reply::error(404, format!("Operation {id} not found")),
    }
}

fn component_status(state: &ApiState, query: &str) -> Reply {
    let name = query_param(query, "name");
    match state.runner.component_status(name.as_deref()) {
        Ok(map) => match serde_json::to_value(&map) {
            Ok(body) => Reply::json(200, body),
            Err(e) => Reply::error(500, format!("Internal Server Error: {e}")),
        },
        Err(CoreError::Executor(ExecutorError::UnknownComponent(name))) => {
            Reply::error(404, format!("Component not found: {name}"))
        }
        Err(e) => {
            error!("component status failed: {e}");
            Reply::error(500, format!("Internal Server Error: {e}"))
        }
    }
}

fn cluster_status(state: &ApiState, query: &str) -> Reply {
    let namespace = query_param(query, "namespace");
    match state.runner.cluster_status(namespace.as_deref()) {
        Ok(report) => Reply::json(200, report.to_value()),
        Err(e) => {
            error!("cluster status failed: {e}");
            Reply::error(500, format!("Internal Server Error: {e}"))
        }
    }
}

fn build(state: &ApiState, body: &Map<String, Value>) -> Reply {
    let component = match body.get("component") {
        Some(Value::String(c)) if !c.trim().is_empty() => c.clone(),
        _ => return Reply::error(400, "Missing required field: component"),
    };
    let message = format!("Building component {component}");
    submit(state, OperationParams::Build { component }, message)
}

fn deploy(state: &ApiState, body: &Map<String, Value>) -> Reply {
    let cloud_provider = match provider_field(state, body) {
        Ok(p) => p,
        Err(reply) => return reply,
    };
    let message = format!("Deploying to {cloud_provider}");
    submit(state, OperationParams::Deploy { cloud_provider }, message)
}

fn build_and_deploy(state: &ApiState, body: &Map<String, Value>) -> Reply {
    let components = match body.get("components") {
        None | Some(Value::Null) => {
            return Reply::error(400, "Missing required field: components");
        }
        Some(Value::Array(items)) => {
            let names: Option<Vec<String>> = items
                .iter()
                .map(|v| v.as_str().map(str::to_owned))
                .collect();
            match names {
                Some(names) => names,
                None => return Reply::error(400, "components must be an array of strings"),
            }
        }
        Some(_) => return Reply::error(400, "components must be an array of strings"),
    };
    let cloud_provider = match provider_field(state, body) {
        Ok(p) => p,
        Err(reply) => return reply,
    };
    if components.is_empty() {
        warn!("build-and-deploy with no components, deploying only");
    }
    let message = format!(
        "Building {} components and deploying to {cloud_provider}",
        components.len()
    );
    submit(
        state,
        OperationParams::BuildAndDeploy {
            components,
            cloud_provider,
        },
        message,
    )
}

fn provider_field(state: &ApiState, body: &Map<String, Value>) -> Result<String, Reply> {
    match body.get("cloud_provider") {
        None | Some(Value::Null) => Ok(state.default_provider.clone()),
        Some(Value::String(p)) if !p.trim().is_empty() => Ok(p.clone()),
        Some(_) => Err(Reply::error(
            400,
            "cloud_provider must be a non-empty string",
        )),
    }
}

fn submit(state: &ApiState, params: OperationParams, message: String) -> Reply {
    match state.runner.submit(params) {
        Ok(launch) => Reply::accepted(launch, message),
        Err(e) => {
            error!("failed to start operation: {e}");
            Reply::error(500, format!("Internal Server Error: {e}"))
        }
    }
}

/// Empty bodies count as `{}`; anything else must be a JSON object.
fn with_body(body: &[u8], handler: impl FnOnce(&Map<String, Value>) -> Reply) -> Reply {
    if body.iter().all(u8::is_ascii_whitespace) {
        return handler(&Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => handler(&map),
        _ => Reply::error(400, "Invalid JSON in request body"),
    }
}

fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unexpected panic")
}

fn respond_json(req: tiny_http::Request, status: u16, body: &Value) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let data = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let response = Response::from_data(data)
        .with_status_code(StatusCode(status))
        .with_header(header);
    if let Err(e) = req.respond(response) {
        debug!("failed to write response: {e}");
    }
}

fn read_body(req: &mut tiny_http::Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

/// Handle a single HTTP request: route it, write the JSON response, then let
/// any accepted operation start.
pub fn handle_request(state: &ApiState, mut req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    let Some(body) = read_body(&mut req) else {
        respond_json(req, 400, &json!({ "error": "failed to read request body" }));
        return;
    };

    let reply = panic::catch_unwind(AssertUnwindSafe(|| route(state, &method, &url, &body)))
        .unwrap_or_else(|payload| {
            let text = panic_text(&*payload);
            error!("{method} {url}: handler panicked: {text}");
            Reply::error(500, format!("Internal Server Error: {text}"))
        });

    let (status, body, hold) = reply.into_parts();
    if status >= 500 {
        warn!("{method} {url} -> {status}");
    } else {
        debug!("{method} {url} -> {status}");
    }
    respond_json(req, status, &body);
    drop(hold);
}

/// Handler threads for accepted requests, one per request.
#[derive(Default)]
struct Handlers {
    active: Mutex<Vec<JoinHandle<()>>>,
}

impl Handlers {
    fn spawn(&self, state: &Arc<ApiState>, req: tiny_http::Request) {
        let state = Arc::clone(state);
        let spawned = thread::Builder::new()
            .name("http-request".to_owned())
            .spawn(move || handle_request(&state, req));
        match spawned {
            Ok(handle) => {
                let mut active = self.lock();
                active.retain(|h| !h.is_finished());
                active.push(handle);
            }
            Err(e) => error!("failed to spawn request handler: {e}"),
        }
    }

    fn join_all(&self) {
        let handles: Vec<_> = self.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("request handler terminated abnormally");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accept requests until `stop` is set or a shutdown signal arrives, handing
/// each one to its own thread, then wait for the handlers still running.
fn accept_loop(server: &Server, state: &Arc<ApiState>, stop: &AtomicBool) {
    let handlers = Handlers::default();
    while !stop.load(Ordering::SeqCst) && !shutdown_requested() {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(req)) => handlers.spawn(state, req),
            Ok(None) => {}
            Err(e) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                warn!("failed to receive request: {e}");
            }
        }
    }
    handlers.join_all();
}

fn bind(addr: &str) -> Result<Server, ServerError> {
    Server::http(addr).map_err(|e| ServerError::Bind {
        addr: addr.to_owned(),
        message: e.to_string(),
    })
}

/// Serve the API until a shutdown signal arrives, then wait for in-flight
/// requests and operations to finish.
pub fn run_server(state: &Arc<ApiState>, addr: &str) -> Result<(), ServerError> {
    let server = bind(addr)?;
    let stop = AtomicBool::new(false);
    info!(
        "listening on {addr} (executor: {})",
        state.runner().executor_name()
    );

    accept_loop(&server, state, &stop);

    info!("HTTP listener stopped");
    state.runner().join_all();
    Ok(())
}

/// Starts the API on `127.0.0.1` with a random port, backed by the given
/// state. Dropping it stops the listener and waits for running operations.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    state: Arc<ApiState>,
    server: Arc<Server>,
    stop: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start(state: ApiState) -> Self {
        let server = Arc::new(bind("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let state = Arc::new(state);
        let stop = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let server = Arc::clone(&server);
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            thread::spawn(move || accept_loop(&server, &state, &stop))
        };

        Self {
            url: format!("http://127.0.0.1:{port}"),
            port,
            state,
            server,
            stop,
            acceptor: Some(acceptor),
        }
    }

    /// A server over a [`MockExecutor`] with `vultr` as the default provider.
    pub fn with_mock(mock: MockExecutor) -> Self {
        Self::start(ApiState::new(OperationRunner::new(Box::new(mock)), "vultr"))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.server.unblock();
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        self.state.runner().join_all();
    }
}
