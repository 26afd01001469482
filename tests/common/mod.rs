//! In-process stand-in for the `doorOpener` service.
//!
//! Records every request it sees and serves canned replies, so tests can
//! assert on the exact wire traffic the agent produces.

// Not every test crate uses every helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Id the fake service hands out for a newly created user.
pub const NEW_USER_ID: &str = "3f2f8c0a9d4e4d208d9f3a6b1c2d4e5f";

/// API key the fake service hands out for a newly created user.
pub const NEW_USER_API_KEY: &str =
    "b1946ac92492d2347c6235b4d2611184f1c2eb315ee8099cd8fedab58b036fd1";

/// API key the fake service hands out on regeneration.
pub const REGENERATED_API_KEY: &str =
    "57d0d2c437e2b0b104a6c59c2284a6f7203de7405184feff19a9893b036fd170";

/// Initialise logging for tests.
pub fn setup() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// One request as the fake service saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    /// Value of a header, if present. Names are lower case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a query parameter, if present.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Canned replies for the configurable routes.
pub struct Options {
    /// Reply to `GET /api/getDoorState`.
    pub door_state: (StatusCode, String),
    /// Reply to `POST /api/setState`.
    pub set_state: (StatusCode, String),
    /// If set, every admin route replies with this instead of succeeding.
    pub admin: Option<(StatusCode, String)>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            door_state: (StatusCode::OK, r#"{"state": false}"#.to_string()),
            set_state: (StatusCode::OK, r#"{"msg": "success"}"#.to_string()),
            admin: None,
        }
    }
}

struct Inner {
    requests: Mutex<Vec<Recorded>>,
    options: Options,
}

impl Inner {
    fn record(&self, path: &str, headers: &HeaderMap, query: Vec<(String, String)>, body: String) {
        let headers = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();
        self.requests.lock().unwrap().push(Recorded {
            path: path.to_string(),
            query,
            headers,
            body,
        });
    }

    fn admin_reply(&self, default_body: String) -> (StatusCode, String) {
        self.options
            .admin
            .clone()
            .unwrap_or((StatusCode::OK, default_body))
    }
}

async fn get_door_state(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    inner.record("/api/getDoorState", &headers, query, String::new());
    inner.options.door_state.clone()
}

async fn set_state(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    inner.record("/api/setState", &headers, Vec::new(), body);
    inner.options.set_state.clone()
}

async fn actor_health(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    inner.record("/api/actorHealth", &headers, query, String::new());
    inner.admin_reply(r#"{"health": true}"#.to_string())
}

async fn add_user(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    let with_password = query.iter().any(|(name, _)| name == "password");
    inner.record("/api/addUser", &headers, query, String::new());

    let password = if with_password {
        r#""-has been set-""#
    } else {
        "null"
    };
    inner.admin_reply(format!(
        r#"{{"id": "{NEW_USER_ID}", "api_key": "{NEW_USER_API_KEY}", "password": {password}}}"#
    ))
}

async fn add_scope(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    inner.record("/api/addScope", &headers, query, String::new());
    inner.admin_reply(r#"{"msg": "success"}"#.to_string())
}

async fn add_valid(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    inner.record("/api/addValid", &headers, query, String::new());
    inner.admin_reply(r#"{"msg": "success"}"#.to_string())
}

async fn regenerate_api_key(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    inner.record("/api/regenerateApiKey", &headers, query, String::new());
    inner.admin_reply(format!(r#"{{"api_key": "{REGENERATED_API_KEY}"}}"#))
}

/// Handle to a running fake service.
pub struct FakeService {
    addr: SocketAddr,
    inner: Arc<Inner>,
    handle: JoinHandle<()>,
}

impl FakeService {
    /// Start with default replies.
    pub async fn start() -> Self {
        Self::start_with(Options::default()).await
    }

    /// Start with the given canned replies.
    pub async fn start_with(options: Options) -> Self {
        let inner = Arc::new(Inner {
            requests: Mutex::new(Vec::new()),
            options,
        });

        let app = Router::new()
            .route("/api/getDoorState", get(get_door_state))
            .route("/api/setState", post(set_state))
            .route("/api/actorHealth", get(actor_health))
            .route("/api/addUser", get(add_user))
            .route("/api/addScope", get(add_scope))
            .route("/api/addValid", get(add_valid))
            .route("/api/regenerateApiKey", get(regenerate_api_key))
            .with_state(inner.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        println!("server: Listening on: {addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            inner,
            handle,
        }
    }

    /// Base URL clients should use.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Service config pointing at this fake, with the given credentials.
    pub fn service_config(&self, actor_id: &str, api_key: &str) -> doorstate::api::Config {
        doorstate::api::Config {
            url: self.url(),
            credentials: doorstate::api::Credentials {
                actor_id: actor_id.to_string(),
                api_key: api_key.to_string(),
            },
        }
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.requests.lock().unwrap().clone()
    }

    /// Requests for one path, in order.
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Stop the service. Connections to the port are refused afterwards.
    pub fn shutdown(self) -> SocketAddr {
        println!("server: Shutting down");
        self.handle.abort();
        self.addr
    }
}
