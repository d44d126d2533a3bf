// Fake Transmission daemon
//
// Serves /transmission/rpc on a loopback port with the same session-id
// handshake, basic auth and result conventions as the real daemon. Added
// torrents are hashed from the uploaded metainfo so duplicates are detected
// the way Transmission does it.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use reconcile::torrent::client::SESSION_ID_HEADER;
use reconcile::torrent::metainfo::info_hash_from_bytes;
use reconcile::torrent::InfoHash;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct FakeTransmissionOptions {
    /// Hashes reported by torrent-get before the run starts
    pub registered: Vec<InfoHash>,
    /// Required basic auth credentials
    pub credentials: Option<(String, String)>,
    /// Make torrent-get answer with this error result
    pub torrent_get_error: Option<String>,
    /// Reject torrent-add for download dirs starting with this prefix
    pub reject_dir_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedTorrent {
    pub info_hash: InfoHash,
    pub download_dir: String,
}

#[derive(Debug, Default)]
struct FakeState {
    session_id: String,
    known: HashSet<InfoHash>,
    added: Vec<AddedTorrent>,
    conflicts: usize,
    rpc_calls: Vec<String>,
}

#[derive(Clone)]
struct AppState {
    options: Arc<FakeTransmissionOptions>,
    state: Arc<Mutex<FakeState>>,
}

pub struct FakeTransmission {
    pub server: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransmission {
    pub async fn start(options: FakeTransmissionOptions) -> Self {
        let state = Arc::new(Mutex::new(FakeState {
            session_id: "session-1".to_string(),
            known: options.registered.iter().copied().collect(),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/transmission/rpc", post(rpc))
            .with_state(AppState {
                options: Arc::new(options),
                state: state.clone(),
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake Transmission");
        let addr = listener.local_addr().expect("No local address");
        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Fake Transmission failed");
        });

        Self {
            server: addr.to_string(),
            state,
        }
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}/transmission/rpc", self.server)
    }

    /// Force a new session id, as the daemon does after a restart
    pub fn rotate_session(&self, session_id: &str) {
        self.state.lock().unwrap().session_id = session_id.to_string();
    }

    pub fn added(&self) -> Vec<AddedTorrent> {
        self.state.lock().unwrap().added.clone()
    }

    /// Requests answered with 409
    pub fn conflicts(&self) -> usize {
        self.state.lock().unwrap().conflicts
    }

    /// Methods of requests that passed the handshake and auth
    pub fn rpc_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().rpc_calls.clone()
    }
}

fn basic_auth_value(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

async fn rpc(State(app): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some((username, password)) = &app.options.credentials {
        let expected = basic_auth_value(username, password);
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let mut state = app.state.lock().unwrap();

    let provided_session = headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok());
    if provided_session != Some(state.session_id.as_str()) {
        state.conflicts += 1;
        return (
            StatusCode::CONFLICT,
            [(SESSION_ID_HEADER, state.session_id.clone())],
        )
            .into_response();
    }

    let method = body["method"].as_str().unwrap_or_default().to_string();
    state.rpc_calls.push(method.clone());

    let reply = match method.as_str() {
        "torrent-get" => match &app.options.torrent_get_error {
            Some(error) => json!({ "result": error, "arguments": {} }),
            None => {
                let torrents: Vec<Value> = state
                    .known
                    .iter()
                    .map(|hash| json!({ "hashString": hash.to_hex() }))
                    .collect();
                json!({ "result": "success", "arguments": { "torrents": torrents } })
            }
        },
        "torrent-add" => torrent_add(&app.options, &mut state, &body["arguments"]),
        _ => json!({ "result": "method name not recognized", "arguments": {} }),
    };

    Json(reply).into_response()
}

fn torrent_add(options: &FakeTransmissionOptions, state: &mut FakeState, arguments: &Value) -> Value {
    let download_dir = arguments["download-dir"].as_str().unwrap_or_default().to_string();
    if let Some(prefix) = &options.reject_dir_prefix {
        if download_dir.starts_with(prefix.as_str()) {
            return json!({ "result": "download directory is not writable", "arguments": {} });
        }
    }

    let metainfo = arguments["metainfo"].as_str().unwrap_or_default();
    let info_hash = match base64::engine::general_purpose::STANDARD
        .decode(metainfo)
        .ok()
        .and_then(|data| info_hash_from_bytes(&data).ok())
    {
        Some(hash) => hash,
        None => return json!({ "result": "invalid or corrupt torrent file", "arguments": {} }),
    };

    if !state.known.insert(info_hash) {
        return json!({
            "result": "success",
            "arguments": { "torrent-duplicate": { "hashString": info_hash.to_hex() } }
        });
    }

    state.added.push(AddedTorrent {
        info_hash,
        download_dir,
    });
    json!({
        "result": "success",
        "arguments": { "torrent-added": { "id": state.added.len(), "hashString": info_hash.to_hex() } }
    })
}
