// Transmission RPC client
//
// Speaks the Transmission JSON RPC protocol: every call is a POST of
// `{"method", "arguments"}` to /transmission/rpc. The daemon guards against
// CSRF with a session id; the first request is answered with 409 and an
// X-Transmission-Session-Id header, which must be echoed on every later
// request. The id can rotate at any time, so a 409 is always handled.

use crate::torrent::metainfo::InfoHash;
use base64::Engine;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

pub const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Default RPC path appended to the server address
pub const RPC_PATH: &str = "/transmission/rpc";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Authentication rejected by server")]
    Unauthorized,
    #[error("Server answered 409 without a session id")]
    MissingSessionId,
    #[error("RPC {method} failed: {result}")]
    Rpc { method: &'static str, result: String },
    #[error("Unexpected RPC response: {0}")]
    InvalidResponse(String),
    #[error("Failed to read torrent file {path:?}: {source}")]
    TorrentFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a successful add request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The daemon accepted a new torrent
    Added,
    /// The daemon already had this torrent
    Duplicate,
}

/// Remote download-management service (allows mocking for tests)
#[async_trait::async_trait]
pub trait DownloadClient: Send + Sync {
    /// Info hashes of every torrent the service currently knows about
    async fn list_registered(&self) -> Result<HashSet<InfoHash>, ClientError>;

    /// Register a torrent file, with its payload expected under `download_dir`
    async fn add_torrent(
        &self,
        torrent_path: &Path,
        download_dir: &str,
    ) -> Result<AddOutcome, ClientError>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct TorrentGetArguments {
    #[serde(default)]
    torrents: Vec<TorrentHashField>,
}

#[derive(Debug, Deserialize)]
struct TorrentHashField {
    #[serde(rename = "hashString")]
    hash_string: String,
}

/// Username/password pair sent as HTTP basic auth
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub struct TransmissionClient {
    client: Client,
    rpc_url: String,
    credentials: Option<Credentials>,
    session_id: Mutex<Option<String>>,
}

impl TransmissionClient {
    pub fn new(rpc_url: String, credentials: Option<Credentials>) -> Self {
        Self {
            client: Client::new(),
            rpc_url,
            credentials,
            session_id: Mutex::new(None),
        }
    }

    /// Build the RPC endpoint for a `host:port` server address
    pub fn rpc_url_for(server: &str, use_tls: bool) -> String {
        let scheme = if use_tls { "https" } else { "http" };
        format!("{}://{}{}", scheme, server.trim_end_matches('/'), RPC_PATH)
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store_session_id(&self, session_id: String) {
        *self
            .session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(session_id);
    }

    async fn send(&self, request: &RpcRequest<'_>) -> Result<Response, ClientError> {
        let mut builder = self.client.post(&self.rpc_url).json(request);
        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(session_id) = self.current_session_id() {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }
        Ok(builder.send().await?)
    }

    /// Execute one RPC method, returning its `arguments` object
    async fn call(&self, method: &'static str, arguments: Value) -> Result<Value, ClientError> {
        let request = RpcRequest { method, arguments };

        let mut response = self.send(&request).await?;
        if response.status() == StatusCode::CONFLICT {
            let session_id = response
                .headers()
                .get(SESSION_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .ok_or(ClientError::MissingSessionId)?
                .to_string();
            debug!(session_id = %session_id, "Refreshed Transmission session id");
            self.store_session_id(session_id);
            response = self.send(&request).await?;
        }

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ClientError::Unauthorized)
            }
            StatusCode::CONFLICT => return Err(ClientError::MissingSessionId),
            _ => {}
        }

        let response: RpcResponse = response.error_for_status()?.json().await?;
        if response.result != "success" {
            return Err(ClientError::Rpc {
                method,
                result: response.result,
            });
        }
        Ok(response.arguments)
    }
}

#[async_trait::async_trait]
impl DownloadClient for TransmissionClient {
    async fn list_registered(&self) -> Result<HashSet<InfoHash>, ClientError> {
        let arguments = self
            .call("torrent-get", json!({ "fields": ["hashString"] }))
            .await?;
        let parsed: TorrentGetArguments = serde_json::from_value(arguments)
            .map_err(|e| ClientError::InvalidResponse(format!("torrent-get: {}", e)))?;

        let mut hashes = HashSet::with_capacity(parsed.torrents.len());
        for torrent in parsed.torrents {
            match InfoHash::from_hex(&torrent.hash_string) {
                Ok(hash) => {
                    hashes.insert(hash);
                }
                Err(e) => warn!(error = %e, "Ignoring torrent with unparseable hash"),
            }
        }
        Ok(hashes)
    }

    async fn add_torrent(
        &self,
        torrent_path: &Path,
        download_dir: &str,
    ) -> Result<AddOutcome, ClientError> {
        let data = tokio::fs::read(torrent_path)
            .await
            .map_err(|source| ClientError::TorrentFile {
                path: torrent_path.to_path_buf(),
                source,
            })?;
        let metainfo = base64::engine::general_purpose::STANDARD.encode(&data);

        let arguments = self
            .call(
                "torrent-add",
                json!({
                    "metainfo": metainfo,
                    "download-dir": download_dir,
                }),
            )
            .await?;

        add_outcome(&arguments)
    }
}

fn add_outcome(arguments: &Value) -> Result<AddOutcome, ClientError> {
    if arguments.get("torrent-added").is_some() {
        Ok(AddOutcome::Added)
    } else if arguments.get("torrent-duplicate").is_some() {
        Ok(AddOutcome::Duplicate)
    } else {
        Err(ClientError::InvalidResponse(format!(
            "torrent-add returned neither torrent-added nor torrent-duplicate: {}",
            arguments
        )))
    }
}
