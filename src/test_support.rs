// Test support utilities for both unit and integration tests

use crate::db::{PathIndex, PathIndexError};
use crate::torrent::{
    AddOutcome, ClientError, DownloadClient, InfoHash, MetainfoError, MetainfoReader,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Deterministic info hash for tests: `seed` repeated 20 times
pub fn test_hash(seed: u8) -> InfoHash {
    InfoHash::from_bytes([seed; 20])
}

/// Mock path database
///
/// Returns every stored path that *contains* the fragment, in insertion
/// order. That is broader than the SQL suffix query, which lets tests check
/// that callers verify the exact suffix themselves.
#[derive(Default)]
pub struct MockPathIndex {
    paths: Vec<String>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockPathIndex {
    pub fn new<S: Into<String>>(paths: impl IntoIterator<Item = S>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// An index whose every query fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Fragments queried so far, in order
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PathIndex for MockPathIndex {
    async fn candidates(&self, fragment: &str) -> Result<Vec<String>, PathIndexError> {
        self.queries.lock().unwrap().push(fragment.to_string());
        if self.fail {
            return Err(PathIndexError::Database(sqlx::Error::PoolClosed));
        }
        Ok(self
            .paths
            .iter()
            .filter(|path| path.contains(fragment))
            .cloned()
            .collect())
    }
}

/// Mock metainfo reader with a fixed torrent -> hash table.
/// Torrents not in the table fail as if they had no info dictionary.
#[derive(Default)]
pub struct MockMetainfoReader {
    hashes: HashMap<PathBuf, InfoHash>,
    calls: Mutex<Vec<PathBuf>>,
}

impl MockMetainfoReader {
    pub fn new<P: Into<PathBuf>>(hashes: impl IntoIterator<Item = (P, InfoHash)>) -> Self {
        Self {
            hashes: hashes.into_iter().map(|(p, h)| (p.into(), h)).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MetainfoReader for MockMetainfoReader {
    async fn info_hash(&self, torrent_path: &Path) -> Result<InfoHash, MetainfoError> {
        self.calls.lock().unwrap().push(torrent_path.to_path_buf());
        self.hashes
            .get(torrent_path)
            .copied()
            .ok_or(MetainfoError::MissingInfo)
    }
}

/// Mock download client
///
/// Records every add request. Individual torrents can be made to fail or be
/// reported as duplicates.
#[derive(Default)]
pub struct MockDownloadClient {
    registered: HashSet<InfoHash>,
    fail_listing: bool,
    failing_adds: HashSet<PathBuf>,
    duplicate_adds: HashSet<PathBuf>,
    added: Mutex<Vec<(PathBuf, String)>>,
}

impl MockDownloadClient {
    pub fn new(registered: impl IntoIterator<Item = InfoHash>) -> Self {
        Self {
            registered: registered.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn with_failing_add(mut self, torrent_path: impl Into<PathBuf>) -> Self {
        self.failing_adds.insert(torrent_path.into());
        self
    }

    pub fn with_duplicate_add(mut self, torrent_path: impl Into<PathBuf>) -> Self {
        self.duplicate_adds.insert(torrent_path.into());
        self
    }

    /// (torrent path, download dir) of every add request, in order
    pub fn added(&self) -> Vec<(PathBuf, String)> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DownloadClient for MockDownloadClient {
    async fn list_registered(&self) -> Result<HashSet<InfoHash>, ClientError> {
        if self.fail_listing {
            return Err(ClientError::Unauthorized);
        }
        Ok(self.registered.clone())
    }

    async fn add_torrent(
        &self,
        torrent_path: &Path,
        download_dir: &str,
    ) -> Result<AddOutcome, ClientError> {
        self.added
            .lock()
            .unwrap()
            .push((torrent_path.to_path_buf(), download_dir.to_string()));

        if self.failing_adds.contains(torrent_path) {
            return Err(ClientError::Rpc {
                method: "torrent-add",
                result: "invalid or corrupt torrent file".to_string(),
            });
        }
        if self.duplicate_adds.contains(torrent_path) {
            return Ok(AddOutcome::Duplicate);
        }
        Ok(AddOutcome::Added)
    }
}
