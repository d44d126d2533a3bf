// Path Resolver
//
// Stage 2: finds the directory holding each torrent's payload. The path index
// is searched for the contained file, excluded candidates are dropped, and the
// first candidate that ends exactly with the contained file wins. Its prefix
// is the target directory. Each torrent resolves at most once; later refs for
// a resolved torrent are discarded without touching the database.

use crate::db::{PathIndex, PathIndexError};
use crate::pipeline::types::{ResolvedMatch, ResolverStats, TorrentFileRef};
use crate::torrent::MetainfoReader;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Path lookup for {fragment:?} failed: {source}")]
    Query {
        fragment: String,
        #[source]
        source: PathIndexError,
    },
    #[error("Registrar stopped accepting matches")]
    RegistrarClosed,
}

/// Pick the target directory from candidate paths in the order given.
///
/// Returns the directory and how many candidates were excluded on the way.
pub fn select_target_dir<I>(
    candidates: I,
    contained_file: &str,
    exclude: Option<&Regex>,
) -> (Option<String>, usize)
where
    I: IntoIterator<Item = String>,
{
    let mut excluded = 0;

    for candidate in candidates {
        if exclude.is_some_and(|pattern| pattern.is_match(&candidate)) {
            debug!(candidate = %candidate, "Excluded");
            excluded += 1;
            continue;
        }

        match candidate.strip_suffix(contained_file) {
            Some(dir) => {
                debug!(candidate = %candidate, target_dir = %dir, "Exact suffix match");
                return (Some(dir.to_string()), excluded);
            }
            None => debug!(candidate = %candidate, "Candidate does not end with fragment"),
        }
    }

    (None, excluded)
}

pub struct PathResolver {
    index: Arc<dyn PathIndex>,
    metainfo: Arc<dyn MetainfoReader>,
    exclude: Option<Regex>,
    /// torrent path -> target directory
    resolved: HashMap<PathBuf, String>,
    stats: ResolverStats,
}

impl PathResolver {
    pub fn new(
        index: Arc<dyn PathIndex>,
        metainfo: Arc<dyn MetainfoReader>,
        exclude: Option<Regex>,
    ) -> Self {
        Self {
            index,
            metainfo,
            exclude,
            resolved: HashMap::new(),
            stats: ResolverStats::default(),
        }
    }

    /// Target directory previously resolved for a torrent
    pub fn resolved_dir(&self, torrent_path: &Path) -> Option<&str> {
        self.resolved.get(torrent_path).map(String::as_str)
    }

    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    /// Resolve one ref. `Ok(None)` means nothing is to be registered for it.
    pub async fn resolve(
        &mut self,
        file_ref: TorrentFileRef,
    ) -> Result<Option<ResolvedMatch>, ResolveError> {
        self.stats.received += 1;

        if self.resolved.contains_key(&file_ref.torrent_path) {
            debug!(torrent = %file_ref.torrent_path.display(), "Already resolved");
            self.stats.already_resolved += 1;
            return Ok(None);
        }

        debug!(
            torrent = %file_ref.torrent_path.display(),
            fragment = %file_ref.contained_file,
            "Querying path index"
        );
        let candidates = self
            .index
            .candidates(&file_ref.contained_file)
            .await
            .map_err(|source| ResolveError::Query {
                fragment: file_ref.contained_file.clone(),
                source,
            })?;
        self.stats.queried += 1;

        let (target_dir, excluded) =
            select_target_dir(candidates, &file_ref.contained_file, self.exclude.as_ref());
        self.stats.excluded_candidates += excluded;

        let Some(target_dir) = target_dir else {
            info!(
                torrent = %file_ref.torrent_path.display(),
                fragment = %file_ref.contained_file,
                excluded,
                "No match"
            );
            self.stats.unmatched += 1;
            return Ok(None);
        };

        self.resolved
            .insert(file_ref.torrent_path.clone(), target_dir.clone());

        // Hashing reads the whole torrent file, so only matched torrents pay for it
        let info_hash = match self.metainfo.info_hash(&file_ref.torrent_path).await {
            Ok(hash) => hash,
            Err(e) => {
                error!(
                    torrent = %file_ref.torrent_path.display(),
                    error = %e,
                    "Failed to read torrent info hash"
                );
                self.stats.hash_failures += 1;
                return Ok(None);
            }
        };

        info!(
            torrent = %file_ref.torrent_path.display(),
            target_dir = %target_dir,
            info_hash = %info_hash,
            "Matched"
        );
        self.stats.matched += 1;

        Ok(Some(ResolvedMatch {
            torrent_path: file_ref.torrent_path,
            info_hash,
            target_dir,
        }))
    }

    /// Resolve refs until the reader closes its channel.
    ///
    /// Returns early on a query failure; dropping `ref_rx` then stops the reader.
    pub async fn run(
        mut self,
        mut ref_rx: mpsc::Receiver<TorrentFileRef>,
        match_tx: mpsc::Sender<ResolvedMatch>,
    ) -> Result<ResolverStats, ResolveError> {
        while let Some(file_ref) = ref_rx.recv().await {
            let resolved = match self.resolve(file_ref).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    error!(error = %e, "Path resolver aborting");
                    return Err(e);
                }
            };

            if let Some(resolved) = resolved {
                match_tx
                    .send(resolved)
                    .await
                    .map_err(|_| ResolveError::RegistrarClosed)?;
            }
        }

        info!(
            matched = self.stats.matched,
            unmatched = self.stats.unmatched,
            already_resolved = self.stats.already_resolved,
            "Path resolver finished"
        );
        Ok(self.stats)
    }
}
