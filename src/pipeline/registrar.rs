// Registrar
//
// Stage 3: hands resolved torrents to the download client. The set of torrents
// the client already knows is fetched once at startup and never refreshed, so
// a torrent added by someone else mid-run can still be submitted; the client
// reports that as a duplicate. Submission failures are per torrent and never
// stop the stage. Nothing is retried.

use crate::pipeline::types::{RegistrarStats, ResolvedMatch};
use crate::torrent::{AddOutcome, ClientError, DownloadClient, InfoHash};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What to do when the registered-torrent list cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisteredFetchPolicy {
    /// Continue as if nothing were registered
    #[default]
    Degrade,
    /// Fail the run
    Abort,
}

#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("Failed to fetch registered torrents: {0}")]
    Fetch(#[source] ClientError),
}

/// Outcome of handling one resolved match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    AlreadyRegistered,
    Added,
    Duplicate,
    Failed,
}

pub struct Registrar {
    client: Arc<dyn DownloadClient>,
    registered: HashSet<InfoHash>,
    stats: RegistrarStats,
}

impl Registrar {
    /// Fetch the registered set and build a registrar around it
    pub async fn start(
        client: Arc<dyn DownloadClient>,
        policy: RegisteredFetchPolicy,
    ) -> Result<Self, RegistrarError> {
        let registered = match client.list_registered().await {
            Ok(registered) => {
                info!(count = registered.len(), "Fetched registered torrents");
                registered
            }
            Err(e) if policy == RegisteredFetchPolicy::Degrade => {
                warn!(
                    error = %e,
                    "Could not fetch registered torrents; assuming none are registered"
                );
                HashSet::new()
            }
            Err(e) => {
                error!(error = %e, "Could not fetch registered torrents");
                return Err(RegistrarError::Fetch(e));
            }
        };

        Ok(Self {
            client,
            registered,
            stats: RegistrarStats::default(),
        })
    }

    pub fn is_registered(&self, info_hash: &InfoHash) -> bool {
        self.registered.contains(info_hash)
    }

    pub fn stats(&self) -> &RegistrarStats {
        &self.stats
    }

    pub async fn submit(&mut self, resolved: ResolvedMatch) -> Submission {
        self.stats.received += 1;

        if self.is_registered(&resolved.info_hash) {
            debug!(
                torrent = %resolved.torrent_path.display(),
                info_hash = %resolved.info_hash,
                "Already registered"
            );
            self.stats.already_registered += 1;
            return Submission::AlreadyRegistered;
        }

        match self
            .client
            .add_torrent(&resolved.torrent_path, &resolved.target_dir)
            .await
        {
            Ok(AddOutcome::Added) => {
                info!(
                    torrent = %resolved.torrent_path.display(),
                    target_dir = %resolved.target_dir,
                    "Added torrent"
                );
                self.stats.added += 1;
                Submission::Added
            }
            Ok(AddOutcome::Duplicate) => {
                info!(
                    torrent = %resolved.torrent_path.display(),
                    info_hash = %resolved.info_hash,
                    "Client already had torrent"
                );
                self.stats.duplicates += 1;
                Submission::Duplicate
            }
            Err(e) => {
                error!(
                    torrent = %resolved.torrent_path.display(),
                    target_dir = %resolved.target_dir,
                    error = %e,
                    "Failed to add torrent"
                );
                self.stats.failed += 1;
                Submission::Failed
            }
        }
    }

    /// Submit matches until the resolver closes its channel
    pub async fn run(mut self, mut match_rx: mpsc::Receiver<ResolvedMatch>) -> RegistrarStats {
        while let Some(resolved) = match_rx.recv().await {
            self.submit(resolved).await;
        }

        info!(
            added = self.stats.added,
            failed = self.stats.failed,
            already_registered = self.stats.already_registered,
            "Registrar finished"
        );
        self.stats
    }
}
