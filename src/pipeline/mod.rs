// Reconcile Pipeline
//
// Three-stage pipeline: Read → Resolve → Register
//
// - Reader: runs on the calling task, parsing input lines into refs
// - Resolver: one task, owns the path index and the resolved-torrent memo
// - Registrar: one task, owns the download client and the registered set
//
// Stages are joined by single-slot channels, so a slow registrar throttles the
// resolver and a slow resolver throttles the reader. Shutdown flows forward:
// the reader drops its sender when input is exhausted, the resolver drains and
// drops the match sender, and the registrar drains and exits.

pub mod input_reader;
pub mod path_resolver;
pub mod registrar;
pub mod types;


pub use input_reader::{parse_line, read_sources, LineError, STDIN_SOURCE};
pub use path_resolver::{select_target_dir, PathResolver, ResolveError};
pub use registrar::{RegisteredFetchPolicy, Registrar, RegistrarError, Submission};
pub use types::{
    PipelineSummary, ReaderStats, RegistrarStats, ResolvedMatch, ResolverStats, TorrentFileRef,
};

use crate::db::PathIndex;
use crate::torrent::{DownloadClient, MetainfoReader};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

/// Channel capacity between stages.
///
/// tokio channels cannot be zero-sized; one slot is the closest to a direct
/// handoff and still bounds every stage to the pace of the next.
pub const HANDOFF_CAPACITY: usize = 1;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Registrar(#[from] RegistrarError),
    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Matching and registration policy for one run
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub exclude: Option<Regex>,
    pub fetch_policy: RegisteredFetchPolicy,
}

/// Run the whole pipeline over `sources` and wait for every stage to finish.
pub async fn run_pipeline(
    sources: Vec<PathBuf>,
    index: Arc<dyn PathIndex>,
    metainfo: Arc<dyn MetainfoReader>,
    client: Arc<dyn DownloadClient>,
    options: PipelineOptions,
) -> Result<PipelineSummary, PipelineError> {
    let (ref_tx, ref_rx) = mpsc::channel::<TorrentFileRef>(HANDOFF_CAPACITY);
    let (match_tx, match_rx) = mpsc::channel::<ResolvedMatch>(HANDOFF_CAPACITY);

    // Both consumers exist before the first line is read
    let resolver = PathResolver::new(index, metainfo, options.exclude);
    let resolver_task = tokio::spawn(resolver.run(ref_rx, match_tx));

    let fetch_policy = options.fetch_policy;
    let registrar_task = tokio::spawn(async move {
        let registrar = Registrar::start(client, fetch_policy).await?;
        Ok::<_, RegistrarError>(registrar.run(match_rx).await)
    });

    info!(sources = sources.len(), "Reading input");
    let reader = read_sources(&sources, ref_tx).await;

    let resolver_result = resolver_task.await?;
    let registrar_result = registrar_task.await?;

    match (resolver_result, registrar_result) {
        (Ok(resolver), Ok(registrar)) => Ok(PipelineSummary {
            reader,
            resolver,
            registrar,
        }),
        // The resolver only saw a closed channel; the registrar has the cause
        (Err(ResolveError::RegistrarClosed), Err(e)) => Err(e.into()),
        (Err(e), _) => Err(e.into()),
        (Ok(_), Err(e)) => Err(e.into()),
    }
}
