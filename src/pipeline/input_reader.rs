// Input Reader
//
// Stage 1: turns `torrent<TAB>contained-file` lines into TorrentFileRefs.
// Sources are read strictly one after another so per-source line order is
// preserved downstream. Bad lines and unreadable sources are logged and
// skipped; only a closed downstream channel stops the reader early.

use crate::pipeline::types::{ReaderStats, TorrentFileRef};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Source locator meaning standard input
pub const STDIN_SOURCE: &str = "-";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("expected 2 tab-separated fields, found {0}")]
    FieldCount(usize),
    #[error("torrent path is empty")]
    EmptyTorrentPath,
    #[error("contained file is empty")]
    EmptyContainedFile,
    #[error("not valid UTF-8 after byte {0}")]
    NotUtf8(usize),
}

/// Downstream receiver was dropped
#[derive(Debug)]
pub(crate) struct Closed;

/// Parse one input line into a TorrentFileRef
pub fn parse_line(line: &str) -> Result<TorrentFileRef, LineError> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [torrent, contained] = fields[..] else {
        return Err(LineError::FieldCount(fields.len()));
    };

    let torrent = torrent.trim();
    let contained = contained.trim();
    if torrent.is_empty() {
        return Err(LineError::EmptyTorrentPath);
    }
    if contained.is_empty() {
        return Err(LineError::EmptyContainedFile);
    }

    Ok(TorrentFileRef {
        torrent_path: PathBuf::from(torrent),
        contained_file: contained.to_string(),
    })
}

/// Read every source in order, sending one ref per valid line.
///
/// Dropping `ref_tx` on return is what tells the resolver input is done.
pub async fn read_sources(
    sources: &[PathBuf],
    ref_tx: mpsc::Sender<TorrentFileRef>,
) -> ReaderStats {
    let mut stats = ReaderStats::default();

    for source in sources {
        stats.sources += 1;

        let result = if source.as_os_str() == STDIN_SOURCE {
            let reader = BufReader::new(tokio::io::stdin());
            read_source(source, reader, &ref_tx, &mut stats).await
        } else {
            match tokio::fs::File::open(source).await {
                Ok(file) => read_source(source, BufReader::new(file), &ref_tx, &mut stats).await,
                Err(e) => {
                    error!(source = %source.display(), error = %e, "Failed to open input");
                    stats.unreadable_sources += 1;
                    continue;
                }
            }
        };

        if let Err(Closed) = result {
            warn!(
                source = %source.display(),
                "Resolver stopped; remaining input not read"
            );
            stats.cut_short = true;
            break;
        }
    }

    debug!(
        lines = stats.lines,
        invalid = stats.invalid_lines,
        sent = stats.refs_sent,
        "Input exhausted"
    );
    stats
}

pub(crate) async fn read_source<R: AsyncBufRead + Unpin>(
    source: &Path,
    mut reader: R,
    ref_tx: &mpsc::Sender<TorrentFileRef>,
    stats: &mut ReaderStats,
) -> Result<(), Closed> {
    let mut buf = Vec::new();
    let mut line_number = 0usize;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                // Nothing after a read error can be trusted to line up
                error!(
                    source = %source.display(),
                    line = line_number + 1,
                    error = %e,
                    "Failed to read input"
                );
                stats.read_errors += 1;
                return Ok(());
            }
        }
        line_number += 1;
        stats.lines += 1;

        match decode_line(&buf).and_then(parse_line) {
            Ok(file_ref) => {
                ref_tx.send(file_ref).await.map_err(|_| Closed)?;
                stats.refs_sent += 1;
            }
            Err(e) => {
                let content = String::from_utf8_lossy(&buf);
                warn!(
                    source = %source.display(),
                    line = line_number,
                    content = %content.trim_end(),
                    error = %e,
                    "Invalid line"
                );
                stats.invalid_lines += 1;
            }
        }
    }
}

/// Strip the line terminator and decode as UTF-8
fn decode_line(raw: &[u8]) -> Result<&str, LineError> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    std::str::from_utf8(raw).map_err(|e| LineError::NotUtf8(e.valid_up_to()))
}
