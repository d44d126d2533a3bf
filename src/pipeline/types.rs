use crate::torrent::InfoHash;
use std::fmt;
use std::path::PathBuf;

/// One file expected inside a torrent, read from an input line.
///
/// Example: `{ torrent_path: "ubuntu.torrent", contained_file: "iso/ubuntu-22.04.iso" }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFileRef {
    pub torrent_path: PathBuf,
    /// Relative path fragment to search for in the path database
    pub contained_file: String,
}

/// A torrent resolved to the directory that holds its payload.
///
/// Produced at most once per distinct `torrent_path`.
///
/// Example: `{ torrent_path: "ubuntu.torrent", info_hash: 5a8f…, target_dir: "/data/incoming/" }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMatch {
    pub torrent_path: PathBuf,
    pub info_hash: InfoHash,
    pub target_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub sources: usize,
    /// Sources that could not be opened
    pub unreadable_sources: usize,
    /// Sources abandoned partway by an I/O error
    pub read_errors: usize,
    pub lines: usize,
    pub invalid_lines: usize,
    pub refs_sent: usize,
    /// The resolver stopped accepting input before all sources were read
    pub cut_short: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub received: usize,
    /// Inputs discarded because their torrent already had a match
    pub already_resolved: usize,
    pub queried: usize,
    pub excluded_candidates: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub hash_failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrarStats {
    pub received: usize,
    pub already_registered: usize,
    pub added: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Counters from all three stages of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub reader: ReaderStats,
    pub resolver: ResolverStats,
    pub registrar: RegistrarStats,
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines ({} invalid), {} torrents matched, {} unmatched, {} hash failures; \
             {} added, {} duplicates, {} already registered, {} failed",
            self.reader.lines,
            self.reader.invalid_lines,
            self.resolver.matched,
            self.resolver.unmatched,
            self.resolver.hash_failures,
            self.registrar.added,
            self.registrar.duplicates,
            self.registrar.already_registered,
            self.registrar.failed,
        )
    }
}
