// Torrent Metainfo
//
// Derives the BitTorrent v1 info hash of a .torrent file: the SHA-1 digest of
// the raw bencoded `info` dictionary, exactly as it appears on disk. The
// dictionary is located by walking the bencode structure without decoding it,
// so re-encoding quirks can never change the hash.

use sha1::{Digest, Sha1};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Nesting limit for bencode lists and dictionaries
const MAX_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum MetainfoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed bencode at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
    #[error("Torrent has no info dictionary")]
    MissingInfo,
    #[error("Invalid info hash: {0}")]
    InvalidHash(String),
}

/// 20-byte SHA-1 info hash identifying a torrent's content
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        InfoHash(bytes)
    }

    /// Parse a 40-character hex string (either case), as reported by
    /// Transmission's `hashString` field
    pub fn from_hex(s: &str) -> Result<Self, MetainfoError> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| MetainfoError::InvalidHash(format!("{:?}: {}", s, e)))?;
        Ok(InfoHash(bytes))
    }

    /// Hash a bencoded info dictionary
    pub fn of_info_dict(info: &[u8]) -> Self {
        let digest = Sha1::digest(info);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        InfoHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

/// Derives info hashes from torrent files (allows mocking for tests)
#[async_trait::async_trait]
pub trait MetainfoReader: Send + Sync {
    async fn info_hash(&self, torrent_path: &Path) -> Result<InfoHash, MetainfoError>;
}

/// Reads .torrent files from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FileMetainfoReader;

#[async_trait::async_trait]
impl MetainfoReader for FileMetainfoReader {
    async fn info_hash(&self, torrent_path: &Path) -> Result<InfoHash, MetainfoError> {
        let data = tokio::fs::read(torrent_path).await?;
        info_hash_from_bytes(&data)
    }
}

/// Compute the info hash of an in-memory .torrent file
pub fn info_hash_from_bytes(data: &[u8]) -> Result<InfoHash, MetainfoError> {
    let info = info_dict_span(data)?;
    Ok(InfoHash::of_info_dict(info))
}

/// Locate the raw bytes of the top-level `info` value
pub fn info_dict_span(data: &[u8]) -> Result<&[u8], MetainfoError> {
    if data.first() != Some(&b'd') {
        return Err(malformed(0, "torrent must be a dictionary"));
    }

    let mut pos = 1;
    loop {
        match data.get(pos) {
            Some(b'e') => return Err(MetainfoError::MissingInfo),
            Some(_) => {}
            None => return Err(malformed(pos, "unterminated dictionary")),
        }

        let (key, value_start) = read_string(data, pos)?;
        let value_end = skip_value(data, value_start, 1)?;
        if key == b"info" {
            if data[value_start] != b'd' {
                return Err(malformed(value_start, "info must be a dictionary"));
            }
            return Ok(&data[value_start..value_end]);
        }
        pos = value_end;
    }
}

/// Read a `<len>:<bytes>` string, returning it and the offset after it
fn read_string(data: &[u8], pos: usize) -> Result<(&[u8], usize), MetainfoError> {
    let colon = data[pos..]
        .iter()
        .position(|&b| b == b':')
        .map(|i| pos + i)
        .ok_or_else(|| malformed(pos, "string length without ':'"))?;

    let digits = &data[pos..colon];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed(pos, "invalid string length"));
    }
    let len: usize = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed(pos, "invalid string length"))?;

    let start = colon + 1;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| malformed(pos, "string runs past end of data"))?;
    Ok((&data[start..end], end))
}

/// Skip one bencode value starting at `pos`, returning the offset after it
fn skip_value(data: &[u8], pos: usize, depth: usize) -> Result<usize, MetainfoError> {
    if depth > MAX_DEPTH {
        return Err(malformed(pos, "nesting too deep"));
    }

    match data.get(pos) {
        Some(b'i') => {
            let end = data[pos..]
                .iter()
                .position(|&b| b == b'e')
                .ok_or_else(|| malformed(pos, "unterminated integer"))?;
            Ok(pos + end + 1)
        }
        Some(b'l') => {
            let mut p = pos + 1;
            while data.get(p) != Some(&b'e') {
                if p >= data.len() {
                    return Err(malformed(p, "unterminated list"));
                }
                p = skip_value(data, p, depth + 1)?;
            }
            Ok(p + 1)
        }
        Some(b'd') => {
            let mut p = pos + 1;
            while data.get(p) != Some(&b'e') {
                if p >= data.len() {
                    return Err(malformed(p, "unterminated dictionary"));
                }
                let (_, value_start) = read_string(data, p)?;
                p = skip_value(data, value_start, depth + 1)?;
            }
            Ok(p + 1)
        }
        Some(b) if b.is_ascii_digit() => read_string(data, pos).map(|(_, end)| end),
        Some(_) => Err(malformed(pos, "unexpected byte")),
        None => Err(malformed(pos, "unexpected end of data")),
    }
}

fn malformed(offset: usize, reason: &'static str) -> MetainfoError {
    MetainfoError::Malformed { offset, reason }
}
