//! File-backed JSONL persistence for the travel cache.
//!
//! The file format is line-delimited JSON (`.jsonl`):
//! - Line 1: header with `format_major`, `format_minor`, `level_count` and
//!   `body_sha256_hex`, the SHA-256 of every following line (newlines included).
//! - Lines 2+: one `level` record per known level, in level order.
//! - Last line: the `waypoints` record.
//!
//! A file written by a different major version is not an error: it loads as an
//! empty cache, since learned connector data can always be relearned. Anything
//! else that does not check out is reported as a [`CacheLoadError`].

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::exclusion::{Exclusion, ExclusionSet};
use crate::travel::{Connector, LevelInfo, TravelCache, WAYPOINT_COUNT};
use crate::types::{LevelId, LevelPos};

pub const FORMAT_MAJOR: u16 = 1;
pub const FORMAT_MINOR: u16 = 0;

// ---------------------------------------------------------------------------
// File format structs
// ---------------------------------------------------------------------------

/// Only the field needed to decide whether the rest of the header is readable.
#[derive(Deserialize)]
struct VersionProbe {
    format_major: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct FileHeader {
    format_major: u16,
    format_minor: u16,
    level_count: usize,
    body_sha256_hex: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct LevelRecord {
    id: LevelId,
    connectors: Vec<Connector>,
    /// Row-major connector distance matrix.
    distances: Vec<Option<u32>>,
    exclusions: Vec<Exclusion>,
    fingerprint: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "record", rename_all = "snake_case")]
enum BodyLine {
    Level(LevelRecord),
    Waypoints { slots: Vec<Option<LevelPos>> },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Describes why a cache file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum CacheLoadError {
    #[error("travel cache I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("travel cache file is empty")]
    EmptyFile,
    #[error("incomplete travel cache line at line {line}")]
    IncompleteLine { line: usize },
    #[error("invalid travel cache header: {message}")]
    InvalidHeader { message: String },
    #[error("invalid travel cache record at line {line}: {message}")]
    InvalidRecord { line: usize, message: String },
    #[error("travel cache header promises {expected} levels, found {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("travel cache body does not match its SHA-256 checksum")]
    ChecksumMismatch,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn body_sha256_hex(body: &str) -> String {
    let result = Sha256::digest(body.as_bytes());
    format!("{result:064x}")
}

fn level_record(info: &LevelInfo) -> LevelRecord {
    LevelRecord {
        id: info.id(),
        connectors: info.connectors().to_vec(),
        distances: info.distances().to_vec(),
        exclusions: info.exclusions().iter().cloned().collect(),
        fingerprint: info.fingerprint(),
    }
}

/// Serializes the whole cache, header first.
pub fn encode_cache(cache: &TravelCache) -> io::Result<String> {
    let mut body = String::new();
    let mut level_count = 0;
    for info in cache.levels() {
        let line = serde_json::to_string(&BodyLine::Level(level_record(info)))
            .map_err(io::Error::other)?;
        body.push_str(&line);
        body.push('\n');
        level_count += 1;
    }
    let waypoints = BodyLine::Waypoints { slots: cache.waypoints().to_vec() };
    body.push_str(&serde_json::to_string(&waypoints).map_err(io::Error::other)?);
    body.push('\n');

    let header = FileHeader {
        format_major: FORMAT_MAJOR,
        format_minor: FORMAT_MINOR,
        level_count,
        body_sha256_hex: body_sha256_hex(&body),
    };
    let mut out = serde_json::to_string(&header).map_err(io::Error::other)?;
    out.push('\n');
    out.push_str(&body);
    Ok(out)
}

pub fn save_cache_to_file(path: &Path, cache: &TravelCache) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, encode_cache(cache)?)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

pub fn decode_cache(content: &str) -> Result<TravelCache, CacheLoadError> {
    if content.is_empty() {
        return Err(CacheLoadError::EmptyFile);
    }
    let Some((header_line, body)) = content.split_once('\n') else {
        return Err(CacheLoadError::IncompleteLine { line: 1 });
    };
    if !body.is_empty() && !body.ends_with('\n') {
        return Err(CacheLoadError::IncompleteLine { line: content.lines().count() });
    }

    // --- header (line 1) ---
    let probe: VersionProbe = serde_json::from_str(header_line)
        .map_err(|e| CacheLoadError::InvalidHeader { message: e.to_string() })?;
    if probe.format_major != FORMAT_MAJOR {
        tracing::debug!(
            target: "travel::cache_file",
            found = probe.format_major,
            expected = FORMAT_MAJOR,
            "travel cache written by another format version, starting empty"
        );
        return Ok(TravelCache::new());
    }
    let header: FileHeader = serde_json::from_str(header_line)
        .map_err(|e| CacheLoadError::InvalidHeader { message: e.to_string() })?;
    if header.body_sha256_hex != body_sha256_hex(body) {
        return Err(CacheLoadError::ChecksumMismatch);
    }

    // --- records (lines 2+) ---
    let mut cache = TravelCache::new();
    let mut levels_seen = 0;
    let mut waypoints_seen = false;
    for (line_index, line) in body.lines().enumerate() {
        let line_number = line_index + 2; // 1-indexed; header is line 1
        let invalid = |message: String| CacheLoadError::InvalidRecord { line: line_number, message };
        if waypoints_seen {
            return Err(invalid("record after the waypoint line".to_string()));
        }

        let record: BodyLine = serde_json::from_str(line).map_err(|e| invalid(e.to_string()))?;
        match record {
            BodyLine::Level(record) => {
                if cache.has_level(record.id) {
                    return Err(invalid(format!("level {} appears twice", record.id)));
                }
                let mut exclusions = ExclusionSet::new();
                for zone in record.exclusions {
                    exclusions.insert(zone);
                }
                let info = LevelInfo::from_parts(
                    record.id,
                    record.connectors,
                    record.distances,
                    exclusions,
                    record.fingerprint,
                )
                .map_err(invalid)?;
                cache.insert_level(info);
                levels_seen += 1;
            }
            BodyLine::Waypoints { slots } => {
                if slots.len() != WAYPOINT_COUNT {
                    return Err(invalid(format!(
                        "expected {WAYPOINT_COUNT} waypoint slots, found {}",
                        slots.len()
                    )));
                }
                for (number, slot) in slots.into_iter().enumerate() {
                    if let Some(at) = slot {
                        cache.set_waypoint(number, at).map_err(|e| invalid(e.to_string()))?;
                    }
                }
                waypoints_seen = true;
            }
        }
    }

    if levels_seen != header.level_count {
        return Err(CacheLoadError::CountMismatch {
            expected: header.level_count,
            found: levels_seen,
        });
    }
    if !waypoints_seen {
        return Err(CacheLoadError::InvalidRecord {
            line: body.lines().count() + 1,
            message: "missing waypoint line".to_string(),
        });
    }
    Ok(cache)
}

pub fn load_cache_from_file(path: &Path) -> Result<TravelCache, CacheLoadError> {
    let content = fs::read_to_string(path)?;
    decode_cache(&content)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests;
