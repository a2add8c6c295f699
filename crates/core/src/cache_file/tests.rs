use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use super::*;
use crate::exclusion::ExclusionKind;
use crate::types::{BranchId, ConnectorKind, Pos};

fn make_test_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

fn lvl(depth: u8) -> LevelId {
    LevelId { branch: BranchId(0), depth }
}

fn sample_cache() -> TravelCache {
    let mut cache = TravelCache::new();
    cache.record_crossing(
        LevelPos::new(lvl(1), Pos::new(2, 7)),
        ConnectorKind::StairsDown,
        LevelPos::new(lvl(2), Pos::new(1, 2)),
    );
    cache
        .level_mut(lvl(2))
        .exclusions_mut()
        .insert(Exclusion::new(Pos::new(4, 4), 3, ExclusionKind::Auto));
    cache.set_waypoint(0, LevelPos::new(lvl(1), Pos::new(1, 1))).unwrap();
    cache.set_waypoint(9, LevelPos::anywhere(lvl(2))).unwrap();
    cache
}

#[test]
fn saved_cache_loads_back_identical() {
    let dir = tempdir().unwrap();
    let path = make_test_path(dir.path(), "nested/travel.jsonl");
    let cache = sample_cache();

    save_cache_to_file(&path, &cache).unwrap();
    let loaded = load_cache_from_file(&path).unwrap();
    assert_eq!(loaded, cache);
    assert_eq!(loaded.waypoint(9), Some(LevelPos::anywhere(lvl(2))));
    assert_eq!(loaded.level(lvl(2)).map(|l| l.exclusions().len()), Some(1));
}

#[test]
fn header_describes_the_body() {
    let text = encode_cache(&sample_cache()).unwrap();
    let header: FileHeader = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(header.format_major, FORMAT_MAJOR);
    assert_eq!(header.level_count, 2);
    assert_eq!(header.body_sha256_hex.len(), 64);
    assert_eq!(text.lines().count(), 4, "header, two levels, waypoints");
}

#[test]
fn tampered_body_fails_the_checksum() {
    let text = encode_cache(&sample_cache()).unwrap();
    let tampered = text.replacen("\"depth\":2", "\"depth\":3", 1);
    assert_ne!(tampered, text);
    assert!(matches!(decode_cache(&tampered), Err(CacheLoadError::ChecksumMismatch)));
}

#[test]
fn other_major_version_loads_empty() {
    let text = encode_cache(&sample_cache()).unwrap();
    let future = text.replacen(
        &format!("\"format_major\":{FORMAT_MAJOR}"),
        &format!("\"format_major\":{}", FORMAT_MAJOR + 1),
        1,
    );
    let loaded = decode_cache(&future).unwrap();
    assert_eq!(loaded, TravelCache::new());
}

#[test]
fn newer_minor_version_still_loads() {
    let cache = sample_cache();
    let text = encode_cache(&cache).unwrap();
    let newer = text.replacen("\"format_minor\":0", "\"format_minor\":7", 1);
    assert_eq!(decode_cache(&newer).unwrap(), cache);
}

#[test]
fn wrong_level_count_is_reported() {
    let text = encode_cache(&sample_cache()).unwrap();
    let (header_line, body) = text.split_once('\n').unwrap();
    let mut header: FileHeader = serde_json::from_str(header_line).unwrap();
    header.level_count = 5;
    let rewritten = format!("{}\n{body}", serde_json::to_string(&header).unwrap());
    assert!(matches!(
        decode_cache(&rewritten),
        Err(CacheLoadError::CountMismatch { expected: 5, found: 2 })
    ));
}

#[test]
fn truncated_and_empty_files_are_rejected() {
    let text = encode_cache(&sample_cache()).unwrap();
    let truncated = &text[..text.len() - 1];
    assert!(matches!(decode_cache(truncated), Err(CacheLoadError::IncompleteLine { .. })));
    assert!(matches!(decode_cache(""), Err(CacheLoadError::EmptyFile)));
    assert!(matches!(decode_cache("not json\n"), Err(CacheLoadError::InvalidHeader { .. })));
}

#[test]
fn malformed_record_names_its_line() {
    let body = "{\"record\":\"level\",\"id\":{\"branch\":0,\"depth\":1}}\n";
    let header = FileHeader {
        format_major: FORMAT_MAJOR,
        format_minor: FORMAT_MINOR,
        level_count: 1,
        body_sha256_hex: body_sha256_hex(body),
    };
    let text = format!("{}\n{body}", serde_json::to_string(&header).unwrap());
    assert!(matches!(decode_cache(&text), Err(CacheLoadError::InvalidRecord { line: 2, .. })));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let path = make_test_path(dir.path(), "absent.jsonl");
    assert!(matches!(load_cache_from_file(&path), Err(CacheLoadError::Io(_))));
    fs::write(&path, "").unwrap();
    assert!(matches!(load_cache_from_file(&path), Err(CacheLoadError::EmptyFile)));
}
