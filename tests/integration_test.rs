use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use unpbo::{extract, parse, EntryDescriptor, ExtractError, FaultKind};

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// Lay out `entries` as an archive: table, sentinel, `props`, payloads.
fn build_archive(entries: &[EntryDescriptor], props: &[u8], payloads: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();
    for e in entries {
        buf.extend_from_slice(e.name.as_bytes());
        buf.push(0);
        for v in [e.packing_method, e.original_size, e.reserved, e.timestamp, e.data_size] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }
    buf.push(0);
    buf.extend_from_slice(props);
    for p in payloads {
        buf.extend_from_slice(p);
    }
    buf
}

fn stored(name: &str, len: usize) -> EntryDescriptor {
    EntryDescriptor {
        name:           name.to_string(),
        packing_method: 0,
        original_size:  len as u32,
        reserved:       0,
        timestamp:      0,
        data_size:      len as u32,
    }
}

fn scenario_archive() -> Vec<u8> {
    build_archive(
        &[stored("a.txt", 11), stored("dir\\b.txt", 5)],
        b"\x00\x00",
        &[b"hello world", b"there"],
    )
}

fn write_archive(bytes: &[u8]) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), bytes).unwrap();
    file
}

/// Every regular file under `root`, keyed by its path relative to `root`.
fn tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out
}

struct Run {
    result:    Result<unpbo::ExtractReport, ExtractError>,
    log:       Vec<String>,
    progress:  Vec<f64>,
}

fn run_extract(archive: &Path, root: &Path) -> Run {
    let mut log = Vec::new();
    let mut progress = Vec::new();
    let result = extract(archive, root, |l| log.push(l.to_string()), |f| progress.push(f));
    Run { result, log, progress }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn test_two_entry_scenario() {
    let archive = write_archive(&scenario_archive());
    let out = TempDir::new().unwrap();
    let root = out.path().join("R");

    let run = run_extract(archive.path(), &root);
    let report = run.result.unwrap();

    assert_eq!(fs::read(root.join("a.txt")).unwrap(), b"hello world");
    assert_eq!(fs::read(root.join("dir").join("b.txt")).unwrap(), b"there");
    assert_eq!(report.files, 2);
    assert_eq!(report.bytes, 16);
    assert_eq!(report.entries, vec![PathBuf::from("a.txt"), Path::new("dir").join("b.txt")]);

    assert_eq!(run.progress.len(), 2);
    assert!(run.progress[0] > 0.0 && run.progress[0] < 1.0);
    assert_eq!(run.progress[1], 1.0);

    assert_eq!(run.log.len(), 3);
    assert!(run.log[0].contains("a.txt") && run.log[0].contains("11"));
    assert!(run.log[1].contains("dir\\b.txt") && run.log[1].contains("5"));
    assert!(run.log[2].contains("extraction complete"));
    assert!(run.log[2].contains(&root.display().to_string()));
}

#[test]
fn test_written_tree_matches_table() {
    let names = ["config.cpp", "data\\tex\\a.paa", "data\\tex\\b.paa", "scripts\\init.sqf"];
    let payloads: Vec<Vec<u8>> = names
        .iter()
        .enumerate()
        .map(|(i, n)| n.bytes().cycle().take(100 * (i + 1)).collect())
        .collect();
    let entries: Vec<_> = names.iter().zip(&payloads).map(|(n, p)| stored(n, p.len())).collect();
    let slices: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
    let archive = write_archive(&build_archive(&entries, b"prefix\x00co08\x00\x00", &slices));
    let out = TempDir::new().unwrap();

    let report = run_extract(archive.path(), out.path()).result.unwrap();

    let expected: BTreeMap<PathBuf, Vec<u8>> = names
        .iter()
        .zip(&payloads)
        .map(|(n, p)| (n.split('\\').collect::<PathBuf>(), p.clone()))
        .collect();
    let written = tree(out.path());
    assert_eq!(written, expected);
    assert_eq!(report.files, names.len());
    assert_eq!(report.bytes, written.values().map(|v| v.len() as u64).sum::<u64>());
}

#[test]
fn test_extract_twice_is_idempotent() {
    let archive = write_archive(&scenario_archive());
    let out = TempDir::new().unwrap();

    run_extract(archive.path(), out.path()).result.unwrap();
    let first = tree(out.path());
    fs::write(out.path().join("a.txt"), b"locally edited, longer than the original").unwrap();
    run_extract(archive.path(), out.path()).result.unwrap();

    assert_eq!(tree(out.path()), first);
}

#[test]
fn test_empty_table_is_noop() {
    let archive = write_archive(b"\x00\x00\x00");
    let out = TempDir::new().unwrap();
    let root = out.path().join("empty");

    let run = run_extract(archive.path(), &root);
    let report = run.result.unwrap();

    assert_eq!(report.files, 0);
    assert_eq!(run.progress, vec![1.0]);
    assert!(tree(&root).is_empty());
}

#[test]
fn test_zero_size_entry_creates_empty_file() {
    let archive = write_archive(&build_archive(
        &[stored("empty\\marker.txt", 0), stored("b.txt", 2)],
        b"\x00\x00",
        &[b"", b"ok"],
    ));
    let out = TempDir::new().unwrap();

    run_extract(archive.path(), out.path()).result.unwrap();

    let marker = out.path().join("empty").join("marker.txt");
    assert!(marker.is_file());
    assert_eq!(fs::metadata(&marker).unwrap().len(), 0);
    assert_eq!(fs::read(out.path().join("b.txt")).unwrap(), b"ok");
}

// ── Faults ───────────────────────────────────────────────────────────────────

#[test]
fn test_truncated_last_payload_fails() {
    let mut bytes = scenario_archive();
    bytes.pop();
    let archive = write_archive(&bytes);
    let out = TempDir::new().unwrap();

    let run = run_extract(archive.path(), out.path());
    let err = run.result.unwrap_err();

    assert_eq!(err.kind(), FaultKind::Truncation);
    assert!(matches!(err, ExtractError::TruncatedPayload { ref name, .. } if name == "dir\\b.txt"));
    assert!(run.log.last().unwrap().starts_with("extraction failed"));
    assert!(!run.log.iter().any(|l| l.contains("extraction complete")));
    assert_ne!(run.progress.last().copied(), Some(1.0));
}

#[test]
fn test_truncated_table_surfaces_parse_fault() {
    let bytes = scenario_archive();
    let archive = write_archive(&bytes[..12]);
    let out = TempDir::new().unwrap();

    let err = run_extract(archive.path(), &out.path().join("R")).result.unwrap_err();
    assert!(matches!(err, ExtractError::Parse(unpbo::ParseError::TruncatedHeader { .. })));
    assert_eq!(err.kind(), FaultKind::Truncation);
    assert!(!out.path().join("R").exists());
}

#[test]
fn test_traversal_name_never_escapes_root() {
    let archive = write_archive(&build_archive(
        &[stored("ok.txt", 2), stored("..\\..\\evil.txt", 4)],
        b"\x00\x00",
        &[b"ok", b"evil"],
    ));
    let out = TempDir::new().unwrap();
    let root = out.path().join("a").join("b");

    let run = run_extract(archive.path(), &root);
    let err = run.result.unwrap_err();

    assert_eq!(err.kind(), FaultKind::PathSafety);
    assert!(run.log.last().unwrap().contains("evil.txt"));
    assert!(!out.path().join("evil.txt").exists());
    assert!(!out.path().join("a").join("evil.txt").exists());
    let everything = tree(out.path());
    assert_eq!(everything.len(), 1);
    assert!(everything.keys().all(|p| out.path().join(p).starts_with(&root)));
}

#[test]
fn test_packed_entry_reports_code_for_delegation() {
    let mut entry = stored("mission.sqm", 3);
    entry.packing_method = 0x4370_7273;
    entry.original_size = 10;
    let archive = write_archive(&build_archive(&[entry], b"\x00\x00", &[b"abc"]));
    let out = TempDir::new().unwrap();

    let err = run_extract(archive.path(), out.path()).result.unwrap_err();

    assert!(err.is_unsupported_encoding());
    let msg = err.to_string();
    assert!(msg.contains("mission.sqm"));
    assert!(msg.contains("0x43707273"));
    assert!(tree(out.path()).is_empty());
}

#[test]
fn test_independent_extractions_in_parallel() {
    let archive = write_archive(&scenario_archive());
    let out = TempDir::new().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = archive.path().to_path_buf();
            let root = out.path().join(format!("root{i}"));
            std::thread::spawn(move || {
                extract(&path, &root, |_| {}, |_| {}).unwrap();
                tree(&root)
            })
        })
        .collect();

    let trees: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(trees.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(trees[0].len(), 2);
}

// ── Properties ───────────────────────────────────────────────────────────────

fn arb_entry() -> impl Strategy<Value = EntryDescriptor> {
    (
        "[a-z0-9_]{1,8}(\\\\[a-z0-9_.]{1,8}){0,3}",
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
    )
        .prop_map(|(name, packing_method, original_size, reserved, timestamp, data_size)| {
            EntryDescriptor { name, packing_method, original_size, reserved, timestamp, data_size }
        })
}

proptest! {
    #[test]
    fn prop_hand_built_table_parses_back(
        entries in prop::collection::vec(arb_entry(), 0..16),
        props in "([a-z]{1,6}\\x00[a-z0-9]{1,6}\\x00){0,3}",
    ) {
        let mut props = props.into_bytes();
        props.push(0);
        if props.len() == 1 { props.push(0); }
        let bytes = build_archive(&entries, &props, &[]);

        let table = parse(&bytes[..]).unwrap();
        prop_assert_eq!(table.entries(), &entries[..]);
        prop_assert_eq!(table.data_offset() as usize, bytes.len());
    }
}
