//! Versioned binary codec for the single-file store.
//!
//! Layout is little-endian throughout: a `FEAT` magic + u32 version header,
//! a metadata section, then one self-describing section per modality with
//! `(id, vector)` pairs in internal-index order. The writer always emits
//! version 5; the reader accepts 2 through 5. HNSW topology is never
//! serialized — vectors are re-inserted on load.
//!
//! Corruption policy: a bad header is fatal, a foreign magic yields a fresh
//! store, and mid-stream truncation stops the read but keeps everything
//! decoded so far (partial recovery).

use crate::config;
use crate::error::{FeatherError, Result};
use crate::hnsw::HnswIndex;
use crate::record::{ContextType, Edge, Metadata};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// One modality's persisted payload: `(id, vector)` pairs in insertion order.
#[derive(Debug, Default)]
pub(crate) struct ModalitySection {
    pub name: String,
    pub dim: u32,
    pub vectors: Vec<(u64, Vec<f32>)>,
}

/// Everything a store file contains, decoded but not yet indexed.
#[derive(Debug, Default)]
pub(crate) struct LoadedStore {
    pub records: HashMap<u64, Metadata>,
    pub modalities: Vec<ModalitySection>,
}

/// Result of opening a store path.
pub(crate) enum ReadOutcome {
    /// No file, or a file with foreign magic: start empty.
    Fresh,
    /// A recognized store file (possibly partially recovered).
    Loaded(LoadedStore),
}

// ── Writing ──────────────────────────────────────────────────────────────

/// Serialize the whole store to `path` at the current version.
///
/// Writes to a sibling temp file first and renames over the target, so an
/// I/O failure leaves the previous file intact.
pub(crate) fn write_store(
    path: &Path,
    records: &HashMap<u64, Metadata>,
    modalities: &HashMap<String, HnswIndex>,
) -> Result<()> {
    let tmp = tmp_path(path);
    let file = File::create(&tmp)?;
    let mut w = BufWriter::new(file);

    w.write_all(&config::FILE_MAGIC.to_le_bytes())?;
    w.write_all(&config::FILE_VERSION.to_le_bytes())?;

    w.write_all(&(records.len() as u32).to_le_bytes())?;
    for (&id, meta) in records {
        w.write_all(&id.to_le_bytes())?;
        encode_metadata(&mut w, meta)?;
    }

    // Stable section order keeps repeated saves byte-comparable.
    let mut names: Vec<&String> = modalities.keys().collect();
    names.sort();
    w.write_all(&(names.len() as u32).to_le_bytes())?;
    for name in names {
        let index = &modalities[name];
        write_str_u16(&mut w, name)?;
        w.write_all(&(index.dimension() as u32).to_le_bytes())?;
        w.write_all(&index.node_count().to_le_bytes())?;
        for internal in 0..index.node_count() {
            w.write_all(&index.label_at(internal).to_le_bytes())?;
            for &v in index.vector_at(internal) {
                w.write_all(&v.to_le_bytes())?;
            }
        }
    }

    w.flush()?;
    fs::rename(&tmp, path)?;
    tracing::info!(
        records = records.len(),
        modalities = modalities.len(),
        path = %path.display(),
        "store saved"
    );
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize one metadata record (current version layout).
///
/// The legacy links slot is always written as zero; edges carry that
/// information now. Length-prefixed strings are clamped to what their
/// prefix width can express, on a char boundary.
pub(crate) fn encode_metadata(w: &mut impl Write, meta: &Metadata) -> Result<()> {
    w.write_all(&meta.timestamp.to_le_bytes())?;
    w.write_all(&meta.importance.to_le_bytes())?;
    w.write_all(&[meta.kind.as_u8()])?;
    write_str_u16(w, &meta.source)?;
    write_str_u32(w, &meta.content)?;
    write_str_u16(w, &meta.tags_json)?;

    // Legacy plain-link slot, superseded by typed edges.
    w.write_all(&0u16.to_le_bytes())?;
    w.write_all(&meta.recall_count.to_le_bytes())?;
    w.write_all(&meta.last_recalled_at.to_le_bytes())?;

    write_str_u16(w, &meta.namespace_id)?;
    write_str_u16(w, &meta.entity_id)?;
    w.write_all(&(meta.attributes.len() as u16).to_le_bytes())?;
    for (key, val) in &meta.attributes {
        write_str_u16(w, key)?;
        write_str_u32(w, val)?;
    }

    w.write_all(&(meta.edges.len() as u16).to_le_bytes())?;
    for e in &meta.edges {
        w.write_all(&e.target_id.to_le_bytes())?;
        write_str_u8(w, &e.rel_type)?;
        w.write_all(&e.weight.to_le_bytes())?;
    }
    Ok(())
}

// ── Reading ──────────────────────────────────────────────────────────────

/// Open and decode the store file at `path`.
///
/// Missing file or foreign magic → [`ReadOutcome::Fresh`]. A short header is
/// fatal [`FeatherError::Corrupt`]; a known magic with an unknown version is
/// [`FeatherError::UnsupportedVersion`]. Everything past the header degrades
/// gracefully: truncation keeps what was decoded.
pub(crate) fn read_store(path: &Path) -> Result<ReadOutcome> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReadOutcome::Fresh),
        Err(e) => return Err(e.into()),
    };
    let mut r = BufReader::new(file);

    let mut header = [0u8; 8];
    r.read_exact(&mut header)
        .map_err(|_| FeatherError::Corrupt("truncated header".into()))?;
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    if magic != config::FILE_MAGIC {
        return Ok(ReadOutcome::Fresh);
    }
    if !(config::FILE_MIN_VERSION..=config::FILE_VERSION).contains(&version) {
        return Err(FeatherError::UnsupportedVersion(version));
    }

    let mut store = LoadedStore::default();
    let read = if version == 2 {
        read_v2(&mut r, &mut store)
    } else {
        read_sectioned(&mut r, version, &mut store)
    };
    if let Err(e) = read {
        tracing::warn!(
            records = store.records.len(),
            path = %path.display(),
            "store file corrupt past this point, keeping partial load: {e}"
        );
    } else {
        tracing::info!(
            records = store.records.len(),
            modalities = store.modalities.len(),
            version,
            path = %path.display(),
            "store loaded"
        );
    }
    Ok(ReadOutcome::Loaded(store))
}

/// Version 2: single implicit `"text"` modality, metadata interleaved with
/// vectors, repeated until EOF.
fn read_v2(r: &mut impl Read, store: &mut LoadedStore) -> Result<()> {
    let dim = read_u32(r)?;
    // Register the section up front so a truncated tail still keeps every
    // fully decoded (metadata, vector) pair.
    store.modalities.push(ModalitySection {
        name: config::DEFAULT_MODALITY.to_string(),
        dim,
        vectors: Vec::new(),
    });
    let section = store
        .modalities
        .last_mut()
        .expect("section pushed just above");
    loop {
        let id = match read_u64(r) {
            Ok(id) => id,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        let meta = decode_metadata(r, 2)?;
        let vector = read_vector(r, dim as usize)?;
        store.records.insert(id, meta);
        section.vectors.push((id, vector));
    }
    Ok(())
}

/// Versions 3–5: metadata section first, then per-modality vector sections.
fn read_sectioned(r: &mut impl Read, version: u32, store: &mut LoadedStore) -> Result<()> {
    let meta_count = read_u32(r)?;
    for _ in 0..meta_count {
        let id = read_u64(r)?;
        let meta = decode_metadata(r, version)?;
        store.records.insert(id, meta);
    }

    let modal_count = read_u32(r)?;
    for _ in 0..modal_count {
        let name = read_string_u16(r)?;
        let dim = read_u32(r)?;
        let element_count = read_u32(r)?;
        store.modalities.push(ModalitySection {
            name,
            dim,
            vectors: Vec::new(),
        });
        let section = store
            .modalities
            .last_mut()
            .expect("section pushed just above");
        for _ in 0..element_count {
            let id = read_u64(r)?;
            let vector = read_vector(r, dim as usize)?;
            section.vectors.push((id, vector));
        }
    }
    Ok(())
}

/// Decode one metadata record. Fields are version-gated: namespace, entity,
/// and attributes exist from v4; the typed edge list from v5. Non-zero
/// legacy link counts (v3/v4 files) are promoted to `related_to` edges.
pub(crate) fn decode_metadata(r: &mut impl Read, version: u32) -> Result<Metadata> {
    let mut meta = Metadata {
        timestamp: read_i64(r)?,
        importance: read_f32(r)?,
        kind: ContextType::from_u8(read_u8(r)?),
        ..Metadata::default()
    };
    meta.source = read_string_u16(r)?;
    meta.content = read_string_u32(r)?;
    meta.tags_json = read_string_u16(r)?;

    let legacy_links = read_u16(r)?;
    for _ in 0..legacy_links {
        meta.edges.push(Edge {
            target_id: read_u64(r)?,
            rel_type: config::DEFAULT_REL_TYPE.to_string(),
            weight: 1.0,
        });
    }
    meta.recall_count = read_u32(r)?;
    meta.last_recalled_at = read_u64(r)?;

    if version >= 4 {
        meta.namespace_id = read_string_u16(r)?;
        meta.entity_id = read_string_u16(r)?;
        let attr_count = read_u16(r)?;
        for _ in 0..attr_count {
            let key = read_string_u16(r)?;
            let val = read_string_u32(r)?;
            meta.attributes.insert(key, val);
        }
    }

    if version >= 5 {
        let edge_count = read_u16(r)?;
        for _ in 0..edge_count {
            meta.edges.push(Edge {
                target_id: read_u64(r)?,
                rel_type: read_string_u8(r)?,
                weight: read_f32(r)?,
            });
        }
    }

    Ok(meta)
}

// ── Primitive readers/writers ────────────────────────────────────────────

fn read_u8(r: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16(r: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64(r: &mut impl Read) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_f32(r: &mut impl Read) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_vector(r: &mut impl Read, dim: usize) -> io::Result<Vec<f32>> {
    let mut bytes = vec![0u8; dim * 4];
    r.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn read_string(r: &mut impl Read, len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes).map_err(FeatherError::Io)?;
    String::from_utf8(bytes).map_err(|_| FeatherError::Corrupt("non-UTF-8 string field".into()))
}

fn read_string_u8(r: &mut impl Read) -> Result<String> {
    let len = read_u8(r)? as usize;
    read_string(r, len)
}

fn read_string_u16(r: &mut impl Read) -> Result<String> {
    let len = read_u16(r)? as usize;
    read_string(r, len)
}

fn read_string_u32(r: &mut impl Read) -> Result<String> {
    let len = read_u32(r)? as usize;
    read_string(r, len)
}

fn write_str_u8(w: &mut impl Write, s: &str) -> io::Result<()> {
    let s = clamp_str(s, u8::MAX as usize);
    w.write_all(&[s.len() as u8])?;
    w.write_all(s.as_bytes())
}

fn write_str_u16(w: &mut impl Write, s: &str) -> io::Result<()> {
    let s = clamp_str(s, u16::MAX as usize);
    w.write_all(&(s.len() as u16).to_le_bytes())?;
    w.write_all(s.as_bytes())
}

fn write_str_u32(w: &mut impl Write, s: &str) -> io::Result<()> {
    w.write_all(&(s.len() as u32).to_le_bytes())?;
    w.write_all(s.as_bytes())
}

/// Longest prefix of `s` at most `max` bytes long, on a char boundary.
fn clamp_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn full_meta() -> Metadata {
        let mut meta = Metadata {
            timestamp: -120,
            importance: 0.75,
            kind: ContextType::Preference,
            source: "import:notes".into(),
            content: "prefers tea over coffee ☕".into(),
            tags_json: r#"["beverages"]"#.into(),
            recall_count: 4,
            last_recalled_at: 1_700_000_000,
            namespace_id: "home".into(),
            entity_id: "sam".into(),
            ..Metadata::default()
        };
        meta.attributes.insert("strength".into(), "strong".into());
        meta.edges.push(Edge {
            target_id: 42,
            rel_type: "supports".into(),
            weight: 0.9,
        });
        meta
    }

    #[test]
    fn test_metadata_roundtrip_current_version() {
        let meta = full_meta();
        let mut buf = Vec::new();
        encode_metadata(&mut buf, &meta).unwrap();
        let decoded = decode_metadata(&mut Cursor::new(buf), config::FILE_VERSION).unwrap();
        assert_eq!(decoded, meta);
    }

    /// Hand-build a v3 metadata record: fields through last_recalled_at.
    fn v3_bytes(links: &[u64]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&500i64.to_le_bytes()); // timestamp
        b.extend_from_slice(&0.5f32.to_le_bytes()); // importance
        b.push(2); // Event
        b.extend_from_slice(&3u16.to_le_bytes());
        b.extend_from_slice(b"old");
        b.extend_from_slice(&5u32.to_le_bytes());
        b.extend_from_slice(b"hello");
        b.extend_from_slice(&0u16.to_le_bytes()); // tags
        b.extend_from_slice(&(links.len() as u16).to_le_bytes());
        for &l in links {
            b.extend_from_slice(&l.to_le_bytes());
        }
        b.extend_from_slice(&7u32.to_le_bytes()); // recall_count
        b.extend_from_slice(&900u64.to_le_bytes()); // last_recalled_at
        b
    }

    #[test]
    fn test_v3_decode_defaults_newer_fields() {
        let decoded = decode_metadata(&mut Cursor::new(v3_bytes(&[])), 3).unwrap();
        assert_eq!(decoded.timestamp, 500);
        assert_eq!(decoded.kind, ContextType::Event);
        assert_eq!(decoded.source, "old");
        assert_eq!(decoded.content, "hello");
        assert_eq!(decoded.recall_count, 7);
        assert!(decoded.namespace_id.is_empty());
        assert!(decoded.entity_id.is_empty());
        assert!(decoded.attributes.is_empty());
        assert!(decoded.edges.is_empty());
    }

    #[test]
    fn test_v3_legacy_links_promoted_to_edges() {
        let decoded = decode_metadata(&mut Cursor::new(v3_bytes(&[10, 11])), 3).unwrap();
        assert_eq!(decoded.edges.len(), 2);
        for (e, target) in decoded.edges.iter().zip([10u64, 11]) {
            assert_eq!(e.target_id, target);
            assert_eq!(e.rel_type, "related_to");
            assert_eq!(e.weight, 1.0);
        }
    }

    #[test]
    fn test_v4_decode_reads_namespace_but_no_edges() {
        let mut b = v3_bytes(&[]);
        b.extend_from_slice(&2u16.to_le_bytes());
        b.extend_from_slice(b"ws");
        b.extend_from_slice(&3u16.to_le_bytes());
        b.extend_from_slice(b"bob");
        b.extend_from_slice(&1u16.to_le_bytes()); // one attribute
        b.extend_from_slice(&1u16.to_le_bytes());
        b.extend_from_slice(b"k");
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(b"v");

        let decoded = decode_metadata(&mut Cursor::new(b), 4).unwrap();
        assert_eq!(decoded.namespace_id, "ws");
        assert_eq!(decoded.entity_id, "bob");
        assert_eq!(decoded.attributes.get("k").map(String::as_str), Some("v"));
        assert!(decoded.edges.is_empty());
    }

    #[test]
    fn test_rel_type_clamped_to_u8_on_boundary() {
        let mut meta = Metadata::default();
        // 300 two-byte chars: must clamp to <= 255 bytes without splitting one.
        meta.edges.push(Edge {
            target_id: 1,
            rel_type: "é".repeat(300),
            weight: 1.0,
        });
        let mut buf = Vec::new();
        encode_metadata(&mut buf, &meta).unwrap();
        let decoded = decode_metadata(&mut Cursor::new(buf), 5).unwrap();
        let rel = &decoded.edges[0].rel_type;
        assert!(rel.len() <= 255);
        assert_eq!(rel.len() % 2, 0, "must not split a 2-byte char");
    }

    #[test]
    fn test_non_utf8_string_is_corrupt() {
        let mut b = Vec::new();
        b.extend_from_slice(&0i64.to_le_bytes());
        b.extend_from_slice(&1.0f32.to_le_bytes());
        b.push(0);
        b.extend_from_slice(&2u16.to_le_bytes());
        b.extend_from_slice(&[0xFF, 0xFE]); // invalid UTF-8 source
        let err = decode_metadata(&mut Cursor::new(b), 5).unwrap_err();
        assert!(matches!(err, FeatherError::Corrupt(_)));
    }

    // ── Whole-file paths ─────────────────────────────────────────────

    fn tmp_file(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("feather_codec_{tag}_{}.db", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_missing_file_is_fresh() {
        let path = tmp_file("missing");
        assert!(matches!(read_store(&path).unwrap(), ReadOutcome::Fresh));
    }

    #[test]
    fn test_foreign_magic_is_fresh() {
        let path = tmp_file("foreign");
        fs::write(&path, b"SQLITE FORMATISH FILE.......").unwrap();
        assert!(matches!(read_store(&path).unwrap(), ReadOutcome::Fresh));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_short_header_is_corrupt() {
        let path = tmp_file("short");
        fs::write(&path, &config::FILE_MAGIC.to_le_bytes()[..3]).unwrap();
        assert!(matches!(
            read_store(&path),
            Err(FeatherError::Corrupt(_))
        ));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unknown_version_rejected() {
        let path = tmp_file("version");
        let mut b = Vec::new();
        b.extend_from_slice(&config::FILE_MAGIC.to_le_bytes());
        b.extend_from_slice(&9u32.to_le_bytes());
        fs::write(&path, b).unwrap();
        assert!(matches!(
            read_store(&path),
            Err(FeatherError::UnsupportedVersion(9))
        ));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_read_roundtrip() {
        let path = tmp_file("roundtrip");
        let mut records = HashMap::new();
        records.insert(1u64, full_meta());
        records.insert(2u64, Metadata::default());

        let mut index = HnswIndex::with_default_config(3);
        index.add_point(&[1.0, 0.0, 0.0], 1);
        index.add_point(&[0.0, 1.0, 0.0], 2);
        let mut modalities = HashMap::new();
        modalities.insert("text".to_string(), index);

        write_store(&path, &records, &modalities).unwrap();
        let loaded = match read_store(&path).unwrap() {
            ReadOutcome::Loaded(l) => l,
            ReadOutcome::Fresh => panic!("expected a loaded store"),
        };
        assert_eq!(loaded.records, records);
        assert_eq!(loaded.modalities.len(), 1);
        let section = &loaded.modalities[0];
        assert_eq!(section.name, "text");
        assert_eq!(section.dim, 3);
        assert_eq!(
            section.vectors,
            vec![(1u64, vec![1.0, 0.0, 0.0]), (2u64, vec![0.0, 1.0, 0.0])]
        );
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_truncated_file_keeps_partial_records() {
        let path = tmp_file("truncated");
        let mut records = HashMap::new();
        for id in 0..10u64 {
            records.insert(
                id,
                Metadata {
                    content: format!("record {id}"),
                    ..Metadata::default()
                },
            );
        }
        let modalities = HashMap::new();
        write_store(&path, &records, &modalities).unwrap();

        // Chop the tail off: some records decode, the rest are gone.
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let loaded = match read_store(&path).unwrap() {
            ReadOutcome::Loaded(l) => l,
            ReadOutcome::Fresh => panic!("expected partial load"),
        };
        assert!(!loaded.records.is_empty(), "some records should survive");
        assert!(loaded.records.len() < 10, "the tail should be lost");
        for (id, meta) in &loaded.records {
            assert_eq!(meta.content, format!("record {id}"));
        }
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_v2_file_loads_into_text_modality() {
        let path = tmp_file("v2");
        let mut b = Vec::new();
        b.extend_from_slice(&config::FILE_MAGIC.to_le_bytes());
        b.extend_from_slice(&2u32.to_le_bytes());
        b.extend_from_slice(&2u32.to_le_bytes()); // dim
        for (id, vec) in [(7u64, [1.0f32, 2.0]), (8, [3.0, 4.0])] {
            b.extend_from_slice(&id.to_le_bytes());
            b.extend_from_slice(&v3_bytes(&[])); // v2 metadata shares the v3 layout
            for v in vec {
                b.extend_from_slice(&v.to_le_bytes());
            }
        }
        fs::write(&path, b).unwrap();

        let loaded = match read_store(&path).unwrap() {
            ReadOutcome::Loaded(l) => l,
            ReadOutcome::Fresh => panic!("expected a loaded store"),
        };
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.modalities.len(), 1);
        assert_eq!(loaded.modalities[0].name, "text");
        assert_eq!(loaded.modalities[0].dim, 2);
        assert_eq!(
            loaded.modalities[0].vectors,
            vec![(7u64, vec![1.0, 2.0]), (8, vec![3.0, 4.0])]
        );
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_atomic_save_replaces_previous_file() {
        let path = tmp_file("atomic");
        let modalities = HashMap::new();
        let mut records = HashMap::new();
        records.insert(1u64, Metadata::default());
        write_store(&path, &records, &modalities).unwrap();
        records.insert(2u64, Metadata::default());
        write_store(&path, &records, &modalities).unwrap();

        let loaded = match read_store(&path).unwrap() {
            ReadOutcome::Loaded(l) => l,
            ReadOutcome::Fresh => panic!("expected a loaded store"),
        };
        assert_eq!(loaded.records.len(), 2);
        assert!(!tmp_path(&path).exists(), "temp file must be renamed away");
        fs::remove_file(&path).unwrap();
    }
}
