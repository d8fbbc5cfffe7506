use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IndexError;
use crate::flat::{FlatIndex, Metric};
use crate::labels::{CardLabel, LabelTable};
use crate::snapshot::{ArtifactMeta, IndexSnapshot};

/// Default file name of the vector half of an artifact.
pub const INDEX_FILE_NAME: &str = "cards_index.cvx";
/// Default file name of the label half of an artifact.
pub const LABELS_FILE_NAME: &str = "cards_labels.cvl";

const INDEX_MAGIC: [u8; 4] = *b"CVIX";
const LABELS_MAGIC: [u8; 4] = *b"CVLB";
const ARTIFACT_VERSION: u32 = 1;

/// Upper bound for header strings; anything larger is a corrupt file.
const MAX_HEADER_STRING: usize = 64 * 1024;

/// Largest vector dimension a reader accepts.
pub const MAX_DIMENSION: usize = 1 << 16;

/// Bytes before the first header string: magic, version, build id,
/// metric, dim and count.
const FIXED_HEADER_LEN: u64 = 4 + 4 + 16 + 4 + 4 + 4;

/// Locations of the two files that make up one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub labels: PathBuf,
}

impl ArtifactPaths {
    /// Uses the default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            index: dir.join(INDEX_FILE_NAME),
            labels: dir.join(LABELS_FILE_NAME),
        }
    }

    /// True when both files are present.
    pub fn exists(&self) -> bool {
        self.index.is_file() && self.labels.is_file()
    }
}

/// Label file body, following the magic and version.
#[derive(Serialize, Deserialize)]
struct LabelDocument {
    build_id: Uuid,
    labels: Vec<CardLabel>,
}

fn io_err(path: &Path) -> impl Fn(std::io::Error) -> IndexError + '_ {
    move |e| IndexError::Io(format!("{}: {e}", path.display()))
}

/// Serializes the vector half of `snapshot`.
///
/// ```text
/// [4B magic "CVIX"] [4B version=1]
/// [16B build id] [4B metric id] [4B dim] [4B count]
/// [4B modelLen] [modelLen bytes model id]
/// [4B datasetLen] [datasetLen bytes dataset]
/// [count x dim x 4B float32], insertion order
/// ```
///
/// All multi-byte values are little-endian.
pub fn write_index(snapshot: &IndexSnapshot, w: &mut dyn Write) -> Result<(), IndexError> {
    let mut bw = BufWriter::new(w);
    let write_err = |e: std::io::Error| IndexError::Io(e.to_string());
    let index = snapshot.index();
    let meta = snapshot.meta();

    bw.write_all(&INDEX_MAGIC).map_err(write_err)?;
    bw.write_all(&ARTIFACT_VERSION.to_le_bytes()).map_err(write_err)?;

    bw.write_all(meta.build_id.as_bytes()).map_err(write_err)?;
    bw.write_all(&index.metric().id().to_le_bytes()).map_err(write_err)?;
    bw.write_all(&(index.dim() as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&(index.len() as u32).to_le_bytes()).map_err(write_err)?;

    for s in [&meta.model_id, &meta.dataset] {
        bw.write_all(&(s.len() as u32).to_le_bytes()).map_err(write_err)?;
        bw.write_all(s.as_bytes()).map_err(write_err)?;
    }

    for &v in index.as_slice() {
        bw.write_all(&v.to_le_bytes()).map_err(write_err)?;
    }

    bw.flush().map_err(write_err)?;
    Ok(())
}

/// Decoded vector file.
pub struct IndexFile {
    pub index: FlatIndex,
    pub meta: ArtifactMeta,
}

/// Deserializes a vector file written by [`write_index`].
///
/// The declared count must match the data exactly: a short read or
/// trailing bytes are both [`IndexError::InvalidFormat`].
pub fn read_index(r: &mut dyn Read) -> Result<IndexFile, IndexError> {
    decode_index(r, None)
}

/// Like [`read_index`], but rejects a header whose declared vector data
/// does not fit in `file_len` bytes before reading any of it.
pub fn read_index_sized(r: &mut dyn Read, file_len: u64) -> Result<IndexFile, IndexError> {
    decode_index(r, Some(file_len))
}

fn decode_index(r: &mut dyn Read, file_len: Option<u64>) -> Result<IndexFile, IndexError> {
    let mut br = BufReader::new(r);
    let read_err = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => IndexError::InvalidFormat("truncated index file".into()),
        _ => IndexError::Io(e.to_string()),
    };
    let read_u32 = |br: &mut BufReader<&mut dyn Read>| -> Result<u32, IndexError> {
        let mut buf = [0u8; 4];
        br.read_exact(&mut buf).map_err(read_err)?;
        Ok(u32::from_le_bytes(buf))
    };
    let read_string = |br: &mut BufReader<&mut dyn Read>| -> Result<String, IndexError> {
        let len = read_u32(br)? as usize;
        if len > MAX_HEADER_STRING {
            return Err(IndexError::InvalidFormat(format!("header string of {len} bytes")));
        }
        let mut bytes = vec![0u8; len];
        br.read_exact(&mut bytes).map_err(read_err)?;
        String::from_utf8(bytes).map_err(|e| IndexError::InvalidFormat(e.to_string()))
    };

    let mut magic = [0u8; 4];
    br.read_exact(&mut magic).map_err(read_err)?;
    if magic != INDEX_MAGIC {
        return Err(IndexError::InvalidFormat(format!("invalid index magic {magic:?}")));
    }
    let version = read_u32(&mut br)?;
    if version != ARTIFACT_VERSION {
        return Err(IndexError::InvalidFormat(format!(
            "unsupported index version {version} (want {ARTIFACT_VERSION})"
        )));
    }

    let mut id = [0u8; 16];
    br.read_exact(&mut id).map_err(read_err)?;
    let build_id = Uuid::from_bytes(id);

    let metric_id = read_u32(&mut br)?;
    let metric = Metric::from_id(metric_id)
        .ok_or_else(|| IndexError::InvalidFormat(format!("unknown metric id {metric_id}")))?;
    let dim = read_u32(&mut br)? as usize;
    if dim == 0 || dim > MAX_DIMENSION {
        return Err(IndexError::InvalidFormat(format!(
            "invalid dimension {dim} (max {MAX_DIMENSION})"
        )));
    }
    let count = read_u32(&mut br)? as usize;
    let model_id = read_string(&mut br)?;
    let dataset = read_string(&mut br)?;

    let total = count
        .checked_mul(dim)
        .ok_or_else(|| IndexError::InvalidFormat(format!("{count} x {dim} overflows")))?;
    if let Some(file_len) = file_len {
        let header = FIXED_HEADER_LEN + 4 + model_id.len() as u64 + 4 + dataset.len() as u64;
        let need = (total as u64)
            .checked_mul(4)
            .and_then(|n| n.checked_add(header))
            .ok_or_else(|| IndexError::InvalidFormat(format!("{count} x {dim} overflows")))?;
        if need > file_len {
            return Err(IndexError::InvalidFormat(format!(
                "header declares {count} x {dim} vectors, needs {need} bytes, file has {file_len}"
            )));
        }
    }
    // Grow with the data instead of trusting the header for the allocation.
    let mut data = Vec::with_capacity(total.min(1 << 22));
    let mut row = vec![0u8; dim * 4];
    for _ in 0..count {
        br.read_exact(&mut row).map_err(read_err)?;
        data.extend(
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
    }

    let mut tail = [0u8; 1];
    match br.read(&mut tail) {
        Ok(0) => {}
        Ok(_) => return Err(IndexError::InvalidFormat("trailing data after vectors".into())),
        Err(e) => return Err(IndexError::Io(e.to_string())),
    }

    Ok(IndexFile {
        index: FlatIndex::from_parts(dim, metric, data)?,
        meta: ArtifactMeta {
            build_id,
            dataset,
            model_id,
        },
    })
}

/// Serializes the label half of `snapshot`:
/// `[4B magic "CVLB"] [4B version=1]` then a MessagePack `{build_id, labels}`.
pub fn write_labels(snapshot: &IndexSnapshot, w: &mut dyn Write) -> Result<(), IndexError> {
    let doc = LabelDocument {
        build_id: snapshot.meta().build_id,
        labels: snapshot.labels().iter().cloned().collect(),
    };
    let body = rmp_serde::to_vec_named(&doc).map_err(|e| IndexError::InvalidFormat(e.to_string()))?;

    let mut bw = BufWriter::new(w);
    let write_err = |e: std::io::Error| IndexError::Io(e.to_string());
    bw.write_all(&LABELS_MAGIC).map_err(write_err)?;
    bw.write_all(&ARTIFACT_VERSION.to_le_bytes()).map_err(write_err)?;
    bw.write_all(&body).map_err(write_err)?;
    bw.flush().map_err(write_err)?;
    Ok(())
}

/// Deserializes a label file written by [`write_labels`].
pub fn read_labels(r: &mut dyn Read) -> Result<(Uuid, LabelTable), IndexError> {
    let mut br = BufReader::new(r);
    let read_err = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => IndexError::InvalidFormat("truncated label file".into()),
        _ => IndexError::Io(e.to_string()),
    };

    let mut head = [0u8; 8];
    br.read_exact(&mut head).map_err(read_err)?;
    if head[..4] != LABELS_MAGIC {
        return Err(IndexError::InvalidFormat(format!("invalid label magic {:?}", &head[..4])));
    }
    let version = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
    if version != ARTIFACT_VERSION {
        return Err(IndexError::InvalidFormat(format!(
            "unsupported label version {version} (want {ARTIFACT_VERSION})"
        )));
    }

    let doc: LabelDocument =
        rmp_serde::from_read(&mut br).map_err(|e| IndexError::InvalidFormat(e.to_string()))?;
    Ok((doc.build_id, LabelTable::from(doc.labels)))
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut dyn Write) -> Result<(), IndexError>,
) -> Result<(), IndexError> {
    let mut f = File::create(path).map_err(io_err(path))?;
    write(&mut f)?;
    f.sync_all().map_err(io_err(path))
}

/// Persists both files of `snapshot`.
///
/// Each file is written to a `.tmp` sibling first and renamed into place
/// once both are complete, so a crash never leaves a half-written file
/// under the final name.
pub fn save_artifact(snapshot: &IndexSnapshot, paths: &ArtifactPaths) -> Result<(), IndexError> {
    for p in [&paths.index, &paths.labels] {
        if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
    }

    let index_tmp = tmp_sibling(&paths.index);
    let labels_tmp = tmp_sibling(&paths.labels);
    write_file(&index_tmp, |w| write_index(snapshot, w))?;
    write_file(&labels_tmp, |w| write_labels(snapshot, w))?;

    fs::rename(&index_tmp, &paths.index).map_err(io_err(&paths.index))?;
    fs::rename(&labels_tmp, &paths.labels).map_err(io_err(&paths.labels))?;
    Ok(())
}

/// Loads both files and checks that they belong together.
pub fn load_artifact(paths: &ArtifactPaths) -> Result<IndexSnapshot, IndexError> {
    for p in [&paths.index, &paths.labels] {
        if !p.is_file() {
            return Err(IndexError::NotFound(p.display().to_string()));
        }
    }

    let mut f = File::open(&paths.index).map_err(io_err(&paths.index))?;
    let file_len = f.metadata().map_err(io_err(&paths.index))?.len();
    let IndexFile { index, meta } = read_index_sized(&mut f, file_len)?;

    let mut f = File::open(&paths.labels).map_err(io_err(&paths.labels))?;
    let (labels_build, labels) = read_labels(&mut f)?;

    if labels_build != meta.build_id {
        return Err(IndexError::MixedArtifact {
            index: meta.build_id,
            labels: labels_build,
        });
    }
    IndexSnapshot::new(index, labels, meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> IndexSnapshot {
        let mut index = FlatIndex::new(3).unwrap();
        index.push(&[1.0, 0.0, 0.0]).unwrap();
        index.push(&[0.0, 0.6, 0.8]).unwrap();
        let labels = LabelTable::from(vec![
            CardLabel::new("base1-4", "Charizard"),
            CardLabel::new("base1-58", "Pikachu"),
        ]);
        IndexSnapshot::new(index, labels, ArtifactMeta::new("cards", "test-model")).unwrap()
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path().join("nested"));
        let snap = sample_snapshot();
        save_artifact(&snap, &paths).unwrap();
        assert!(paths.exists());

        let loaded = load_artifact(&paths).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dim(), 3);
        assert_eq!(loaded.meta(), snap.meta());
        assert_eq!(loaded.labels(), snap.labels());
        assert_eq!(loaded.index().vector(1), Some(&[0.0, 0.6, 0.8][..]));

        // No temp files left behind.
        let names: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2, "{names:?}");
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_artifact(&ArtifactPaths::in_dir(dir.path())).unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[test]
    fn test_load_mixed_builds() {
        let dir = tempfile::tempdir().unwrap();
        let a = ArtifactPaths::in_dir(dir.path().join("a"));
        let b = ArtifactPaths::in_dir(dir.path().join("b"));
        save_artifact(&sample_snapshot(), &a).unwrap();
        save_artifact(&sample_snapshot(), &b).unwrap();

        let mixed = ArtifactPaths {
            index: a.index.clone(),
            labels: b.labels.clone(),
        };
        assert!(matches!(
            load_artifact(&mixed),
            Err(IndexError::MixedArtifact { .. })
        ));
    }

    #[test]
    fn test_load_invalid_magic() {
        let bad = b"NOPE\x01\x00\x00\x00";
        assert!(matches!(
            read_index(&mut bad.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));
        assert!(matches!(
            read_labels(&mut bad.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_truncated_vectors() {
        let mut buf = Vec::new();
        write_index(&sample_snapshot(), &mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            read_index(&mut buf.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut buf = Vec::new();
        write_index(&sample_snapshot(), &mut buf).unwrap();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            read_index(&mut buf.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));
    }

    fn raw_header(dim: u32, count: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"CVIX");
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(Uuid::new_v4().as_bytes());
        buf.extend_from_slice(&Metric::InnerProduct.id().to_le_bytes());
        buf.extend_from_slice(&dim.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        for s in ["m", "cards"] {
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        buf
    }

    #[test]
    fn test_oversized_dimension_rejected() {
        let buf = raw_header(u32::MAX, 1);
        let err = read_index(&mut buf.as_slice()).err().unwrap();
        assert!(matches!(err, IndexError::InvalidFormat(ref m) if m.contains("dimension")), "{err}");

        let buf = raw_header((MAX_DIMENSION + 1) as u32, 1);
        assert!(matches!(
            read_index(&mut buf.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_declared_size_exceeds_file() {
        let mut buf = raw_header(MAX_DIMENSION as u32, u32::MAX);
        buf.extend_from_slice(&[0u8; 64]);
        let len = buf.len() as u64;
        let err = read_index_sized(&mut buf.as_slice(), len).err().unwrap();
        assert!(matches!(err, IndexError::InvalidFormat(ref m) if m.contains("file has")), "{err}");

        // load_artifact sizes the index file before reading vectors.
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        save_artifact(&sample_snapshot(), &paths).unwrap();
        fs::write(&paths.index, &buf).unwrap();
        assert!(matches!(
            load_artifact(&paths),
            Err(IndexError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_sized_read_accepts_exact_file() {
        let mut buf = Vec::new();
        write_index(&sample_snapshot(), &mut buf).unwrap();
        let len = buf.len() as u64;
        let file = read_index_sized(&mut buf.as_slice(), len).unwrap();
        assert_eq!(file.index.len(), 2);
    }

    #[test]
    fn test_header_layout() {
        let snap = sample_snapshot();
        let mut buf = Vec::new();
        write_index(&snap, &mut buf).unwrap();

        assert_eq!(&buf[0..4], b"CVIX");
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 1);
        assert_eq!(&buf[8..24], snap.meta().build_id.as_bytes());
        assert_eq!(u32::from_le_bytes(buf[24..28].try_into().unwrap()), 1); // metric
        assert_eq!(u32::from_le_bytes(buf[28..32].try_into().unwrap()), 3); // dim
        assert_eq!(u32::from_le_bytes(buf[32..36].try_into().unwrap()), 2); // count
        let header = 36 + 4 + "test-model".len() + 4 + "cards".len();
        assert_eq!(buf.len(), header + 2 * 3 * 4);
    }

    #[test]
    fn test_empty_index_round_trips_but_is_not_servable() {
        let snap = IndexSnapshot::new(
            FlatIndex::new(3).unwrap(),
            LabelTable::new(),
            ArtifactMeta::new("cards", "m"),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        save_artifact(&snap, &paths).unwrap();
        let loaded = load_artifact(&paths).unwrap();
        assert!(!loaded.is_servable());
    }
}
