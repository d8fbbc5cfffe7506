use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::IndexError;
use crate::labels::CardLabel;

/// One labeled reference image, still encoded.
#[derive(Debug, Clone)]
pub struct CorpusItem {
    /// Identifies the item in build reports.
    pub key: String,
    pub label: CardLabel,
    pub image: Vec<u8>,
}

/// An item the corpus could not produce.
#[derive(Debug, Clone)]
pub struct CorpusFailure {
    pub key: String,
    pub reason: String,
}

/// Corpus is the source of reference images an index is built from.
///
/// Items are produced lazily and in a stable order; that order becomes
/// the insertion order of the index. A failure to read one item is
/// reported in-band so the builder can skip it and keep going.
pub trait Corpus: Send + Sync {
    fn items(&self) -> Box<dyn Iterator<Item = Result<CorpusItem, CorpusFailure>> + '_>;
}

/// One line of a corpus manifest. Field names follow the upstream dataset
/// columns (`id_card`, `name`, `image`).
#[derive(Debug, Deserialize)]
struct ManifestLine {
    id_card: String,
    name: String,
    /// Image path, relative to the manifest's directory unless absolute.
    image: PathBuf,
}

/// Corpus backed by a JSON Lines manifest:
///
/// ```text
/// {"id_card": "sv3-125", "name": "Charizard ex", "image": "images/sv3-125.webp"}
/// {"id_card": "sv3-126", "name": "Pidgeot ex",   "image": "images/sv3-126.webp"}
/// ```
///
/// The manifest is streamed line by line and each image is read only when
/// its item is reached. Blank lines are ignored; malformed lines become
/// failures keyed `line:<n>`.
#[derive(Debug, Clone)]
pub struct ManifestCorpus {
    manifest: PathBuf,
    root: PathBuf,
}

impl ManifestCorpus {
    pub fn open(manifest: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let manifest = manifest.into();
        if !manifest.is_file() {
            return Err(IndexError::NotFound(manifest.display().to_string()));
        }
        let root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self { manifest, root })
    }

    pub fn path(&self) -> &Path {
        &self.manifest
    }

    fn parse_line(&self, line_no: usize, line: &str) -> Result<CorpusItem, CorpusFailure> {
        let entry: ManifestLine = serde_json::from_str(line).map_err(|e| CorpusFailure {
            key: format!("line:{line_no}"),
            reason: format!("malformed manifest entry: {e}"),
        })?;

        let path = self.root.join(&entry.image);
        let image = fs::read(&path).map_err(|e| CorpusFailure {
            key: entry.id_card.clone(),
            reason: format!("{}: {e}", path.display()),
        })?;

        Ok(CorpusItem {
            key: entry.id_card.clone(),
            label: CardLabel::new(entry.id_card, entry.name),
            image,
        })
    }
}

impl Corpus for ManifestCorpus {
    fn items(&self) -> Box<dyn Iterator<Item = Result<CorpusItem, CorpusFailure>> + '_> {
        let file = match File::open(&self.manifest) {
            Ok(f) => f,
            Err(e) => {
                return Box::new(std::iter::once(Err(CorpusFailure {
                    key: self.manifest.display().to_string(),
                    reason: e.to_string(),
                })));
            }
        };

        let lines = BufReader::new(file).lines().enumerate();
        Box::new(lines.filter_map(move |(i, line)| {
            let line_no = i + 1;
            match line {
                Ok(l) if l.trim().is_empty() => None,
                Ok(l) => Some(self.parse_line(line_no, &l)),
                Err(e) => Some(Err(CorpusFailure {
                    key: format!("line:{line_no}"),
                    reason: e.to_string(),
                })),
            }
        }))
    }
}

/// In-memory corpus. Items are yielded in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    items: Vec<Result<CorpusItem, CorpusFailure>>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an encoded image keyed by its label id.
    pub fn push(&mut self, label: CardLabel, image: Vec<u8>) {
        self.items.push(Ok(CorpusItem {
            key: label.id.clone(),
            label,
            image,
        }));
    }

    /// Adds an item that fails to read.
    pub fn push_failure(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.items.push(Err(CorpusFailure {
            key: key.into(),
            reason: reason.into(),
        }));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Corpus for MemoryCorpus {
    fn items(&self) -> Box<dyn Iterator<Item = Result<CorpusItem, CorpusFailure>> + '_> {
        Box::new(self.items.iter().cloned())
    }
}
