//! Find and read the documents of a corpus directory.
//!
//! Discovery is strict: a directory that yields two documents with the same
//! id fails outright, because aggregating both would overwrite a column.
//! Reading is per document, so callers can skip a bad file and carry on.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use corpus_types::DocumentId;
use memmap2::Mmap;
use tracing::{debug, info};

use crate::CorpusError;

/// Strategy for reading document files.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LoadMode {
    /// Memory-map each file (zero-copy).
    #[default]
    Mmap,
    /// Read each file into an owned buffer (portable fallback).
    Owned,
}

impl LoadMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mmap" => Some(LoadMode::Mmap),
            "owned" => Some(LoadMode::Owned),
            _ => None,
        }
    }
}

/// A document found on disk, not yet read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DocumentFile {
    pub id: DocumentId,
    pub path: PathBuf,
}

/// List the files in `dir` (not recursive) whose extension matches
/// `extension` case-insensitively, sorted by path. The document id is the
/// file stem.
pub fn discover(dir: impl AsRef<Path>, extension: &str) -> Result<Vec<DocumentFile>> {
    let dir = dir.as_ref();
    let entries =
        fs::read_dir(dir).with_context(|| format!("read corpus directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }
        let Some(stem) = path.file_stem() else {
            continue;
        };
        let id = DocumentId::new(stem.to_string_lossy());
        files.push(DocumentFile { id, path });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let mut seen: HashMap<&DocumentId, &Path> = HashMap::new();
    for file in &files {
        if let Some(previous) = seen.insert(&file.id, &file.path) {
            debug!(
                "{} and {} share document id {}",
                previous.display(),
                file.path.display(),
                file.id
            );
            return Err(CorpusError::DuplicateDocument(file.id.clone()).into());
        }
    }

    info!("found {} documents in {}", files.len(), dir.display());
    Ok(files)
}

enum Buffer {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Buffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Mmap(m) => m.as_ref(),
            Buffer::Owned(v) => v.as_slice(),
        }
    }
}

/// Raw bytes of one document, mapped or owned.
pub struct DocumentText {
    buffer: Buffer,
}

impl DocumentText {
    pub fn load(path: impl AsRef<Path>, mode: LoadMode) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?
            .len();

        let buffer = match mode {
            // Zero-length files cannot be mapped on every platform.
            LoadMode::Mmap if len > 0 => unsafe { Mmap::map(&file) }
                .map(Buffer::Mmap)
                .with_context(|| format!("mmap {}", path.display()))?,
            _ => {
                let mut buf = Vec::with_capacity(len as usize);
                file.read_to_end(&mut buf)
                    .with_context(|| format!("read {}", path.display()))?;
                Buffer::Owned(buf)
            }
        };
        Ok(Self { buffer })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Decode as UTF-8, dropping a leading byte-order mark.
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        let bytes = self.as_bytes();
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        std::str::from_utf8(bytes)
    }
}
