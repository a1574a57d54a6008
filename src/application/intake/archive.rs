//! Safe extraction of zip bundles into a per-request scratch directory.

use std::{
    cmp::Ordering,
    fs::{self, File},
    io::{self, Cursor, ErrorKind, Read},
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};
use zip::{ZipArchive, result::ZipError};

const DEFAULT_MAX_ENTRIES: usize = 1024;
const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 100 * 1024 * 1024;

/// Bounds applied while unpacking a bundle.
#[derive(Debug, Clone)]
pub struct ExtractionPolicy {
    pub max_entries: usize,
    pub max_extracted_bytes: u64,
    /// Parent for extraction roots; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("archive could not be read: {0}")]
    Corrupt(#[from] ZipError),
    #[error("archive entry `{name}` resolves outside the extraction root")]
    UnsafeEntry { name: String },
    #[error("archive entry `{name}` collides with another entry")]
    ConflictingEntry { name: String },
    #[error("archive has {entries} entries, limit is {limit}")]
    TooManyEntries { entries: usize, limit: usize },
    #[error("archive expands beyond {limit} bytes")]
    TooLarge { limit: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A filesystem entry produced by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMember {
    /// Absolute path inside the extraction root.
    pub path: PathBuf,
    /// Path relative to the extraction root, as named in the archive.
    pub relative: PathBuf,
    pub is_directory: bool,
}

/// An extraction root and the members found under it.
///
/// Dropping the bundle removes the root; [`ExtractedBundle::close`] does the
/// same but reports removal failures.
#[derive(Debug)]
pub struct ExtractedBundle {
    root: TempDir,
    members: Vec<ExtractedMember>,
}

impl ExtractedBundle {
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn members(&self) -> &[ExtractedMember] {
        &self.members
    }

    pub fn close(self) -> io::Result<()> {
        self.root.close()
    }
}

/// Container check on the bytes alone, independent of any filename.
///
/// The upload counts as a zip when its central directory can be read, so
/// leading data such as a self-extractor stub is tolerated and a lone
/// local-header signature is not enough.
pub fn is_archive(bytes: &[u8]) -> bool {
    ZipArchive::new(Cursor::new(bytes)).is_ok()
}

/// Unpack `archive` into a fresh, uniquely named directory.
///
/// Members are listed depth-first; within a directory, files come before
/// subdirectories and both are ordered by name. Any failure removes the
/// partially populated root before returning.
pub fn extract(archive: &[u8], policy: &ExtractionPolicy) -> Result<ExtractedBundle, ExtractError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    if zip.len() > policy.max_entries {
        return Err(ExtractError::TooManyEntries {
            entries: zip.len(),
            limit: policy.max_entries,
        });
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix("pressroom-bundle-");
    let root = match policy.scratch_dir.as_deref() {
        Some(dir) => builder.tempdir_in(dir)?,
        None => builder.tempdir()?,
    };

    let mut extracted_bytes: u64 = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ExtractError::UnsafeEntry { name: name.clone() })?;
        let target = root.path().join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|err| placement_error(&name, err))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| placement_error(&name, err))?;
        }

        let remaining = policy.max_extracted_bytes - extracted_bytes;
        let mut limited = (&mut entry).take(remaining.saturating_add(1));
        let mut file = File::create(&target).map_err(|err| placement_error(&name, err))?;
        let written = io::copy(&mut limited, &mut file)?;
        if written > remaining {
            return Err(ExtractError::TooLarge {
                limit: policy.max_extracted_bytes,
            });
        }
        extracted_bytes += written;
    }

    let members = list_members(root.path())?;
    Ok(ExtractedBundle { root, members })
}

/// A file standing where a directory is needed, or the reverse, is a fault
/// of the archive rather than of the host.
fn placement_error(name: &str, err: io::Error) -> ExtractError {
    match err.kind() {
        ErrorKind::AlreadyExists | ErrorKind::NotADirectory | ErrorKind::IsADirectory => {
            ExtractError::ConflictingEntry {
                name: name.to_string(),
            }
        }
        _ => ExtractError::Io(err),
    }
}

fn list_members(root: &Path) -> Result<Vec<ExtractedMember>, ExtractError> {
    let mut members = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by(files_first) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path().to_path_buf();
        let relative = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        members.push(ExtractedMember {
            path,
            relative,
            is_directory: entry.file_type().is_dir(),
        });
    }
    Ok(members)
}

fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}
