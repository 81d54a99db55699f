// Project archive access
// Wraps a zip container held in memory and hands out entry bytes by path

use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::sync::Arc;

use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

type ArchiveReader = Cursor<Arc<[u8]>>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive is unreadable: {0}")]
    Unreadable(#[from] ZipError),
}

/// A read-only view over an opened project container.
///
/// The zip central directory is parsed once in [`ProjectArchive::open`].
/// Reads clone the archive handle, which only bumps reference counts on the
/// shared bytes and index, so concurrent readers never contend on a lock.
#[derive(Clone)]
pub struct ProjectArchive {
    zip: ZipArchive<ArchiveReader>,
}

impl ProjectArchive {
    /// Open a container from its raw bytes
    pub fn open(bytes: impl Into<Arc<[u8]>>) -> Result<Self, ArchiveError> {
        let zip = ZipArchive::new(Cursor::new(bytes.into()))?;
        Ok(Self { zip })
    }

    /// Read an entry's full contents. Returns None if the entry does not
    /// exist or cannot be extracted.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        let mut zip = self.zip.clone();
        let mut entry = match zip.by_name(path) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return None,
            Err(e) => {
                log::warn!("Failed to open archive entry {}: {}", path, e);
                return None;
            }
        };

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut bytes) {
            log::warn!("Failed to extract archive entry {}: {}", path, e);
            return None;
        }
        Some(bytes)
    }

    /// All entry paths in the container
    pub fn list(&self) -> BTreeSet<String> {
        self.zip.file_names().map(str::to_string).collect()
    }

    /// Number of entries, directories included
    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.is_empty()
    }
}

impl std::fmt::Debug for ProjectArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectArchive")
            .field("entries", &self.zip.len())
            .finish()
    }
}
