//! Directory-backed [`FileStore`] with the fixed virtual categories.

use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};
use vantage_protocol::{EntryKind, ListingEntry};

use crate::{DeleteOutcome, FileInfo, FileStore, StoreError};

/// The four top-level folders presented to peers.
const ROOT_FOLDERS: [&str; 4] = ["Sdcard", "Images", "Audio", "Videos"];

/// Backing directories for the virtual categories.
#[derive(Debug, Clone)]
pub struct CategoryRoots {
    /// General-purpose root, presented as `Sdcard`.
    pub sdcard: PathBuf,
    pub pictures: PathBuf,
    pub music: PathBuf,
    pub movies: PathBuf,
    /// Destination for uploads whose extension matches no media
    /// category.
    pub downloads: PathBuf,
}

impl CategoryRoots {
    /// Lays every category out under a single base directory.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            sdcard: base.to_path_buf(),
            pictures: base.join("Pictures"),
            music: base.join("Music"),
            movies: base.join("Movies"),
            downloads: base.join("Download"),
        }
    }
}

/// Filesystem-backed store mapping virtual folders onto directories.
pub struct CategoryStore {
    roots: CategoryRoots,
}

impl CategoryStore {
    pub fn new(roots: CategoryRoots) -> Self {
        Self { roots }
    }

    /// Resolves a virtual path (`Images/holiday.jpg`) onto the backing
    /// filesystem. Rejects any path that would escape its category
    /// root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let trimmed = path.trim_start_matches('/');
        let (category, rest) = match trimmed.split_once('/') {
            Some((c, r)) => (c, r),
            None => (trimmed, ""),
        };
        let root = match category {
            "Sdcard" => &self.roots.sdcard,
            "Images" => &self.roots.pictures,
            "Audio" => &self.roots.music,
            "Videos" => &self.roots.movies,
            other => return Err(StoreError::UnknownCategory(other.to_owned())),
        };
        let mut resolved = root.clone();
        for component in Path::new(rest).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(StoreError::PathTraversal(path.to_owned())),
            }
        }
        Ok(resolved)
    }

    /// Picks the destination directory for an upload by file extension.
    fn route_by_extension(&self, name: &str) -> &PathBuf {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("jpg" | "jpeg" | "png" | "bmp") => &self.roots.pictures,
            Some("mp4" | "mkv") => &self.roots.movies,
            Some("mp3" | "wav" | "ogg") => &self.roots.music,
            _ => &self.roots.downloads,
        }
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<ListingEntry>, StoreError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                entries.push(ListingEntry::directory(name));
            } else {
                let modified = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64);
                entries.push(ListingEntry {
                    name,
                    kind: EntryKind::File,
                    size: Some(meta.len()),
                    modified,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

impl FileStore for CategoryStore {
    fn list_category(&self, path: &str) -> Result<Vec<ListingEntry>, StoreError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(ROOT_FOLDERS
                .iter()
                .map(|name| ListingEntry::directory(*name))
                .collect());
        }
        let dir = self.resolve(trimmed)?;
        debug!(path, dir = %dir.display(), "listing");
        self.list_dir(&dir)
    }

    fn open_for_write(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Box<dyn Write + Send + Sync>, StoreError> {
        let dir = match self.resolve(path) {
            Ok(dir) => dir,
            // Peers frequently upload against the root or an opaque
            // locator; fall back to extension routing.
            Err(StoreError::UnknownCategory(_)) => self.route_by_extension(name).clone(),
            Err(err) => return Err(err),
        };
        fs::create_dir_all(&dir)?;
        let dest = dir.join(name);
        debug!(name, dest = %dest.display(), "opening upload destination");
        let file = fs::File::create(&dest)?;
        Ok(Box::new(file))
    }

    fn open_for_read(&self, locator: &str) -> Result<(Box<dyn Read + Send>, FileInfo), StoreError> {
        let path = if locator.starts_with('/') {
            PathBuf::from(locator)
        } else {
            self.resolve(locator)?
        };
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(locator.to_owned()));
            }
            Err(err) => return Err(err.into()),
        };
        let meta = file.metadata()?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| locator.to_owned());
        let info = FileInfo { name, size: meta.len() };
        Ok((Box::new(file), info))
    }

    fn delete(&self, locator: &str) -> Result<DeleteOutcome, StoreError> {
        let path = if locator.starts_with('/') {
            PathBuf::from(locator)
        } else {
            self.resolve(locator)?
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(DeleteOutcome::NotFound)
            }
            Err(err) => {
                warn!(locator, %err, "delete failed");
                Err(err.into())
            }
        }
    }
}
