//! Archive byte sources: where entries come from before they are stored.

use async_trait::async_trait;
use av_core::ViewerError;
use av_core::ViewerResult;
use av_net::ArchivePath;
use core::fmt;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArchiveEntry {
    pub path: ArchivePath,
    pub is_directory: bool,
}

/// The archive-loading collaborator.
#[async_trait]
pub trait ArchiveSource: Send + Sync + fmt::Debug {
    async fn list_entries(&self) -> ViewerResult<Vec<ArchiveEntry>>;

    /// Fails with `storage.entry_missing` for unknown paths.
    async fn read_entry_bytes(&self, path: &ArchivePath) -> ViewerResult<Vec<u8>>;
}

fn entry_missing(path: &ArchivePath) -> ViewerError {
    ViewerError::new(
        "storage.entry_missing",
        format!("no archive entry `{path}`"),
    )
}

/// Entries held in memory; used by tests and by hosts that unpack archives
/// themselves.
#[derive(Debug, Default, Clone)]
pub struct MemoryArchive {
    entries: BTreeMap<ArchivePath, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&mut self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(ArchivePath::new(path), bytes.into());
    }
}

#[async_trait]
impl ArchiveSource for MemoryArchive {
    async fn list_entries(&self) -> ViewerResult<Vec<ArchiveEntry>> {
        let mut directories = BTreeSet::new();
        for path in self.entries.keys() {
            let mut prefix = String::new();
            let segments: Vec<&str> = path.segments().collect();
            for segment in segments.iter().take(segments.len().saturating_sub(1)) {
                prefix.push_str(segment);
                prefix.push('/');
                directories.insert(prefix.clone());
            }
        }

        let mut out: Vec<ArchiveEntry> = directories
            .into_iter()
            .map(|dir| ArchiveEntry {
                path: ArchivePath::new(&dir),
                is_directory: true,
            })
            .collect();
        out.extend(self.entries.keys().map(|path| ArchiveEntry {
            path: path.clone(),
            is_directory: false,
        }));
        Ok(out)
    }

    async fn read_entry_bytes(&self, path: &ArchivePath) -> ViewerResult<Vec<u8>> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| entry_missing(path))
    }
}

/// An unpacked archive on disk; entry paths are relative to `root`.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, path: &ArchivePath) -> PathBuf {
        let mut file = self.root.clone();
        for segment in path.segments() {
            file.push(segment);
        }
        file
    }
}

#[async_trait]
impl ArchiveSource for DirectoryArchive {
    async fn list_entries(&self) -> ViewerResult<Vec<ArchiveEntry>> {
        let mut out = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut reader = tokio::fs::read_dir(&dir).await.map_err(|error| {
                ViewerError::new(
                    "storage.list_failed",
                    format!("failed to list `{}`: {error}", dir.display()),
                )
            })?;

            while let Some(child) = reader.next_entry().await.map_err(|error| {
                ViewerError::new(
                    "storage.list_failed",
                    format!("failed to list `{}`: {error}", dir.display()),
                )
            })? {
                let name = child.file_name().to_string_lossy().into_owned();
                let file_type = child.file_type().await.map_err(|error| {
                    ViewerError::new(
                        "storage.list_failed",
                        format!("failed to stat `{}`: {error}", child.path().display()),
                    )
                })?;

                let relative = format!("{prefix}{name}");
                if file_type.is_dir() {
                    out.push(ArchiveEntry {
                        path: ArchivePath::new(&format!("{relative}/")),
                        is_directory: true,
                    });
                    pending.push((child.path(), format!("{relative}/")));
                } else if file_type.is_file() {
                    out.push(ArchiveEntry {
                        path: ArchivePath::new(&relative),
                        is_directory: false,
                    });
                }
            }
        }

        out.sort();
        Ok(out)
    }

    async fn read_entry_bytes(&self, path: &ArchivePath) -> ViewerResult<Vec<u8>> {
        let file = self.file_path(path);
        tokio::fs::read(&file).await.map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                entry_missing(path)
            } else {
                ViewerError::new(
                    "storage.read_failed",
                    format!("failed to read `{}`: {error}", file.display()),
                )
            }
        })
    }
}
