//! Session resource store: archive entries, the ephemeral locators issued
//! for them, and the derivatives produced by rewriting.
//!
//! The store is append-only while a session is live. Entries and locators
//! are added, never replaced; the whole locator table is released at once
//! when the session ends.

pub mod archive;

use av_core::ViewerResult;
use av_core::mime_type_for_path;
use av_net::ArchivePath;
use core::fmt;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use tracing::debug;
use tracing::info;
use uuid::Uuid;

pub use archive::ArchiveEntry;
pub use archive::ArchiveSource;
pub use archive::DirectoryArchive;
pub use archive::MemoryArchive;

/// Scheme + authority prefix of every issued locator.
pub const LOCATOR_PREFIX: &str = "blob:archive-viewer/";

/// Rewrite applied to produce a derivative resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Document,
    Stylesheet,
}

impl TransformKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Stylesheet => "stylesheet",
        }
    }
}

/// What a locator stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    /// Verbatim bytes of an archive entry.
    Original,
    /// Rewritten derivative of an archive entry.
    Rewritten(TransformKind),
    /// Bytes with no archive entry behind them (localized external
    /// resources, moved inline scripts, notices).
    Generated,
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => f.write_str("original"),
            Self::Rewritten(kind) => write!(f, "rewritten:{}", kind.as_str()),
            Self::Generated => f.write_str("generated"),
        }
    }
}

/// One archive entry and its verbatim locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: ArchivePath,
    pub content: Arc<[u8]>,
    pub mime_type: String,
    pub locator: String,
}

/// Bytes behind an issued locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorContent {
    pub bytes: Arc<[u8]>,
    pub mime_type: String,
    pub kind: LocatorKind,
    pub path: Option<ArchivePath>,
}

/// Row of the locator manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub locator: String,
    pub kind: LocatorKind,
    pub path: Option<ArchivePath>,
    pub mime_type: String,
}

#[derive(Debug, Default)]
struct StoreState {
    resources: BTreeMap<ArchivePath, Resource>,
    locators: HashMap<String, LocatorContent>,
    issued: Vec<String>,
    next_locator: u64,
    released: bool,
}

#[derive(Debug)]
pub struct ResourceStore {
    session: Uuid,
    state: Mutex<StoreState>,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore {
    pub fn new() -> Self {
        Self {
            session: Uuid::new_v4(),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Reads every file entry of `source` into a fresh store.
    pub async fn load(source: &dyn ArchiveSource) -> ViewerResult<Self> {
        let store = Self::new();
        let entries = source.list_entries().await?;
        for entry in entries.into_iter().filter(|entry| !entry.is_directory) {
            let bytes = source.read_entry_bytes(&entry.path).await?;
            let mime_type = mime_type_for_path(entry.path.as_str());
            store.register(entry.path, bytes, mime_type);
        }

        info!(
            session = %store.session,
            resources = store.resource_count(),
            "archive loaded"
        );
        Ok(store)
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, path: &ArchivePath) -> Option<Resource> {
        self.state().resources.get(path).cloned()
    }

    pub fn contains(&self, path: &ArchivePath) -> bool {
        self.state().resources.contains_key(path)
    }

    pub fn resource_count(&self) -> usize {
        self.state().resources.len()
    }

    /// Adds an archive entry and issues its locator. Registering a path
    /// twice keeps the first resource.
    pub fn register(
        &self,
        path: ArchivePath,
        content: impl Into<Arc<[u8]>>,
        mime_type: &str,
    ) -> Resource {
        let mut state = self.state();
        if let Some(existing) = state.resources.get(&path) {
            return existing.clone();
        }

        let content = content.into();
        let locator = self.issue(
            &mut state,
            LocatorContent {
                bytes: Arc::clone(&content),
                mime_type: mime_type.to_owned(),
                kind: LocatorKind::Original,
                path: Some(path.clone()),
            },
        );
        let resource = Resource {
            path: path.clone(),
            content,
            mime_type: mime_type.to_owned(),
            locator,
        };
        state.resources.insert(path, resource.clone());
        resource
    }

    /// Issues a locator for a rewritten derivative of `path`.
    pub fn register_rewritten(
        &self,
        path: &ArchivePath,
        kind: TransformKind,
        content: impl Into<Arc<[u8]>>,
        mime_type: &str,
    ) -> String {
        let mut state = self.state();
        let locator = self.issue(
            &mut state,
            LocatorContent {
                bytes: content.into(),
                mime_type: mime_type.to_owned(),
                kind: LocatorKind::Rewritten(kind),
                path: Some(path.clone()),
            },
        );
        debug!(path = %path, transform = kind.as_str(), %locator, "registered rewritten resource");
        locator
    }

    /// Issues a locator for bytes that have no archive entry.
    pub fn register_generated(&self, content: impl Into<Arc<[u8]>>, mime_type: &str) -> String {
        let mut state = self.state();
        self.issue(
            &mut state,
            LocatorContent {
                bytes: content.into(),
                mime_type: mime_type.to_owned(),
                kind: LocatorKind::Generated,
                path: None,
            },
        )
    }

    fn issue(&self, state: &mut StoreState, content: LocatorContent) -> String {
        state.next_locator += 1;
        let locator = format!("{LOCATOR_PREFIX}{}/{}", self.session, state.next_locator);
        if !state.released {
            state.locators.insert(locator.clone(), content);
            state.issued.push(locator.clone());
        }
        locator
    }

    /// Content behind a locator. A fragment is ignored; a query string
    /// invalidates the locator, as it does for real ephemeral URLs.
    pub fn read_locator(&self, locator: &str) -> Option<LocatorContent> {
        let key = locator_key(locator)?;
        self.state().locators.get(key).cloned()
    }

    /// Archive path a locator was issued for, original or rewritten.
    pub fn path_for_locator(&self, locator: &str) -> Option<ArchivePath> {
        self.read_locator(locator)?.path
    }

    pub fn is_rewritten(&self, locator: &str) -> bool {
        matches!(
            self.read_locator(locator).map(|content| content.kind),
            Some(LocatorKind::Rewritten(_))
        )
    }

    pub fn is_locator(url: &str) -> bool {
        url.starts_with(LOCATOR_PREFIX)
    }

    /// Live locators in issue order.
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        let state = self.state();
        state
            .issued
            .iter()
            .filter_map(|locator| {
                let content = state.locators.get(locator)?;
                Some(ManifestEntry {
                    locator: locator.clone(),
                    kind: content.kind,
                    path: content.path.clone(),
                    mime_type: content.mime_type.clone(),
                })
            })
            .collect()
    }

    pub fn locator_count(&self) -> usize {
        self.state().locators.len()
    }

    /// Revokes every issued locator. Later registrations still return
    /// locator strings, but none of them resolve.
    pub fn release_all(&self) -> usize {
        let mut state = self.state();
        if state.released {
            return 0;
        }
        state.released = true;
        state.issued.clear();
        let released = state.locators.len();
        state.locators.clear();
        debug!(session = %self.session, released, "released locators");
        released
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }
}

impl Drop for ResourceStore {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn locator_key(locator: &str) -> Option<&str> {
    let key = locator.split('#').next().unwrap_or(locator);
    if key.contains('?') {
        return None;
    }
    Some(key)
}
