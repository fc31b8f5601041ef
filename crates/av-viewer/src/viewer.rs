//! Host-facing viewer session.

use crate::chain::RecursionChain;
use crate::config::ViewerConfig;
use crate::orchestrator::FetchOrchestrator;
use av_core::ViewerError;
use av_core::ViewerResult;
use av_net::ArchivePath;
use av_net::ExternalFetcher;
use av_net::Url;
use av_storage::ArchiveSource;
use av_storage::LocatorContent;
use av_storage::ManifestEntry;
use av_storage::ResourceStore;
use av_storage::TransformKind;
use std::sync::Arc;
use tracing::info;

/// Schemes a host may open outside the viewer.
const EXTERNAL_NAVIGATION_SCHEMES: &[&str] = &["http", "https", "ftp", "mailto"];

/// Where a click inside a rendered document should take the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    /// Open another (or the same) archive document.
    SameArchive {
        path: ArchivePath,
        fragment: Option<String>,
    },
    /// Leave the archive.
    External(String),
    /// Suppress the navigation.
    Inert,
}

/// One archive viewing session.
#[derive(Debug)]
pub struct Viewer {
    orchestrator: FetchOrchestrator,
}

impl Viewer {
    pub fn new(
        store: Arc<ResourceStore>,
        config: ViewerConfig,
        fetcher: Arc<dyn ExternalFetcher>,
    ) -> ViewerResult<Self> {
        config.validate()?;
        Ok(Self {
            orchestrator: FetchOrchestrator::new(store, config, fetcher),
        })
    }

    /// Loads every entry of `source` and starts a session over it.
    pub async fn open_archive(
        source: &dyn ArchiveSource,
        config: ViewerConfig,
        fetcher: Arc<dyn ExternalFetcher>,
    ) -> ViewerResult<Self> {
        config.validate()?;
        let store = Arc::new(ResourceStore::load(source).await?);
        Self::new(store, config, fetcher)
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        self.orchestrator.store()
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    /// Rewrites the index document and returns its locator, with
    /// `initial_fragment` appended.
    pub async fn open_root_document(
        &self,
        index_path: &str,
        initial_fragment: Option<&str>,
    ) -> ViewerResult<String> {
        let mut path = ArchivePath::new(index_path);
        if path.is_directory() {
            path = path.index_entry();
        }
        self.open_document(&path, initial_fragment).await
    }

    /// Rewrites an archive document under a fresh chain. Used for the root
    /// and for following [`ClickTarget::SameArchive`].
    pub async fn open_document(
        &self,
        path: &ArchivePath,
        fragment: Option<&str>,
    ) -> ViewerResult<String> {
        let Some(locator) = self
            .orchestrator
            .fetch(
                path.clone(),
                Some(TransformKind::Document),
                RecursionChain::new(),
            )
            .await
        else {
            return Err(ViewerError::new(
                "viewer.document_missing",
                format!("archive has no entry `{path}`"),
            ));
        };

        info!(path = %path, %locator, "document opened");
        Ok(match fragment.filter(|fragment| !fragment.is_empty()) {
            Some(fragment) => format!("{locator}#{}", fragment.trim_start_matches('#')),
            None => locator,
        })
    }

    /// Classifies a navigation to `target_url` from the document behind
    /// `locator`.
    pub fn resolve_click_target(&self, locator: &str, target_url: &str) -> ClickTarget {
        let store = self.store();
        let target_url = target_url.trim();

        if ResourceStore::is_locator(target_url) {
            return match store.path_for_locator(target_url) {
                Some(path) => ClickTarget::SameArchive {
                    path,
                    fragment: fragment_of(target_url),
                },
                None => ClickTarget::Inert,
            };
        }

        let base = self.orchestrator.resolver().base();
        let reference = self
            .orchestrator
            .reference_url(locator)
            .or_else(|| store.path_for_locator(locator).map(|path| base.to_virtual_url(&path)));
        let absolute = match reference {
            Some(reference) => reference.join(target_url),
            None => Url::parse(target_url),
        };
        let Ok(absolute) = absolute else {
            return ClickTarget::Inert;
        };

        if let Some(mut path) = base.from_virtual_url(&absolute) {
            if path.is_directory() {
                path = path.index_entry();
            }
            return if store.contains(&path) {
                ClickTarget::SameArchive {
                    path,
                    fragment: absolute.fragment().map(str::to_owned),
                }
            } else {
                ClickTarget::Inert
            };
        }

        if EXTERNAL_NAVIGATION_SCHEMES.contains(&absolute.scheme()) {
            ClickTarget::External(absolute.into())
        } else {
            ClickTarget::Inert
        }
    }

    /// Bytes behind an issued locator; the fragment is ignored.
    pub fn read_locator(&self, locator: &str) -> Option<LocatorContent> {
        self.store().read_locator(locator)
    }

    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.store().manifest()
    }

    /// Ends the session, revoking every issued locator.
    pub fn close(&self) -> usize {
        let released = self.store().release_all();
        info!(released, "viewer closed");
        released
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if !self.store().is_released() {
            self.close();
        }
    }
}

fn fragment_of(url: &str) -> Option<String> {
    url.split_once('#').map(|(_, fragment)| fragment.to_owned())
}
