//! The single fetch entry point every rewrite path goes through.

use crate::chain::RecursionChain;
use crate::config::ViewerConfig;
use crate::document::DocumentRewriter;
use crate::resolve::UrlResolver;
use crate::stylesheet::StylesheetRewriter;
use av_core::MarkupKind;
use av_core::ReferenceFault;
use av_css::decode_stylesheet;
use av_net::ArchivePath;
use av_net::ExternalFetcher;
use av_net::Url;
use av_storage::ResourceStore;
use av_storage::TransformKind;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;
use tracing::debug;

/// Script inserted first into every HTML/XHTML head when privileged APIs
/// must be removed from archived pages.
pub const SANITIZER_SCRIPT: &str = r#"(function () {
  "use strict";
  var names = ["browser", "chrome", "messenger"];
  for (var i = 0; i < names.length; i++) {
    try {
      delete window[names[i]];
    } catch (error) {}
    try {
      Object.defineProperty(window, names[i], { value: undefined, configurable: false, writable: false });
    } catch (error) {}
  }
})();
"#;

#[derive(Debug)]
pub struct FetchOrchestrator {
    store: Arc<ResourceStore>,
    resolver: UrlResolver,
    config: ViewerConfig,
    fetcher: Arc<dyn ExternalFetcher>,
    reset_locator: OnceLock<String>,
    sanitizer_locator: OnceLock<String>,
    /// Reference URL each rewritten document resolved against, keyed by
    /// its locator.
    reference_urls: Mutex<HashMap<String, Url>>,
}

impl FetchOrchestrator {
    pub fn new(
        store: Arc<ResourceStore>,
        config: ViewerConfig,
        fetcher: Arc<dyn ExternalFetcher>,
    ) -> Self {
        Self {
            resolver: UrlResolver::new(config.virtual_base.clone(), Arc::clone(&store)),
            store,
            config,
            fetcher,
            reset_locator: OnceLock::new(),
            sanitizer_locator: OnceLock::new(),
            reference_urls: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    pub fn resolver(&self) -> &UrlResolver {
        &self.resolver
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &dyn ExternalFetcher {
        self.fetcher.as_ref()
    }

    /// Locator for `path`, rewritten first when a transform is requested.
    ///
    /// `None` means the archive has no such entry. Without a transform the
    /// resource's own locator is returned, so repeated calls agree. Each
    /// transformed fetch rewrites afresh and issues a new locator, since the
    /// chain it runs under may differ between calls.
    pub fn fetch(
        &self,
        path: ArchivePath,
        transform: Option<TransformKind>,
        chain: RecursionChain,
    ) -> BoxFuture<'_, Option<String>> {
        async move {
            let Some(resource) = self.store.get(&path) else {
                debug!(path = %path, reason = ReferenceFault::NotFound.as_str(), "fetch target missing");
                return None;
            };

            match transform {
                None => Some(resource.locator),
                Some(TransformKind::Document) => {
                    if MarkupKind::from_mime(&resource.mime_type).is_none() {
                        debug!(path = %path, mime = %resource.mime_type, "not markup, serving verbatim");
                        return Some(resource.locator);
                    }

                    let rewritten = DocumentRewriter::new(self).rewrite(&resource, &chain).await;
                    let locator = self.store.register_rewritten(
                        &path,
                        TransformKind::Document,
                        rewritten.bytes,
                        &rewritten.mime_type,
                    );
                    self.reference_urls
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(locator.clone(), rewritten.reference_url);
                    Some(locator)
                }
                Some(TransformKind::Stylesheet) => {
                    let text = decode_stylesheet(&resource.content, &resource.mime_type);
                    let sheet_url = self.resolver.document_url(&path);
                    let rewritten = StylesheetRewriter::new(self)
                        .rewrite(&text, &sheet_url, &chain)
                        .await;
                    Some(self.store.register_rewritten(
                        &path,
                        TransformKind::Stylesheet,
                        rewritten.into_bytes(),
                        "text/css;charset=UTF-8",
                    ))
                }
            }
        }
        .boxed()
    }

    /// URL relative links in the document behind `locator` resolve
    /// against: its `<base href>` when it has one. `None` for locators that
    /// are not rewritten documents.
    pub fn reference_url(&self, locator: &str) -> Option<Url> {
        let key = locator.split_once('#').map_or(locator, |(key, _)| key);
        self.reference_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Locator of the reset stylesheet, issued on first use.
    pub(crate) fn reset_stylesheet_locator(&self) -> Option<&str> {
        if self.config.reset_stylesheet.is_empty() {
            return None;
        }
        Some(self.reset_locator.get_or_init(|| {
            self.store.register_generated(
                self.config.reset_stylesheet.clone().into_bytes(),
                "text/css;charset=UTF-8",
            )
        }))
    }

    /// Locator of the privileged API sanitizer, issued on first use.
    pub(crate) fn sanitizer_locator(&self) -> Option<&str> {
        if !self.config.policy.remove_privileged_apis {
            return None;
        }
        Some(self.sanitizer_locator.get_or_init(|| {
            self.store.register_generated(
                SANITIZER_SCRIPT.as_bytes().to_vec(),
                "application/javascript;charset=UTF-8",
            )
        }))
    }
}
