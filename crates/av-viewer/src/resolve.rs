//! Mapping reference strings onto archive resources.

use av_core::ReferenceFault;
use av_net::ArchivePath;
use av_net::Url;
use av_net::VirtualBase;
use av_storage::ResourceStore;
use std::sync::Arc;
use tracing::debug;

/// An in-archive reference target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    pub path: ArchivePath,
    /// Absolute virtual URL of the reference, query and fragment included.
    pub virtual_url: Url,
    /// Canonical virtual URL of the target entry (no query or fragment).
    pub document_url: Url,
    pub query: Option<String>,
    pub fragment: Option<String>,
    pub mime_type: String,
    /// The resource's own locator.
    pub locator: String,
}

impl ArchiveTarget {
    /// `locator` with this reference's fragment appended. The query is
    /// dropped: locators do not accept one.
    pub fn with_fragment(&self, locator: &str) -> String {
        match &self.fragment {
            Some(fragment) => format!("{locator}#{fragment}"),
            None => locator.to_owned(),
        }
    }

    /// Fragment-only form used for links back into the same document.
    pub fn self_link(&self) -> String {
        match self.fragment.as_deref() {
            Some(fragment) if !fragment.is_empty() => format!("#{fragment}"),
            _ => "#".to_owned(),
        }
    }
}

/// Outcome of resolving one reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedReference {
    InArchive(ArchiveTarget),
    /// Resolves outside the archive's address space; passed through.
    External(Url),
    /// Could not be mapped; the reference keeps its original text.
    Unresolved {
        original: String,
        fault: ReferenceFault,
    },
}

impl ResolvedReference {
    /// The value a rewritten reference takes.
    pub fn final_url(&self) -> String {
        match self {
            Self::InArchive(target) => target.with_fragment(&target.locator),
            Self::External(url) => url.to_string(),
            Self::Unresolved { original, .. } => original.clone(),
        }
    }

    pub fn is_in_archive(&self) -> bool {
        matches!(self, Self::InArchive(_))
    }

    pub fn archive_target(&self) -> Option<&ArchiveTarget> {
        match self {
            Self::InArchive(target) => Some(target),
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<ReferenceFault> {
        match self {
            Self::InArchive(_) => None,
            Self::External(_) => Some(ReferenceFault::NotInArchive),
            Self::Unresolved { fault, .. } => Some(*fault),
        }
    }
}

/// Resolves references against a reference URL under the virtual base.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    base: VirtualBase,
    store: Arc<ResourceStore>,
}

impl UrlResolver {
    pub fn new(base: VirtualBase, store: Arc<ResourceStore>) -> Self {
        Self { base, store }
    }

    pub fn base(&self) -> &VirtualBase {
        &self.base
    }

    /// Virtual URL a document loaded from `path` resolves its references
    /// against.
    pub fn document_url(&self, path: &ArchivePath) -> Url {
        self.base.to_virtual_url(path)
    }

    pub fn resolve(&self, input: &str, ref_url: &Url) -> ResolvedReference {
        let trimmed = input.trim_matches(|ch: char| ch.is_ascii_whitespace());
        let absolute = match ref_url.join(trimmed) {
            Ok(absolute) => absolute,
            Err(error) => {
                debug!(url = input, %error, reason = ReferenceFault::MalformedUrl.as_str(), "unresolvable reference");
                return ResolvedReference::Unresolved {
                    original: input.to_owned(),
                    fault: ReferenceFault::MalformedUrl,
                };
            }
        };

        let Some(mut path) = self.base.from_virtual_url(&absolute) else {
            return ResolvedReference::External(absolute);
        };
        if path.is_directory() {
            path = path.index_entry();
        }

        let Some(resource) = self.store.get(&path) else {
            debug!(url = input, path = %path, reason = ReferenceFault::NotFound.as_str(), "missing archive entry");
            return ResolvedReference::Unresolved {
                original: input.to_owned(),
                fault: ReferenceFault::NotFound,
            };
        };

        ResolvedReference::InArchive(ArchiveTarget {
            document_url: self.base.to_virtual_url(&path),
            query: absolute.query().map(str::to_owned),
            fragment: absolute.fragment().map(str::to_owned),
            virtual_url: absolute,
            path,
            mime_type: resource.mime_type,
            locator: resource.locator,
        })
    }
}
