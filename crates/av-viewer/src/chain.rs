//! Recursion chain: the documents and stylesheets a fetch is nested in.
//!
//! Chains are persistent linked lists. Extending one allocates a new head
//! that shares the parent's tail, so sibling branches never observe each
//! other's entries.

use av_net::Url;
use std::sync::Arc;

#[derive(Debug)]
struct Link {
    identity: String,
    parent: Option<Arc<Link>>,
}

#[derive(Debug, Clone, Default)]
pub struct RecursionChain {
    head: Option<Arc<Link>>,
    len: usize,
}

impl RecursionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new chain ending in `url`; `self` is left untouched.
    pub fn with(&self, url: &Url) -> Self {
        Self {
            head: Some(Arc::new(Link {
                identity: document_identity(url),
                parent: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether fetching `target` from here would re-enter a document that is
    /// already being rewritten.
    pub fn would_cycle(&self, target: &Url) -> bool {
        let identity = document_identity(target);
        let mut link = self.head.as_deref();
        while let Some(current) = link {
            if current.identity == identity {
                return true;
            }
            link = current.parent.as_deref();
        }
        false
    }

    /// Entries from the outermost document inwards.
    pub fn entries(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len);
        let mut link = self.head.as_deref();
        while let Some(current) = link {
            out.push(current.identity.clone());
            link = current.parent.as_deref();
        }
        out.reverse();
        out
    }
}

/// A document is identified by its URL without query or fragment: both
/// address the same archive entry.
fn document_identity(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}
