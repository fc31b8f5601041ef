//! Stylesheet text rewriting.
//!
//! Rewriting runs in three passes. The scan pass swaps every reference for
//! a placeholder marker and records it in a token table. The resolve pass
//! settles all tokens concurrently, recursing into imported stylesheets.
//! The substitution pass swaps each marker for its final `url()` token.

use crate::INERT_TARGET;
use crate::chain::RecursionChain;
use crate::orchestrator::FetchOrchestrator;
use crate::resolve::ResolvedReference;
use av_core::ReferenceFault;
use av_css::CssReferenceKind;
use av_css::CssScanner;
use av_css::url_token;
use av_net::Url;
use av_storage::TransformKind;
use futures::future::join_all;
use tracing::debug;
use uuid::Uuid;

/// Marker prefix; a full marker is `{prefix}{nonce}:{index};`.
pub const PLACEHOLDER_PREFIX: &str = "urn:archive-viewer:placeholder:";

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingReference {
    url: String,
    kind: CssReferenceKind,
}

/// Stylesheet text with references replaced by markers, plus the table the
/// markers index into.
#[derive(Debug)]
struct ScannedStylesheet {
    text: String,
    nonce: String,
    pending: Vec<PendingReference>,
}

impl ScannedStylesheet {
    fn scan(css: &str) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        let mut text = String::with_capacity(css.len());
        let mut pending = Vec::new();
        let mut cursor = 0_usize;

        for reference in CssScanner.scan(css) {
            // Empty and fragment-only targets point into the embedding
            // document itself.
            if reference.url.trim().is_empty() || reference.url.starts_with('#') {
                continue;
            }

            text.push_str(&css[cursor..reference.span.start]);
            text.push_str(&marker(&nonce, pending.len()));
            cursor = reference.span.end;
            pending.push(PendingReference {
                url: reference.url,
                kind: reference.kind,
            });
        }
        text.push_str(&css[cursor..]);

        Self {
            text,
            nonce,
            pending,
        }
    }

    /// Replaces this table's markers with `values`. Anything else that looks
    /// like a marker is copied through untouched.
    fn substitute(&self, values: &[String]) -> String {
        let own_prefix = format!("{PLACEHOLDER_PREFIX}{}:", self.nonce);
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(position) = rest.find(PLACEHOLDER_PREFIX) {
            out.push_str(&rest[..position]);
            let candidate = &rest[position..];

            if let Some((index, consumed)) = parse_marker_index(candidate, &own_prefix) {
                if let Some(value) = values.get(index) {
                    out.push_str(&url_token(value));
                    rest = &candidate[consumed..];
                    continue;
                }
            }

            out.push_str(PLACEHOLDER_PREFIX);
            rest = &candidate[PLACEHOLDER_PREFIX.len()..];
        }

        out.push_str(rest);
        out
    }
}

fn marker(nonce: &str, index: usize) -> String {
    format!("{PLACEHOLDER_PREFIX}{nonce}:{index};")
}

/// Index and byte length of a marker carrying `own_prefix`.
fn parse_marker_index(candidate: &str, own_prefix: &str) -> Option<(usize, usize)> {
    let after = candidate.strip_prefix(own_prefix)?;
    let digits = after.find(';')?;
    let index = after[..digits].parse::<usize>().ok()?;
    Some((index, own_prefix.len() + digits + 1))
}

/// Rewrites the references inside stylesheet text.
#[derive(Debug, Clone, Copy)]
pub struct StylesheetRewriter<'a> {
    orchestrator: &'a FetchOrchestrator,
}

impl<'a> StylesheetRewriter<'a> {
    pub fn new(orchestrator: &'a FetchOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Rewrites `css`, whose relative references resolve against `ref_url`.
    /// `chain` holds the documents and stylesheets this text is nested in.
    pub async fn rewrite(&self, css: &str, ref_url: &Url, chain: &RecursionChain) -> String {
        let scanned = ScannedStylesheet::scan(css);
        if scanned.pending.is_empty() {
            return css.to_owned();
        }

        let chain = chain.with(ref_url);
        let values = join_all(
            scanned
                .pending
                .iter()
                .map(|pending| self.resolve_pending(pending, ref_url, &chain)),
        )
        .await;

        scanned.substitute(&values)
    }

    async fn resolve_pending(
        &self,
        pending: &PendingReference,
        ref_url: &Url,
        chain: &RecursionChain,
    ) -> String {
        let resolved = self.orchestrator.resolver().resolve(&pending.url, ref_url);
        let ResolvedReference::InArchive(target) = &resolved else {
            return resolved.final_url();
        };

        if chain.would_cycle(&target.document_url) {
            debug!(url = %pending.url, path = %target.path, reason = ReferenceFault::Cycle.as_str(), "stylesheet reference cycles");
            return INERT_TARGET.to_owned();
        }

        let transform = match pending.kind {
            CssReferenceKind::Import => Some(TransformKind::Stylesheet),
            CssReferenceKind::Url => None,
        };
        match self
            .orchestrator
            .fetch(target.path.clone(), transform, chain.clone())
            .await
        {
            Some(locator) => target.with_fragment(&locator),
            None => resolved.final_url(),
        }
    }
}
