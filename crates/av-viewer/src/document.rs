//! Document rewriting: every reference-bearing node of an HTML, XHTML or
//! SVG document is pointed at its in-archive counterpart.
//!
//! The tree is walked once, pre-order. Rewrites that need nothing but the
//! resolver are applied on the spot. Rewrites that recurse or fetch bytes
//! are queued as jobs addressed by node path; all jobs run concurrently and
//! their edits are applied once every job has finished, so the result does
//! not depend on completion order.

use crate::INERT_TARGET;
use crate::chain::RecursionChain;
use crate::orchestrator::FetchOrchestrator;
use crate::resolve::ResolvedReference;
use crate::stylesheet::StylesheetRewriter;
use av_core::ReferenceFault;
use av_core::essence;
use av_dom::Document;
use av_dom::Element;
use av_dom::Node;
use av_dom::NodePath;
use av_dom::escape_attribute;
use av_html::HtmlParser;
use av_html::Refresh;
use av_html::parse_refresh_content;
use av_html::rewrite_srcset;
use av_net::ArchivePath;
use av_net::Url;
use av_storage::Resource;
use av_storage::TransformKind;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;
use tracing::debug;
use tracing::warn;

/// `og:` properties whose content is a URL.
const OPEN_GRAPH_URL_PROPERTIES: &[&str] = &[
    "og:url",
    "og:image",
    "og:image:url",
    "og:image:secure_url",
    "og:audio",
    "og:audio:url",
    "og:audio:secure_url",
    "og:video",
    "og:video:url",
    "og:video:secure_url",
];

const SCRIPT_MIME_TYPES: &[&str] = &[
    "application/javascript",
    "application/ecmascript",
    "application/x-javascript",
    "application/x-ecmascript",
    "text/javascript",
    "text/ecmascript",
    "text/jscript",
    "text/livescript",
    "text/x-javascript",
    "text/x-ecmascript",
    "module",
];

/// Serialized output of a document rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenDocument {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// URL the document's relative references resolved against.
    pub reference_url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subtree {
    Html,
    Svg,
    MathMl,
}

impl Subtree {
    fn enter(self, element: &Element) -> Self {
        if element.is("svg") {
            Self::Svg
        } else if element.is("math") {
            Self::MathMl
        } else {
            self
        }
    }
}

#[derive(Debug)]
enum Change {
    Attr { name: &'static str, value: String },
    Text(String),
}

#[derive(Debug)]
struct Edit {
    path: NodePath,
    change: Change,
}

impl Edit {
    fn attr(path: NodePath, name: &'static str, value: String) -> Self {
        Self {
            path,
            change: Change::Attr { name, value },
        }
    }

    fn apply(self, document: &mut Document) {
        let Some(element) = document.element_mut(&self.path) else {
            return;
        };
        match self.change {
            Change::Attr { name, value } => element.set_attr(name, value),
            Change::Text(text) => element.set_text(text),
        }
    }
}

type Job<'a> = BoxFuture<'a, Option<Edit>>;

#[derive(Debug, Clone, Copy)]
pub struct DocumentRewriter<'a> {
    orchestrator: &'a FetchOrchestrator,
}

impl<'a> DocumentRewriter<'a> {
    pub fn new(orchestrator: &'a FetchOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Rewrites `resource` under `chain`. Unparsable documents come back as
    /// their original bytes.
    pub async fn rewrite(&self, resource: &Resource, chain: &RecursionChain) -> RewrittenDocument {
        let doc_url = self.orchestrator.resolver().document_url(&resource.path);
        let mut parsed = match HtmlParser.parse(&resource.content, &resource.mime_type) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(path = %resource.path, %error, reason = ReferenceFault::ParseFailure.as_str(), "serving document unmodified");
                return RewrittenDocument {
                    bytes: resource.content.to_vec(),
                    mime_type: resource.mime_type.clone(),
                    reference_url: doc_url,
                };
            }
        };

        let ref_url = base_href(&parsed.document)
            .and_then(|href| doc_url.join(&href).ok())
            .unwrap_or_else(|| doc_url.clone());

        let mut pass = Pass {
            orchestrator: self.orchestrator,
            path: &resource.path,
            ref_url: ref_url.clone(),
            child_chain: chain.with(&doc_url),
            stylesheet_chain: RecursionChain::new().with(&doc_url),
            recode: parsed.encoding != "UTF-8",
            jobs: Vec::new(),
        };
        pass.visit(&mut parsed.document.children, &mut Vec::new(), Subtree::Html);

        let jobs = pass.jobs;
        let queued = jobs.len();
        for edit in join_all(jobs).await.into_iter().flatten() {
            edit.apply(&mut parsed.document);
        }

        if parsed.kind.is_html_family() {
            self.insert_head_assets(&mut parsed.document);
        }

        debug!(path = %resource.path, depth = chain.len(), jobs = queued, "document rewritten");
        RewrittenDocument {
            bytes: parsed.serialize().into_bytes(),
            mime_type: parsed.output_mime_type(),
            reference_url: ref_url,
        }
    }

    /// Sanitizer script first, then the reset stylesheet, at the top of
    /// `<head>`.
    fn insert_head_assets(&self, document: &mut Document) {
        let mut assets = Vec::new();
        if let Some(locator) = self.orchestrator.sanitizer_locator() {
            assets.push(Node::Element(Element::new("script").with_attr("src", locator)));
        }
        if let Some(locator) = self.orchestrator.reset_stylesheet_locator() {
            let mut link = Element::new("link")
                .with_attr("rel", "stylesheet")
                .with_attr("href", locator);
            link.self_closing = true;
            assets.push(Node::Element(link));
        }
        if assets.is_empty() {
            return;
        }

        let Some(head) = head_element(document) else {
            return;
        };
        head.expand_self_closing();
        head.children.splice(0..0, assets);
    }
}

/// The document's `<head>`, created when missing.
fn head_element(document: &mut Document) -> Option<&mut Element> {
    if let Some(path) = document.find_element("head") {
        return document.element_mut(&path);
    }

    if let Some(mut path) = document.find_element("html") {
        let html = document.element_mut(&path)?;
        html.children.insert(0, Node::Element(Element::new("head")));
        path.push(0);
        return document.element_mut(&path);
    }

    let index = document
        .children
        .iter()
        .position(|node| matches!(node, Node::Element(_)))
        .unwrap_or(document.children.len());
    document
        .children
        .insert(index, Node::Element(Element::new("head")));
    document.element_mut(&[index])
}

/// `href` of the first `<base>` that has one.
fn base_href(document: &Document) -> Option<String> {
    fn find(nodes: &[Node]) -> Option<String> {
        for node in nodes {
            let Node::Element(element) = node else {
                continue;
            };
            if element.is("base") {
                if let Some(href) = element.attr("href") {
                    return Some(href.to_owned());
                }
            }
            if let Some(href) = find(&element.children) {
                return Some(href);
            }
        }
        None
    }
    find(&document.children)
}

/// Minimal page standing in for a meta refresh to an external target.
fn redirect_notice(target: &str) -> String {
    let escaped = escape_attribute(target);
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"><title>Redirect</title></head>\
         <body><p>This page redirects to <a href=\"{escaped}\">{escaped}</a>.</p></body></html>\n"
    )
}

fn is_executable_script(element: &Element) -> bool {
    match element.attr("type").map(str::trim) {
        None | Some("") => true,
        Some(kind) => SCRIPT_MIME_TYPES.contains(&essence(kind).as_str()),
    }
}

fn has_only_text(element: &Element) -> bool {
    element
        .children
        .iter()
        .all(|child| matches!(child, Node::Text(_)))
}

fn is_network_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// State of one traversal.
struct Pass<'a, 'p> {
    orchestrator: &'a FetchOrchestrator,
    path: &'p ArchivePath,
    ref_url: Url,
    /// Chain for documents nested in this one: the caller's chain plus this
    /// document.
    child_chain: RecursionChain,
    /// Stylesheets start their own chain at this document.
    stylesheet_chain: RecursionChain,
    /// Source was not UTF-8; charset declarations must be updated.
    recode: bool,
    jobs: Vec<Job<'a>>,
}

impl<'a> Pass<'a, '_> {
    fn visit(&mut self, nodes: &mut [Node], path: &mut NodePath, subtree: Subtree) {
        for (index, node) in nodes.iter_mut().enumerate() {
            let Node::Element(element) = node else {
                continue;
            };

            path.push(index);
            let subtree = subtree.enter(element);
            if self.rewrite_element(element, path, subtree) {
                self.visit(&mut element.children, path, subtree);
            } else {
                // Detached; an empty raw node keeps sibling paths stable.
                *node = Node::Raw(String::new());
            }
            path.pop();
        }
    }

    /// Returns `false` when the element is detached from the output.
    fn rewrite_element(&mut self, element: &mut Element, path: &NodePath, subtree: Subtree) -> bool {
        match subtree {
            Subtree::Svg | Subtree::MathMl => {
                self.rewrite_self_link(element, "href");
                if subtree == Subtree::Svg {
                    self.rewrite_self_link(element, "xlink:href");
                }
                if element.is("style") {
                    self.queue_style_element(element, path);
                }
            }
            Subtree::Html => match element.local_name().as_str() {
                "base" => return false,
                "meta" => self.rewrite_meta(element, path),
                "link" => self.rewrite_link(element, path),
                "style" => self.queue_style_element(element, path),
                "script" => self.rewrite_script(element, path),
                "body" | "table" | "tr" | "th" | "td" => self.rewrite_attr(element, "background"),
                "frame" | "iframe" => self.rewrite_frame(element, path),
                "a" | "area" => self.rewrite_self_link(element, "href"),
                "img" => {
                    self.rewrite_attr(element, "src");
                    self.rewrite_srcset(element);
                }
                "audio" | "track" => self.rewrite_attr(element, "src"),
                "video" => {
                    self.rewrite_attr(element, "src");
                    self.rewrite_attr(element, "poster");
                }
                "source" => {
                    self.rewrite_attr(element, "src");
                    self.rewrite_srcset(element);
                }
                "embed" => self.rewrite_plugin(element, path, "src"),
                "object" => self.rewrite_plugin(element, path, "data"),
                "applet" => {
                    self.rewrite_plugin(element, path, "code");
                    self.rewrite_plugin(element, path, "archive");
                }
                "form" => self.rewrite_attr(element, "action"),
                "input" => {
                    if element
                        .attr("type")
                        .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("image"))
                    {
                        self.rewrite_attr(element, "src");
                    }
                }
                _ => {}
            },
        }

        if element.has_attr("style") {
            self.queue_style_attr(element, path);
        }
        true
    }

    fn resolve(&self, url: &str) -> ResolvedReference {
        self.orchestrator.resolver().resolve(url, &self.ref_url)
    }

    fn rewrite_attr(&self, element: &mut Element, name: &str) {
        let Some(value) = element.attr(name) else {
            return;
        };
        let rewritten = self.resolve(value).final_url();
        element.set_attr(name, rewritten);
    }

    fn rewrite_srcset(&self, element: &mut Element) {
        let Some(value) = element.attr("srcset") else {
            return;
        };
        let rewritten = rewrite_srcset(value, |url| self.resolve(url).final_url());
        element.set_attr("srcset", rewritten);
    }

    /// Links back into this document keep only their fragment.
    fn rewrite_self_link(&self, element: &mut Element, name: &str) {
        let Some(value) = element.attr(name) else {
            return;
        };
        let rewritten = match self.resolve(value) {
            ResolvedReference::InArchive(target) if target.path == *self.path => target.self_link(),
            other => other.final_url(),
        };
        element.set_attr(name, rewritten);
    }

    fn rewrite_meta(&mut self, element: &mut Element, path: &NodePath) {
        if let Some(http_equiv) = element.attr("http-equiv").map(str::to_ascii_lowercase) {
            match http_equiv.trim() {
                "refresh" => self.rewrite_refresh(element, path),
                "content-type" if self.recode => {
                    let mime = element.attr("content").map(essence).unwrap_or_default();
                    if !mime.is_empty() {
                        element.set_attr("content", format!("{mime}; charset=UTF-8"));
                    }
                }
                _ => {}
            }
        }

        if self.recode && element.has_attr("charset") {
            element.set_attr("charset", "UTF-8");
        }

        let is_url_property = element.attr("property").is_some_and(|property| {
            OPEN_GRAPH_URL_PROPERTIES.contains(&property.trim().to_ascii_lowercase().as_str())
        });
        if is_url_property {
            self.rewrite_attr(element, "content");
        }
    }

    fn rewrite_refresh(&mut self, element: &mut Element, path: &NodePath) {
        let Some(refresh) = element.attr("content").and_then(parse_refresh_content) else {
            return;
        };
        let Some(target) = refresh.url.as_deref() else {
            return;
        };
        let with_target = |url: String| {
            Refresh {
                time: refresh.time.clone(),
                url: Some(url),
            }
            .to_content()
        };

        match self.resolve(target) {
            ResolvedReference::InArchive(target) if target.path == *self.path => {
                element.set_attr("content", with_target(target.self_link()));
            }
            ResolvedReference::InArchive(target) => {
                if self.child_chain.would_cycle(&target.document_url) {
                    debug!(path = %self.path, target = %target.path, reason = ReferenceFault::Cycle.as_str(), "meta refresh cycles");
                    element.set_attr("content", with_target(INERT_TARGET.to_owned()));
                    return;
                }

                let orchestrator = self.orchestrator;
                let chain = self.child_chain.clone();
                let path = path.clone();
                let time = refresh.time.clone();
                self.jobs.push(
                    async move {
                        let locator = orchestrator
                            .fetch(target.path.clone(), Some(TransformKind::Document), chain)
                            .await?;
                        let content = Refresh {
                            time,
                            url: Some(target.with_fragment(&locator)),
                        }
                        .to_content();
                        Some(Edit::attr(path, "content", content))
                    }
                    .boxed(),
                );
            }
            ResolvedReference::External(url) => {
                let notice = self.orchestrator.store().register_generated(
                    redirect_notice(url.as_str()).into_bytes(),
                    "text/html;charset=UTF-8",
                );
                let notice = match url.fragment() {
                    Some(fragment) => format!("{notice}#{fragment}"),
                    None => notice,
                };
                element.set_attr("content", with_target(notice));
            }
            ResolvedReference::Unresolved { .. } => {}
        }
    }

    fn rewrite_link(&mut self, element: &mut Element, path: &NodePath) {
        let is_stylesheet = element.attr("rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case("stylesheet"))
        });
        if !is_stylesheet {
            self.rewrite_attr(element, "href");
            return;
        }

        let Some(href) = element.attr("href") else {
            return;
        };
        let target = match self.resolve(href) {
            ResolvedReference::InArchive(target) => target,
            other => {
                element.set_attr("href", other.final_url());
                return;
            }
        };

        let orchestrator = self.orchestrator;
        let chain = self.stylesheet_chain.clone();
        let path = path.clone();
        self.jobs.push(
            async move {
                let locator = orchestrator
                    .fetch(target.path.clone(), Some(TransformKind::Stylesheet), chain)
                    .await?;
                Some(Edit::attr(path, "href", target.with_fragment(&locator)))
            }
            .boxed(),
        );
    }

    fn queue_style_element(&mut self, element: &Element, path: &NodePath) {
        if !has_only_text(element) {
            return;
        }
        let css = element.text();
        if css.trim().is_empty() {
            return;
        }

        let orchestrator = self.orchestrator;
        let ref_url = self.ref_url.clone();
        let chain = self.stylesheet_chain.clone();
        let path = path.clone();
        self.jobs.push(
            async move {
                let rewritten = StylesheetRewriter::new(orchestrator)
                    .rewrite(&css, &ref_url, &chain)
                    .await;
                (rewritten != css).then(|| Edit {
                    path,
                    change: Change::Text(rewritten),
                })
            }
            .boxed(),
        );
    }

    fn queue_style_attr(&mut self, element: &Element, path: &NodePath) {
        let Some(css) = element.attr("style") else {
            return;
        };
        let lowered = css.to_ascii_lowercase();
        if !lowered.contains("url(") && !lowered.contains("@import") {
            return;
        }

        let css = css.to_owned();
        let orchestrator = self.orchestrator;
        let ref_url = self.ref_url.clone();
        let chain = self.stylesheet_chain.clone();
        let path = path.clone();
        self.jobs.push(
            async move {
                let rewritten = StylesheetRewriter::new(orchestrator)
                    .rewrite(&css, &ref_url, &chain)
                    .await;
                (rewritten != css).then(|| Edit::attr(path, "style", rewritten))
            }
            .boxed(),
        );
    }

    fn rewrite_script(&mut self, element: &mut Element, path: &NodePath) {
        let orchestrator = self.orchestrator;
        let policy = &orchestrator.config().policy;

        if let Some(src) = element.attr("src") {
            match self.resolve(src) {
                ResolvedReference::External(url)
                    if policy.localize_external_scripts() && is_network_url(&url) =>
                {
                    let path = path.clone();
                    self.jobs.push(
                        async move {
                            let value = match orchestrator.fetcher().fetch(url.as_str()).await {
                                Ok(fetched) => {
                                    let mime_type = if fetched.content_type.is_empty() {
                                        "application/javascript".to_owned()
                                    } else {
                                        fetched.content_type
                                    };
                                    orchestrator
                                        .store()
                                        .register_generated(fetched.bytes, &mime_type)
                                }
                                Err(error) => {
                                    warn!(url = %url, %error, reason = ReferenceFault::FetchFailure.as_str(), "neutralizing external script");
                                    INERT_TARGET.to_owned()
                                }
                            };
                            Some(Edit::attr(path, "src", value))
                        }
                        .boxed(),
                    );
                }
                other => element.set_attr("src", other.final_url()),
            }
            return;
        }

        if !policy.localize_inline_scripts() || !is_executable_script(element) {
            return;
        }
        if !has_only_text(element) {
            return;
        }
        let text = element.text();
        if text.trim().is_empty() {
            return;
        }

        let locator = orchestrator
            .store()
            .register_generated(text.into_bytes(), "application/javascript;charset=UTF-8");
        element.set_attr("src", locator);
        element.set_text("");
    }

    fn rewrite_frame(&mut self, element: &mut Element, path: &NodePath) {
        let Some(src) = element.attr("src") else {
            return;
        };
        let target = match self.resolve(src) {
            ResolvedReference::InArchive(target) => target,
            other => {
                element.set_attr("src", other.final_url());
                return;
            }
        };

        if self.child_chain.would_cycle(&target.document_url) {
            debug!(path = %self.path, target = %target.path, reason = ReferenceFault::Cycle.as_str(), "frame cycles");
            element.set_attr("src", INERT_TARGET);
            return;
        }

        let orchestrator = self.orchestrator;
        let chain = self.child_chain.clone();
        let path = path.clone();
        self.jobs.push(
            async move {
                let locator = orchestrator
                    .fetch(target.path.clone(), Some(TransformKind::Document), chain)
                    .await?;
                Some(Edit::attr(path, "src", target.with_fragment(&locator)))
            }
            .boxed(),
        );
    }

    /// Plugin content is best effort: external bytes are copied behind a
    /// locator when the host forbids loading them, and a failed copy keeps
    /// the external URL.
    fn rewrite_plugin(&mut self, element: &mut Element, path: &NodePath, name: &'static str) {
        let Some(value) = element.attr(name) else {
            return;
        };
        let resolved = self.resolve(value);
        element.set_attr(name, resolved.final_url());

        let ResolvedReference::External(url) = resolved else {
            return;
        };
        if !self.orchestrator.config().policy.localize_plugin_bytes() || !is_network_url(&url) {
            return;
        }

        let orchestrator = self.orchestrator;
        let path = path.clone();
        self.jobs.push(
            async move {
                match orchestrator.fetcher().fetch(url.as_str()).await {
                    Ok(fetched) => {
                        let mime_type = if fetched.content_type.is_empty() {
                            "application/octet-stream".to_owned()
                        } else {
                            fetched.content_type
                        };
                        let locator = orchestrator
                            .store()
                            .register_generated(fetched.bytes, &mime_type);
                        Some(Edit::attr(path, name, locator))
                    }
                    Err(error) => {
                        debug!(url = %url, %error, reason = ReferenceFault::FetchFailure.as_str(), "plugin bytes stay external");
                        None
                    }
                }
            }
            .boxed(),
        );
    }
}
