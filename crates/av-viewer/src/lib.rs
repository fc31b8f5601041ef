//! Archive viewer engine: resolves every reference inside archived
//! documents and stylesheets to session locators, recursively and without
//! looping on cyclic references.

pub mod chain;
pub mod config;
pub mod document;
pub mod orchestrator;
pub mod resolve;
pub mod stylesheet;
pub mod viewer;

pub use chain::RecursionChain;
pub use config::DEFAULT_RESET_STYLESHEET;
pub use config::ViewerConfig;
pub use document::DocumentRewriter;
pub use document::RewrittenDocument;
pub use orchestrator::FetchOrchestrator;
pub use resolve::ArchiveTarget;
pub use resolve::ResolvedReference;
pub use resolve::UrlResolver;
pub use stylesheet::PLACEHOLDER_PREFIX;
pub use stylesheet::StylesheetRewriter;
pub use viewer::ClickTarget;
pub use viewer::Viewer;

/// Destination substituted for references that would re-enter a document
/// already being rewritten, or whose content could not be made safe.
pub const INERT_TARGET: &str = "about:blank";
