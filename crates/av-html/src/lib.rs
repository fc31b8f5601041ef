//! HTML/XHTML/SVG parsing boundaries for the rewriter.

mod charset;
mod refresh;
mod srcset;
mod tokenizer;
mod tree;

use av_core::MarkupKind;
use av_core::ViewerError;
use av_core::ViewerResult;
use av_dom::Document;
use av_dom::Node;

pub use charset::DecodedText;
pub use charset::decode_markup;
pub use refresh::Refresh;
pub use refresh::parse_refresh_content;
pub use srcset::SrcsetCandidate;
pub use srcset::parse_srcset;
pub use srcset::rewrite_srcset;

/// A parsed markup document together with how it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub document: Document,
    pub kind: MarkupKind,
    /// Encoding the source bytes were decoded with.
    pub encoding: &'static str,
}

impl ParsedDocument {
    /// Serializes to UTF-8 markup in the document's own flavour.
    pub fn serialize(&self) -> String {
        self.document.serialize(self.kind.is_xml())
    }

    /// MIME type for the serialized output.
    pub fn output_mime_type(&self) -> String {
        format!("{};charset=UTF-8", self.kind.mime_type())
    }
}

/// Parses raw markup bytes into a source-preserving tree.
#[derive(Debug, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn parse(&self, bytes: &[u8], mime: &str) -> ViewerResult<ParsedDocument> {
        let kind = MarkupKind::from_mime(mime).ok_or_else(|| {
            ViewerError::new(
                "html.parse.unsupported_mime",
                format!("`{mime}` is not a markup type"),
            )
        })?;

        let decoded = decode_markup(bytes, mime, kind == MarkupKind::Html);
        if kind.is_xml() && decoded.had_errors {
            return Err(ViewerError::new(
                "html.parse.malformed_encoding",
                format!("document is not valid {}", decoded.encoding),
            ));
        }

        let source = decoded.text.replace('\u{0}', "\u{fffd}");
        let children = tree::build_tree(tokenizer::tokenize(&source, kind.is_xml()), kind.is_xml());
        let document = Document::new(children);

        if kind.is_xml() && !document.children.iter().any(|node| matches!(node, Node::Element(_))) {
            return Err(ViewerError::new(
                "html.parse.missing_root",
                "XML document has no root element",
            ));
        }

        Ok(ParsedDocument {
            document,
            kind,
            encoding: decoded.encoding,
        })
    }
}
