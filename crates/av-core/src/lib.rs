//! Shared primitives used across archive viewer crates.

use core::fmt;

/// Result alias used across the workspace.
pub type ViewerResult<T> = Result<T, ViewerError>;

/// Workspace error type: a stable dotted code plus a human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerError {
    pub code: &'static str,
    pub message: String,
}

impl ViewerError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ViewerError {}

/// Why a reference could not be mapped onto an in-archive resource.
///
/// None of these abort a rewrite. They are recorded in logs and the affected
/// reference degrades to an inert or pass-through value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceFault {
    MalformedUrl,
    NotInArchive,
    NotFound,
    Cycle,
    ParseFailure,
    FetchFailure,
}

impl ReferenceFault {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedUrl => "malformed_url",
            Self::NotInArchive => "not_in_archive",
            Self::NotFound => "not_found",
            Self::Cycle => "cycle",
            Self::ParseFailure => "parse_failure",
            Self::FetchFailure => "fetch_failure",
        }
    }
}

impl fmt::Display for ReferenceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Markup flavours the document rewriter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkupKind {
    Html,
    Xhtml,
    Svg,
}

impl MarkupKind {
    /// Classifies a MIME type (parameters ignored).
    pub fn from_mime(mime: &str) -> Option<Self> {
        match essence(mime).as_str() {
            "text/html" => Some(Self::Html),
            "application/xhtml+xml" => Some(Self::Xhtml),
            "image/svg+xml" => Some(Self::Svg),
            _ => None,
        }
    }

    pub fn is_xml(self) -> bool {
        matches!(self, Self::Xhtml | Self::Svg)
    }

    /// HTML and XHTML documents get document-wide insertions; SVG does not.
    pub fn is_html_family(self) -> bool {
        matches!(self, Self::Html | Self::Xhtml)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Xhtml => "application/xhtml+xml",
            Self::Svg => "image/svg+xml",
        }
    }
}

/// Lowercased MIME essence (`type/subtype`) without parameters.
pub fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// The `charset` parameter of a MIME type, unquoted.
pub fn charset_parameter(content_type: &str) -> Option<String> {
    for part in content_type.split(';').skip(1) {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("charset") {
            continue;
        }

        let label = value.trim().trim_matches('"').trim_matches('\'');
        if !label.is_empty() {
            return Some(label.to_owned());
        }
    }

    None
}

pub fn is_css_mime(mime: &str) -> bool {
    essence(mime) == "text/css"
}

const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    ("htm", "text/html"),
    ("html", "text/html"),
    ("shtml", "text/html"),
    ("xht", "application/xhtml+xml"),
    ("xhtml", "application/xhtml+xml"),
    ("svg", "image/svg+xml"),
    ("svgz", "image/svg+xml"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain"),
    ("png", "image/png"),
    ("apng", "image/apng"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("vtt", "text/vtt"),
    ("pdf", "application/pdf"),
    ("swf", "application/x-shockwave-flash"),
    ("jar", "application/java-archive"),
    ("class", "application/java-vm"),
];

/// Guesses a MIME type from the extension of an archive path.
pub fn mime_type_for_path(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return "application/octet-stream";
    };

    let extension = extension.to_ascii_lowercase();
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == extension)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}
