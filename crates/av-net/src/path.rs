//! Archive paths and their virtual URLs.

use av_core::ViewerError;
use av_core::ViewerResult;
use core::fmt;
use url::Url;

/// Address space every archive entry is mounted under.
pub const DEFAULT_VIRTUAL_BASE: &str = "https://archive-viewer.invalid/!/";

/// Normalized, percent-decoded `/`-separated entry name.
///
/// Leading and repeated slashes are dropped, `.` segments vanish and `..`
/// pops the previous segment. A trailing slash is kept: it marks a
/// directory reference, which resolution maps onto its `index.html`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    pub fn new(raw: &str) -> Self {
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }

        let mut path = segments.join("/");
        if raw.ends_with('/') && !path.is_empty() {
            path.push('/');
        }
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Empty or slash-terminated: names a directory, not an entry.
    pub fn is_directory(&self) -> bool {
        self.0.is_empty() || self.0.ends_with('/')
    }

    /// Entry served for a directory reference.
    pub fn index_entry(&self) -> Self {
        Self(format!("{}index.html", self.0))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Final segment, used for MIME guessing and display.
    pub fn file_name(&self) -> &str {
        self.segments().last().unwrap_or_default()
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArchivePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Synthetic origin + path prefix that in-archive references resolve under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualBase {
    url: Url,
}

impl Default for VirtualBase {
    fn default() -> Self {
        match Self::parse(DEFAULT_VIRTUAL_BASE) {
            Ok(base) => base,
            Err(error) => unreachable!("default virtual base is valid: {error}"),
        }
    }
}

impl VirtualBase {
    pub fn parse(input: &str) -> ViewerResult<Self> {
        let url = Url::parse(input).map_err(|error| {
            ViewerError::new(
                "net.base.invalid",
                format!("failed to parse virtual base `{input}`: {error}"),
            )
        })?;

        let base = Self { url };
        base.validate()?;
        Ok(base)
    }

    pub fn validate(&self) -> ViewerResult<()> {
        if self.url.cannot_be_a_base() {
            return Err(ViewerError::new(
                "net.base.not_hierarchical",
                format!("virtual base `{}` cannot anchor relative URLs", self.url),
            ));
        }

        if self.url.query().is_some() || self.url.fragment().is_some() {
            return Err(ViewerError::new(
                "net.base.query_or_fragment",
                "virtual base must not carry a query or fragment",
            ));
        }

        if !self.url.path().ends_with('/') {
            return Err(ViewerError::new(
                "net.base.trailing_slash",
                "virtual base path must end with `/`",
            ));
        }

        Ok(())
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Percent-encodes each segment of `path` under the base.
    pub fn to_virtual_url(&self, path: &ArchivePath) -> Url {
        let mut url = self.url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path.segments());
            if path.as_str().ends_with('/') {
                segments.push("");
            }
        }
        url
    }

    /// Strips the base and decodes the remaining segments.
    ///
    /// Query and fragment are ignored. `None` means the URL lies outside the
    /// archive's address space.
    pub fn from_virtual_url(&self, url: &Url) -> Option<ArchivePath> {
        if url.scheme() != self.url.scheme()
            || url.host_str() != self.url.host_str()
            || url.port_or_known_default() != self.url.port_or_known_default()
            || url.username() != self.url.username()
            || url.password() != self.url.password()
        {
            return None;
        }

        let remainder = url.path().strip_prefix(self.url.path())?;
        let decoded = remainder
            .split('/')
            .map(percent_decode)
            .collect::<Vec<_>>()
            .join("/");
        Some(ArchivePath::new(&decoded))
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.from_virtual_url(url).is_some()
    }
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0_usize;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (
                decode_hex_nibble(bytes[index + 1]),
                decode_hex_nibble(bytes[index + 2]),
            ) {
                out.push((high << 4) | low);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn decode_hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::ArchivePath;
    use super::VirtualBase;
    use proptest::prelude::*;
    use url::Url;

    fn base() -> VirtualBase {
        VirtualBase::default()
    }

    fn parse(input: &str) -> Url {
        match Url::parse(input) {
            Ok(url) => url,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn normalizes_slashes_and_dot_segments() {
        assert_eq!(ArchivePath::new("/a//b/./c").as_str(), "a/b/c");
        assert_eq!(ArchivePath::new("a/b/../c").as_str(), "a/c");
        assert_eq!(ArchivePath::new("dir/").as_str(), "dir/");
        assert!(ArchivePath::new("dir/").is_directory());
        assert!(ArchivePath::new("").is_directory());
        assert_eq!(ArchivePath::new("dir/").index_entry().as_str(), "dir/index.html");
        assert_eq!(ArchivePath::new("img/a.png").file_name(), "a.png");
    }

    #[test]
    fn encodes_each_segment() {
        let url = base().to_virtual_url(&ArchivePath::new("my dir/100%/caf\u{e9}#1.html"));
        assert_eq!(
            url.as_str(),
            "https://archive-viewer.invalid/!/my%20dir/100%25/caf%C3%A9%231.html"
        );
    }

    #[test]
    fn urls_outside_base_are_not_in_archive() {
        let base = base();
        assert!(base.from_virtual_url(&parse("https://example.com/!/a.html")).is_none());
        assert!(base.from_virtual_url(&parse("https://archive-viewer.invalid/a.html")).is_none());
        assert!(base.from_virtual_url(&parse("http://archive-viewer.invalid/!/a.html")).is_none());
    }

    #[test]
    fn ignores_query_and_fragment() {
        let decoded = base().from_virtual_url(&parse(
            "https://archive-viewer.invalid/!/a%20b/c.html?x=1#top",
        ));
        assert_eq!(decoded, Some(ArchivePath::new("a b/c.html")));
    }

    #[test]
    fn base_root_decodes_to_directory() {
        let decoded = base().from_virtual_url(&parse("https://archive-viewer.invalid/!/"));
        assert_eq!(decoded, Some(ArchivePath::new("")));
    }

    #[test]
    fn rejects_unusable_bases() {
        assert!(VirtualBase::parse("https://host/no-slash").is_err());
        assert!(VirtualBase::parse("https://host/?q").is_err());
        assert!(VirtualBase::parse("data:text/plain,x").is_err());
        assert!(VirtualBase::parse("not a url").is_err());
        assert!(VirtualBase::parse("https://host/root/").is_ok());
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 %#?\\\\:;@&=+$,'()!~*\u{e9}\u{4e2d}\u{1f600}._-]{1,10}"
            .prop_filter("dot segments are not entry names", |segment| {
                segment != "." && segment != ".."
            })
    }

    proptest! {
        #[test]
        fn virtual_url_round_trips(segments in proptest::collection::vec(segment(), 1..5)) {
            let path = ArchivePath::new(&segments.join("/"));
            let base = base();
            let url = base.to_virtual_url(&path);
            let reparsed = Url::parse(url.as_str());
            prop_assert!(reparsed.is_ok());
            if let Ok(reparsed) = reparsed {
                prop_assert_eq!(base.from_virtual_url(&reparsed), Some(path));
            }
        }
    }
}
