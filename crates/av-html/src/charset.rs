use av_core::charset_parameter;
use encoding_rs::Encoding;
use encoding_rs::UTF_8;

/// Decoded document text and whether decoding hit malformed sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    pub had_errors: bool,
}

/// Decodes markup bytes: BOM first, then a charset declared in the document
/// prefix (HTML only), then the MIME type parameter, then UTF-8.
pub fn decode_markup(body: &[u8], mime: &str, sniff_meta: bool) -> DecodedText {
    let encoding = Encoding::for_bom(body)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            if sniff_meta {
                parse_charset_from_html_prefix(body)
                    .and_then(|label| Encoding::for_label(label.as_bytes()))
            } else {
                None
            }
        })
        .or_else(|| {
            charset_parameter(mime)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or(UTF_8);

    let (decoded, used, had_errors) = encoding.decode(body);
    DecodedText {
        text: decoded.into_owned(),
        encoding: used.name(),
        had_errors,
    }
}

pub fn parse_charset_from_html_prefix(body: &[u8]) -> Option<String> {
    let prefix_len = body.len().min(8192);
    let prefix = String::from_utf8_lossy(&body[..prefix_len]);
    let lower = prefix.to_ascii_lowercase();
    let mut search_start = 0_usize;

    while let Some(relative) = lower[search_start..].find("charset=") {
        let charset_start = search_start + relative + "charset=".len();
        let remainder = &prefix[charset_start..];
        if let Some(label) = parse_charset_label(remainder) {
            return Some(label);
        }
        search_start = charset_start;
    }

    None
}

fn parse_charset_label(input: &str) -> Option<String> {
    let trimmed = input.trim_start();
    let first = trimmed.chars().next()?;

    if first == '"' || first == '\'' {
        let rest = &trimmed[first.len_utf8()..];
        let end = rest.find(first)?;
        let label = rest[..end].trim();
        return if label.is_empty() {
            None
        } else {
            Some(label.to_owned())
        };
    }

    let end = trimmed
        .find(|ch: char| ch.is_whitespace() || matches!(ch, '"' | '\'' | ';' | '>' | '/'))
        .unwrap_or(trimmed.len());
    let label = trimmed[..end].trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_owned())
    }
}
