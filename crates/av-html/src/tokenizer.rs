use av_dom::Attribute;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Start {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
        /// Source from the last attribute through the closing `>`.
        tail: String,
    },
    End {
        name: String,
        raw: String,
    },
    Text(String),
    Doctype(String),
    Raw(String),
}

/// Splits markup into tokens. Every byte of the input lands in exactly one
/// token, so concatenating token sources reproduces the input.
pub(crate) fn tokenize(source: &str, xml: bool) -> Vec<Token> {
    let mut out = Vec::new();
    let bytes = source.as_bytes();
    let mut text_start = 0_usize;
    let mut i = 0_usize;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        let Some((token, next)) = markup_token(source, i) else {
            i += 1;
            continue;
        };

        if text_start < i {
            out.push(Token::Text(source[text_start..i].to_owned()));
        }

        let raw_text_tag = match &token {
            Token::Start {
                name, self_closing, ..
            } if !*self_closing && is_raw_text_tag(&name.to_ascii_lowercase(), xml) => {
                Some(name.clone())
            }
            _ => None,
        };

        out.push(token);
        i = next;

        if let Some(tag_name) = raw_text_tag {
            let (raw_end, closing) = find_raw_text_end(bytes, i, &tag_name);
            if i < raw_end {
                out.push(Token::Text(source[i..raw_end].to_owned()));
            }
            match closing {
                Some(closing_end) => {
                    out.push(Token::End {
                        name: tag_name,
                        raw: source[raw_end..closing_end].to_owned(),
                    });
                    i = closing_end;
                }
                None => i = bytes.len(),
            }
        }

        text_start = i;
    }

    if text_start < bytes.len() {
        out.push(Token::Text(source[text_start..].to_owned()));
    }

    out
}

fn markup_token(source: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = source.as_bytes();

    if starts_with(bytes, start, b"<!--") {
        let end = find_subslice(bytes, start + 4, b"-->")
            .map(|idx| idx + 3)
            .unwrap_or(bytes.len());
        return Some((Token::Raw(source[start..end].to_owned()), end));
    }

    if starts_with(bytes, start, b"<![CDATA[") {
        let end = find_subslice(bytes, start + 9, b"]]>")
            .map(|idx| idx + 3)
            .unwrap_or(bytes.len());
        return Some((Token::Raw(source[start..end].to_owned()), end));
    }

    if starts_with_ignore_ascii_case(bytes, start, b"<!doctype") {
        let end = skip_to_gt(bytes, start + 2);
        return Some((Token::Doctype(source[start..end].to_owned()), end));
    }

    if starts_with(bytes, start, b"<!") {
        let end = skip_to_gt(bytes, start + 2);
        return Some((Token::Raw(source[start..end].to_owned()), end));
    }

    if starts_with(bytes, start, b"<?") {
        let end = find_subslice(bytes, start + 2, b"?>")
            .map(|idx| idx + 2)
            .unwrap_or_else(|| skip_to_gt(bytes, start + 2));
        return Some((Token::Raw(source[start..end].to_owned()), end));
    }

    if starts_with(bytes, start, b"</") {
        return parse_end_tag(source, start);
    }

    parse_start_tag(source, start)
}

fn parse_end_tag(source: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = source.as_bytes();
    let begin = start + 2;
    let mut i = begin;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    if i == begin {
        return None;
    }

    let name = source[begin..i].to_owned();
    while i < bytes.len() && bytes[i] != b'>' {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }

    Some((
        Token::End {
            name,
            raw: source[start..=i].to_owned(),
        },
        i + 1,
    ))
}

fn parse_start_tag(source: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = source.as_bytes();
    let begin = start + 1;
    let mut i = begin;
    if i >= bytes.len() || !bytes[i].is_ascii_alphabetic() {
        return None;
    }
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }

    let name = source[begin..i].to_owned();
    let mut attrs = Vec::new();
    let mut self_closing = false;
    // End of the tag name or of the previous attribute.
    let mut segment_start = i;

    loop {
        skip_spaces(bytes, &mut i);
        if i >= bytes.len() {
            return None;
        }

        if bytes[i] == b'>' {
            i += 1;
            break;
        }

        if bytes[i] == b'/' {
            i += 1;
            skip_spaces(bytes, &mut i);
            if i < bytes.len() && bytes[i] == b'>' {
                self_closing = true;
                i += 1;
                break;
            }
            continue;
        }

        let a_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        if i == a_start {
            i += 1;
            continue;
        }

        let a_name = source[a_start..i].to_owned();
        let leading = &source[segment_start..a_start];
        let name_end = i;
        let mut after_name = i;
        skip_spaces(bytes, &mut after_name);

        if after_name < bytes.len() && bytes[after_name] == b'=' {
            i = after_name + 1;
            skip_spaces(bytes, &mut i);
            let v_start = i;
            let value = if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let inner_start = i;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                let inner = &source[inner_start..i.min(bytes.len())];
                if i < bytes.len() {
                    i += 1;
                }
                inner
            } else {
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                &source[v_start..i]
            };
            let raw = source[name_end..i].to_owned();
            attrs.push(Attribute::parsed(a_name, decode_entities(value), raw).with_leading(leading));
        } else {
            attrs.push(Attribute::parsed(a_name, String::new(), String::new()).with_leading(leading));
        }
        segment_start = i;
    }

    Some((
        Token::Start {
            name,
            attrs,
            self_closing,
            tail: source[segment_start..i].to_owned(),
        },
        i,
    ))
}

/// Returns (end of raw text, end of closing tag if present).
fn find_raw_text_end(bytes: &[u8], start: usize, tag_name: &str) -> (usize, Option<usize>) {
    let tag_bytes = tag_name.as_bytes();
    let mut i = start;

    while i < bytes.len() {
        if bytes[i] != b'<'
            || bytes.get(i + 1).copied() != Some(b'/')
            || !starts_with_ignore_ascii_case(bytes, i + 2, tag_bytes)
        {
            i += 1;
            continue;
        }

        let mut close = i + 2 + tag_bytes.len();
        while close < bytes.len() && bytes[close].is_ascii_whitespace() {
            close += 1;
        }

        if close < bytes.len() && bytes[close] == b'>' {
            return (i, Some(close + 1));
        }

        i += 1;
    }

    (bytes.len(), None)
}

pub(crate) fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0_usize;

    while let Some(rel_amp) = input[cursor..].find('&') {
        let amp = cursor + rel_amp;
        out.push_str(&input[cursor..amp]);

        let rest = &input[(amp + 1)..];
        let Some(rel_semi) = rest.find(';') else {
            out.push('&');
            cursor = amp + 1;
            continue;
        };

        let semi = amp + 1 + rel_semi;
        let entity = &input[(amp + 1)..semi];
        if let Some(decoded) = decode_entity(entity) {
            out.push_str(&decoded);
            cursor = semi + 1;
        } else {
            out.push('&');
            cursor = amp + 1;
        }
    }

    out.push_str(&input[cursor..]);
    out
}

fn decode_entity(entity: &str) -> Option<String> {
    match entity {
        "nbsp" => Some("\u{a0}".to_owned()),
        "amp" => Some("&".to_owned()),
        "lt" => Some("<".to_owned()),
        "gt" => Some(">".to_owned()),
        "quot" => Some("\"".to_owned()),
        "apos" => Some("'".to_owned()),
        _ => {
            if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                let value = u32::from_str_radix(hex, 16).ok()?;
                char::from_u32(value).map(|ch| ch.to_string())
            } else if let Some(dec) = entity.strip_prefix('#') {
                let value = dec.parse::<u32>().ok()?;
                char::from_u32(value).map(|ch| ch.to_string())
            } else {
                None
            }
        }
    }
}

fn is_raw_text_tag(tag: &str, xml: bool) -> bool {
    if xml {
        return matches!(tag, "script" | "style");
    }
    matches!(
        tag,
        "script" | "style" | "title" | "textarea" | "xmp" | "iframe" | "noembed" | "noframes"
    )
}

fn starts_with(bytes: &[u8], i: usize, pat: &[u8]) -> bool {
    let end = i.saturating_add(pat.len());
    end <= bytes.len() && &bytes[i..end] == pat
}

fn starts_with_ignore_ascii_case(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    if end > bytes.len() {
        return false;
    }

    bytes[idx..end]
        .iter()
        .zip(pattern.iter())
        .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }

    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn skip_to_gt(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() {
        if bytes[idx] == b'>' {
            return idx + 1;
        }
        idx += 1;
    }

    bytes.len()
}

fn skip_spaces(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

fn is_attr_name_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'/' | b'>' | b'=' | b'"' | b'\'')
}

#[cfg(test)]
mod tests {
    use super::{Token, decode_entities, tokenize};

    #[test]
    fn keeps_script_contents_as_single_text_token() {
        let tokens = tokenize("<script>if (a < b) { x(\"</p>\"); }</script>", false);
        assert_eq!(tokens.len(), 3);
        assert_eq!(
            tokens[1],
            Token::Text("if (a < b) { x(\"</p>\"); }".to_owned())
        );
    }

    #[test]
    fn stray_angle_bracket_stays_text() {
        let tokens = tokenize("a < b <3", false);
        assert_eq!(tokens, vec![Token::Text("a < b <3".to_owned())]);
    }

    #[test]
    fn parses_unquoted_path_values() {
        let tokens = tokenize("<a href=/docs/a.html>x</a>", false);
        let Token::Start { attrs, .. } = &tokens[0] else {
            panic!("expected start tag");
        };
        assert_eq!(attrs[0].value(), "/docs/a.html");
    }

    #[test]
    fn keeps_comments_and_doctype_verbatim() {
        let tokens = tokenize("<!DOCTYPE html><!-- <img src=x> --><p>", false);
        assert_eq!(tokens[0], Token::Doctype("<!DOCTYPE html>".to_owned()));
        assert_eq!(tokens[1], Token::Raw("<!-- <img src=x> -->".to_owned()));
    }

    #[test]
    fn textarea_is_raw_text_only_in_html() {
        let html = tokenize("<textarea><b></textarea>", false);
        assert_eq!(html.len(), 3);
        let xml = tokenize("<textarea><b/></textarea>", true);
        assert_eq!(xml.len(), 3);
        assert!(matches!(
            &xml[1],
            Token::Start {
                self_closing: true,
                ..
            }
        ));
    }

    #[test]
    fn start_tag_tail_keeps_its_whitespace() {
        let tokens = tokenize("<img src = \"a.png\"\n />", false);
        let Token::Start {
            attrs,
            self_closing,
            tail,
            ..
        } = &tokens[0]
        else {
            panic!("expected start tag");
        };
        assert!(*self_closing);
        assert_eq!(tail, "\n />");
        assert_eq!(attrs[0].value(), "a.png");
    }

    #[test]
    fn decodes_numeric_and_named_entities() {
        assert_eq!(decode_entities("a&amp;b&#x41;&#66;&bogus;"), "a&bAB&bogus;");
    }
}
