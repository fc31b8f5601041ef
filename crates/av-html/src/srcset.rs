/// One image candidate from a `srcset` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetCandidate {
    pub url: String,
    /// Width/density descriptor text, empty when absent.
    pub descriptor: String,
}

/// Splits a `srcset` value into candidates.
///
/// URLs may themselves contain commas (`data:` URLs); a comma only ends a
/// candidate when it trails the URL or follows the descriptor.
pub fn parse_srcset(value: &str) -> Vec<SrcsetCandidate> {
    let mut out = Vec::new();
    let mut rest = value;

    loop {
        rest = rest.trim_start_matches(|ch: char| ch.is_ascii_whitespace() || ch == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest
            .find(|ch: char| ch.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let raw_url = &rest[..url_end];
        rest = &rest[url_end..];

        let url = raw_url.trim_end_matches(',');
        if url.len() != raw_url.len() {
            out.push(SrcsetCandidate {
                url: url.to_owned(),
                descriptor: String::new(),
            });
            continue;
        }

        let descriptor_end = descriptor_end(rest);
        let descriptor = rest[..descriptor_end].trim();
        out.push(SrcsetCandidate {
            url: url.to_owned(),
            descriptor: descriptor.to_owned(),
        });
        rest = &rest[descriptor_end..];
    }

    out
}

fn descriptor_end(input: &str) -> usize {
    let mut depth = 0_u32;
    for (index, ch) in input.char_indices() {
        match ch {
            '(' => depth = depth.saturating_add(1),
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return index,
            _ => {}
        }
    }
    input.len()
}

/// Rewrites every candidate URL, preserving descriptors.
pub fn rewrite_srcset(value: &str, mut rewrite: impl FnMut(&str) -> String) -> String {
    parse_srcset(value)
        .into_iter()
        .map(|candidate| {
            let url = rewrite(&candidate.url);
            if candidate.descriptor.is_empty() {
                url
            } else {
                format!("{url} {}", candidate.descriptor)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
