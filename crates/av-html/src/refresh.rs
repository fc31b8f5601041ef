/// Parsed `http-equiv="refresh"` content: `<seconds>[;,] url=<target>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refresh {
    /// Delay exactly as written (digits and an optional fraction).
    pub time: String,
    /// Target URL, `None` for a plain reload.
    pub url: Option<String>,
}

impl Refresh {
    pub fn to_content(&self) -> String {
        match &self.url {
            Some(url) => format!("{};url={url}", self.time),
            None => self.time.clone(),
        }
    }
}

pub fn parse_refresh_content(content: &str) -> Option<Refresh> {
    let input = content.trim_start();
    let time_end = input
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(input.len());
    let time = &input[..time_end];
    if !time.starts_with(|ch: char| ch.is_ascii_digit()) {
        return None;
    }

    let rest = input[time_end..].trim_start_matches(|ch: char| ch.is_whitespace() || ch == ';' || ch == ',');
    if rest.is_empty() {
        return Some(Refresh {
            time: time.to_owned(),
            url: None,
        });
    }

    let target = strip_url_key(rest).unwrap_or(rest).trim();
    let target = unquote(target).trim();
    Some(Refresh {
        time: time.to_owned(),
        url: if target.is_empty() {
            None
        } else {
            Some(target.to_owned())
        },
    })
}

fn strip_url_key(input: &str) -> Option<&str> {
    let head = input.get(..3)?;
    if !head.eq_ignore_ascii_case("url") {
        return None;
    }
    let after = input[3..].trim_start();
    after.strip_prefix('=')
}

fn unquote(input: &str) -> &str {
    let Some(first) = input.chars().next() else {
        return input;
    };
    if first != '"' && first != '\'' {
        return input;
    }
    let inner = &input[1..];
    match inner.find(first) {
        Some(end) => &inner[..end],
        None => inner,
    }
}
