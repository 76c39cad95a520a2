//! Page scraping: media link discovery, title extraction and clean-up.
//!
//! These are pure string functions; the pipeline feeds them fetched HTML.

use std::sync::OnceLock;

use regex::Regex;

/// Name used when the page has no `<title>`.
pub const UNTITLED: &str = "Sound";
/// Name used when sanitising leaves nothing.
pub const UNNAMED: &str = "Unnamed_Sound";

/// Returns `true` for the generated fallback names.
pub fn is_placeholder(name: &str) -> bool {
    name == UNTITLED || name == UNNAMED
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("bad regex {pattern}: {e}")))
}

// ---------------------------------------------------------------------------
// Media links
// ---------------------------------------------------------------------------

/// A direct link to an audio asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLink {
    pub url: String,
    /// Lowercase extension without the dot.
    pub extension: String,
}

/// Find the first direct audio link in `page`.
///
/// Absolute `http(s)` links win.  Otherwise the first quoted root-relative
/// path (`"/media/x.mp3"`) is resolved against `page_url`.
pub fn find_media_link(page: &str, page_url: &str) -> Option<MediaLink> {
    static ABSOLUTE: OnceLock<Regex> = OnceLock::new();
    static RELATIVE: OnceLock<Regex> = OnceLock::new();

    let absolute = regex(
        &ABSOLUTE,
        r#"(?i)https?://[^\s"'<>]+?\.(mp3|wav|ogg|flac)\b"#,
    );
    if let Some(caps) = absolute.captures(page) {
        return Some(MediaLink {
            url: caps[0].to_string(),
            extension: caps[1].to_ascii_lowercase(),
        });
    }

    let relative = regex(
        &RELATIVE,
        r#"(?i)["'](/[^\s"'<>/][^\s"'<>]*?\.(mp3|wav|ogg|flac))\b"#,
    );
    let base = reqwest::Url::parse(page_url).ok()?;
    relative.captures_iter(page).find_map(|caps| {
        let url = base.join(&caps[1]).ok()?;
        Some(MediaLink {
            url: url.to_string(),
            extension: caps[2].to_ascii_lowercase(),
        })
    })
}

// ---------------------------------------------------------------------------
// Titles
// ---------------------------------------------------------------------------

/// Raw contents of the first `<title>` element.
pub fn extract_title(page: &str) -> Option<String> {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    let title = regex(&TITLE, r"(?is)<title[^>]*>(.*?)</title>");
    title
        .captures(page)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Turn a page title into a display name that is safe as a file stem.
///
/// Site boilerplate and markup are removed, entities decoded, anything but
/// letters, digits, space, `-` and `_` dropped, then the result is
/// title-cased and trimmed.  Falls back to [`UNNAMED`].
pub fn sanitize_title(raw: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static BOILERPLATE: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let text = regex(&TAGS, r"<[^>]*>").replace_all(raw, " ");
    let text = decode_entities(&text);
    let text = regex(
        &BOILERPLATE,
        r"(?i)sound\s*button|myinstants|download|mp3|online",
    )
    .replace_all(&text, "");

    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cased = title_case(&kept);
    let trimmed = cased.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '_');
    let collapsed = regex(&SPACES, r" {2,}").replace_all(trimmed, " ");

    if collapsed.is_empty() {
        UNNAMED.to_string()
    } else {
        collapsed.into_owned()
    }
}

/// Uppercase the first letter of every run of letters, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Decode the named entities sound sites actually emit plus numeric ones.
pub fn decode_entities(s: &str) -> String {
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    let entity = regex(&ENTITY, r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);");

    entity
        .replace_all(s, |caps: &regex::Captures| {
            let body = &caps[1];
            let decoded = match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if body.starts_with("#x") || body.starts_with("#X") => {
                    u32::from_str_radix(&body[2..], 16).ok().and_then(char::from_u32)
                }
                _ if body.starts_with('#') => body[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
