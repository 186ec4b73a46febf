// Base-name derivation for downloaded files

use rand::RngExt;
use regex::Regex;

lazy_static::lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^\w\-]").unwrap();
}

/// Page suffixes stripped from the last path segment
const PAGE_SUFFIXES: [&str; 4] = [".shtml", ".html", ".htm", ".php"];

/// Byte budget for a base name; leaves room for extension and subtitle suffixes
pub const MAX_BASE_NAME_BYTES: usize = 200;

/// Device names Windows refuses as file stems
const RESERVED_STEMS: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Derive a filesystem-safe base name from a URL.
///
/// Takes the last non-empty path segment, drops a page suffix such as
/// `.html`, replaces anything outside `[\w-]` with `_` and caps the result at
/// [`MAX_BASE_NAME_BYTES`] on a char boundary. Falls back to a
/// random 9-digit token when there is no URL or no usable segment.
pub fn derive_base_name(url: Option<&str>) -> String {
    url.and_then(base_name_from_url).unwrap_or_else(random_token)
}

fn base_name_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();

    let decoded = percent_decode(&segment);
    let stem = strip_page_suffix(&decoded);
    if stem.is_empty() {
        return None;
    }

    let mut name = UNSAFE_CHARS.replace_all(stem, "_").into_owned();
    truncate_on_char_boundary(&mut name, MAX_BASE_NAME_BYTES);
    if RESERVED_STEMS.iter().any(|r| r.eq_ignore_ascii_case(&name)) {
        name.push('_');
    }
    Some(name)
}

fn truncate_on_char_boundary(name: &mut String, max_bytes: usize) {
    if name.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.truncate(end);
}

fn strip_page_suffix(segment: &str) -> &str {
    let lower = segment.to_ascii_lowercase();
    for suffix in PAGE_SUFFIXES {
        if lower.ends_with(suffix) {
            return &segment[..segment.len() - suffix.len()];
        }
    }
    segment
}

fn percent_decode(segment: &str) -> String {
    let escaped = segment.replace('+', "%2B").replace('&', "%26");
    url::form_urlencoded::parse(format!("s={}", escaped).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

/// Random 9-digit decimal token
pub fn random_token() -> String {
    rand::rng().random_range(100_000_000u32..=999_999_999).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_page_name() {
        assert_eq!(
            derive_base_name(Some("https://site.example/videos/my-clip-42.html")),
            "my-clip-42"
        );
    }

    #[test]
    fn trailing_slash_uses_last_non_empty_segment() {
        assert_eq!(derive_base_name(Some("https://site.example/play/abc123/")), "abc123");
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(
            derive_base_name(Some("https://site.example/v/a.b:c*d.html?x=1")),
            "a_b_c_d"
        );
    }

    #[test]
    fn percent_encoded_segment_is_decoded_then_sanitized() {
        assert_eq!(derive_base_name(Some("https://site.example/v/a%20b.html")), "a_b");
        assert_eq!(derive_base_name(Some("https://site.example/v/a%2Fb")), "a_b");
    }

    #[test]
    fn unicode_word_characters_survive() {
        assert_eq!(derive_base_name(Some("https://site.example/v/%E8%A7%86%E9%A2%91.html")), "视频");
    }

    #[test]
    fn reserved_windows_stem_is_suffixed() {
        assert_eq!(derive_base_name(Some("https://site.example/con.html")), "con_");
    }

    #[test]
    fn long_segment_is_capped() {
        let url = format!("https://site.example/v/{}.html", "a".repeat(300));
        let name = derive_base_name(Some(&url));
        assert_eq!(name.len(), MAX_BASE_NAME_BYTES);

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("{}.en.mp4", name)), b"x").unwrap();
    }

    #[test]
    fn long_multibyte_segment_is_cut_on_a_char_boundary() {
        // 3 bytes per char, 200 is not a multiple of 3
        let url = format!("https://site.example/v/{}", "视".repeat(100));
        let name = derive_base_name(Some(&url));
        assert!(name.len() <= MAX_BASE_NAME_BYTES);
        assert_eq!(name, "视".repeat(66));
    }

    #[test]
    fn no_path_gives_token() {
        let name = derive_base_name(Some("https://site.example/"));
        assert_eq!(name.len(), 9);
        assert!(name.chars().all(|c| c.is_ascii_digit()));

        let name = derive_base_name(Some("https://site.example/.html"));
        assert_eq!(name.len(), 9);
    }

    #[test]
    fn no_url_gives_distinct_tokens() {
        let a = derive_base_name(None);
        let b = derive_base_name(None);
        assert_eq!(a.len(), 9);
        assert!(a.chars().all(|c| c.is_ascii_digit()));
        assert!(!a.starts_with('0'));
        assert_ne!(a, b);
    }

    #[test]
    fn unparsable_url_gives_token() {
        let name = derive_base_name(Some("funny cats"));
        assert_eq!(name.len(), 9);
    }
}
