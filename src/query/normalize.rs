//! Text normalization shared by tokens and queries.
//!
//! Both sides go through the same pipeline before comparison:
//! strip generator markup, decode HTML entities, lower-case, collapse
//! whitespace. Template brackets (`vector<int>`) are content, not markup.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

/// HTML tags the documentation generator wraps around names
const MARKUP_TAGS: &str = "a|b|i|u|em|strong|span|code|tt|br|p|div|sup|sub|small|font|mark";

fn markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"</?(?:{})(?:\s[^<>]*)?/?>", MARKUP_TAGS))
            .expect("markup pattern is valid")
    })
}

/// Remove generator markup tags, keeping their text content
pub fn strip_markup(text: &str) -> Cow<'_, str> {
    if !text.contains('<') {
        return Cow::Borrowed(text);
    }
    markup_regex().replace_all(text, "")
}

/// Decode the HTML entities the generator emits (`&lt;`, `&#39;`, ...).
/// Unknown entities are left as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        // Entities are short; only look a few characters ahead for ';'
        let decoded = tail
            .char_indices()
            .take(12)
            .find(|&(_, c)| c == ';')
            .and_then(|(semi, _)| decode_entity(&tail[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Normalize a token or query for comparison
pub fn normalize(text: &str) -> String {
    let stripped = strip_markup(text);
    let decoded = decode_entities(&stripped);

    let mut out = String::with_capacity(decoded.len());
    for word in decoded.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        for c in word.chars() {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Decode a generated search key into its token and uniqueness suffix.
///
/// Keys look like `keep_5falive_5207`: every `_XX` is a hex-escaped byte and
/// the trailing `_<digits>` is an ordinal. Returns `None` when the key is not
/// in that form.
pub fn decode_search_key(key: &str) -> Option<(String, u32)> {
    let (body, suffix) = key.rsplit_once('_')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let ordinal = suffix.parse::<u32>().ok()?;

    let bytes = body.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = body.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }

    let token = String::from_utf8(decoded).ok()?;
    if token.is_empty() {
        return None;
    }
    Some((token, ordinal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_whitespace() {
        assert_eq!(normalize("TaggedCache"), "taggedcache");
        assert_eq!(normalize("  key   comp \t () "), "key comp ()");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_normalize_strips_markup() {
        assert_eq!(normalize("<span class=\"SRScope\">ripple</span>::Tuning"), "ripple::tuning");
        assert_eq!(normalize("<b>KeepRange</b>"), "keeprange");
        assert_eq!(normalize("<em></em>"), "");
    }

    #[test]
    fn test_normalize_keeps_template_brackets() {
        assert_eq!(normalize("vector<int>"), "vector<int>");
        assert_eq!(normalize("uhash&lt;&gt;"), "uhash<>");
        assert_eq!(
            normalize("underlying_type_t&lt; JobType &gt;"),
            "underlying_type_t< jobtype >"
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp;&amp; b"), "a && b");
        assert_eq!(decode_entities("&#39;x&#x27;"), "'x'");
        assert_eq!(decode_entities("AT&T"), "AT&T");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
        assert_eq!(decode_entities("trailing &"), "trailing &");
    }

    #[test]
    fn test_decode_search_key() {
        assert_eq!(
            decode_search_key("keep_5falive_5207"),
            Some(("keep_alive".to_string(), 5207))
        );
        assert_eq!(
            decode_search_key("uhash_3c_3e_13781"),
            Some(("uhash<>".to_string(), 13781))
        );
        assert_eq!(
            decode_search_key("underlying_5ftype_5ft_3c_20jobtype_20_3e_13802"),
            Some(("underlying_type_t< jobtype >".to_string(), 13802))
        );
        assert_eq!(decode_search_key("k_5203"), Some(("k".to_string(), 5203)));
    }

    #[test]
    fn test_decode_search_key_rejects_plain_tokens() {
        assert_eq!(decode_search_key("key_type"), None);
        assert_eq!(decode_search_key("key_"), None);
        assert_eq!(decode_search_key("TaggedCache"), None);
        assert_eq!(decode_search_key("_12"), None);
    }
}
