//! URL list sanitation.
//!
//! Produces the canonical URL lists that every later stage works on.

use std::collections::HashSet;

use url::Url;

/// Trim, deduplicate (first occurrence wins) and drop anything that is not a
/// syntactically valid absolute URL.
///
/// Empty input yields empty output; callers decide what an empty result means.
pub fn normalize<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for raw in urls {
        let candidate = raw.as_ref().trim();
        if candidate.is_empty() || !seen.insert(candidate.to_string()) {
            continue;
        }
        if is_valid_url(candidate) {
            out.push(candidate.to_string());
        }
    }

    out
}

/// Strict absolute-URL check: literal `scheme://` prefix, non-empty host, no
/// backslashes, whitespace or control characters anywhere in the input.
///
/// `Url::parse` alone follows the lenient WHATWG rules (`https:host`,
/// `http:/host`, `\\` as `/`), so the raw prefix is checked as well.
pub fn is_valid_url(candidate: &str) -> bool {
    if candidate
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '\\')
    {
        return false;
    }
    let Some((scheme, rest)) = candidate.split_once("://") else {
        return false;
    };
    if rest.starts_with('/') {
        return false;
    }

    match Url::parse(candidate) {
        Ok(url) => {
            url.scheme().eq_ignore_ascii_case(scheme)
                && !url.cannot_be_a_base()
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Remove a single trailing `/`.
pub fn strip_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// Drop the `scheme://` prefix and the trailing slash, leaving `host[/path]`.
pub fn strip_scheme(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed.trim_start_matches('/'),
    };
    strip_trailing_slash(without_scheme).to_string()
}

/// Append a trailing `/` when missing.
pub fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_deduplicates_in_first_seen_order() {
        let out = normalize([
            " https://example.com/b ",
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/a\t",
        ]);
        assert_eq!(out, vec!["https://example.com/b", "https://example.com/a"]);
    }

    #[test]
    fn drops_malformed_entries() {
        let out = normalize([
            "not a url",
            "example.com/page",
            "",
            "   ",
            "https://",
            "mailto:someone@example.com",
            "https://exa mple.com/",
            "https:example.com/a",
            "https:\\\\example.com\\b",
            "http:/example.com/c",
            "https:///example.com/d",
            "https://example.com/ok",
        ]);
        assert_eq!(out, vec!["https://example.com/ok"]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let input = vec![
            "  https://a.example.com/ ".to_string(),
            "https://a.example.com/".to_string(),
            "garbage".to_string(),
            "http://b.example.com/x?y=1".to_string(),
        ];
        let once = normalize(&input);
        let twice = normalize(&once);
        assert_eq!(once, twice);
        assert!(once.iter().all(|u| is_valid_url(u)));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let empty: Vec<String> = Vec::new();
        assert!(normalize(empty).is_empty());
    }

    #[test]
    fn strip_scheme_keeps_host_characters() {
        assert_eq!(strip_scheme("https://thesite.com/"), "thesite.com");
        assert_eq!(strip_scheme("http://shop.example.com"), "shop.example.com");
        assert_eq!(
            strip_scheme(" https://example.com/blog/ "),
            "example.com/blog"
        );
        assert_eq!(strip_scheme("//cdn.example.com/"), "cdn.example.com");
    }

    #[test]
    fn trailing_slash_helpers() {
        assert_eq!(strip_trailing_slash("https://a.com/"), "https://a.com");
        assert_eq!(strip_trailing_slash("https://a.com"), "https://a.com");
        assert_eq!(ensure_trailing_slash("https://edge"), "https://edge/");
        assert_eq!(ensure_trailing_slash("https://edge/"), "https://edge/");
    }
}
