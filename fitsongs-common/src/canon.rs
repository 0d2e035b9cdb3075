//! URL canonicalization
//!
//! The same logical workout page is reachable through many surface forms:
//! locale-prefixed paths, tracking query parameters, and redirect chains.
//! Canonicalization collapses them to one stable identity in three steps:
//! strip the query, rewrite the locale segment to the reference locale, then
//! resolve redirects against the live resource. The network step degrades
//! gracefully so canonicalization is total.

use tracing::warn;

use crate::fetch::PageFetcher;

/// Reference locale every two-letter locale path segment is rewritten to.
pub const REFERENCE_LOCALE: &str = "us";

/// Sentinel category for URLs the category parser cannot interpret.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Drop everything from the first `?` onward.
pub fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// Rewrite a two-letter locale path segment immediately following the
/// authority to [`REFERENCE_LOCALE`], leaving the rest of the path untouched.
///
/// URLs without such a segment pass through unchanged.
pub fn normalize_locale(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let Some(path_rel) = url[authority_start..].find('/') else {
        return url.to_string();
    };
    let path_start = authority_start + path_rel;

    let path = &url[path_start + 1..];
    let segment = match path.find('/') {
        Some(idx) => &path[..idx],
        None => path,
    };

    let is_locale = segment.len() == 2 && segment.chars().all(|c| c.is_ascii_alphabetic());
    if !is_locale || segment == REFERENCE_LOCALE {
        return url.to_string();
    }

    let rest = &path[segment.len()..];
    format!("{}/{}{}", &url[..path_start], REFERENCE_LOCALE, rest)
}

/// Resolve `url` to its canonical identity.
///
/// Strips the query, normalizes the locale, then follows redirects and adopts
/// the final resolved URL. When the normalized URL cannot be fetched the
/// query-stripped input is tried once; on total network failure the
/// locale-normalized URL stands in as a best-effort identity. Never fails.
pub async fn canonicalize(fetcher: &dyn PageFetcher, url: &str) -> String {
    let stripped = strip_query(url);
    let normalized = normalize_locale(stripped);

    match fetcher.fetch(&normalized).await {
        Ok(page) => page.final_url,
        Err(first_err) => {
            // The normalized form occasionally 404s for region-locked pages;
            // the original input may still resolve.
            if normalized != stripped {
                if let Ok(page) = fetcher.fetch(stripped).await {
                    return page.final_url;
                }
            }
            warn!(url = %url, error = %first_err, "canonicalization degraded to locale-normalized URL");
            normalized
        }
    }
}

/// Derive a human-readable workout category from a canonical URL.
///
/// Takes the class-identifier segment after `workout` and keeps the portion
/// before `-with-` (falling back to the first `-`). `hiit` is rendered as
/// `HIIT`; anything unparseable yields [`UNKNOWN_CATEGORY`].
pub fn workout_category(url: &str) -> String {
    let slug = strip_query(url)
        .split('/')
        .skip_while(|p| *p != "workout")
        .nth(1)
        .filter(|s| !s.is_empty());

    let Some(slug) = slug else {
        return UNKNOWN_CATEGORY.to_string();
    };

    let category = match slug.find("-with-") {
        Some(idx) => &slug[..idx],
        None => slug.split('-').next().unwrap_or(slug),
    };
    if category.is_empty() {
        return UNKNOWN_CATEGORY.to_string();
    }

    if category.eq_ignore_ascii_case("hiit") {
        return "HIIT".to_string();
    }

    let mut chars = category.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => UNKNOWN_CATEGORY.to_string(),
    }
}

/// Map a duration string to a coarse bucket: 5, 10, 20, 30 or 45 minutes.
///
/// Parses the first integer found in the string (e.g. `"45min"` -> 45);
/// absent or unparseable input yields None.
pub fn duration_bucket(duration: &str) -> Option<u32> {
    let start = duration.find(|c: char| c.is_ascii_digit())?;
    let digits: String = duration[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let minutes: u32 = digits.parse().ok()?;

    Some(match minutes {
        0..=7 => 5,
        8..=15 => 10,
        16..=25 => 20,
        26..=37 => 30,
        _ => 45,
    })
}
