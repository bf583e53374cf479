use url::Url;

use crate::config::SameSitePolicy;
use crate::error::CrawlError;

/// Canonical form of a URL: lowercase scheme and host (the parser already
/// does both), fragment stripped, default ports dropped. Path and query are
/// left untouched beyond what the parser itself normalizes.
pub fn normalize(raw: &str) -> Result<String, CrawlError> {
    let mut url = Url::parse(raw).map_err(|e| CrawlError::InvalidUrl(format!("{raw}: {e}")))?;
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Resolve `href` against `base`, then canonicalize.
pub fn normalize_joined(base: &Url, href: &str) -> Result<String, CrawlError> {
    let mut url = base
        .join(href)
        .map_err(|e| CrawlError::InvalidUrl(format!("{href}: {e}")))?;
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Lowercase hostname of a URL, if it has one.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Last two labels of a hostname. An approximation of the registrable
/// domain that is good enough for same-site grouping of news hosts.
fn registrable(host: &str) -> &str {
    let mut dots = host.rmatch_indices('.');
    dots.next();
    match dots.next() {
        Some((idx, _)) => &host[idx + 1..],
        None => host,
    }
}

/// Same-site predicate used for `on_domain` and link filtering.
pub fn same_site(a_host: &str, b_host: &str, policy: SameSitePolicy) -> bool {
    match policy {
        SameSitePolicy::ExactHost => a_host.eq_ignore_ascii_case(b_host),
        SameSitePolicy::RegistrableDomain => {
            registrable(&a_host.to_ascii_lowercase()) == registrable(&b_host.to_ascii_lowercase())
        }
    }
}
