use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use newsreel_core::Classification;

/// Date-in-path or slug shapes that news CMSes give article pages.
static ARTICLE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?x)
        /20\d{2}/\d{1,2}(/\d{1,2})?/   # /2026/08/01/
        | /(article|story|news|politics|world|business|sport|opinion)s?/.*[a-z0-9]-[a-z0-9-]+
        | -\d{6,}(\.html?)?$           # trailing numeric story id
    ").unwrap()
});

static HUB_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/(index|home|latest|topics?|sections?|tags?|categor(y|ies)|archive)s?(/|\.html?)?$")
        .unwrap()
});

/// Whether the URL's shape alone says "article page".
pub fn looks_like_article_url(url: &Url) -> bool {
    ARTICLE_PATH.is_match(url.path())
}

/// Whether the URL's shape says "listing / hub page".
pub fn looks_like_hub_url(url: &Url) -> bool {
    let path = url.path();
    path == "/" || HUB_PATH.is_match(path)
}

/// Combine URL shape, extracted word count, and link density into the
/// three-way page classification.
pub fn classify(url: &Url, word_count: i64, link_count: usize) -> Classification {
    if looks_like_article_url(url) && word_count >= 60 {
        return Classification::Article;
    }
    // Long text with few links reads as an article even without a
    // recognizable URL shape.
    if word_count >= 250 && (link_count as i64) < word_count / 10 {
        return Classification::Article;
    }
    if looks_like_hub_url(url) || link_count >= 15 {
        return Classification::Nav;
    }
    Classification::Other
}
