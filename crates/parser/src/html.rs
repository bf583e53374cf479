use scraper::{Html, Selector};
use url::Url;

use newsreel_core::urlnorm;
use newsreel_core::{DiscoveredLink, LinkKind};

use crate::classify::looks_like_article_url;

/// Raw signals pulled out of one document.
pub struct DomSignals {
    pub title: Option<String>,
    pub canonical_url: Option<String>,
    pub language: Option<String>,
    pub section: Option<String>,
    pub published: Option<String>,
    pub text: String,
    pub word_count: i64,
    pub links: Vec<DiscoveredLink>,
    pub has_article_tag: bool,
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn meta_content(document: &Html, selector_str: &str) -> Option<String> {
    selector(selector_str)
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("content").map(str::to_string))
        .filter(|v| !v.is_empty())
}

pub fn extract(html_str: &str, base_url: &Url) -> DomSignals {
    let document = Html::parse_document(html_str);

    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let canonical_url = selector("link[rel='canonical']")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| urlnorm::normalize_joined(base_url, href).ok());

    let language = selector("html")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("lang").map(str::to_string));

    let section = meta_content(&document, "meta[property='article:section']")
        .or_else(|| meta_content(&document, "meta[name='section']"));

    let published = meta_content(&document, "meta[property='article:published_time']")
        .or_else(|| {
            selector("time[datetime]")
                .and_then(|s| document.select(&s).next())
                .and_then(|el| el.value().attr("datetime").map(str::to_string))
        });

    // All visible text, whitespace-normalized.
    let text = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let word_count = text.split_whitespace().count() as i64;

    let links = extract_links(&document, base_url);

    let has_article_tag = selector("article")
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false);

    DomSignals {
        title,
        canonical_url,
        language,
        section,
        published,
        text,
        word_count,
        links,
        has_article_tag,
    }
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<DiscoveredLink> {
    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
                || href.starts_with("data:")
                || href.starts_with('#')
            {
                return None;
            }

            let resolved = urlnorm::normalize_joined(base_url, href).ok()?;
            let parsed = Url::parse(&resolved).ok()?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return None;
            }

            let anchor = {
                let t = el.text().collect::<String>().trim().to_string();
                if t.is_empty() {
                    None
                } else {
                    Some(t)
                }
            };
            let kind = if looks_like_article_url(&parsed) {
                LinkKind::Article
            } else {
                LinkKind::Nav
            };

            Some(DiscoveredLink {
                url: resolved,
                anchor,
                rel: el.value().attr("rel").map(str::to_string),
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://news.example.com/2026/08/01/markets-slide").unwrap()
    }

    const PAGE: &str = r##"
        <html lang="en">
          <head>
            <title>Markets slide on rate fears</title>
            <link rel="canonical" href="/2026/08/01/markets-slide" />
            <meta property="article:section" content="Business" />
            <meta property="article:published_time" content="2026-08-01T06:00:00Z" />
          </head>
          <body>
            <article>
              <h1>Markets slide</h1>
              <p>Stocks fell sharply on Friday as investors weighed new data.</p>
            </article>
            <a href="/2026/08/01/banks-react-to-selloff">Banks react</a>
            <a href="/business">Business section</a>
            <a href="mailto:tips@example.com">tips</a>
            <a href="#top">top</a>
            <a href="javascript:void(0)">noop</a>
          </body>
        </html>
    "##;

    #[test]
    fn test_extracts_head_metadata() {
        let signals = extract(PAGE, &base());
        assert_eq!(signals.title.as_deref(), Some("Markets slide on rate fears"));
        assert_eq!(
            signals.canonical_url.as_deref(),
            Some("https://news.example.com/2026/08/01/markets-slide")
        );
        assert_eq!(signals.language.as_deref(), Some("en"));
        assert_eq!(signals.section.as_deref(), Some("Business"));
        assert_eq!(signals.published.as_deref(), Some("2026-08-01T06:00:00Z"));
        assert!(signals.has_article_tag);
    }

    #[test]
    fn test_links_are_resolved_typed_and_filtered() {
        let signals = extract(PAGE, &base());
        assert_eq!(signals.links.len(), 2);

        let article = &signals.links[0];
        assert_eq!(
            article.url,
            "https://news.example.com/2026/08/01/banks-react-to-selloff"
        );
        assert_eq!(article.kind, LinkKind::Article);
        assert_eq!(article.anchor.as_deref(), Some("Banks react"));

        let nav = &signals.links[1];
        assert_eq!(nav.url, "https://news.example.com/business");
        assert_eq!(nav.kind, LinkKind::Nav);
    }

    #[test]
    fn test_text_is_whitespace_normalized() {
        let signals = extract(PAGE, &base());
        assert!(signals.text.contains("Stocks fell sharply"));
        assert!(!signals.text.contains('\n'));
        assert!(signals.word_count > 10);
    }
}
