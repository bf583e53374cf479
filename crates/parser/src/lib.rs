use std::collections::HashMap;

use serde_json::json;
use url::Url;

use newsreel_core::{AnalysisResult, Analyzer, Classification, ParseError};

pub mod classify;
pub mod html;

pub use classify::{classify, looks_like_article_url};

/// Max bytes to parse (5 MB). Larger pages are truncated before parsing.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// Default analyzer: scraper-backed extraction plus URL-shape and
/// link-density heuristics. Deterministic over its inputs.
#[derive(Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for HeuristicAnalyzer {
    fn analyze(
        &self,
        url: &Url,
        bytes: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<AnalysisResult, ParseError> {
        if bytes.is_empty() {
            return Err(ParseError("empty body".to_string()));
        }
        // A NUL in the first window means we were handed binary data.
        if bytes.iter().take(512).any(|b| *b == 0) {
            return Err(ParseError("binary content".to_string()));
        }

        let body = if bytes.len() > MAX_PARSE_SIZE {
            &bytes[..MAX_PARSE_SIZE]
        } else {
            bytes
        };
        let body_str = String::from_utf8_lossy(body);
        let signals = html::extract(&body_str, url);

        let link_count = signals.links.len();
        let classification = classify::classify(url, signals.word_count, link_count);

        let (nav_links, article_links) = signals.links.iter().fold((0usize, 0usize), |acc, l| {
            match l.kind {
                newsreel_core::LinkKind::Nav => (acc.0 + 1, acc.1),
                newsreel_core::LinkKind::Article => (acc.0, acc.1 + 1),
            }
        });

        let section = signals.section.clone().or_else(|| {
            // First path segment as a section fallback for article pages.
            if classification == Classification::Article {
                url.path_segments()
                    .and_then(|mut segments| segments.next().map(str::to_string))
                    .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic()))
            } else {
                None
            }
        });

        let analysis = json!({
            "linkCount": link_count,
            "navLinks": nav_links,
            "articleLinks": article_links,
            "wordCount": signals.word_count,
            "hasArticleTag": signals.has_article_tag,
            "contentType": headers.get("content-type"),
            "urlShape": if looks_like_article_url(url) { "article" } else { "other" },
        });

        let text = if signals.text.is_empty() {
            None
        } else {
            Some(signals.text)
        };

        Ok(AnalysisResult {
            classification,
            canonical_url: signals.canonical_url,
            title: signals.title,
            date: signals.published,
            section,
            text,
            word_count: Some(signals.word_count),
            language: signals.language,
            article_xpath: signals.has_article_tag.then(|| "//article".to_string()),
            links: signals.links,
            analysis,
        })
    }
}

/// Hex SHA-256 of a response body, recorded alongside stored article HTML.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(url: &str, body: &str) -> Result<AnalysisResult, ParseError> {
        HeuristicAnalyzer::new().analyze(
            &Url::parse(url).unwrap(),
            body.as_bytes(),
            &HashMap::new(),
        )
    }

    #[test]
    fn test_article_page_end_to_end() {
        let body = format!(
            r#"<html lang="en"><head><title>Big story</title></head><body>
               <article><p>{}</p></article>
               <a href="/2026/08/01/followup-report-lands">follow-up</a>
               </body></html>"#,
            "word ".repeat(200)
        );
        let result = analyze("https://news.example.com/2026/08/01/big-story", &body).unwrap();
        assert_eq!(result.classification, Classification::Article);
        assert_eq!(result.title.as_deref(), Some("Big story"));
        assert!(result.word_count.unwrap() >= 200);
        assert_eq!(result.article_xpath.as_deref(), Some("//article"));
        assert_eq!(result.links.len(), 1);
    }

    #[test]
    fn test_front_page_is_nav() {
        let links: String = (0..30)
            .map(|i| format!("<a href=\"/2026/08/01/story-number-{i}\">story {i}</a>"))
            .collect();
        let body = format!("<html><body>{links}</body></html>");
        let result = analyze("https://news.example.com/", &body).unwrap();
        assert_eq!(result.classification, Classification::Nav);
        assert_eq!(result.links.len(), 30);
    }

    #[test]
    fn test_empty_body_is_a_parse_error() {
        assert!(analyze("https://news.example.com/x", "").is_err());
    }

    #[test]
    fn test_binary_body_is_a_parse_error() {
        let result = HeuristicAnalyzer::new().analyze(
            &Url::parse("https://news.example.com/logo.png").unwrap(),
            &[0x89, 0x50, 0x4e, 0x47, 0x00, 0x0d],
            &HashMap::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_sha256_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
