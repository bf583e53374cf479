use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Immutable crawl policy, loaded once at job start and passed by
/// reference everywhere. Unknown keys in the source file are warned about
/// by the loader and ignored.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CrawlConfig {
    /// Caller-supplied job id; generated as `crawler-<date-slug>` if absent.
    pub job_id: Option<String>,
    pub db_path: String,
    pub concurrency: usize,
    pub max_depth: u32,
    pub max_pages_per_domain: Option<u64>,
    pub max_downloads: Option<u64>,
    pub crawl_timeout_ms: Option<u64>,
    pub per_host_min_interval_ms: u64,
    /// Host-specific overrides of the minimum request interval.
    pub per_host_interval_overrides: HashMap<String, u64>,
    pub per_host_concurrency: usize,
    pub retry: RetryConfig,
    pub same_site_policy: SameSitePolicy,
    pub link_type_filter: LinkTypeFilter,
    pub prefer_cache: bool,
    pub output_verbosity: Verbosity,
    pub progress_interval_ms: u64,
    pub fetch: FetchConfig,
    pub queue: QueueConfig,
    pub priority: PriorityConfig,
    pub events: EventWriterConfig,
    pub backoff: HostBackoffConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            job_id: None,
            db_path: "newsreel.db".to_string(),
            concurrency: 4,
            max_depth: 3,
            max_pages_per_domain: None,
            max_downloads: None,
            crawl_timeout_ms: Some(10 * 60 * 1000),
            per_host_min_interval_ms: 1000,
            per_host_interval_overrides: HashMap::new(),
            per_host_concurrency: 2,
            retry: RetryConfig::default(),
            same_site_policy: SameSitePolicy::ExactHost,
            link_type_filter: LinkTypeFilter::default(),
            prefer_cache: false,
            output_verbosity: Verbosity::Normal,
            progress_interval_ms: 1000,
            fetch: FetchConfig::default(),
            queue: QueueConfig::default(),
            priority: PriorityConfig::default(),
            events: EventWriterConfig::default(),
            backoff: HostBackoffConfig::default(),
        }
    }
}

impl CrawlConfig {
    /// Effective job id: the configured one, or `crawler-<ISO8601-date-slug>`.
    pub fn job_id_or_generated(&self, now: DateTime<Utc>) -> String {
        match &self.job_id {
            Some(id) => id.clone(),
            None => format!("crawler-{}", now.format("%Y-%m-%dt%H-%M-%Sz")),
        }
    }

    pub fn min_interval_ms_for(&self, host: &str) -> u64 {
        self.per_host_interval_overrides
            .get(host)
            .copied()
            .unwrap_or(self.per_host_min_interval_ms)
    }
}

/// Retry policy for transient fetch failures (network errors and 5xx).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SameSitePolicy {
    ExactHost,
    RegistrableDomain,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkTypeFilter {
    pub follow_nav: bool,
    pub follow_article: bool,
}

impl Default for LinkTypeFilter {
    fn default() -> Self {
        Self {
            follow_nav: true,
            follow_article: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Verbosity {
    Silent,
    Normal,
    ExtraTerse,
    Verbose,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
    pub max_body_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0"
                .to_string(),
            max_body_size_mb: 10,
            max_redirects: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct QueueConfig {
    /// Unbounded when None; when set, lowest-priority items are pruned on
    /// overflow.
    pub max_size: Option<usize>,
}

/// Feature flags and weights feeding the enqueue-time priority formula.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriorityConfig {
    /// Bonus per discovery method; unknown methods contribute 0.
    pub bonuses: HashMap<String, f64>,
    pub weights: PriorityWeights,
    pub features: PriorityFeatures,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        let mut bonuses = HashMap::new();
        bonuses.insert("seed".to_string(), 0.5);
        bonuses.insert("hub-seed".to_string(), 0.4);
        bonuses.insert("link:article".to_string(), 0.2);
        bonuses.insert("link:nav".to_string(), 0.0);
        Self {
            bonuses,
            weights: PriorityWeights::default(),
            features: PriorityFeatures::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriorityWeights {
    pub discovery: f64,
    pub gap: f64,
    pub cluster: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            discovery: 0.0,
            gap: 0.0,
            cluster: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PriorityFeatures {
    pub gap_prediction: bool,
    pub clustering: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EventWriterConfig {
    pub batch_writes: bool,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for EventWriterConfig {
    fn default() -> Self {
        Self {
            batch_writes: true,
            batch_size: 50,
            flush_interval_ms: 1000,
        }
    }
}

/// Failure-induced per-host backoff tuning.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HostBackoffConfig {
    /// Network errors within the window before backoff kicks in.
    pub error_threshold: usize,
    pub error_window_ms: u64,
    pub initial_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for HostBackoffConfig {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            error_window_ms: 60_000,
            initial_ms: 2_000,
            ceiling_ms: 5 * 60 * 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = CrawlConfig::default();
        assert!(cfg.concurrency >= 1);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.events.batch_size, 50);
        assert!(cfg.link_type_filter.follow_nav);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: CrawlConfig = toml::from_str(
            r#"
            concurrency = 8
            max_depth = 1

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.concurrency, 8);
        assert_eq!(cfg.max_depth, 1);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.initial_delay_ms, 500);
        assert_eq!(cfg.per_host_min_interval_ms, 1000);
    }

    #[test]
    fn test_generated_job_id_slug() {
        let cfg = CrawlConfig::default();
        let now = "2026-08-01T12:30:05Z".parse().unwrap();
        assert_eq!(cfg.job_id_or_generated(now), "crawler-2026-08-01t12-30-05z");
    }

    #[test]
    fn test_host_interval_override() {
        let mut cfg = CrawlConfig::default();
        cfg.per_host_interval_overrides
            .insert("slow.example.com".to_string(), 5000);
        assert_eq!(cfg.min_interval_ms_for("slow.example.com"), 5000);
        assert_eq!(cfg.min_interval_ms_for("other.example.com"), 1000);
    }
}
