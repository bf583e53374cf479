use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

use priority_queue::PriorityQueue;
use tracing::debug;

use newsreel_core::QueueItem;

mod host;
pub mod priority;

pub use host::{HostLimiter, HostLimiterConfig};

/// Queue ordering: score first, FIFO among equal scores.
#[derive(Debug, Clone, Copy)]
struct Rank {
    priority: f64,
    order: u64,
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.priority.to_bits() == other.priority.to_bits() && self.order == other.order
    }
}

impl Eq for Rank {}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            // Earlier enqueue wins ties (greater rank pops first).
            .then_with(|| other.order.cmp(&self.order))
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct UrlKey(String);

/// Result of asking the frontier for work.
#[derive(Debug)]
pub enum Pull {
    /// Highest-priority item whose host admits work right now.
    Item(QueueItem),
    /// Work exists but every candidate host is gated. Sleep until then —
    /// `None` when the gate has no known expiry (in-flight caps).
    Wait { until: Option<Instant> },
    /// Nothing queued.
    Empty,
}

struct FrontierInner {
    queue: PriorityQueue<UrlKey, Rank>,
    items: HashMap<String, QueueItem>,
    seen: HashSet<String>,
    next_order: u64,
    max_size: Option<usize>,
}

/// Score-ordered set of pending work with exact URL deduplication. One
/// mutex guards the ordered set and the dedup index together so the
/// at-most-once-enqueue invariant holds under concurrent workers.
pub struct Frontier {
    inner: Mutex<FrontierInner>,
}

impl Frontier {
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(FrontierInner {
                queue: PriorityQueue::new(),
                items: HashMap::new(),
                seen: HashSet::new(),
                next_order: 0,
                max_size,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an item. Returns false without touching the queue when the URL
    /// was already accepted once and the item does not allow revisits.
    pub fn enqueue(&self, item: QueueItem) -> bool {
        let mut inner = self.lock();
        if inner.seen.contains(&item.url) && !item.allow_revisit {
            return false;
        }
        inner.seen.insert(item.url.clone());

        let rank = Rank {
            priority: item.priority,
            order: inner.next_order,
        };
        inner.next_order += 1;
        let key = UrlKey(item.url.clone());
        inner.items.insert(item.url.clone(), item);
        inner.queue.push(key, rank);

        if let Some(cap) = inner.max_size {
            while inner.queue.len() > cap {
                let lowest = inner
                    .queue
                    .iter()
                    .min_by(|a, b| a.1.cmp(b.1))
                    .map(|(key, _)| key.clone());
                match lowest {
                    Some(key) => {
                        inner.queue.remove(&key);
                        inner.items.remove(&key.0);
                        debug!(url = %key.0, "queue over cap, pruned lowest-priority item");
                    }
                    None => break,
                }
            }
        }
        true
    }

    /// Pop the best item whose host is admissible at `now`. Gated items go
    /// straight back with their original rank; the earliest known gate
    /// expiry over them comes back as the wake-up hint.
    pub fn pull(&self, now: Instant, limiter: &HostLimiter) -> Pull {
        let mut inner = self.lock();
        if inner.queue.is_empty() {
            return Pull::Empty;
        }

        let mut skipped: Vec<(UrlKey, Rank)> = Vec::new();
        let mut wake: Option<Instant> = None;
        let mut picked: Option<QueueItem> = None;

        while let Some((key, rank)) = inner.queue.pop() {
            let Some(item) = inner.items.get(&key.0) else {
                continue;
            };
            if limiter.admissible(&item.host, now) {
                limiter.on_dequeue(&item.host, now);
                picked = inner.items.remove(&key.0);
                break;
            }
            if let Some(until) = limiter.earliest_admissible(&item.host, now) {
                wake = Some(wake.map_or(until, |w: Instant| w.min(until)));
            }
            skipped.push((key, rank));
        }

        for (key, rank) in skipped {
            inner.queue.push(key, rank);
        }

        match picked {
            Some(item) => Pull::Item(item),
            None => Pull::Wait { until: wake },
        }
    }

    pub fn size(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn peek(&self) -> Option<QueueItem> {
        let inner = self.lock();
        inner
            .queue
            .peek()
            .and_then(|(key, _)| inner.items.get(&key.0).cloned())
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.queue.clear();
        inner.items.clear();
    }

    /// Whether a URL has ever been accepted (still queued or long gone).
    pub fn is_seen(&self, url: &str) -> bool {
        self.lock().seen.contains(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsreel_core::config::{CrawlConfig, HostBackoffConfig};
    use newsreel_core::QueueItemKind;
    use std::collections::HashMap as StdHashMap;
    use std::time::Duration;

    fn item(url: &str, host: &str, priority: f64) -> QueueItem {
        QueueItem {
            url: url.to_string(),
            host: host.to_string(),
            depth: 0,
            kind: QueueItemKind::Seed,
            priority,
            discovery_method: None,
            referrer: None,
            attempt: 0,
            allow_revisit: false,
        }
    }

    fn open_limiter() -> HostLimiter {
        HostLimiter::new(HostLimiterConfig {
            min_interval: Duration::from_millis(0),
            interval_overrides: StdHashMap::new(),
            host_concurrency: 100,
            backoff: HostBackoffConfig::default(),
        })
    }

    fn limiter_from(cfg: &CrawlConfig) -> HostLimiter {
        HostLimiter::new(HostLimiterConfig::from_crawl_config(cfg))
    }

    #[test]
    fn test_enqueue_dedup_at_most_once() {
        let frontier = Frontier::new(None);
        assert!(frontier.enqueue(item("http://a/1", "a", 1.0)));
        assert!(!frontier.enqueue(item("http://a/1", "a", 2.0)));
        assert_eq!(frontier.size(), 1);

        // Still rejected after the item has been pulled.
        let limiter = open_limiter();
        assert!(matches!(frontier.pull(Instant::now(), &limiter), Pull::Item(_)));
        assert!(!frontier.enqueue(item("http://a/1", "a", 3.0)));
        assert_eq!(frontier.size(), 0);
    }

    #[test]
    fn test_allow_revisit_bypasses_dedup() {
        let frontier = Frontier::new(None);
        assert!(frontier.enqueue(item("http://a/1", "a", 1.0)));
        let limiter = open_limiter();
        assert!(matches!(frontier.pull(Instant::now(), &limiter), Pull::Item(_)));

        let mut revisit = item("http://a/1", "a", 1.0);
        revisit.allow_revisit = true;
        assert!(frontier.enqueue(revisit));
        assert_eq!(frontier.size(), 1);
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let frontier = Frontier::new(None);
        frontier.enqueue(item("http://a/low", "a", 0.1));
        frontier.enqueue(item("http://a/first", "a", 0.5));
        frontier.enqueue(item("http://a/second", "a", 0.5));
        frontier.enqueue(item("http://a/high", "a", 0.9));

        let limiter = open_limiter();
        let mut order = Vec::new();
        while let Pull::Item(it) = frontier.pull(Instant::now(), &limiter) {
            order.push(it.url);
        }
        assert_eq!(
            order,
            vec!["http://a/high", "http://a/first", "http://a/second", "http://a/low"]
        );
    }

    #[test]
    fn test_pull_skips_gated_host_and_reports_wake() {
        let mut cfg = CrawlConfig::default();
        cfg.per_host_min_interval_ms = 60_000;
        cfg.per_host_concurrency = 1;
        let limiter = limiter_from(&cfg);

        let frontier = Frontier::new(None);
        frontier.enqueue(item("http://slow/1", "slow", 0.9));
        frontier.enqueue(item("http://slow/2", "slow", 0.8));
        frontier.enqueue(item("http://fast/1", "fast", 0.1));

        let now = Instant::now();
        // Best item is slow/1; slow becomes gated after this dequeue.
        let Pull::Item(first) = frontier.pull(now, &limiter) else {
            panic!("expected an item");
        };
        assert_eq!(first.url, "http://slow/1");

        // slow/2 outranks fast/1, but its host is gated: fast/1 comes out.
        let Pull::Item(second) = frontier.pull(now, &limiter) else {
            panic!("expected an item");
        };
        assert_eq!(second.url, "http://fast/1");

        // Only slow/2 remains; the pull reports when to come back.
        match frontier.pull(now, &limiter) {
            Pull::Wait { until: Some(until) } => {
                assert!(until >= now + Duration::from_secs(59));
            }
            other => panic!("expected Wait, got {other:?}"),
        }
        assert_eq!(frontier.size(), 1);
    }

    #[test]
    fn test_cap_prunes_lowest_priority() {
        let frontier = Frontier::new(Some(2));
        frontier.enqueue(item("http://a/1", "a", 0.5));
        frontier.enqueue(item("http://a/2", "a", 0.9));
        frontier.enqueue(item("http://a/3", "a", 0.7));
        assert_eq!(frontier.size(), 2);

        let limiter = open_limiter();
        let mut urls = Vec::new();
        while let Pull::Item(it) = frontier.pull(Instant::now(), &limiter) {
            urls.push(it.url);
        }
        assert_eq!(urls, vec!["http://a/2", "http://a/3"]);
    }

    #[test]
    fn test_empty_pull() {
        let frontier = Frontier::new(None);
        assert!(matches!(frontier.pull(Instant::now(), &open_limiter()), Pull::Empty));
    }
}
