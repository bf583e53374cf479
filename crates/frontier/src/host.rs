use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use newsreel_core::config::{CrawlConfig, HostBackoffConfig};

/// Pacing and failure state for one host.
#[derive(Debug)]
struct HostState {
    next_admissible_at: Instant,
    in_flight: usize,
    recent_errors: VecDeque<Instant>,
    backoff_until: Option<Instant>,
    rate_limited: bool,
    backoff_level: u32,
}

impl HostState {
    fn new(now: Instant) -> Self {
        Self {
            next_admissible_at: now,
            in_flight: 0,
            recent_errors: VecDeque::new(),
            backoff_until: None,
            rate_limited: false,
            backoff_level: 0,
        }
    }

    fn gate(&self) -> Option<Instant> {
        match self.backoff_until {
            Some(until) if until > self.next_admissible_at => Some(until),
            _ => Some(self.next_admissible_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostLimiterConfig {
    pub min_interval: Duration,
    pub interval_overrides: HashMap<String, Duration>,
    pub host_concurrency: usize,
    pub backoff: HostBackoffConfig,
}

impl HostLimiterConfig {
    pub fn from_crawl_config(cfg: &CrawlConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(cfg.per_host_min_interval_ms),
            interval_overrides: cfg
                .per_host_interval_overrides
                .iter()
                .map(|(host, ms)| (host.clone(), Duration::from_millis(*ms)))
                .collect(),
            host_concurrency: cfg.per_host_concurrency.max(1),
            backoff: cfg.backoff.clone(),
        }
    }

    fn interval_for(&self, host: &str) -> Duration {
        self.interval_overrides
            .get(host)
            .copied()
            .unwrap_or(self.min_interval)
    }
}

/// Per-host pacing: earliest admissible time, in-flight cap, rate-limit
/// and repeated-failure backoff. All state lives behind a concurrent map;
/// each operation touches exactly one host entry.
pub struct HostLimiter {
    cfg: HostLimiterConfig,
    hosts: DashMap<String, HostState>,
}

impl HostLimiter {
    pub fn new(cfg: HostLimiterConfig) -> Self {
        Self {
            cfg,
            hosts: DashMap::new(),
        }
    }

    /// A host admits work when the pacing gate and any backoff have both
    /// passed and it is under its concurrency cap.
    pub fn admissible(&self, host: &str, now: Instant) -> bool {
        match self.hosts.get(host) {
            None => true,
            Some(state) => {
                let gate = state.gate().unwrap_or(now);
                now >= gate && state.in_flight < self.cfg.host_concurrency
            }
        }
    }

    /// When the host next becomes admissible, if that moment is known.
    /// None when the host is gated only by in-flight work.
    pub fn earliest_admissible(&self, host: &str, now: Instant) -> Option<Instant> {
        let state = self.hosts.get(host)?;
        match state.gate() {
            Some(gate) if gate > now => Some(gate),
            _ => None,
        }
    }

    /// Claim a slot: advance the pacing gate and count the request.
    pub fn on_dequeue(&self, host: &str, now: Instant) {
        let mut state = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(now));
        state.next_admissible_at = state.next_admissible_at.max(now) + self.cfg.interval_for(host);
        state.in_flight += 1;
    }

    pub fn on_complete(&self, host: &str) {
        if let Some(mut state) = self.hosts.get_mut(host) {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }

    /// A success clears rate-limit status and the error window.
    pub fn on_success(&self, host: &str, now: Instant) {
        if let Some(mut state) = self.hosts.get_mut(host) {
            state.rate_limited = false;
            state.recent_errors.clear();
            state.backoff_level = 0;
            if state.backoff_until.map(|until| until <= now).unwrap_or(false) {
                state.backoff_until = None;
            }
        }
    }

    /// HTTP 429 or an explicit Retry-After: hold the host off until the
    /// server says it is willing again.
    pub fn on_rate_limited(&self, host: &str, retry_after: Duration, now: Instant) {
        let mut state = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(now));
        let until = now + retry_after;
        state.backoff_until = Some(state.backoff_until.map_or(until, |b| b.max(until)));
        state.rate_limited = true;
        debug!(host, retry_after_ms = retry_after.as_millis() as u64, "host rate limited");
    }

    /// Record a network failure. Enough failures inside the sliding window
    /// push the host into exponential backoff, capped at the ceiling.
    pub fn on_network_error(&self, host: &str, now: Instant) {
        let window = Duration::from_millis(self.cfg.backoff.error_window_ms);
        let mut state = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(now));
        state.recent_errors.push_back(now);
        while let Some(front) = state.recent_errors.front() {
            if now.duration_since(*front) > window {
                state.recent_errors.pop_front();
            } else {
                break;
            }
        }
        if state.recent_errors.len() >= self.cfg.backoff.error_threshold {
            let exp = self
                .cfg
                .backoff
                .initial_ms
                .saturating_mul(1u64 << state.backoff_level.min(16));
            let delay = Duration::from_millis(exp.min(self.cfg.backoff.ceiling_ms));
            state.backoff_until = Some(now + delay);
            state.backoff_level += 1;
            debug!(host, delay_ms = delay.as_millis() as u64, "host in failure backoff");
        }
    }

    pub fn is_rate_limited(&self, host: &str) -> bool {
        self.hosts.get(host).map(|s| s.rate_limited).unwrap_or(false)
    }

    pub fn in_flight(&self, host: &str) -> usize {
        self.hosts.get(host).map(|s| s.in_flight).unwrap_or(0)
    }

    /// Latest pending backoff expiry across all hosts. Not a completion
    /// gate: URLs gated by a backoff stay in the queue, so an empty queue
    /// cannot be revived by an expiry. Callers use this to report that a
    /// crawl is finishing while hosts are still backing off.
    pub fn pending_backoff_until(&self, now: Instant) -> Option<Instant> {
        self.hosts
            .iter()
            .filter_map(|entry| entry.backoff_until.filter(|until| *until > now))
            .max()
    }
}
