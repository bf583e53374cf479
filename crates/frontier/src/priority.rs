use newsreel_core::config::PriorityConfig;
use newsreel_core::QueueItemKind;

/// Base score for a queue item before depth decay. Policy values, not
/// hard-coded magic: seeds first, then article-looking links, then nav.
fn base_for(kind: QueueItemKind) -> f64 {
    match kind {
        QueueItemKind::Seed => 1.0,
        QueueItemKind::HubSeed => 0.9,
        QueueItemKind::Article => 0.8,
        QueueItemKind::Nav => 0.5,
        QueueItemKind::Other => 0.3,
    }
}

/// Enqueue-time priority. Never recomputed for items already queued.
///
/// `priority = base + bonus + w.discovery * base + w.gap * gap + w.cluster * cluster`
/// where `base` is depth-decayed and the bonus comes from the discovery
/// method table (unknown methods contribute 0). Gap and cluster terms are
/// gated behind their feature flags.
pub fn score(
    cfg: &PriorityConfig,
    kind: QueueItemKind,
    depth: u32,
    discovery_method: Option<&str>,
    gap_score: f64,
    cluster_boost: f64,
) -> f64 {
    let base = base_for(kind) / (depth as f64 + 1.0);
    let bonus = discovery_method
        .and_then(|m| cfg.bonuses.get(m))
        .copied()
        .unwrap_or(0.0);

    let mut priority = base + bonus + cfg.weights.discovery * base;
    if cfg.features.gap_prediction {
        priority += cfg.weights.gap * gap_score;
    }
    if cfg.features.clustering {
        priority += cfg.weights.cluster * cluster_boost;
    }
    priority
}
