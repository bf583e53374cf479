//! Category and severity inference for event types that arrive without
//! explicit metadata.

/// Known event types. Categories: lifecycle, work, metric, control, error.
const EXACT: &[(&str, &str, &str)] = &[
    ("crawl:start", "lifecycle", "info"),
    ("crawl:end", "lifecycle", "info"),
    ("crawl:pause", "control", "info"),
    ("crawl:resume", "control", "info"),
    ("crawl:stop", "control", "info"),
    ("goal:reached", "lifecycle", "info"),
    ("progress", "metric", "info"),
    ("url:dequeued", "work", "info"),
    ("url:fetched", "work", "info"),
    ("url:saved", "work", "info"),
    ("url:enqueued", "work", "info"),
    ("links:discovered", "work", "info"),
    ("url:error", "error", "warn"),
    ("parse:error", "error", "warn"),
    ("rate:limit", "control", "warn"),
    ("error", "error", "error"),
];

fn exact(event_type: &str) -> Option<(&'static str, &'static str)> {
    EXACT
        .iter()
        .find(|(name, _, _)| *name == event_type)
        .map(|(_, cat, sev)| (*cat, *sev))
}

/// Resolve `(category, severity)` for an event type: exact match first,
/// then progressively shorter `:`-suffixes, then keywords, then work/info.
pub fn infer(event_type: &str) -> (&'static str, &'static str) {
    if let Some(hit) = exact(event_type) {
        return hit;
    }

    let segments: Vec<&str> = event_type.split(':').collect();
    for start in 1..segments.len() {
        let suffix = segments[start..].join(":");
        if let Some(hit) = exact(&suffix) {
            return hit;
        }
    }

    let lower = event_type.to_ascii_lowercase();
    if lower.contains("error") || lower.contains("fail") {
        return ("error", "error");
    }
    if lower.contains("warn") || lower.contains("problem") {
        return ("error", "warn");
    }
    if lower.contains("start") || lower.contains("end") || lower.contains("complete") {
        return ("lifecycle", "info");
    }
    if lower.contains("metric") || lower.contains("progress") || lower.contains("rate") {
        return ("metric", "info");
    }

    ("work", "info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_matches() {
        assert_eq!(infer("crawl:start"), ("lifecycle", "info"));
        assert_eq!(infer("url:error"), ("error", "warn"));
        assert_eq!(infer("rate:limit"), ("control", "warn"));
        assert_eq!(infer("error"), ("error", "error"));
    }

    #[test]
    fn test_suffix_scan() {
        // The trailing segments resolve through the table.
        assert_eq!(infer("worker:url:fetched"), ("work", "info"));
        assert_eq!(infer("browser:rate:limit"), ("control", "warn"));
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(infer("db:write:failure"), ("error", "error"));
        assert_eq!(infer("slow:host:warning"), ("error", "warn"));
        assert_eq!(infer("stage:complete"), ("lifecycle", "info"));
        assert_eq!(infer("throughput:metric"), ("metric", "info"));
    }

    #[test]
    fn test_final_fallback() {
        assert_eq!(infer("something:opaque"), ("work", "info"));
    }
}
