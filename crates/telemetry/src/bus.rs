use tokio::sync::broadcast;

use newsreel_core::events::CrawlEvent;

/// In-process publish/subscribe for crawl events. Publishing never blocks;
/// slow subscribers lag and lose the oldest events, never the producer.
///
/// Durable logging does not go through here: the orchestrator hands every
/// event to the `EventWriter` itself, so the bus carries only live
/// observers (protocol printers, tests, UIs).
#[derive(Clone)]
pub struct TelemetryBus {
    tx: broadcast::Sender<CrawlEvent>,
}

impl TelemetryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self { tx }
    }

    pub fn publish(&self, event: CrawlEvent) {
        // No subscribers is fine; the event just evaporates.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.tx.subscribe()
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsreel_core::events::EventPayload;

    #[tokio::test]
    async fn test_subscribers_see_events_in_order() {
        let bus = TelemetryBus::default();
        let mut rx = bus.subscribe();
        bus.publish(CrawlEvent::now("job-b", EventPayload::CrawlPause));
        bus.publish(CrawlEvent::now("job-b", EventPayload::CrawlResume));
        assert_eq!(rx.recv().await.unwrap().payload.event_type(), "crawl:pause");
        assert_eq!(rx.recv().await.unwrap().payload.event_type(), "crawl:resume");
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = TelemetryBus::default();
        bus.publish(CrawlEvent::now("job-b", EventPayload::CrawlPause));
        let mut rx = bus.subscribe();
        bus.publish(CrawlEvent::now("job-b", EventPayload::CrawlResume));
        assert_eq!(rx.recv().await.unwrap().payload.event_type(), "crawl:resume");
    }

    #[test]
    fn test_publish_without_subscribers_is_a_no_op() {
        let bus = TelemetryBus::new(16);
        bus.publish(CrawlEvent::now("job-b", EventPayload::CrawlPause));
    }
}
