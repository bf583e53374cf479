use std::sync::Arc;

use tokio::sync::watch;

use newsreel_core::events::{CrawlEvent, EventPayload};
use newsreel_telemetry::{EventWriter, TelemetryBus};

/// What the job should be doing, as requested by the owner. Workers read
/// this between steps and at every suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Running,
    Paused,
    Stopping,
    Aborting,
}

/// Cloneable control surface for a running crawl.
#[derive(Clone)]
pub struct CrawlHandle {
    desired: Arc<watch::Sender<DesiredState>>,
    bus: TelemetryBus,
    writer: Arc<EventWriter>,
    job_id: String,
}

impl CrawlHandle {
    pub(crate) fn new(
        desired: Arc<watch::Sender<DesiredState>>,
        bus: TelemetryBus,
        writer: Arc<EventWriter>,
        job_id: String,
    ) -> Self {
        Self {
            desired,
            bus,
            writer,
            job_id,
        }
    }

    fn transition(&self, to: DesiredState, from: &[DesiredState]) -> bool {
        self.desired.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    async fn emit(&self, payload: EventPayload) {
        let event = CrawlEvent::now(&self.job_id, payload);
        self.bus.publish(event.clone());
        self.writer.write_event(&event).await;
    }

    pub async fn pause(&self) {
        if self.transition(DesiredState::Paused, &[DesiredState::Running]) {
            self.emit(EventPayload::CrawlPause).await;
        }
    }

    pub async fn resume(&self) {
        if self.transition(DesiredState::Running, &[DesiredState::Paused]) {
            self.emit(EventPayload::CrawlResume).await;
        }
    }

    /// Request a graceful stop: in-flight work drains, nothing new starts.
    pub async fn stop(&self) {
        if self.transition(
            DesiredState::Stopping,
            &[DesiredState::Running, DesiredState::Paused],
        ) {
            self.emit(EventPayload::Other {
                event_type: "crawl:stop".to_string(),
                data: serde_json::json!({}),
            })
            .await;
        }
    }

    /// Like stop, but cancels in-flight fetches. Completed writes still
    /// flush.
    pub async fn abort(&self) {
        self.transition(
            DesiredState::Aborting,
            &[
                DesiredState::Running,
                DesiredState::Paused,
                DesiredState::Stopping,
            ],
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn current(&self) -> DesiredState {
        *self.desired.borrow()
    }
}
