mod bus;
mod event_writer;
mod infer;

pub use bus::TelemetryBus;
pub use event_writer::{
    EventFilters, EventWriter, TaskEventRow, TaskListEntry, TaskSummary, WriteRequest,
};
