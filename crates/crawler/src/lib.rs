mod control;
mod orchestrator;
mod worker;

pub use control::{CrawlHandle, DesiredState};
pub use orchestrator::{CrawlReport, Orchestrator};
