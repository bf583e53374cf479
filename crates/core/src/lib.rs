pub mod config;
pub mod error;
pub mod events;
pub mod types;
pub mod urlnorm;

pub use config::CrawlConfig;
pub use error::{CrawlError, ParseError};
pub use events::{CrawlEvent, EventPayload, Outcome};
pub use types::*;
