//! Port trait definitions (Hexagonal Architecture)
//!
//! - DomainTaskHandler: analysis work for one domain
//! - HistoryStore: persisted costs and the task episode log
//! - EventPublisher: fire-and-forget event emission
//! - StateSource: live world state for plan execution

pub mod event_publisher;
pub mod history_store;
pub mod state_source;
pub mod task_handler;

pub use event_publisher::EventPublisher;
pub use history_store::{EpisodeRecord, HistoryStore};
pub use state_source::StateSource;
pub use task_handler::DomainTaskHandler;
