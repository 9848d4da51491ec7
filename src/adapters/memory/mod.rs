//! In-memory adapters for the history store and live world state.

mod history_store;
mod world_state;

pub use history_store::InMemoryHistoryStore;
pub use world_state::SharedWorldState;
