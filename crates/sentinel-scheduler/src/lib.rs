//! Event queue: one worker drains change events in arrival order.

mod memory;
mod trait_;

pub use memory::{InMemoryEventQueue, MAX_FINISHED_JOBS};
pub use trait_::{EventQueue, QueueError};
