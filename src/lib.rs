pub mod cli;
pub mod config;
pub mod coordination;
pub mod queue;

// Public API
pub use coordination::{
    ChildWatch, CoordinationError, Coordinator, CreateMode, MemoryServer, MemorySession,
    WatchedEvent,
};
pub use queue::{DistributedQueue, QueueError, ELEMENT_PREFIX};
