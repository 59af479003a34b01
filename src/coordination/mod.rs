//! Client interface to a hierarchical, watch-capable coordination service
//!
//! The service stores a tree of named nodes, each holding a byte payload. It
//! supports atomic create/read/delete, server-assigned sequence suffixes on
//! creation, and one-shot watches on a node's children.

pub mod error;
pub mod memory;
pub mod path;

pub use error::CoordinationError;
pub use memory::{MemoryServer, MemorySession};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

/// How a node is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// The node is created at exactly the requested path
    Persistent,
    /// The service appends the parent's next sequence number to the requested path
    PersistentSequential,
}

impl CreateMode {
    pub fn is_sequential(&self) -> bool {
        matches!(self, CreateMode::PersistentSequential)
    }
}

/// Event delivered to a one-shot children watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchedEvent {
    /// A child was added to or removed from the watched node
    NodeChildrenChanged { path: String },
    /// The watched node itself was deleted
    NodeDeleted { path: String },
}

/// Sending half of a children watch, held by the service until it fires
pub type WatchSender = oneshot::Sender<Result<WatchedEvent, CoordinationError>>;

/// A registered one-shot children watch
#[derive(Debug)]
pub struct ChildWatch {
    path: String,
    receiver: oneshot::Receiver<Result<WatchedEvent, CoordinationError>>,
}

impl ChildWatch {
    /// Create a watch for `path` together with the sender that fires it
    pub fn channel(path: &str) -> (WatchSender, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                path: path.to_string(),
                receiver: rx,
            },
        )
    }

    /// Path of the watched node
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the watch to fire.
    ///
    /// Fails with a connection error if the session is lost before the event
    /// arrives; a watch whose sender vanished is reported as `ConnectionLoss`.
    pub async fn fired(self) -> Result<WatchedEvent, CoordinationError> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(CoordinationError::ConnectionLoss),
        }
    }
}

/// Operations a queue needs from a coordination service session
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Create a node and return its actual path.
    ///
    /// Fails with `NoNode` when the parent is missing and `NodeExists` when a
    /// persistent node already exists at `path`.
    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> Result<String, CoordinationError>;

    /// Names of the node's children, in no particular order
    async fn get_children(&self, path: &str) -> Result<Vec<String>, CoordinationError>;

    /// Payload of the node
    async fn get_data(&self, path: &str) -> Result<Bytes, CoordinationError>;

    /// Delete a node. At most one concurrent delete of the same node succeeds;
    /// the rest fail with `NoNode`.
    async fn delete(&self, path: &str) -> Result<(), CoordinationError>;

    /// Whether the node exists
    async fn exists(&self, path: &str) -> Result<bool, CoordinationError>;

    /// Register a one-shot watch on the node's children
    async fn watch_children(&self, path: &str) -> Result<ChildWatch, CoordinationError>;
}
