//! Distributed FIFO queue over a coordination service
//!
//! Each element is a sequential child node of the queue directory, named
//! `qn-` followed by the server-assigned sequence number. FIFO order is the
//! ascending sequence order. Consumers claim an element by deleting its node;
//! the service lets at most one delete of a node succeed, so every element is
//! handed to exactly one consumer without any client-side locking.

pub mod error;
mod take;

pub use error::QueueError;

use crate::coordination::{path, CoordinationError, Coordinator, CreateMode};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

/// Name prefix of element nodes
pub const ELEMENT_PREFIX: &str = "qn-";

/// A handle to the queue stored under one directory.
///
/// Any number of handles, in any number of processes, may share a directory.
/// The handle keeps no state between calls beyond its session.
pub struct DistributedQueue<C: Coordinator> {
    coordinator: Arc<C>,
    dir: String,
}

impl<C: Coordinator> Clone for DistributedQueue<C> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            dir: self.dir.clone(),
        }
    }
}

impl<C: Coordinator> DistributedQueue<C> {
    /// Create a handle for the queue at `dir`. The directory itself is created
    /// lazily by the first operation that needs it.
    pub fn new(coordinator: Arc<C>, dir: &str) -> Result<Self, QueueError> {
        path::validate(dir)?;
        Ok(Self {
            coordinator,
            dir: dir.to_string(),
        })
    }

    /// Path of the queue directory
    pub fn directory(&self) -> &str {
        &self.dir
    }

    /// Append an element to the tail of the queue
    pub async fn offer(&self, data: impl Into<Bytes>) -> Result<(), QueueError> {
        let data = data.into();
        let base = path::join(&self.dir, ELEMENT_PREFIX);

        let created = match self
            .coordinator
            .create(&base, data.clone(), CreateMode::PersistentSequential)
            .await
        {
            Ok(created) => created,
            Err(CoordinationError::NoNode(_)) => {
                self.ensure_directory().await?;
                self.coordinator
                    .create(&base, data, CreateMode::PersistentSequential)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Offered element {}", created);
        Ok(())
    }

    /// Remove and return the head of the queue.
    ///
    /// Fails with `QueueError::NoSuchElement` if the queue is empty.
    pub async fn remove(&self) -> Result<Bytes, QueueError> {
        self.claim_head().await?.ok_or(QueueError::NoSuchElement)
    }

    /// Remove and return the head of the queue, or `None` if it is empty
    pub async fn poll(&self) -> Result<Option<Bytes>, QueueError> {
        self.claim_head().await
    }

    /// Return the head of the queue without removing it.
    ///
    /// Fails with `QueueError::NoSuchElement` if the queue is empty. The
    /// element may be claimed by another consumer right after it is read.
    pub async fn element(&self) -> Result<Bytes, QueueError> {
        self.read_head().await?.ok_or(QueueError::NoSuchElement)
    }

    /// Return the head of the queue without removing it, or `None` if it is empty
    pub async fn peek(&self) -> Result<Option<Bytes>, QueueError> {
        self.read_head().await
    }

    /// Number of elements currently in the queue. Advisory only.
    pub async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.ordered_children().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Element names with their sequence numbers, ascending.
    ///
    /// Children that do not follow the element naming convention are skipped.
    /// A missing directory reads as empty and is left missing.
    pub async fn ordered_children(&self) -> Result<Vec<(u64, String)>, QueueError> {
        match self.coordinator.get_children(&self.dir).await {
            Ok(children) => Ok(self.sort_elements(children)),
            Err(CoordinationError::NoNode(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Listing for remove, element and take, which create the directory on
    /// first use
    async fn snapshot(&self) -> Result<Vec<(u64, String)>, QueueError> {
        match self.coordinator.get_children(&self.dir).await {
            Ok(children) => Ok(self.sort_elements(children)),
            Err(CoordinationError::NoNode(_)) => {
                self.ensure_directory().await?;
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn sort_elements(&self, children: Vec<String>) -> Vec<(u64, String)> {
        let mut ordered: Vec<(u64, String)> = children
            .into_iter()
            .filter_map(|name| match path::parse_sequence(&name, ELEMENT_PREFIX) {
                Some(sequence) => Some((sequence, name)),
                None => {
                    debug!("Ignoring foreign node {} in {}", name, self.dir);
                    None
                }
            })
            .collect();
        ordered.sort_unstable_by_key(|(sequence, _)| *sequence);
        ordered
    }

    /// Claim protocol: walk the snapshot in order, reading then deleting each
    /// candidate until one delete succeeds. Candidates that vanish were taken
    /// by someone else. Re-list only once the whole snapshot is exhausted.
    async fn claim_head(&self) -> Result<Option<Bytes>, QueueError> {
        loop {
            let snapshot = self.snapshot().await?;
            if snapshot.is_empty() {
                return Ok(None);
            }

            for (sequence, name) in snapshot {
                let node = path::join(&self.dir, &name);

                let data = match self.coordinator.get_data(&node).await {
                    Ok(data) => data,
                    Err(CoordinationError::NoNode(_)) => {
                        debug!("Element {} vanished before read, advancing", sequence);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };

                match self.coordinator.delete(&node).await {
                    Ok(()) => {
                        debug!("Claimed element {} from {}", sequence, self.dir);
                        return Ok(Some(data));
                    }
                    Err(CoordinationError::NoNode(_)) => {
                        debug!("Element {} claimed by another consumer, advancing", sequence);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            debug!("Every candidate in {} was claimed elsewhere, re-listing", self.dir);
        }
    }

    async fn read_head(&self) -> Result<Option<Bytes>, QueueError> {
        loop {
            let snapshot = self.snapshot().await?;
            if snapshot.is_empty() {
                return Ok(None);
            }

            for (sequence, name) in snapshot {
                match self.coordinator.get_data(&path::join(&self.dir, &name)).await {
                    Ok(data) => return Ok(Some(data)),
                    Err(CoordinationError::NoNode(_)) => {
                        debug!("Head element {} vanished, trying next", sequence);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    /// Create the queue directory and any missing ancestors. Nodes created
    /// concurrently by other handles are fine.
    async fn ensure_directory(&self) -> Result<(), QueueError> {
        for dir in path::ancestors(&self.dir) {
            match self
                .coordinator
                .create(dir, Bytes::new(), CreateMode::Persistent)
                .await
            {
                Ok(_) => info!("Created queue directory node {}", dir),
                Err(CoordinationError::NodeExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{ChildWatch, MemoryServer, MemorySession};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Barrier, Mutex};

    /// Wraps a session and lets a second session delete chosen nodes just
    /// before this one reads or deletes them, or create the queue directory
    /// right after this one finds it missing.
    struct RacingCoordinator {
        inner: MemorySession,
        rival: MemorySession,
        steal_on_read: Mutex<HashSet<String>>,
        steal_on_delete: Mutex<HashSet<String>>,
        rival_bootstrap: Mutex<Option<String>>,
        listings: AtomicUsize,
        node_exists: AtomicUsize,
    }

    impl RacingCoordinator {
        fn new(server: &MemoryServer) -> Self {
            Self {
                inner: server.connect(),
                rival: server.connect(),
                steal_on_read: Mutex::new(HashSet::new()),
                steal_on_delete: Mutex::new(HashSet::new()),
                rival_bootstrap: Mutex::new(None),
                listings: AtomicUsize::new(0),
                node_exists: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Coordinator for RacingCoordinator {
        async fn create(
            &self,
            path: &str,
            data: Bytes,
            mode: CreateMode,
        ) -> Result<String, CoordinationError> {
            let result = self.inner.create(path, data, mode).await;
            match &result {
                Err(CoordinationError::NoNode(_)) => {
                    if let Some(dir) = self.rival_bootstrap.lock().await.take() {
                        self.rival
                            .create(&dir, Bytes::new(), CreateMode::Persistent)
                            .await?;
                    }
                }
                Err(CoordinationError::NodeExists(_)) => {
                    self.node_exists.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
            result
        }

        async fn get_children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            self.inner.get_children(path).await
        }

        async fn get_data(&self, path: &str) -> Result<Bytes, CoordinationError> {
            if self.steal_on_read.lock().await.remove(path) {
                self.rival.delete(path).await?;
            }
            self.inner.get_data(path).await
        }

        async fn delete(&self, path: &str) -> Result<(), CoordinationError> {
            if self.steal_on_delete.lock().await.remove(path) {
                self.rival.delete(path).await?;
            }
            self.inner.delete(path).await
        }

        async fn exists(&self, path: &str) -> Result<bool, CoordinationError> {
            self.inner.exists(path).await
        }

        async fn watch_children(&self, path: &str) -> Result<ChildWatch, CoordinationError> {
            self.inner.watch_children(path).await
        }
    }

    fn element_path(dir: &str, sequence: u64) -> String {
        path::sequential_name(&path::join(dir, ELEMENT_PREFIX), sequence)
    }

    #[tokio::test]
    async fn test_new_rejects_relative_directory() {
        let session = Arc::new(MemoryServer::new().connect());
        let result = DistributedQueue::new(session, "queue");
        assert!(matches!(result, Err(QueueError::InvalidPath { .. })));
    }

    #[tokio::test]
    async fn test_offer_creates_nested_directory() {
        let session = Arc::new(MemoryServer::new().connect());
        let queue = DistributedQueue::new(session.clone(), "/app/jobs/queue").unwrap();

        queue.offer("first").await.unwrap();

        assert!(session.exists("/app/jobs").await.unwrap());
        assert_eq!(queue.len().await.unwrap(), 1);
        assert_eq!(queue.remove().await.unwrap(), Bytes::from("first"));
    }

    #[tokio::test]
    async fn test_listing_leaves_missing_directory_alone() {
        let session = Arc::new(MemoryServer::new().connect());
        let queue = DistributedQueue::new(session.clone(), "/lazy").unwrap();

        assert!(queue.ordered_children().await.unwrap().is_empty());
        assert_eq!(queue.len().await.unwrap(), 0);
        assert!(queue.is_empty().await.unwrap());
        assert!(!session.exists("/lazy").await.unwrap());
    }

    #[tokio::test]
    async fn test_consuming_operations_create_missing_directory() {
        let server = MemoryServer::new();
        let observer = server.connect();

        let remover = DistributedQueue::new(Arc::new(server.connect()), "/lazy/remove").unwrap();
        assert_eq!(remover.remove().await, Err(QueueError::NoSuchElement));
        assert!(observer.exists("/lazy/remove").await.unwrap());

        let peeker = DistributedQueue::new(Arc::new(server.connect()), "/lazy/element").unwrap();
        assert_eq!(peeker.element().await, Err(QueueError::NoSuchElement));
        assert!(observer.exists("/lazy/element").await.unwrap());
    }

    #[tokio::test]
    async fn test_offer_tolerates_directory_created_concurrently() {
        let server = MemoryServer::new();
        let racing = Arc::new(RacingCoordinator::new(&server));
        *racing.rival_bootstrap.lock().await = Some("/bootstrap".to_string());
        let queue = DistributedQueue::new(racing.clone(), "/bootstrap").unwrap();

        queue.offer("first").await.unwrap();

        // The rival created the directory between our NoNode and our bootstrap
        assert_eq!(racing.node_exists.load(Ordering::SeqCst), 1);
        assert!(racing.rival_bootstrap.lock().await.is_none());
        assert_eq!(queue.remove().await.unwrap(), Bytes::from("first"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bootstrap() {
        let server = MemoryServer::new();
        let start = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();
        for i in 0..8 {
            let queue = DistributedQueue::new(Arc::new(server.connect()), "/race/q").unwrap();
            let start = start.clone();
            handles.push(tokio::spawn(async move {
                start.wait().await;
                queue.offer(format!("item{}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let queue = DistributedQueue::new(Arc::new(server.connect()), "/race/q").unwrap();
        assert_eq!(queue.len().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_ordered_children_sorts_numerically_and_skips_foreign() {
        let session = Arc::new(MemoryServer::new().connect());
        let queue = DistributedQueue::new(session.clone(), "/mixed").unwrap();
        for i in 0..12 {
            queue.offer(format!("{}", i)).await.unwrap();
        }
        session
            .create("/mixed/lock", Bytes::new(), CreateMode::Persistent)
            .await
            .unwrap();
        session
            .create("/mixed/qn-abc", Bytes::new(), CreateMode::Persistent)
            .await
            .unwrap();

        let ordered = queue.ordered_children().await.unwrap();
        assert_eq!(ordered.len(), 12);
        assert!(ordered.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert_eq!(queue.remove().await.unwrap(), Bytes::from("0"));
    }

    #[tokio::test]
    async fn test_remove_advances_within_snapshot_when_head_claimed() {
        let server = MemoryServer::new();
        let racing = Arc::new(RacingCoordinator::new(&server));
        let queue = DistributedQueue::new(racing.clone(), "/contended").unwrap();
        queue.offer("a").await.unwrap();
        queue.offer("b").await.unwrap();

        let head = queue.ordered_children().await.unwrap()[0].1.clone();
        racing
            .steal_on_delete
            .lock()
            .await
            .insert(path::join("/contended", &head));

        let before = racing.listings.load(Ordering::SeqCst);
        assert_eq!(queue.remove().await.unwrap(), Bytes::from("b"));
        assert_eq!(racing.listings.load(Ordering::SeqCst), before + 1);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_relists_when_snapshot_exhausted() {
        let server = MemoryServer::new();
        let racing = Arc::new(RacingCoordinator::new(&server));
        let queue = DistributedQueue::new(racing.clone(), "/exhausted").unwrap();
        queue.offer("a").await.unwrap();

        {
            let mut steal = racing.steal_on_read.lock().await;
            steal.insert(element_path("/exhausted", 0));
        }
        let before = racing.listings.load(Ordering::SeqCst);
        assert_eq!(queue.remove().await, Err(QueueError::NoSuchElement));
        assert_eq!(racing.listings.load(Ordering::SeqCst), before + 2);
    }

    #[tokio::test]
    async fn test_element_skips_vanished_head() {
        let server = MemoryServer::new();
        let racing = Arc::new(RacingCoordinator::new(&server));
        let queue = DistributedQueue::new(racing.clone(), "/peeked").unwrap();
        queue.offer("a").await.unwrap();
        queue.offer("b").await.unwrap();

        racing
            .steal_on_read
            .lock()
            .await
            .insert(element_path("/peeked", 0));
        assert_eq!(queue.element().await.unwrap(), Bytes::from("b"));
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_poll_and_peek_on_empty() {
        let session = Arc::new(MemoryServer::new().connect());
        let queue = DistributedQueue::new(session, "/empty").unwrap();
        assert_eq!(queue.poll().await.unwrap(), None);
        assert_eq!(queue.peek().await.unwrap(), None);

        queue.offer("x").await.unwrap();
        assert_eq!(queue.peek().await.unwrap(), Some(Bytes::from("x")));
        assert_eq!(queue.poll().await.unwrap(), Some(Bytes::from("x")));
        assert_eq!(queue.poll().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connection_errors_propagate() {
        let session = Arc::new(MemoryServer::new().connect());
        let queue = DistributedQueue::new(session.clone(), "/closed").unwrap();
        queue.offer("x").await.unwrap();

        session.close().await;
        assert_eq!(queue.offer("y").await, Err(QueueError::ConnectionLoss));
        assert_eq!(queue.remove().await, Err(QueueError::ConnectionLoss));
        assert_eq!(queue.element().await, Err(QueueError::ConnectionLoss));
    }
}
