//! In-process coordination service
//!
//! `MemoryServer` keeps the whole node tree behind a single lock, which makes
//! every operation linearizable. Each `MemorySession` behaves like a client
//! connection: it can be closed or expired, after which all of its calls and
//! pending watches fail with the matching connection error.

use super::path;
use super::{ChildWatch, CoordinationError, Coordinator, CreateMode, WatchSender, WatchedEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SESSION_CONNECTED: u8 = 0;
const SESSION_CLOSED: u8 = 1;
const SESSION_EXPIRED: u8 = 2;

#[derive(Debug, Default)]
struct Node {
    data: Bytes,
    children: BTreeSet<String>,
    /// Bumped on every child creation and deletion; source of sequence suffixes
    child_version: u64,
}

struct Watcher {
    session: u64,
    sender: WatchSender,
}

struct Tree {
    nodes: HashMap<String, Node>,
    watches: HashMap<String, Vec<Watcher>>,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::default());
        Self {
            nodes,
            watches: HashMap::new(),
        }
    }

    fn fire(&mut self, path: &str, event: WatchedEvent) {
        if let Some(watchers) = self.watches.remove(path) {
            debug!("Firing {} watch(es) on {}", watchers.len(), path);
            for watcher in watchers {
                // The waiter may have given up already
                let _ = watcher.sender.send(Ok(event.clone()));
            }
        }
    }

    fn fail_session(&mut self, session: u64, error: CoordinationError) -> usize {
        let mut failed = 0;
        for watchers in self.watches.values_mut() {
            let (mine, others): (Vec<Watcher>, Vec<Watcher>) = std::mem::take(watchers)
                .into_iter()
                .partition(|w| w.session == session);
            *watchers = others;
            for watcher in mine {
                let _ = watcher.sender.send(Err(error.clone()));
                failed += 1;
            }
        }
        self.watches.retain(|_, watchers| !watchers.is_empty());
        failed
    }
}

struct Shared {
    tree: Mutex<Tree>,
    next_session: AtomicU64,
}

/// An in-memory coordination service shared by any number of sessions
#[derive(Clone)]
pub struct MemoryServer {
    shared: Arc<Shared>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// Create a server holding only the root node
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree::new()),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new client session
    pub fn connect(&self) -> MemorySession {
        let id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        info!("Opened coordination session {}", id);
        MemorySession {
            id,
            shared: self.shared.clone(),
            state: Arc::new(AtomicU8::new(SESSION_CONNECTED)),
        }
    }
}

/// A client session against a `MemoryServer`.
///
/// Clones share the same session.
#[derive(Clone)]
pub struct MemorySession {
    id: u64,
    shared: Arc<Shared>,
    state: Arc<AtomicU8>,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.state.load(Ordering::SeqCst) == SESSION_CONNECTED
    }

    /// Close the session. Pending and future calls fail with `ConnectionLoss`.
    pub async fn close(&self) {
        self.terminate(SESSION_CLOSED, CoordinationError::ConnectionLoss)
            .await;
    }

    /// Expire the session. Pending and future calls fail with `SessionExpired`.
    pub async fn expire(&self) {
        self.terminate(SESSION_EXPIRED, CoordinationError::SessionExpired)
            .await;
    }

    async fn terminate(&self, state: u8, error: CoordinationError) {
        if self
            .state
            .compare_exchange(SESSION_CONNECTED, state, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let mut tree = self.shared.tree.lock().await;
        let failed = tree.fail_session(self.id, error.clone());
        info!(
            "Session {} terminated ({}), failed {} pending watch(es)",
            self.id, error, failed
        );
    }

    /// Must be called with the tree lock held so that it orders against `terminate`
    fn ensure_connected(&self) -> Result<(), CoordinationError> {
        match self.state.load(Ordering::SeqCst) {
            SESSION_CONNECTED => Ok(()),
            SESSION_EXPIRED => Err(CoordinationError::SessionExpired),
            _ => Err(CoordinationError::ConnectionLoss),
        }
    }
}

#[async_trait]
impl Coordinator for MemorySession {
    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> Result<String, CoordinationError> {
        path::validate(path)?;
        let parent = match path::parent(path) {
            Some(parent) => parent,
            None => return Err(CoordinationError::NodeExists(path.to_string())),
        };

        let mut tree = self.shared.tree.lock().await;
        self.ensure_connected()?;

        let sequence = tree
            .nodes
            .get(parent)
            .ok_or_else(|| CoordinationError::NoNode(parent.to_string()))?
            .child_version;
        let actual = if mode.is_sequential() {
            path::sequential_name(path, sequence)
        } else {
            path.to_string()
        };
        if tree.nodes.contains_key(&actual) {
            return Err(CoordinationError::NodeExists(actual));
        }

        if let Some(parent_node) = tree.nodes.get_mut(parent) {
            parent_node
                .children
                .insert(path::name(&actual).to_string());
            parent_node.child_version += 1;
        }
        tree.nodes.insert(
            actual.clone(),
            Node {
                data,
                ..Node::default()
            },
        );
        debug!("Session {} created {}", self.id, actual);

        tree.fire(
            parent,
            WatchedEvent::NodeChildrenChanged {
                path: parent.to_string(),
            },
        );
        Ok(actual)
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
        path::validate(path)?;
        let tree = self.shared.tree.lock().await;
        self.ensure_connected()?;
        tree.nodes
            .get(path)
            .map(|node| node.children.iter().cloned().collect())
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }

    async fn get_data(&self, path: &str) -> Result<Bytes, CoordinationError> {
        path::validate(path)?;
        let tree = self.shared.tree.lock().await;
        self.ensure_connected()?;
        tree.nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        path::validate(path)?;
        let parent = path::parent(path)
            .ok_or_else(|| CoordinationError::invalid_path(path, "cannot delete the root"))?;

        let mut tree = self.shared.tree.lock().await;
        self.ensure_connected()?;

        match tree.nodes.get(path) {
            None => return Err(CoordinationError::NoNode(path.to_string())),
            Some(node) if !node.children.is_empty() => {
                return Err(CoordinationError::NotEmpty(path.to_string()));
            }
            Some(_) => {}
        }
        tree.nodes.remove(path);
        if let Some(parent_node) = tree.nodes.get_mut(parent) {
            parent_node.children.remove(path::name(path));
            parent_node.child_version += 1;
        }
        debug!("Session {} deleted {}", self.id, path);

        tree.fire(
            path,
            WatchedEvent::NodeDeleted {
                path: path.to_string(),
            },
        );
        tree.fire(
            parent,
            WatchedEvent::NodeChildrenChanged {
                path: parent.to_string(),
            },
        );
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, CoordinationError> {
        path::validate(path)?;
        let tree = self.shared.tree.lock().await;
        self.ensure_connected()?;
        Ok(tree.nodes.contains_key(path))
    }

    async fn watch_children(&self, path: &str) -> Result<ChildWatch, CoordinationError> {
        path::validate(path)?;
        let mut tree = self.shared.tree.lock().await;
        self.ensure_connected()?;
        if !tree.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }

        let (sender, watch) = ChildWatch::channel(path);
        tree.watches
            .entry(path.to_string())
            .or_default()
            .push(Watcher {
                session: self.id,
                sender,
            });
        debug!("Session {} watching children of {}", self.id, path);
        Ok(watch)
    }
}
