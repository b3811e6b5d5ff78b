//! Client Set Module
//!
//! Primary/replica connections and read selection.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{CacheError, Result};

// == Read Policy ==
/// How reads pick a connection when replicas exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Always the first replica
    #[default]
    FirstReplica,
    /// Cycle through replicas
    RoundRobin,
    /// Read from the primary too
    Primary,
}

impl FromStr for ReadPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-replica" | "first_replica" => Ok(ReadPolicy::FirstReplica),
            "round-robin" | "round_robin" => Ok(ReadPolicy::RoundRobin),
            "primary" => Ok(ReadPolicy::Primary),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown read policy '{}'",
                other
            ))),
        }
    }
}

// == Client Set ==
/// Ordered connections: index 0 is the primary, the rest are replicas.
///
/// Fixed after construction. Writes always go to the primary.
#[derive(Debug)]
pub struct ClientSet<C> {
    clients: Vec<Arc<C>>,
    policy: ReadPolicy,
    /// Round-robin position
    cursor: AtomicUsize,
}

impl<C> ClientSet<C> {
    /// A set with only a primary.
    pub fn single(primary: C) -> Self {
        Self::from_arcs(Arc::new(primary), Vec::new())
    }

    /// A primary with replicas.
    pub fn new(primary: C, replicas: impl IntoIterator<Item = C>) -> Self {
        Self::from_arcs(
            Arc::new(primary),
            replicas.into_iter().map(Arc::new).collect(),
        )
    }

    /// Builds from shared connections.
    pub fn from_arcs(primary: Arc<C>, replicas: Vec<Arc<C>>) -> Self {
        let mut clients = Vec::with_capacity(replicas.len() + 1);
        clients.push(primary);
        clients.extend(replicas);
        Self {
            clients,
            policy: ReadPolicy::default(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Builds from an ordered list; the first entry is the primary.
    pub fn from_vec(clients: Vec<C>) -> Result<Self> {
        let mut iter = clients.into_iter();
        let primary = iter
            .next()
            .ok_or_else(|| CacheError::InvalidConfig("no cache servers configured".to_string()))?;
        Ok(Self::new(primary, iter))
    }

    pub fn with_policy(mut self, policy: ReadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ReadPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn primary(&self) -> &Arc<C> {
        &self.clients[0]
    }

    pub fn replicas(&self) -> &[Arc<C>] {
        &self.clients[1..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<C>> {
        self.clients.iter()
    }

    // == Selection ==
    /// Index of the connection to use.
    pub fn index_for(&self, write: bool) -> usize {
        let replicas = self.clients.len() - 1;
        if write || replicas == 0 {
            return 0;
        }
        match self.policy {
            ReadPolicy::FirstReplica => 1,
            ReadPolicy::RoundRobin => 1 + self.cursor.fetch_add(1, Ordering::Relaxed) % replicas,
            ReadPolicy::Primary => 0,
        }
    }

    /// Connection to use for a write (`true`) or a read (`false`).
    pub fn get(&self, write: bool) -> &Arc<C> {
        &self.clients[self.index_for(write)]
    }
}
