//! The per-connection execution context requests run against.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use uuid::Uuid;

use gridlink_core::{GridError, ProtocolVersion, Result};

use crate::lifecycle::Status;
use crate::message::OrderingKey;
use crate::partition::ScanConfig;
use crate::store::{FilterCookie, MemberResolver, NameDirectory, PartitionedStore};
use crate::topic::connector::TopicConnector;

/// One client connection's execution context.
///
/// A channel carries the negotiated protocol version, the collaborators
/// requests delegate to, and per-channel state: ordering gates, the local
/// lock table, and in-flight request statuses. Channels are shared across
/// worker tasks behind an `Arc`; all interior state is its own lock.
pub struct Channel {
    id: Uuid,
    version: ProtocolVersion,
    store: Arc<dyn PartitionedStore>,
    topic: Option<Arc<dyn TopicConnector>>,
    names: Option<Arc<dyn NameDirectory>>,
    resolver: Option<Arc<dyn MemberResolver>>,
    scan_config: ScanConfig,
    // Keys this channel currently holds the distributed lock for.
    lock_table: Mutex<HashSet<(String, Vec<u8>)>>,
    // Serialization gates, one per ordering key seen on this channel.
    gates: Mutex<HashMap<OrderingKey, Arc<AsyncMutex<()>>>>,
    // Local admission gates for the two-phase lock protocol, separate from
    // the ordering gates so a lock request can hold both without deadlock.
    lock_gates: Mutex<HashMap<(String, Vec<u8>), Arc<AsyncMutex<()>>>>,
    statuses: Mutex<HashMap<i64, Arc<Status>>>,
}

impl Channel {
    /// The channel's unique id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The protocol version negotiated for this channel.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The backing partitioned store.
    pub fn store(&self) -> &Arc<dyn PartitionedStore> {
        &self.store
    }

    /// The topic connector, if this channel serves the topic sub-protocol.
    pub fn topic(&self) -> Result<&Arc<dyn TopicConnector>> {
        self.topic.as_ref().ok_or_else(|| {
            GridError::Unsupported("channel has no topic connector".to_string())
        })
    }

    /// The grid's name directory, if wired.
    pub fn names(&self) -> Result<&Arc<dyn NameDirectory>> {
        self.names
            .as_ref()
            .ok_or_else(|| GridError::Unsupported("channel has no name directory".to_string()))
    }

    /// Scan engine tuning for this channel.
    pub fn scan_config(&self) -> &ScanConfig {
        &self.scan_config
    }

    /// Returns the serialization gate for `key`, creating it on first use.
    pub fn ordering_gate(&self, key: &OrderingKey) -> Arc<AsyncMutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.entry(key.clone()).or_default().clone()
    }

    /// Returns the local admission gate for a distributed lock on `key`.
    pub fn lock_gate(&self, name: &str, key: &[u8]) -> Arc<AsyncMutex<()>> {
        let mut gates = self.lock_gates.lock().unwrap_or_else(|e| e.into_inner());
        gates
            .entry((name.to_string(), key.to_vec()))
            .or_default()
            .clone()
    }

    /// Drops the ordering gate for `key` if no request holds or awaits it.
    ///
    /// Safe under the map lock: a strong count of one means the map holds
    /// the only reference, and every new reference goes through the map.
    pub fn drop_idle_gate(&self, key: &OrderingKey) {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        if gates.get(key).is_some_and(|g| Arc::strong_count(g) == 1) {
            gates.remove(key);
        }
    }

    /// Drops the admission gate for a lock key if no request holds or
    /// awaits it.
    pub fn drop_idle_lock_gate(&self, name: &str, key: &[u8]) {
        let mut gates = self.lock_gates.lock().unwrap_or_else(|e| e.into_inner());
        let entry = (name.to_string(), key.to_vec());
        if gates.get(&entry).is_some_and(|g| Arc::strong_count(g) == 1) {
            gates.remove(&entry);
        }
    }

    /// The number of ordering gates currently retained.
    pub fn gate_count(&self) -> usize {
        self.gates.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The number of lock admission gates currently retained.
    pub fn lock_gate_count(&self) -> usize {
        self.lock_gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Records that this channel holds the distributed lock on `key`.
    pub fn mark_locked(&self, name: &str, key: &[u8]) {
        let mut table = self.lock_table.lock().unwrap_or_else(|e| e.into_inner());
        table.insert((name.to_string(), key.to_vec()));
    }

    /// Returns true if this channel holds the distributed lock on `key`.
    pub fn is_locked(&self, name: &str, key: &[u8]) -> bool {
        let table = self.lock_table.lock().unwrap_or_else(|e| e.into_inner());
        table.contains(&(name.to_string(), key.to_vec()))
    }

    /// Forgets a held lock; returns true if one was recorded.
    pub fn clear_locked(&self, name: &str, key: &[u8]) -> bool {
        let mut table = self.lock_table.lock().unwrap_or_else(|e| e.into_inner());
        table.remove(&(name.to_string(), key.to_vec()))
    }

    /// Drops every lock record for `name`. Used when the resource itself is
    /// destroyed out from under the locks.
    pub fn release_resource_locks(&self, name: &str) -> Vec<Vec<u8>> {
        let mut table = self.lock_table.lock().unwrap_or_else(|e| e.into_inner());
        let keys: Vec<Vec<u8>> = table
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, k)| k.clone())
            .collect();
        for key in &keys {
            table.remove(&(name.to_string(), key.clone()));
        }
        drop(table);
        // The resource is gone, so its admission gates go too, except ones
        // a still-parked lock request is waiting on.
        let mut gates = self.lock_gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.retain(|(n, _), gate| n != name || Arc::strong_count(gate) > 1);
        keys
    }

    /// Registers a new in-flight status for `request_id`.
    pub fn register_status(&self, request_id: i64) -> Arc<Status> {
        let status = Arc::new(Status::new());
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        statuses.insert(request_id, status.clone());
        status
    }

    /// Looks up the in-flight status for `request_id`.
    pub fn status(&self, request_id: i64) -> Option<Arc<Status>> {
        let statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        statuses.get(&request_id).cloned()
    }

    /// Removes the status entry for a settled request.
    pub fn remove_status(&self, request_id: i64) {
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        statuses.remove(&request_id);
    }

    /// Re-resolves the member ids inside a filter cookie against the live
    /// membership. Ballots whose member is gone are dropped rather than
    /// failing the request; without a resolver the cookie passes through
    /// untouched.
    pub fn resolve_cookie(&self, cookie: FilterCookie) -> FilterCookie {
        let Some(resolver) = &self.resolver else {
            return cookie;
        };
        let mut resolved = Vec::with_capacity(cookie.ballots.len());
        for ballot in cookie.ballots {
            if resolver.resolve(ballot.member_id) {
                resolved.push(ballot);
            } else {
                debug!(member_id = %ballot.member_id, "dropping ballot for departed member");
            }
        }
        FilterCookie { ballots: resolved }
    }
}

/// Builder for [`Channel`].
pub struct ChannelBuilder {
    version: ProtocolVersion,
    store: Arc<dyn PartitionedStore>,
    topic: Option<Arc<dyn TopicConnector>>,
    names: Option<Arc<dyn NameDirectory>>,
    resolver: Option<Arc<dyn MemberResolver>>,
    scan_config: ScanConfig,
}

impl ChannelBuilder {
    /// Starts a builder over the given store at the current version.
    pub fn new(store: Arc<dyn PartitionedStore>) -> Self {
        Self {
            version: ProtocolVersion::CURRENT,
            store,
            topic: None,
            names: None,
            resolver: None,
            scan_config: ScanConfig::default(),
        }
    }

    /// Sets the negotiated protocol version.
    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Wires a topic connector.
    pub fn topic(mut self, topic: Arc<dyn TopicConnector>) -> Self {
        self.topic = Some(topic);
        self
    }

    /// Wires a name directory.
    pub fn names(mut self, names: Arc<dyn NameDirectory>) -> Self {
        self.names = Some(names);
        self
    }

    /// Wires a member resolver for filter-cookie resolution.
    pub fn resolver(mut self, resolver: Arc<dyn MemberResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Overrides the scan engine tuning.
    pub fn scan_config(mut self, scan_config: ScanConfig) -> Self {
        self.scan_config = scan_config;
        self
    }

    /// Builds the channel.
    pub fn build(self) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            version: self.version,
            store: self.store,
            topic: self.topic,
            names: self.names,
            resolver: self.resolver,
            scan_config: self.scan_config,
            lock_table: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
            lock_gates: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }
}
