//! In-memory collaborator fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use gridlink_core::{GridError, Result};
use gridlink_protocol::store::{
    Entry, FilterSpec, ListenerTarget, MemberResolver, NameDirectory, PartitionedStore,
    ProcessorSpec,
};
use gridlink_protocol::topic::connector::{
    CommitStatus, ReceiveOutcome, ReceiveStatus, SeekOutcome, TopicConnector, TopicElement,
    TopicPosition,
};

/// Deterministic key-to-partition assignment for the fakes.
pub fn partition_of(key: &[u8], count: u32) -> u32 {
    let sum: u32 = key.iter().map(|b| *b as u32).sum();
    sum % count
}

/// A hash-map backed store with call recording for scan assertions.
pub struct MemoryStore {
    partition_count: u32,
    pub data: Mutex<HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
    pub locks: Mutex<HashSet<(String, Vec<u8>)>>,
    pub listeners: Mutex<Vec<(String, ListenerTarget, bool, bool)>>,
    /// The explicit partition set of every restricted filtered call.
    pub scan_calls: Mutex<Vec<Vec<u32>>>,
    /// Filtered calls that arrived without a partition restriction.
    pub unrestricted_calls: Mutex<u32>,
    /// Error injected into every filtered call, for abort tests.
    pub fail_filtered: Mutex<bool>,
}

impl MemoryStore {
    pub fn new(partition_count: u32) -> Self {
        Self {
            partition_count,
            data: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashSet::new()),
            listeners: Mutex::new(Vec::new()),
            scan_calls: Mutex::new(Vec::new()),
            unrestricted_calls: Mutex::new(0),
            fail_filtered: Mutex::new(false),
        }
    }

    pub fn with_entries(self, name: &str, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        {
            let mut data = self.data.lock().unwrap();
            data.insert(name.to_string(), entries.into_iter().collect());
        }
        self
    }

    fn record_filter(&self, filter: &FilterSpec) -> Result<()> {
        if *self.fail_filtered.lock().unwrap() {
            return Err(GridError::Operation("injected failure".to_string()));
        }
        match &filter.partitions {
            Some(partitions) => self
                .scan_calls
                .lock()
                .unwrap()
                .push(partitions.iter().collect()),
            None => *self.unrestricted_calls.lock().unwrap() += 1,
        }
        Ok(())
    }

    fn selected(&self, name: &str, filter: &FilterSpec) -> Vec<(Vec<u8>, Vec<u8>)> {
        let data = self.data.lock().unwrap();
        let Some(map) = data.get(name) else {
            return Vec::new();
        };
        map.iter()
            .filter(|(k, _)| filter.predicate.is_empty() || k.starts_with(&filter.predicate))
            .filter(|(k, _)| match &filter.partitions {
                Some(partitions) => partitions.contains(partition_of(k, self.partition_count)),
                None => true,
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl PartitionedStore for MemoryStore {
    fn partition_count(&self) -> u32 {
        self.partition_count
    }

    async fn get(&self, name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let data = self.data.lock().unwrap();
        Ok(data.get(name).and_then(|m| m.get(key).cloned()))
    }

    async fn get_all(&self, name: &str, keys: &[Vec<u8>]) -> Result<Vec<Entry>> {
        let data = self.data.lock().unwrap();
        let Some(map) = data.get(name) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| map.get(k).map(|v| Entry::new(k.clone(), v.clone())))
            .collect())
    }

    async fn put(
        &self,
        name: &str,
        key: &[u8],
        value: &[u8],
        _expiry_millis: i64,
    ) -> Result<Option<Vec<u8>>> {
        let mut data = self.data.lock().unwrap();
        Ok(data
            .entry(name.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec()))
    }

    async fn put_all(&self, name: &str, entries: Vec<Entry>) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let map = data.entry(name.to_string()).or_default();
        for entry in entries {
            map.insert(entry.key, entry.value);
        }
        Ok(())
    }

    async fn remove(&self, name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut data = self.data.lock().unwrap();
        Ok(data.get_mut(name).and_then(|m| m.remove(key)))
    }

    async fn remove_all(&self, name: &str, keys: &[Vec<u8>]) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(map) = data.get_mut(name) {
            for key in keys {
                map.remove(key);
            }
        }
        Ok(())
    }

    async fn contains_key(&self, name: &str, key: &[u8]) -> Result<bool> {
        let data = self.data.lock().unwrap();
        Ok(data.get(name).is_some_and(|m| m.contains_key(key)))
    }

    async fn contains_all(&self, name: &str, keys: &[Vec<u8>]) -> Result<bool> {
        let data = self.data.lock().unwrap();
        Ok(data
            .get(name)
            .is_some_and(|m| keys.iter().all(|k| m.contains_key(k))))
    }

    async fn contains_value(&self, name: &str, value: &[u8]) -> Result<bool> {
        let data = self.data.lock().unwrap();
        Ok(data
            .get(name)
            .is_some_and(|m| m.values().any(|v| v == value)))
    }

    async fn size(&self, name: &str) -> Result<i32> {
        let data = self.data.lock().unwrap();
        Ok(data.get(name).map_or(0, |m| m.len() as i32))
    }

    async fn clear(&self, name: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(map) = data.get_mut(name) {
            map.clear();
        }
        Ok(())
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.remove(name);
        Ok(())
    }

    async fn key_set(&self, name: &str, filter: &FilterSpec) -> Result<Vec<Vec<u8>>> {
        self.record_filter(filter)?;
        Ok(self.selected(name, filter).into_iter().map(|(k, _)| k).collect())
    }

    async fn entry_set(&self, name: &str, filter: &FilterSpec) -> Result<Vec<Entry>> {
        self.record_filter(filter)?;
        Ok(self
            .selected(name, filter)
            .into_iter()
            .map(|(k, v)| Entry::new(k, v))
            .collect())
    }

    async fn invoke(
        &self,
        name: &str,
        key: &[u8],
        processor: &ProcessorSpec,
    ) -> Result<Option<Vec<u8>>> {
        let mut data = self.data.lock().unwrap();
        let Some(value) = data.get_mut(name).and_then(|m| m.get_mut(key)) else {
            return Ok(None);
        };
        value.extend_from_slice(&processor.body);
        Ok(Some(value.clone()))
    }

    async fn invoke_keys(
        &self,
        name: &str,
        keys: &[Vec<u8>],
        processor: &ProcessorSpec,
    ) -> Result<Vec<Entry>> {
        let mut results = Vec::new();
        for key in keys {
            if let Some(result) = self.invoke(name, key, processor).await? {
                results.push(Entry::new(key.clone(), result));
            }
        }
        Ok(results)
    }

    async fn invoke_filter(
        &self,
        name: &str,
        filter: &FilterSpec,
        processor: &ProcessorSpec,
    ) -> Result<Vec<Entry>> {
        self.record_filter(filter)?;
        let keys: Vec<Vec<u8>> = self.selected(name, filter).into_iter().map(|(k, _)| k).collect();
        self.invoke_keys(name, &keys, processor).await
    }

    async fn aggregate_keys(
        &self,
        name: &str,
        keys: &[Vec<u8>],
        _aggregator: &ProcessorSpec,
    ) -> Result<Vec<u8>> {
        let data = self.data.lock().unwrap();
        let count = data
            .get(name)
            .map_or(0, |m| keys.iter().filter(|k| m.contains_key(*k)).count());
        Ok((count as i32).to_be_bytes().to_vec())
    }

    async fn aggregate_filter(
        &self,
        name: &str,
        filter: &FilterSpec,
        _aggregator: &ProcessorSpec,
    ) -> Result<Vec<u8>> {
        let count = self.selected(name, filter).len();
        Ok((count as i32).to_be_bytes().to_vec())
    }

    async fn lock(
        &self,
        name: &str,
        key: &[u8],
        _wait_millis: i64,
        _lease_millis: i64,
    ) -> Result<bool> {
        let mut locks = self.locks.lock().unwrap();
        Ok(locks.insert((name.to_string(), key.to_vec())))
    }

    async fn unlock(&self, name: &str, key: &[u8]) -> Result<bool> {
        let mut locks = self.locks.lock().unwrap();
        Ok(locks.remove(&(name.to_string(), key.to_vec())))
    }

    async fn add_index(&self, _name: &str, _extractor: &[u8], _ordered: bool) -> Result<()> {
        Ok(())
    }

    async fn remove_index(&self, _name: &str, _extractor: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn add_listener(
        &self,
        name: &str,
        target: &ListenerTarget,
        lite: bool,
        priming: bool,
    ) -> Result<()> {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.push((name.to_string(), target.clone(), lite, priming));
        Ok(())
    }

    async fn remove_listener(&self, name: &str, target: &ListenerTarget) -> Result<()> {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|(n, t, _, _)| !(n == name && t == target));
        Ok(())
    }
}

/// Collects the union of all partitions the store saw across scan calls,
/// asserting no partition was visited twice.
pub fn visited_partitions_unique(store: &MemoryStore) -> Vec<u32> {
    let calls = store.scan_calls.lock().unwrap();
    let mut seen = Vec::new();
    for call in calls.iter() {
        for p in call {
            assert!(!seen.contains(p), "partition {p} executed twice");
            seen.push(*p);
        }
    }
    seen.sort_unstable();
    seen
}

/// A member resolver backed by an explicit id set.
pub struct SetResolver {
    pub live: HashSet<Uuid>,
}

impl MemberResolver for SetResolver {
    fn resolve(&self, member_id: Uuid) -> bool {
        self.live.contains(&member_id)
    }
}

/// A name directory backed by a map.
pub struct MapDirectory {
    pub bindings: HashMap<String, String>,
}

impl NameDirectory for MapDirectory {
    fn lookup(&self, name: &str) -> Option<String> {
        self.bindings.get(name).cloned()
    }
}

/// An in-memory topic connector retaining every published element.
pub struct MemoryTopic {
    simple: bool,
    pub elements: Mutex<BTreeMap<i32, Vec<Vec<u8>>>>,
    /// Index of the next unreceived element per channel.
    pub head_index: Mutex<BTreeMap<i32, usize>>,
    pub committed: Mutex<BTreeMap<i32, TopicPosition>>,
    pub heartbeats: Mutex<u32>,
    pub groups: Mutex<HashSet<String>>,
}

impl MemoryTopic {
    pub fn new() -> Self {
        Self {
            simple: false,
            elements: Mutex::new(BTreeMap::new()),
            head_index: Mutex::new(BTreeMap::new()),
            committed: Mutex::new(BTreeMap::new()),
            heartbeats: Mutex::new(0),
            groups: Mutex::new(HashSet::new()),
        }
    }

    pub fn simple() -> Self {
        Self {
            simple: true,
            ..Self::new()
        }
    }

    fn position(offset: usize) -> TopicPosition {
        TopicPosition::new(0, offset as i32)
    }
}

#[async_trait]
impl TopicConnector for MemoryTopic {
    fn is_simple(&self) -> bool {
        self.simple
    }

    fn owned_channels(&self) -> Vec<i32> {
        self.elements.lock().unwrap().keys().copied().collect()
    }

    fn channel_head(&self, channel: i32) -> TopicPosition {
        let heads = self.head_index.lock().unwrap();
        match heads.get(&channel) {
            Some(index) => Self::position(*index),
            None => TopicPosition::EMPTY,
        }
    }

    async fn offer(&self, channel: i32, elements: Vec<Vec<u8>>) -> Result<i32> {
        let mut all = self.elements.lock().unwrap();
        let slot = all.entry(channel).or_default();
        let accepted = elements.len() as i32;
        slot.extend(elements);
        self.head_index.lock().unwrap().entry(channel).or_insert(0);
        Ok(accepted)
    }

    async fn receive(&self, channel: i32, max_elements: i32) -> Result<ReceiveOutcome> {
        let all = self.elements.lock().unwrap();
        let mut heads = self.head_index.lock().unwrap();
        let slot = all.get(&channel).map(Vec::as_slice).unwrap_or(&[]);
        let head = heads.entry(channel).or_insert(0);

        let available = slot.len().saturating_sub(*head);
        let take = available.min(max_elements.max(0) as usize);
        let elements: Vec<Vec<u8>> = slot[*head..*head + take].to_vec();
        *head += take;
        let remaining = (slot.len() - *head) as i32;
        let status = if take == 0 && remaining == 0 {
            ReceiveStatus::Exhausted
        } else {
            ReceiveStatus::Success
        };
        Ok(ReceiveOutcome::Poll {
            elements,
            remaining,
            status,
        })
    }

    async fn receive_any(&self, max_elements: i32) -> Result<Vec<TopicElement>> {
        let channels = self.owned_channels();
        let mut out = Vec::new();
        for channel in channels {
            if out.len() >= max_elements.max(0) as usize {
                break;
            }
            let budget = max_elements as usize - out.len();
            let head_before = match self.head_index.lock().unwrap().get(&channel) {
                Some(index) => *index,
                None => 0,
            };
            if let ReceiveOutcome::Poll { elements, .. } =
                self.receive(channel, budget as i32).await?
            {
                for (i, payload) in elements.into_iter().enumerate() {
                    out.push(TopicElement {
                        channel,
                        position: Self::position(head_before + i),
                        payload,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn peek(&self, channel: i32, position: TopicPosition) -> Result<Option<TopicElement>> {
        let all = self.elements.lock().unwrap();
        Ok(all
            .get(&channel)
            .and_then(|slot| slot.get(position.offset.max(0) as usize))
            .map(|payload| TopicElement {
                channel,
                position,
                payload: payload.clone(),
            }))
    }

    async fn commit(&self, channel: i32, position: TopicPosition) -> Result<CommitStatus> {
        let mut committed = self.committed.lock().unwrap();
        match committed.get(&channel) {
            Some(previous) if *previous >= position => Ok(CommitStatus::AlreadyCommitted),
            _ => {
                committed.insert(channel, position);
                Ok(CommitStatus::Committed)
            }
        }
    }

    async fn is_committed(&self, channel: i32, position: TopicPosition) -> Result<bool> {
        let committed = self.committed.lock().unwrap();
        Ok(committed.get(&channel).is_some_and(|p| *p >= position))
    }

    async fn last_committed(&self) -> Result<BTreeMap<i32, TopicPosition>> {
        Ok(self.committed.lock().unwrap().clone())
    }

    async fn heads(&self, channels: &[i32]) -> Result<BTreeMap<i32, TopicPosition>> {
        Ok(channels
            .iter()
            .map(|c| (*c, self.channel_head(*c)))
            .collect())
    }

    async fn tails(&self) -> Result<BTreeMap<i32, TopicPosition>> {
        let all = self.elements.lock().unwrap();
        Ok(all
            .iter()
            .map(|(c, slot)| (*c, Self::position(slot.len().saturating_sub(1))))
            .collect())
    }

    async fn seek_to_position(
        &self,
        positions: &BTreeMap<i32, TopicPosition>,
    ) -> Result<BTreeMap<i32, SeekOutcome>> {
        let mut heads = self.head_index.lock().unwrap();
        let mut outcomes = BTreeMap::new();
        for (channel, position) in positions {
            heads.insert(*channel, position.offset.max(0) as usize);
            outcomes.insert(*channel, SeekOutcome { position: *position });
        }
        Ok(outcomes)
    }

    async fn seek_to_timestamp(
        &self,
        timestamps: &BTreeMap<i32, i64>,
    ) -> Result<BTreeMap<i32, SeekOutcome>> {
        // The fake has no element timestamps; every timestamp seek lands on
        // the channel start.
        let mut heads = self.head_index.lock().unwrap();
        let mut outcomes = BTreeMap::new();
        for channel in timestamps.keys() {
            heads.insert(*channel, 0);
            outcomes.insert(
                *channel,
                SeekOutcome {
                    position: Self::position(0),
                },
            );
        }
        Ok(outcomes)
    }

    async fn heartbeat(&self, _async_heartbeat: bool) -> Result<()> {
        *self.heartbeats.lock().unwrap() += 1;
        Ok(())
    }

    async fn remaining(&self, channels: &[i32]) -> Result<i32> {
        let all = self.elements.lock().unwrap();
        let heads = self.head_index.lock().unwrap();
        let selected: Vec<i32> = if channels.is_empty() {
            all.keys().copied().collect()
        } else {
            channels.to_vec()
        };
        Ok(selected
            .iter()
            .map(|c| {
                let len = all.get(c).map_or(0, Vec::len);
                let head = heads.get(c).copied().unwrap_or(0);
                (len.saturating_sub(head)) as i32
            })
            .sum())
    }

    async fn ensure_group(&self, group: &str) -> Result<()> {
        self.groups.lock().unwrap().insert(group.to_string());
        Ok(())
    }

    async fn destroy_group(&self, group: &str) -> Result<()> {
        self.groups.lock().unwrap().remove(group);
        Ok(())
    }
}
