//! Shared fakes for integration tests.

#![allow(dead_code)]

use jobstream::{
    ChannelId, Job, JobStore, ManagerOptions, ManualClock, MergePolicy, ObserverSet,
    ReconnectPolicy, Result, SnapshotSource, StreamClient, SubscriptionManager, SyncError,
    TargetId, Transport,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum TransportCall {
    Open(ChannelId, String),
    Close(ChannelId),
}

/// Records every open/close; can be told to refuse opens.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub calls: Arc<Mutex<Vec<TransportCall>>>,
    pub refuse: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn open_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, TransportCall::Open(..)))
            .count()
    }

    pub fn refuse_opens(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn open(&mut self, channel: ChannelId, target: &TargetId) -> Result<()> {
        self.calls
            .lock()
            .push(TransportCall::Open(channel, target.to_string()));
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn close(&mut self, channel: ChannelId) {
        self.calls.lock().push(TransportCall::Close(channel));
    }
}

/// Serves per-target snapshots from memory.
#[derive(Clone, Default)]
pub struct MemorySource {
    pub snapshots: Arc<Mutex<HashMap<String, Vec<Job>>>>,
    pub fail: Arc<AtomicBool>,
    pub fetches: Arc<AtomicU32>,
}

impl MemorySource {
    pub fn set(&self, target: &str, jobs: Vec<Job>) {
        self.snapshots
            .lock()
            .insert(target.to_string(), jobs);
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for MemorySource {
    fn fetch(&self, target: &TargetId) -> Result<Vec<Job>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Bootstrap {
                target: target.clone(),
                reason: "HTTP 502 Bad Gateway".into(),
            });
        }
        Ok(self
            .snapshots
            .lock()
            .get(target.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

pub type TestManager = SubscriptionManager<MemorySource, RecordingTransport, ManualClock>;

pub struct Harness {
    pub manager: TestManager,
    pub source: MemorySource,
    pub transport: RecordingTransport,
    pub clock: ManualClock,
    pub observers: Arc<ObserverSet>,
}

pub fn harness() -> Harness {
    harness_with(MergePolicy::LastWriteWins, ManagerOptions::default())
}

pub fn harness_with(policy: MergePolicy, options: ManagerOptions) -> Harness {
    let source = MemorySource::default();
    let transport = RecordingTransport::default();
    let clock = ManualClock::new();
    let observers = Arc::new(ObserverSet::new());

    let stream = StreamClient::new(
        transport.clone(),
        clock.clone(),
        ReconnectPolicy::default(),
        Arc::clone(&observers),
    );
    let store = JobStore::with_observers(Arc::clone(&observers), policy);
    let manager = SubscriptionManager::new(source.clone(), stream, store, options);

    Harness {
        manager,
        source,
        transport,
        clock,
        observers,
    }
}

/// Serialized job record as the server sends it.
pub fn job_json(id: &str, status: &str, progress: u8) -> String {
    format!(
        r#"{{"id":"{id}","type":"generation","status":"{status}","progress":{progress},"ownerId":"proj-1"}}"#
    )
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
