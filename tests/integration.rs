//! End-to-end subscription flows against in-memory collaborators.

mod common;

use common::{harness, harness_with, init_tracing, job_json, TransportCall};
use jobstream::{
    ChannelEvent, ConnectionState, Job, JobId, JobStatus, JobType, ManagerOptions, MergePolicy,
    ObserverConfig, ObserverFilter, SyncEvent, TargetId,
};

fn running(id: &str, progress: u8) -> Job {
    Job::new(id, JobType::Generation, JobStatus::Running, progress).with_owner(TargetId::new("proj-1"))
}

// --- Realistic Workflow Tests ---

#[test]
fn test_bootstrap_then_stream_updates() {
    init_tracing();
    let mut h = harness();
    h.source.set("proj-1", vec![running("j1", 40)]);

    h.manager.subscribe(TargetId::new("proj-1")).unwrap();

    // Snapshot applied before any stream traffic
    assert_eq!(h.manager.store().len(), 1);
    let j1 = h.manager.store().get(&JobId::new("j1")).unwrap();
    assert_eq!(j1.status, JobStatus::Running);
    assert_eq!(j1.progress, 40);

    let channel = h.manager.stream().channel().unwrap();
    h.manager.handle_channel_event(channel, ChannelEvent::Opened);
    assert_eq!(h.manager.connection_state(), ConnectionState::Connected);

    h.manager
        .handle_channel_event(channel, ChannelEvent::Message(job_json("j1", "completed", 100)));
    let j1 = h.manager.store().get(&JobId::new("j1")).unwrap();
    assert_eq!(j1.status, JobStatus::Completed);
    assert_eq!(j1.progress, 100);

    h.manager
        .handle_channel_event(channel, ChannelEvent::Message(job_json("j2", "queued", 0)));
    assert_eq!(h.manager.store().len(), 2);
    let j2 = h.manager.store().get(&JobId::new("j2")).unwrap();
    assert_eq!(j2.status, JobStatus::Queued);
    assert_eq!(j2.progress, 0);
}

#[test]
fn test_observer_sees_bootstrap_and_updates() {
    let mut h = harness();
    let updates = h.observers.observe(ObserverConfig {
        filter: ObserverFilter::jobs(),
        ..Default::default()
    });
    h.source.set("proj-1", vec![running("j1", 10), running("j2", 20)]);

    h.manager.subscribe(TargetId::new("proj-1")).unwrap();
    let channel = h.manager.stream().channel().unwrap();
    h.manager.handle_channel_event(channel, ChannelEvent::Opened);
    h.manager
        .handle_channel_event(channel, ChannelEvent::Message(job_json("j1", "running", 60)));

    let lists: Vec<Vec<Job>> = updates
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::Jobs { jobs } => Some(jobs),
            _ => None,
        })
        .collect();

    // One notification for the snapshot, one for the merge
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].len(), 2);
    assert_eq!(lists[1].len(), 2);
    let j1 = lists[1].iter().find(|j| j.id.as_str() == "j1").unwrap();
    assert_eq!(j1.progress, 60);
}

#[test]
fn test_switching_targets_tears_down_old_channel() {
    let mut h = harness();
    h.source.set("proj-1", vec![running("a", 10)]);
    h.source.set("proj-2", vec![running("b", 90)]);

    h.manager.subscribe(TargetId::new("proj-1")).unwrap();
    let first = h.manager.stream().channel().unwrap();
    h.manager.handle_channel_event(first, ChannelEvent::Opened);

    h.manager.subscribe(TargetId::new("proj-2")).unwrap();
    let second = h.manager.stream().channel().unwrap();

    let calls = h.transport.calls.lock().clone();
    assert_eq!(
        calls,
        vec![
            TransportCall::Open(first, "proj-1".into()),
            TransportCall::Close(first),
            TransportCall::Open(second, "proj-2".into()),
        ]
    );

    // Only the new target's jobs remain
    let ids: Vec<String> = h.manager.jobs().into_iter().map(|j| j.id.0).collect();
    assert_eq!(ids, vec!["b".to_string()]);

    // A straggler from the old channel is ignored
    h.manager
        .handle_channel_event(first, ChannelEvent::Message(job_json("a", "completed", 100)));
    assert!(h.manager.store().get(&JobId::new("a")).is_none());
}

#[test]
fn test_resubscribe_after_unsubscribe_bootstraps_again() {
    let mut h = harness();
    h.source.set("proj-1", vec![running("j1", 40)]);

    h.manager.subscribe(TargetId::new("proj-1")).unwrap();
    h.manager.unsubscribe();
    h.manager.subscribe(TargetId::new("proj-1")).unwrap();

    assert_eq!(h.source.fetch_count(), 2);
    assert_eq!(h.transport.open_count(), 2);
    assert_eq!(h.manager.store().len(), 1);
}

#[test]
fn test_monotonic_policy_keeps_terminal_status() {
    let mut h = harness_with(MergePolicy::MonotonicStatus, ManagerOptions::default());
    h.source.set("proj-1", vec![running("j1", 40)]);

    h.manager.subscribe(TargetId::new("proj-1")).unwrap();
    let channel = h.manager.stream().channel().unwrap();
    h.manager.handle_channel_event(channel, ChannelEvent::Opened);

    h.manager
        .handle_channel_event(channel, ChannelEvent::Message(job_json("j1", "completed", 100)));
    // Late tick from before completion
    h.manager
        .handle_channel_event(channel, ChannelEvent::Message(job_json("j1", "running", 80)));

    let j1 = h.manager.store().get(&JobId::new("j1")).unwrap();
    assert_eq!(j1.status, JobStatus::Completed);
    assert_eq!(j1.progress, 100);
}

#[test]
fn test_presentation_order_derived_from_store() {
    let mut h = harness();
    h.manager.subscribe(TargetId::new("proj-1")).unwrap();
    let channel = h.manager.stream().channel().unwrap();
    h.manager.handle_channel_event(channel, ChannelEvent::Opened);

    for (id, ts) in [("a", "2024-05-01T08:00:00Z"), ("b", "2024-05-01T09:00:00Z")] {
        let raw = format!(
            r#"{{"id":"{id}","type":"upscale","status":"queued","createdAt":"{ts}"}}"#
        );
        h.manager.handle_channel_event(channel, ChannelEvent::Message(raw));
    }

    let order: Vec<&str> = h
        .manager
        .store()
        .recent_first()
        .iter()
        .map(|j| j.id.as_str())
        .collect();
    assert_eq!(order, vec!["b", "a"]);
    assert_eq!(h.manager.store().counts().queued, 2);
}
