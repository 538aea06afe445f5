//! Subscription lifecycle: snapshot bootstrap, then live stream.
//!
//! Subscribing is split in two steps so the bootstrap fetch can run off the
//! sync loop: [`SubscriptionManager::begin_subscribe`] hands out a
//! [`BootstrapTicket`], and [`SubscriptionManager::complete_subscribe`]
//! applies the fetched snapshot only if that ticket is still current.
//! [`SubscriptionManager::subscribe`] does both in place.

use crate::error::{Result, SyncError};
use crate::observers::ObserverSet;
use crate::router::{EventRouter, RouterStats};
use crate::store::JobStore;
use crate::stream::{Clock, StreamClient, Transport};
use crate::types::{ChannelEvent, ChannelId, ConnectionState, Job, TargetId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fetches the current server-side job list for a target.
pub trait SnapshotSource {
    fn fetch(&self, target: &TargetId) -> Result<Vec<Job>>;
}

impl<S: SnapshotSource + ?Sized> SnapshotSource for Arc<S> {
    fn fetch(&self, target: &TargetId) -> Result<Vec<Job>> {
        (**self).fetch(target)
    }
}

/// Identifies one bootstrap request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapTicket {
    pub target: TargetId,
    generation: u64,
}

/// What `begin_subscribe` decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscribeStep {
    /// Already subscribed (or bootstrapping) to this target; nothing to do.
    AlreadyActive,
    /// Fetch a snapshot for the ticket's target, then call `complete_subscribe`.
    Bootstrap(BootstrapTicket),
}

/// Lifecycle settings for a manager.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManagerOptions {
    /// Keep jobs in the store after unsubscribing (instant redisplay on
    /// resubscribe). Default: clear.
    pub retain_on_unsubscribe: bool,
}

/// Public entry point: owns the store, router and stream client.
///
/// At most one target is active at a time. Switching targets tears the old
/// channel down before the new bootstrap starts.
pub struct SubscriptionManager<S, T, C> {
    source: S,
    stream: StreamClient<T, C>,
    store: JobStore,
    router: EventRouter,
    options: ManagerOptions,

    active: Option<TargetId>,
    /// Bumped on every subscribe / unsubscribe; stale tickets are discarded.
    generation: u64,
    bootstrapping: Option<BootstrapTicket>,
    /// Target whose jobs were kept in the store by the last unsubscribe.
    retained: Option<TargetId>,
}

impl<S, T, C> SubscriptionManager<S, T, C>
where
    S: SnapshotSource,
    T: Transport,
    C: Clock,
{
    pub fn new(source: S, stream: StreamClient<T, C>, store: JobStore, options: ManagerOptions) -> Self {
        Self {
            source,
            stream,
            store,
            router: EventRouter::new(),
            options,
            active: None,
            generation: 0,
            bootstrapping: None,
            retained: None,
        }
    }

    /// Subscribe to `target`, fetching the snapshot synchronously.
    ///
    /// A no-op if already subscribed to `target` with a live or recovering
    /// channel. A bootstrap failure is returned and leaves nothing subscribed.
    pub fn subscribe(&mut self, target: TargetId) -> Result<()> {
        match self.begin_subscribe(target)? {
            SubscribeStep::AlreadyActive => Ok(()),
            SubscribeStep::Bootstrap(ticket) => {
                let snapshot = self.source.fetch(&ticket.target);
                self.complete_subscribe(&ticket, snapshot)
            }
        }
    }

    /// First half of `subscribe`: tear down any other subscription, clear the
    /// store, and issue a ticket for the bootstrap fetch.
    pub fn begin_subscribe(&mut self, target: TargetId) -> Result<SubscribeStep> {
        if !target.is_valid() {
            return Err(SyncError::InvalidTarget(target.0));
        }

        if self.active.as_ref() == Some(&target) {
            let bootstrapping = self
                .bootstrapping
                .as_ref()
                .is_some_and(|t| t.target == target);
            if bootstrapping || self.stream.is_active_for(&target) {
                debug!(target = %target, "already subscribed");
                return Ok(SubscribeStep::AlreadyActive);
            }
        }

        self.stream.disconnect();
        // Retained jobs stay visible until this target's snapshot replaces them.
        if self.retained.take().as_ref() != Some(&target) {
            self.store.clear();
        }
        self.generation += 1;

        let ticket = BootstrapTicket {
            target: target.clone(),
            generation: self.generation,
        };
        info!(target = %target, "subscribing");
        self.active = Some(target);
        self.bootstrapping = Some(ticket.clone());
        Ok(SubscribeStep::Bootstrap(ticket))
    }

    /// Second half of `subscribe`: apply the snapshot and open the stream.
    ///
    /// A ticket that is no longer current (the caller unsubscribed or switched
    /// targets meanwhile) is discarded without touching the store.
    pub fn complete_subscribe(
        &mut self,
        ticket: &BootstrapTicket,
        snapshot: Result<Vec<Job>>,
    ) -> Result<()> {
        if self.bootstrapping.as_ref() != Some(ticket) || ticket.generation != self.generation {
            debug!(target = %ticket.target, "discarding stale bootstrap result");
            return Ok(());
        }
        self.bootstrapping = None;

        let jobs = match snapshot {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(target = %ticket.target, error = %e, "bootstrap fetch failed");
                self.active = None;
                return Err(match e {
                    err @ SyncError::Bootstrap { .. } => err,
                    other => SyncError::Bootstrap {
                        target: ticket.target.clone(),
                        reason: other.to_string(),
                    },
                });
            }
        };

        let count = self.store.replace_all(jobs);
        info!(target = %ticket.target, jobs = count, "bootstrap applied");
        self.stream.connect(ticket.target.clone());
        Ok(())
    }

    /// Stop tracking the current target.
    pub fn unsubscribe(&mut self) {
        let target = self.active.take();
        if let Some(target) = &target {
            info!(target = %target, "unsubscribing");
        }
        self.generation += 1;
        self.bootstrapping = None;
        self.stream.disconnect();
        if self.options.retain_on_unsubscribe {
            if target.is_some() {
                self.retained = target;
            }
        } else {
            self.store.clear();
        }
    }

    /// Feed one transport event through the stream client and router.
    pub fn handle_channel_event(&mut self, channel: ChannelId, event: ChannelEvent) {
        if let Some(raw) = self.stream.handle(channel, event) {
            self.router.on_message(&raw, &mut self.store);
        }
    }

    /// Fire a due reconnect. Returns true if a connect attempt was made.
    pub fn poll(&mut self) -> bool {
        self.stream.poll()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.stream.next_deadline()
    }

    /// The bootstrap currently awaiting its snapshot, if any.
    pub fn pending_bootstrap(&self) -> Option<&BootstrapTicket> {
        self.bootstrapping.as_ref()
    }

    pub fn active_target(&self) -> Option<&TargetId> {
        self.active.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn attempt(&self) -> u32 {
        self.stream.attempt()
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn stream(&self) -> &StreamClient<T, C> {
        &self.stream
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn observers(&self) -> &Arc<ObserverSet> {
        self.store.observers()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// Current jobs, cloned.
    pub fn jobs(&self) -> Vec<Job> {
        self.store.list().cloned().collect()
    }
}
