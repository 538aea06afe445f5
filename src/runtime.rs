//! Single-threaded event loop driving a `SubscriptionManager`.
//!
//! Every state change happens on the loop thread, in the order events reach
//! its queue. Transports, bootstrap fetches and callers only ever enqueue
//! `LoopEvent`s. The loop sleeps until the next event or the next reconnect
//! deadline, whichever comes first.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::observers::{DropReason, ObserverConfig, ObserverHandle, ObserverSet};
use crate::policy::ReconnectPolicy;
use crate::store::JobStore;
use crate::stream::{Clock, StreamClient, SystemClock, Transport};
use crate::subscription::{
    BootstrapTicket, ManagerOptions, SnapshotSource, SubscribeStep, SubscriptionManager,
};
use crate::types::{ChannelEvent, ChannelId, Job, TargetId};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Work items for the loop thread.
pub enum LoopEvent {
    /// Something happened on a transport channel.
    Channel {
        channel: ChannelId,
        event: ChannelEvent,
    },
    /// A bootstrap fetch finished.
    Bootstrap {
        ticket: BootstrapTicket,
        result: Result<Vec<Job>>,
    },
    Subscribe {
        target: TargetId,
        reply: Sender<Result<()>>,
    },
    Unsubscribe {
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

/// Cloneable sender side of the loop queue, handed to transports.
#[derive(Clone)]
pub struct EventSink {
    sender: Sender<LoopEvent>,
}

impl EventSink {
    /// Report a channel event. Returns false once the loop has stopped.
    pub fn channel_event(&self, channel: ChannelId, event: ChannelEvent) -> bool {
        self.send(LoopEvent::Channel { channel, event })
    }

    pub fn send(&self, event: LoopEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Create the loop queue.
pub fn event_queue() -> (EventSink, Receiver<LoopEvent>) {
    let (sender, receiver) = unbounded();
    (EventSink { sender }, receiver)
}

/// The loop itself. Construct, then `run` on the current thread or `spawn`.
pub struct EventLoop<S, T, C> {
    manager: SubscriptionManager<S, T, C>,
    sink: EventSink,
    events: Receiver<LoopEvent>,
    /// Subscribe callers waiting for their bootstrap to finish.
    waiting: Vec<(BootstrapTicket, Sender<Result<()>>)>,
}

impl<S, T> EventLoop<S, T, SystemClock>
where
    S: SnapshotSource + Clone + Send + 'static,
    T: Transport,
{
    /// Wire a complete loop from a config. `make_transport` receives the sink
    /// the transport must report channel events to.
    pub fn from_config(
        config: &SyncConfig,
        source: S,
        make_transport: impl FnOnce(EventSink) -> T,
    ) -> Result<Self> {
        config.validate()?;
        let (sink, events) = event_queue();
        let observers = Arc::new(ObserverSet::with_buffer_size(config.observer_buffer));

        let stream = StreamClient::new(
            make_transport(sink.clone()),
            SystemClock,
            ReconnectPolicy::from(&config.reconnect),
            Arc::clone(&observers),
        );
        let store = JobStore::with_observers(observers, config.merge_policy);
        let options = ManagerOptions {
            retain_on_unsubscribe: config.retain_on_unsubscribe,
        };

        Ok(Self::new(
            SubscriptionManager::new(source, stream, store, options),
            sink,
            events,
        ))
    }
}

impl<S, T, C> EventLoop<S, T, C>
where
    S: SnapshotSource + Clone + Send + 'static,
    T: Transport,
    C: Clock,
{
    pub fn new(
        manager: SubscriptionManager<S, T, C>,
        sink: EventSink,
        events: Receiver<LoopEvent>,
    ) -> Self {
        Self {
            manager,
            sink,
            events,
            waiting: Vec::new(),
        }
    }

    /// Process events until a `Shutdown` event arrives.
    pub fn run(mut self) {
        loop {
            self.manager.poll();

            let next = match self.manager.stream().time_until_reconnect() {
                Some(wait) => match self.events.recv_timeout(wait) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => None,
                },
                None => self.events.recv().ok(),
            };

            match next {
                Some(event) => {
                    if !self.dispatch(event) {
                        break;
                    }
                }
                None => break,
            }
        }

        debug!("sync loop stopping");
        self.manager.unsubscribe();
        self.answer_all(|| Err(SyncError::LoopClosed));
        self.manager.observers().close_all(DropReason::Shutdown);
    }

    /// Apply one event. Returns false on shutdown.
    fn dispatch(&mut self, event: LoopEvent) -> bool {
        match event {
            LoopEvent::Channel { channel, event } => {
                self.manager.handle_channel_event(channel, event);
            }
            LoopEvent::Bootstrap { ticket, result } => {
                let outcome = self.manager.complete_subscribe(&ticket, result);
                self.answer(&ticket, outcome);
            }
            LoopEvent::Subscribe { target, reply } => self.subscribe(target, reply),
            LoopEvent::Unsubscribe { reply } => {
                self.manager.unsubscribe();
                self.answer_all(|| Ok(()));
                let _ = reply.send(Ok(()));
            }
            LoopEvent::Shutdown => return false,
        }
        true
    }

    fn subscribe(&mut self, target: TargetId, reply: Sender<Result<()>>) {
        match self.manager.begin_subscribe(target) {
            Err(e) => {
                let _ = reply.send(Err(e));
            }
            Ok(SubscribeStep::AlreadyActive) => match self.manager.pending_bootstrap() {
                // Same target still bootstrapping: wait for that result
                Some(ticket) => self.waiting.push((ticket.clone(), reply)),
                None => {
                    let _ = reply.send(Ok(()));
                }
            },
            Ok(SubscribeStep::Bootstrap(ticket)) => {
                // Earlier callers were superseded by this subscribe
                self.answer_all(|| Ok(()));
                self.waiting.push((ticket.clone(), reply));
                self.spawn_fetch(ticket);
            }
        }
    }

    fn spawn_fetch(&self, ticket: BootstrapTicket) {
        let source = self.manager.source().clone();
        let sink = self.sink.clone();
        let spawned = thread::Builder::new()
            .name("jobstream-bootstrap".to_string())
            .spawn({
                let ticket = ticket.clone();
                move || {
                    let result = source.fetch(&ticket.target);
                    sink.send(LoopEvent::Bootstrap { ticket, result });
                }
            });

        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn bootstrap thread");
            self.sink.send(LoopEvent::Bootstrap {
                ticket,
                result: Err(SyncError::Io(e)),
            });
        }
    }

    /// Reply to every caller waiting on `ticket`.
    fn answer(&mut self, ticket: &BootstrapTicket, outcome: Result<()>) {
        let (matching, rest): (Vec<_>, Vec<_>) =
            self.waiting.drain(..).partition(|(t, _)| t == ticket);
        self.waiting = rest;

        let reason = match &outcome {
            Ok(()) => None,
            Err(SyncError::Bootstrap { reason, .. }) => Some(reason.clone()),
            Err(e) => Some(e.to_string()),
        };
        let mut outcome = Some(outcome);
        for (_, reply) in matching {
            // The first waiter gets the original error, others a copy of it.
            let result = outcome.take().unwrap_or_else(|| match &reason {
                None => Ok(()),
                Some(reason) => Err(SyncError::Bootstrap {
                    target: ticket.target.clone(),
                    reason: reason.clone(),
                }),
            });
            let _ = reply.send(result);
        }
    }

    fn answer_all(&mut self, result: impl Fn() -> Result<()>) {
        for (_, reply) in self.waiting.drain(..) {
            let _ = reply.send(result());
        }
    }
}

impl<S, T, C> EventLoop<S, T, C>
where
    S: SnapshotSource + Clone + Send + 'static,
    T: Transport + Send + 'static,
    C: Clock + Send + 'static,
{
    /// Run the loop on a dedicated thread.
    pub fn spawn(self) -> Result<EventLoopHandle> {
        let sender = self.sink.sender.clone();
        let observers = Arc::clone(self.manager.observers());
        let thread = thread::Builder::new()
            .name("jobstream-sync".to_string())
            .spawn(move || self.run())?;

        Ok(EventLoopHandle {
            sender,
            observers,
            thread: Some(thread),
        })
    }
}

/// Caller-side handle to a spawned loop.
pub struct EventLoopHandle {
    sender: Sender<LoopEvent>,
    observers: Arc<ObserverSet>,
    thread: Option<JoinHandle<()>>,
}

impl EventLoopHandle {
    /// Subscribe and wait until the bootstrap snapshot is applied or fails.
    pub fn subscribe(&self, target: impl Into<TargetId>) -> Result<()> {
        let (reply, response) = bounded(1);
        self.sender
            .send(LoopEvent::Subscribe {
                target: target.into(),
                reply,
            })
            .map_err(|_| SyncError::LoopClosed)?;
        response.recv().map_err(|_| SyncError::LoopClosed)?
    }

    pub fn unsubscribe(&self) -> Result<()> {
        let (reply, response) = bounded(1);
        self.sender
            .send(LoopEvent::Unsubscribe { reply })
            .map_err(|_| SyncError::LoopClosed)?;
        response.recv().map_err(|_| SyncError::LoopClosed)?
    }

    pub fn observe(&self, config: ObserverConfig) -> ObserverHandle {
        self.observers.observe(config)
    }

    pub fn observers(&self) -> &Arc<ObserverSet> {
        &self.observers
    }

    /// Stop the loop and wait for its thread.
    pub fn shutdown(mut self) -> Result<()> {
        let _ = self.sender.send(LoopEvent::Shutdown);
        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| SyncError::LoopClosed)?;
        }
        Ok(())
    }
}

impl Drop for EventLoopHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.sender.send(LoopEvent::Shutdown);
        }
    }
}
