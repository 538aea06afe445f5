//! Push channel client with an explicit reconnect state machine.
//!
//! ```text
//!               connect(target)
//!   any state ───────────────────▶ Connecting ──Opened──▶ Connected
//!                                     ▲   │                  │
//!                           timer due │   │ Closed / open    │ Closed
//!                                     │   ▼ error            ▼
//!                                  Reconnecting ◀────────────┘
//!                                     │
//!                                     │ attempts exhausted
//!                                     ▼
//!   disconnect() ─────────────────▶ Disconnected
//! ```
//!
//! Timers are not threads: a pending reconnect is a deadline that the owner
//! fires by calling [`StreamClient::poll`]. With a [`ManualClock`] the whole
//! machine can be stepped deterministically.

mod clock;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use transport::Transport;

use crate::observers::ObserverSet;
use crate::policy::ReconnectPolicy;
use crate::types::{ChannelEvent, ChannelId, ConnectionState, TargetId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A reconnect waiting for its deadline.
#[derive(Clone, Debug)]
struct PendingReconnect {
    target: TargetId,
    due: Instant,
}

/// Owns the single active channel and the reconnect attempt counter.
pub struct StreamClient<T, C = SystemClock> {
    transport: T,
    clock: C,
    policy: ReconnectPolicy,
    observers: Arc<ObserverSet>,

    state: ConnectionState,
    attempt: u32,
    /// Cleared on disconnect; reconnects only fire while it matches.
    target: Option<TargetId>,
    channel: Option<ChannelId>,
    next_channel: u64,
    pending: Option<PendingReconnect>,
}

impl<T: Transport, C: Clock> StreamClient<T, C> {
    pub fn new(transport: T, clock: C, policy: ReconnectPolicy, observers: Arc<ObserverSet>) -> Self {
        Self {
            transport,
            clock,
            policy,
            observers,
            state: ConnectionState::Disconnected,
            attempt: 0,
            target: None,
            channel: None,
            next_channel: 1,
            pending: None,
        }
    }

    /// Open a channel to `target`, replacing any channel or pending retry.
    pub fn connect(&mut self, target: TargetId) {
        self.pending = None;
        self.attempt = 0;
        self.target = Some(target);
        self.open_channel();
    }

    /// Stop everything: cancel the pending retry, close the channel and forget
    /// the target. Nothing scheduled before this call can reopen a channel.
    pub fn disconnect(&mut self) {
        if let Some(target) = &self.target {
            debug!(target = %target, "disconnecting stream");
        }
        self.pending = None;
        self.close_channel();
        self.target = None;
        self.attempt = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Apply one transport event. Returns the payload to route, if any.
    ///
    /// Events from any channel other than the current one are ignored.
    pub fn handle(&mut self, channel: ChannelId, event: ChannelEvent) -> Option<String> {
        if self.channel != Some(channel) {
            debug!(channel = %channel, "ignoring event from stale channel");
            return None;
        }

        match event {
            ChannelEvent::Opened => {
                if self.state == ConnectionState::Connecting {
                    self.attempt = 0;
                    self.set_state(ConnectionState::Connected);
                    if let Some(target) = &self.target {
                        info!(target = %target, channel = %channel, "stream connected");
                    }
                }
                None
            }
            ChannelEvent::Message(raw) => {
                if self.state == ConnectionState::Connected {
                    Some(raw)
                } else {
                    debug!(channel = %channel, state = %self.state, "message before open, ignoring");
                    None
                }
            }
            ChannelEvent::Closed { reason } => {
                self.on_failure(reason);
                None
            }
        }
    }

    /// Fire the pending reconnect if its deadline has passed.
    ///
    /// Returns true if a new connect attempt was made.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.now();
        let pending = match self.pending.take() {
            Some(p) if p.due <= now => p,
            other => {
                self.pending = other;
                return false;
            }
        };

        if self.target.as_ref() != Some(&pending.target) {
            debug!(target = %pending.target, "discarding reconnect for inactive target");
            return false;
        }

        debug!(target = %pending.target, attempt = self.attempt, "reconnecting");
        self.open_channel();
        true
    }

    /// Deadline of the pending reconnect, if one is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Time left until the pending reconnect, if one is scheduled.
    pub fn time_until_reconnect(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|due| due.saturating_duration_since(self.clock.now()))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn target(&self) -> Option<&TargetId> {
        self.target.as_ref()
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// True if `target` is the current target and the client has not given up.
    pub fn is_active_for(&self, target: &TargetId) -> bool {
        self.target.as_ref() == Some(target) && self.state != ConnectionState::Disconnected
    }

    fn open_channel(&mut self) {
        self.close_channel();
        let Some(target) = self.target.clone() else {
            return;
        };

        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channel = Some(id);
        self.set_state(ConnectionState::Connecting);
        debug!(target = %target, channel = %id, attempt = self.attempt, "opening channel");

        if let Err(e) = self.transport.open(id, &target) {
            warn!(target = %target, channel = %id, error = %e, "failed to open channel");
            self.on_failure(Some(e.to_string()));
        }
    }

    fn close_channel(&mut self) {
        if let Some(id) = self.channel.take() {
            self.transport.close(id);
        }
    }

    fn on_failure(&mut self, reason: Option<String>) {
        self.close_channel();
        let Some(target) = self.target.clone() else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        if self.policy.should_retry(self.attempt) {
            let delay = self.policy.delay_for(self.attempt);
            self.attempt += 1;
            self.pending = Some(PendingReconnect {
                target: target.clone(),
                due: self.clock.now() + delay,
            });
            warn!(
                target = %target,
                attempt = self.attempt,
                delay_ms = delay.as_millis() as u64,
                reason = reason.as_deref().unwrap_or("closed"),
                "stream lost, scheduling reconnect"
            );
            self.set_state(ConnectionState::Reconnecting);
        } else {
            warn!(
                target = %target,
                attempts = self.attempt,
                "reconnect attempts exhausted, giving up"
            );
            self.pending = None;
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.observers.publish_connection(state, self.attempt);
    }
}
