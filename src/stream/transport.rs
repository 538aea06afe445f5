//! Transport seam for push channels.

use crate::error::Result;
use crate::types::{ChannelId, TargetId};

/// Opens and closes push channels.
///
/// Implementations report what happens on a channel asynchronously, as
/// `ChannelEvent`s tagged with the `ChannelId` passed to `open`. An error
/// returned from `open` means the channel never started; it is handled like a
/// channel that closed immediately.
pub trait Transport {
    fn open(&mut self, channel: ChannelId, target: &TargetId) -> Result<()>;

    /// Stop a channel. No further events for it should be expected, and any
    /// that still arrive are ignored.
    fn close(&mut self, channel: ChannelId);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, channel: ChannelId, target: &TargetId) -> Result<()> {
        (**self).open(channel, target)
    }

    fn close(&mut self, channel: ChannelId) {
        (**self).close(channel)
    }
}
