//! Lifecycle listener lists.

use std::fmt;
use std::rc::Rc;

use super::ChannelId;
use crate::agent::Agent;

/// Callback invoked on the dispatcher thread for a channel lifecycle event.
///
/// Listeners may themselves cause further lifecycle events, so the same
/// listener can be re-entered for another channel before it returns.
pub type ChannelListener = Rc<dyn Fn(&mut Agent, ChannelId)>;

/// Channel lifecycle events that listeners can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEvent {
    /// A transport constructed the channel.
    Created,
    /// The channel completed its handshake.
    Opened,
    /// The channel was closed.
    Closed,
}

/// Ordered listener lists, one per [`ChannelEvent`].
#[derive(Default)]
pub struct ChannelListeners {
    created: Vec<ChannelListener>,
    opened: Vec<ChannelListener>,
    closed: Vec<ChannelListener>,
}

impl fmt::Debug for ChannelListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelListeners")
            .field("created", &self.created.len())
            .field("opened", &self.opened.len())
            .field("closed", &self.closed.len())
            .finish()
    }
}

impl ChannelListeners {
    /// Appends `listener` to the list for `event`.
    pub fn add(&mut self, event: ChannelEvent, listener: ChannelListener) {
        self.slot(event).push(listener);
    }

    /// Number of listeners registered for `event`.
    #[must_use]
    pub fn count(&self, event: ChannelEvent) -> usize {
        match event {
            ChannelEvent::Created => self.created.len(),
            ChannelEvent::Opened => self.opened.len(),
            ChannelEvent::Closed => self.closed.len(),
        }
    }

    fn slot(&mut self, event: ChannelEvent) -> &mut Vec<ChannelListener> {
        match event {
            ChannelEvent::Created => &mut self.created,
            ChannelEvent::Opened => &mut self.opened,
            ChannelEvent::Closed => &mut self.closed,
        }
    }

    /// Listeners registered for `event` at this moment.
    fn snapshot(&mut self, event: ChannelEvent) -> Vec<ChannelListener> {
        self.slot(event).clone()
    }
}

impl Agent {
    /// Registers `listener` for `event` on every channel.
    pub fn add_channel_listener<F>(&mut self, event: ChannelEvent, listener: F)
    where
        F: Fn(&mut Self, ChannelId) + 'static,
    {
        self.listeners.add(event, Rc::new(listener));
    }

    /// Runs the listeners for `event` in registration order. Listeners added
    /// while the notification runs first see the next event.
    pub(super) fn notify_listeners(&mut self, event: ChannelEvent, channel: ChannelId) {
        for listener in self.listeners.snapshot(event) {
            listener(self, channel);
        }
    }
}
