//! Shutdown coordination between subsystems.
//!
//! Each subsystem that must drain before the process exits registers a hook
//! with a [`ShutdownTracker`]. Triggering shutdown moves every tracker to
//! [`ShutdownState::Pending`] and runs the hook; the subsystem later reports
//! [`ShutdownState::Stopped`] once its own teardown has finished.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Lifecycle of a subsystem with respect to process shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Operating normally.
    Normal,
    /// Shutdown triggered; teardown in progress.
    Pending,
    /// Teardown finished.
    Stopped,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Normal => "normal",
            Self::Pending => "pending",
            Self::Stopped => "stopped",
        };
        formatter.write_str(label)
    }
}

/// Shared, thread-safe shutdown state of one subsystem.
#[derive(Debug, Clone)]
pub struct ShutdownTracker {
    state: Arc<Mutex<ShutdownState>>,
}

impl Default for ShutdownTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownTracker {
    /// Creates a tracker in the [`ShutdownState::Normal`] state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ShutdownState::Normal)),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` once shutdown has been triggered.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == ShutdownState::Pending
    }

    /// Marks the subsystem as draining.
    pub fn set_pending(&self) {
        self.set(ShutdownState::Pending);
    }

    /// Marks the subsystem as fully stopped.
    pub fn set_stopped(&self) {
        self.set(ShutdownState::Stopped);
    }

    /// Returns the subsystem to normal operation unless shutdown is pending.
    pub fn set_normal(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ShutdownState::Pending {
            *state = ShutdownState::Normal;
        }
    }

    fn set(&self, next: ShutdownState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

type TriggerFn<C> = Box<dyn FnMut(&mut C)>;

struct ShutdownHook<C> {
    name: &'static str,
    tracker: ShutdownTracker,
    on_trigger: TriggerFn<C>,
}

/// Ordered set of shutdown hooks owned by the dispatcher context.
pub struct ShutdownRegistry<C> {
    hooks: Vec<ShutdownHook<C>>,
    triggered: bool,
}

impl<C> Default for ShutdownRegistry<C> {
    fn default() -> Self {
        Self {
            hooks: Vec::new(),
            triggered: false,
        }
    }
}

impl<C> fmt::Debug for ShutdownRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field(
                "hooks",
                &self
                    .hooks
                    .iter()
                    .map(|hook| (hook.name, hook.tracker.state()))
                    .collect::<Vec<_>>(),
            )
            .field("triggered", &self.triggered)
            .finish()
    }
}

impl<C> ShutdownRegistry<C> {
    /// Registers `on_trigger` to run when shutdown begins.
    pub fn register<F>(&mut self, name: &'static str, tracker: ShutdownTracker, on_trigger: F)
    where
        F: FnMut(&mut C) + 'static,
    {
        self.hooks.push(ShutdownHook {
            name,
            tracker,
            on_trigger: Box::new(on_trigger),
        });
    }

    /// Returns `true` once [`trigger`](Self::trigger) has run.
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Returns `true` when every registered subsystem reports stopped.
    #[must_use]
    pub fn all_stopped(&self) -> bool {
        self.hooks
            .iter()
            .all(|hook| hook.tracker.state() == ShutdownState::Stopped)
    }

    /// Names of subsystems that have not stopped yet.
    #[must_use]
    pub fn outstanding(&self) -> Vec<&'static str> {
        self.hooks
            .iter()
            .filter(|hook| hook.tracker.state() != ShutdownState::Stopped)
            .map(|hook| hook.name)
            .collect()
    }

    /// Marks every tracker pending and runs each hook once, in registration
    /// order. Later calls are no-ops.
    ///
    /// The registry is usually a field of `context`; callers move it out for
    /// the duration of the call.
    pub fn trigger(&mut self, context: &mut C) {
        if self.triggered {
            return;
        }
        self.triggered = true;
        for hook in &mut self.hooks {
            if hook.tracker.state() != ShutdownState::Stopped {
                hook.tracker.set_pending();
            }
            (hook.on_trigger)(context);
        }
    }
}
