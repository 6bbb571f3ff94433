//! Cooperative event dispatcher.
//!
//! A [`Dispatcher`] runs callbacks one at a time on a single thread. Each
//! callback receives exclusive access to the dispatcher's context value, so
//! state owned by that context (channels, broadcast groups, listener lists)
//! never needs a lock. Other threads interact with the dispatcher only by
//! posting callbacks through a [`Poster`].

mod timer;

use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use self::timer::Timer;

pub(crate) const DISPATCHER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatcher");

/// Callback executed on the dispatcher thread.
pub type Event<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

struct Queue<C> {
    ready: VecDeque<Event<C>>,
    timers: BinaryHeap<Timer<C>>,
    sequence: u64,
    cancelled: bool,
    owner: ThreadId,
}

struct Shared<C> {
    queue: Mutex<Queue<C>>,
    wake: Condvar,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Queue<C>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Event loop owning the queue of pending callbacks.
///
/// The thread that creates the dispatcher is treated as the dispatcher thread
/// until [`Dispatcher::run`] is entered, at which point the running thread
/// takes over that role.
pub struct Dispatcher<C> {
    shared: Arc<Shared<C>>,
}

/// Thread-safe handle used to submit callbacks to a [`Dispatcher`].
pub struct Poster<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Poster<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> std::fmt::Debug for Poster<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poster").finish_non_exhaustive()
    }
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Dispatcher<C> {
    /// Creates an empty dispatcher owned by the calling thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    ready: VecDeque::new(),
                    timers: BinaryHeap::new(),
                    sequence: 0,
                    cancelled: false,
                    owner: thread::current().id(),
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Returns a handle that can post callbacks from any thread.
    #[must_use]
    pub fn poster(&self) -> Poster<C> {
        Poster {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs callbacks until [`Poster::cancel`] is called.
    ///
    /// Callbacks run to completion in FIFO order; delayed callbacks join the
    /// ready queue once their deadline passes. Callbacks still queued when the
    /// loop is cancelled stay queued for a later `run`.
    pub fn run(&self, context: &mut C) {
        self.shared.lock().owner = thread::current().id();
        debug!(target: DISPATCHER_TARGET, "dispatcher loop started");
        while let Some(event) = self.next_event() {
            event(context);
        }
        debug!(target: DISPATCHER_TARGET, "dispatcher loop cancelled");
    }

    fn next_event(&self) -> Option<Event<C>> {
        let mut queue = self.shared.lock();
        loop {
            if queue.cancelled {
                queue.cancelled = false;
                return None;
            }
            let now = Instant::now();
            while queue
                .timers
                .peek()
                .is_some_and(|timer| timer.deadline <= now)
            {
                if let Some(timer) = queue.timers.pop() {
                    queue.ready.push_back(timer.event);
                }
            }
            if let Some(event) = queue.ready.pop_front() {
                return Some(event);
            }
            queue = match queue.timers.peek().map(|timer| timer.deadline) {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(now);
                    self.shared
                        .wake
                        .wait_timeout(queue, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .shared
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

impl<C> Poster<C> {
    /// Queues `event` to run on the dispatcher thread.
    pub fn post<F>(&self, event: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let mut queue = self.shared.lock();
        queue.ready.push_back(Box::new(event));
        drop(queue);
        self.shared.wake.notify_one();
    }

    /// Queues `event` to run no earlier than `delay` from now.
    pub fn post_delayed<F>(&self, delay: Duration, event: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let mut queue = self.shared.lock();
        queue.sequence += 1;
        let sequence = queue.sequence;
        queue.timers.push(Timer {
            deadline,
            sequence,
            event: Box::new(event),
        });
        drop(queue);
        trace!(
            target: DISPATCHER_TARGET,
            delay_us = delay.as_micros(),
            "delayed event posted"
        );
        self.shared.wake.notify_one();
    }

    /// Returns `true` when called on the dispatcher thread.
    #[must_use]
    pub fn is_dispatcher_thread(&self) -> bool {
        self.shared.lock().owner == thread::current().id()
    }

    /// Stops [`Dispatcher::run`] after the callback currently executing.
    pub fn cancel(&self) {
        self.shared.lock().cancelled = true;
        self.shared.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn runs_posted_events_in_fifo_order() {
        let dispatcher = Dispatcher::<Vec<u32>>::new();
        let poster = dispatcher.poster();
        for value in 0..5 {
            poster.post(move |log: &mut Vec<u32>| log.push(value));
        }
        let cancel = poster.clone();
        poster.post(move |_| cancel.cancel());

        let mut log = Vec::new();
        dispatcher.run(&mut log);
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
    }

    #[rstest]
    fn delayed_events_fire_after_ready_events() {
        let dispatcher = Dispatcher::<Vec<&'static str>>::new();
        let poster = dispatcher.poster();
        let cancel = poster.clone();
        poster.post_delayed(Duration::from_millis(30), move |log: &mut Vec<&'static str>| {
            log.push("late");
            cancel.cancel();
        });
        poster.post_delayed(Duration::from_millis(10), |log: &mut Vec<&'static str>| {
            log.push("early");
        });
        poster.post(|log: &mut Vec<&'static str>| log.push("now"));

        let mut log = Vec::new();
        let started = Instant::now();
        dispatcher.run(&mut log);
        assert_eq!(log, vec!["now", "early", "late"]);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[rstest]
    fn events_posted_from_other_threads_run_on_dispatcher() {
        let dispatcher = Dispatcher::<Vec<bool>>::new();
        let poster = dispatcher.poster();
        let remote = poster.clone();
        let handle = thread::spawn(move || {
            assert!(!remote.is_dispatcher_thread());
            let check = remote.clone();
            let cancel = remote.clone();
            remote.post(move |log: &mut Vec<bool>| {
                log.push(check.is_dispatcher_thread());
                cancel.cancel();
            });
        });
        handle.join().expect("poster thread should finish");

        let mut log = Vec::new();
        dispatcher.run(&mut log);
        assert_eq!(log, vec![true]);
        assert!(poster.is_dispatcher_thread());
    }

    #[rstest]
    fn cancel_leaves_remaining_events_queued() {
        let dispatcher = Dispatcher::<Vec<u32>>::new();
        let poster = dispatcher.poster();
        let cancel = poster.clone();
        poster.post(move |log: &mut Vec<u32>| {
            log.push(1);
            cancel.cancel();
        });
        poster.post(|log: &mut Vec<u32>| log.push(2));
        let cancel = poster.clone();
        poster.post(move |_| cancel.cancel());

        let mut log = Vec::new();
        dispatcher.run(&mut log);
        assert_eq!(log, vec![1]);
        dispatcher.run(&mut log);
        assert_eq!(log, vec![1, 2]);
    }
}
