//! Bounded worker pool running blocking requests off the dispatcher thread.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tether_config::ExecutorSettings;
use tracing::{debug, error, info, trace, warn};

use super::ASYNCREQ_TARGET;
use super::errors::ExecutorError;
use super::request::{AsyncRequest, OsError};
use crate::dispatcher::Poster;
use crate::health::HealthReporter;
use crate::shutdown::ShutdownTracker;

type Completion<C> = Box<dyn FnOnce(&mut C, AsyncRequest) + Send + 'static>;

struct Job<C> {
    request: AsyncRequest,
    done: Completion<C>,
}

struct Pool<C> {
    backlog: VecDeque<Job<C>>,
    idle: usize,
    starting: usize,
    running: usize,
    peak: usize,
    next_worker: usize,
    spawned: usize,
    exited: usize,
    draining: bool,
    workers: HashMap<usize, JoinHandle<()>>,
}

struct Shared<C> {
    pool: Mutex<Pool<C>>,
    wake: Condvar,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Pool<C>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorStats {
    /// Workers alive or reserved, including those still starting.
    pub running: usize,
    /// Workers parked waiting for a request.
    pub idle: usize,
    /// Workers reserved but not yet running their loop.
    pub starting: usize,
    /// Requests waiting for a worker.
    pub queued: usize,
    /// Highest value `running` has reached.
    pub peak: usize,
    /// Worker threads started so far.
    pub spawned: usize,
    /// Worker threads reaped so far.
    pub exited: usize,
}

/// Runs [`AsyncRequest`]s on worker threads and delivers each result to the
/// dispatcher as a posted callback.
///
/// At most `max_workers` threads exist at once; surplus requests wait in a
/// FIFO backlog. Workers are started lazily and park when idle, exiting once
/// more than `max_idle_workers` are parked. A worker posts the completion and
/// decides whether to take the next request, park or exit inside one critical
/// section, so a callback that submits again always finds that worker
/// accounted for.
pub struct Executor<C> {
    shared: Arc<Shared<C>>,
    poster: Poster<C>,
    settings: ExecutorSettings,
    reporter: Arc<dyn HealthReporter>,
    tracker: ShutdownTracker,
}

impl<C> Clone for Executor<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            poster: self.poster.clone(),
            settings: self.settings,
            reporter: Arc::clone(&self.reporter),
            tracker: self.tracker.clone(),
        }
    }
}

impl<C> fmt::Debug for Executor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("settings", &self.settings)
            .field("state", &self.tracker.state())
            .finish_non_exhaustive()
    }
}

impl<C: 'static> Executor<C> {
    /// Creates an executor with no workers; threads start on first submit.
    #[must_use]
    pub fn new(
        poster: Poster<C>,
        settings: ExecutorSettings,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pool: Mutex::new(Pool {
                    backlog: VecDeque::new(),
                    idle: 0,
                    starting: 0,
                    running: 0,
                    peak: 0,
                    next_worker: 0,
                    spawned: 0,
                    exited: 0,
                    draining: false,
                    workers: HashMap::new(),
                }),
                wake: Condvar::new(),
            }),
            poster,
            settings,
            reporter,
            tracker: ShutdownTracker::new(),
        }
    }

    /// Shutdown state shared with the agent's shutdown registry.
    #[must_use]
    pub fn tracker(&self) -> ShutdownTracker {
        self.tracker.clone()
    }

    /// Pool sizing in effect.
    #[must_use]
    pub const fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    /// Current pool counters.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        let pool = self.shared.lock();
        ExecutorStats {
            running: pool.running,
            idle: pool.idle,
            starting: pool.starting,
            queued: pool.backlog.len(),
            peak: pool.peak,
            spawned: pool.spawned,
            exited: pool.exited,
        }
    }

    /// Queues `request`; `done` runs on the dispatcher thread with the
    /// completed request.
    ///
    /// May be called from any thread. When called off the dispatcher, any
    /// worker start is deferred to the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ShuttingDown`] once shutdown has been
    /// triggered; `done` is dropped without running.
    pub fn submit<F>(&self, request: AsyncRequest, done: F) -> Result<(), ExecutorError>
    where
        F: FnOnce(&mut C, AsyncRequest) + Send + 'static,
    {
        let kind = request.kind();
        let mut pool = self.shared.lock();
        if pool.draining {
            return Err(ExecutorError::ShuttingDown { kind });
        }
        pool.backlog.push_back(Job {
            request,
            done: Box::new(done),
        });
        if pool.idle > 0 {
            self.shared.wake.notify_one();
        }
        let reserved = self.reserve_worker(&mut pool);
        let queued = pool.backlog.len();
        drop(pool);

        trace!(target: ASYNCREQ_TARGET, %kind, queued, "request submitted");
        if let Some(worker) = reserved {
            if self.poster.is_dispatcher_thread() {
                self.start_worker(worker);
            } else {
                let executor = self.clone();
                self.poster.post(move |_| executor.start_worker(worker));
            }
        }
        Ok(())
    }

    /// Stops accepting requests and wakes parked workers so they exit.
    ///
    /// Queued and in-flight requests still complete. The tracker reports
    /// stopped once the last worker has been reaped.
    pub fn trigger_shutdown(&self) {
        let mut pool = self.shared.lock();
        if pool.draining {
            return;
        }
        pool.draining = true;
        self.tracker.set_pending();
        let running = pool.running;
        let idle = pool.idle;
        drop(pool);
        self.shared.wake.notify_all();

        info!(
            target: ASYNCREQ_TARGET,
            running,
            idle,
            "executor shutdown triggered"
        );
        if running == 0 {
            self.finish_shutdown();
        }
    }

    /// Reserves a worker slot when queued work exceeds the workers able to
    /// take it.
    fn reserve_worker(&self, pool: &mut Pool<C>) -> Option<usize> {
        if pool.backlog.len() <= pool.idle + pool.starting
            || pool.running >= self.settings.max_workers
        {
            return None;
        }
        let worker = pool.next_worker;
        pool.next_worker += 1;
        pool.running += 1;
        pool.starting += 1;
        pool.peak = pool.peak.max(pool.running);
        Some(worker)
    }

    fn start_worker(&self, worker: usize) {
        let executor = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("tether-worker-{worker}"))
            .spawn(move || executor.work(worker));
        match spawned {
            Ok(handle) => {
                let mut pool = self.shared.lock();
                pool.workers.insert(worker, handle);
                pool.spawned += 1;
                let running = pool.running;
                drop(pool);
                debug!(target: ASYNCREQ_TARGET, worker, running, "worker started");
                self.reporter.worker_spawned(worker, running);
            }
            Err(spawn_error) => {
                let code = spawn_error.raw_os_error().unwrap_or(libc::EAGAIN);
                let mut pool = self.shared.lock();
                pool.running -= 1;
                pool.starting -= 1;
                let orphaned: Vec<Job<C>> = if pool.running == 0 {
                    pool.backlog.drain(..).collect()
                } else {
                    Vec::new()
                };
                let stopped = pool.draining && pool.running == 0;
                drop(pool);

                error!(
                    target: ASYNCREQ_TARGET,
                    worker,
                    error = %spawn_error,
                    orphaned = orphaned.len(),
                    "failed to start worker thread"
                );
                for Job { mut request, done } in orphaned {
                    request.fail(OsError::from_raw(code));
                    self.poster.post(move |context| done(context, request));
                }
                if stopped {
                    self.finish_shutdown();
                }
            }
        }
    }

    fn work(&self, worker: usize) {
        let mut pool = self.shared.lock();
        pool.starting -= 1;
        loop {
            let (guard, job) = self.next_job(pool);
            pool = guard;
            let Some(Job { mut request, done }) = job else {
                break;
            };
            drop(pool);

            request.execute();
            trace!(
                target: ASYNCREQ_TARGET,
                kind = %request.kind(),
                rval = request.rval(),
                "request executed"
            );

            pool = self.shared.lock();
            self.poster.post(move |context| done(context, request));
        }
        drop(pool);

        let executor = self.clone();
        self.poster.post(move |_| executor.reap_worker(worker));
    }

    /// Takes the next queued job, parking while the backlog is empty.
    /// Returns `None` when the worker should exit.
    fn next_job<'a>(
        &'a self,
        mut pool: MutexGuard<'a, Pool<C>>,
    ) -> (MutexGuard<'a, Pool<C>>, Option<Job<C>>) {
        loop {
            if let Some(job) = pool.backlog.pop_front() {
                return (pool, Some(job));
            }
            if pool.draining || pool.idle >= self.settings.max_idle_workers {
                return (pool, None);
            }
            pool.idle += 1;
            pool = self
                .shared
                .wake
                .wait(pool)
                .unwrap_or_else(PoisonError::into_inner);
            pool.idle -= 1;
        }
    }

    fn reap_worker(&self, worker: usize) {
        let mut pool = self.shared.lock();
        let handle = pool.workers.remove(&worker);
        pool.running -= 1;
        pool.exited += 1;
        let running = pool.running;
        let stopped = pool.draining && running == 0;
        let replacement = if pool.draining {
            None
        } else {
            self.reserve_worker(&mut pool)
        };
        drop(pool);

        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!(target: ASYNCREQ_TARGET, worker, "worker thread panicked");
        }
        debug!(target: ASYNCREQ_TARGET, worker, running, "worker exited");
        self.reporter.worker_exited(worker, running);

        if let Some(next) = replacement {
            self.start_worker(next);
        }
        if stopped {
            self.finish_shutdown();
        }
    }

    fn finish_shutdown(&self) {
        self.tracker.set_stopped();
        info!(target: ASYNCREQ_TARGET, "executor stopped");
        self.reporter.executor_stopped();
    }
}
