//! Behavioural tests for the request executor's pool sizing and shutdown drain.

use std::collections::HashMap;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use rstest::rstest;
use tempfile::NamedTempFile;
use tether_config::{DEFAULT_MAX_WORKERS, ExecutorSettings};

use crate::asyncreq::{AsyncKind, AsyncOp, AsyncRequest, Executor, ExecutorError, SelectSet};
use crate::dispatcher::Dispatcher;
use crate::health::HealthReporter;
use crate::shutdown::ShutdownState;

use super::support::{HealthEvent, RecordingHealthReporter, WAIT_TIMEOUT, pump_until, run_until};

/// Completion log used as the dispatcher context.
#[derive(Debug, Default)]
struct Completions {
    results: Vec<(AsyncKind, i64)>,
    off_thread: usize,
    threads: Vec<ThreadId>,
    requests: Vec<AsyncRequest>,
}

fn executor(
    settings: ExecutorSettings,
) -> (
    Dispatcher<Completions>,
    Executor<Completions>,
    Arc<RecordingHealthReporter>,
) {
    let dispatcher = Dispatcher::new();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let shared: Arc<dyn HealthReporter> = reporter.clone();
    let executor = Executor::new(dispatcher.poster(), settings, shared);
    (dispatcher, executor, reporter)
}

fn submit_recorded(executor: &Executor<Completions>, op: AsyncOp) -> Result<(), ExecutorError> {
    let dispatcher_thread = thread::current().id();
    executor.submit(AsyncRequest::new(op), move |log: &mut Completions, request| {
        if thread::current().id() != dispatcher_thread {
            log.off_thread += 1;
        }
        log.results.push((request.kind(), request.rval()));
    })
}

fn idle_select(timeout: Duration) -> AsyncOp {
    AsyncOp::Select {
        interest: SelectSet::default(),
        timeout,
        ready: None,
    }
}

#[rstest]
fn completions_run_on_the_dispatcher_thread() {
    let (dispatcher, executor, _) = executor(ExecutorSettings::new(4, 2));
    for _ in 0..10 {
        submit_recorded(&executor, AsyncOp::stat("/")).expect("submit should succeed");
    }

    let mut log = Completions::default();
    let finished = run_until(&dispatcher, &mut log, WAIT_TIMEOUT, |log| {
        log.results.len() == 10
    });

    assert!(finished, "only {} of 10 requests completed", log.results.len());
    assert_eq!(log.off_thread, 0);
    assert!(
        log.results
            .iter()
            .all(|(kind, rval)| *kind == AsyncKind::Stat && *rval == 0)
    );
    assert!(executor.stats().peak <= 4);
}

#[rstest]
fn worker_count_never_exceeds_the_cap() {
    let (dispatcher, executor, reporter) = executor(ExecutorSettings::default());
    for _ in 0..100 {
        submit_recorded(&executor, idle_select(Duration::from_millis(20)))
            .expect("submit should succeed");
    }

    let mut log = Completions::default();
    let finished = run_until(&dispatcher, &mut log, WAIT_TIMEOUT, |log| {
        log.results.len() == 100
    });

    assert!(finished, "only {} of 100 requests completed", log.results.len());
    let stats = executor.stats();
    assert!(stats.peak <= DEFAULT_MAX_WORKERS, "peak was {}", stats.peak);
    assert!(stats.peak > 1, "backlog should have fanned out to several workers");
    assert!(reporter.count(|event| matches!(event, HealthEvent::WorkerSpawned(_))) <= 100);
}

#[rstest]
fn shutdown_drains_backlog_before_workers_exit() {
    let (dispatcher, executor, reporter) = executor(ExecutorSettings::new(2, 2));
    for _ in 0..6 {
        submit_recorded(&executor, idle_select(Duration::from_millis(10)))
            .expect("submit should succeed");
    }
    executor.trigger_shutdown();
    let error = submit_recorded(&executor, AsyncOp::stat("/"))
        .expect_err("submissions after shutdown should be refused");
    assert_eq!(
        error,
        ExecutorError::ShuttingDown {
            kind: AsyncKind::Stat
        }
    );

    let tracker = executor.tracker();
    let mut log = Completions::default();
    let stopped = run_until(&dispatcher, &mut log, WAIT_TIMEOUT, move |_| {
        tracker.state() == ShutdownState::Stopped
    });

    assert!(stopped, "executor should report stopped");
    assert_eq!(log.results.len(), 6);
    let stats = executor.stats();
    assert_eq!(stats.running, 0);
    assert_eq!(stats.exited, stats.spawned);
    let exits = reporter.count(|event| matches!(event, HealthEvent::WorkerExited(_)));
    assert_eq!(exits, stats.spawned);
    assert_eq!(
        reporter.events().last(),
        Some(&HealthEvent::ExecutorStopped)
    );
}

#[rstest]
fn shutdown_without_workers_stops_immediately() {
    let (_dispatcher, executor, reporter) = executor(ExecutorSettings::default());

    executor.trigger_shutdown();
    executor.trigger_shutdown();

    assert_eq!(executor.tracker().state(), ShutdownState::Stopped);
    assert_eq!(reporter.events(), vec![HealthEvent::ExecutorStopped]);
}

#[rstest]
fn failed_calls_report_their_os_error() {
    let (dispatcher, executor, _) = executor(ExecutorSettings::new(1, 1));
    submit_recorded(&executor, AsyncOp::stat("/definitely/not/here"))
        .expect("submit should succeed");

    let mut log = Completions::default();
    run_until(&dispatcher, &mut log, WAIT_TIMEOUT, |log| !log.results.is_empty());

    assert_eq!(log.results, vec![(AsyncKind::Stat, -1)]);
}

fn submit_kept(executor: &Executor<Completions>, op: AsyncOp) -> Result<(), ExecutorError> {
    executor.submit(AsyncRequest::new(op), |log: &mut Completions, request| {
        log.threads.push(thread::current().id());
        log.results.push((request.kind(), request.rval()));
        log.requests.push(request);
    })
}

#[rstest]
fn off_dispatcher_submit_defers_the_worker_start() {
    let (dispatcher, executor, reporter) = executor(ExecutorSettings::new(2, 2));
    let remote = executor.clone();
    thread::spawn(move || {
        for _ in 0..3 {
            submit_kept(&remote, AsyncOp::stat("/")).expect("submit should succeed");
        }
    })
    .join()
    .expect("submitting thread");

    let reserved = executor.stats();
    assert_eq!(reserved.spawned, 0, "no worker may start off the dispatcher");
    assert!(reserved.starting >= 1);
    assert_eq!(reserved.queued, 3);

    let mut log = Completions::default();
    let finished = run_until(&dispatcher, &mut log, WAIT_TIMEOUT, |log| {
        log.results.len() == 3
    });

    assert!(finished, "only {} of 3 requests completed", log.results.len());
    let here = thread::current().id();
    assert!(log.threads.iter().all(|id| *id == here));
    assert!(executor.stats().spawned >= 1);
    assert_eq!(
        reporter.count(|event| matches!(event, HealthEvent::WorkerSpawned(_))),
        executor.stats().spawned
    );
}

#[rstest]
fn workers_beyond_the_idle_cap_exit_after_their_request() {
    let (dispatcher, executor, reporter) = executor(ExecutorSettings::new(4, 1));
    for _ in 0..4 {
        submit_recorded(&executor, idle_select(Duration::from_millis(50)))
            .expect("submit should succeed");
    }

    let mut log = Completions::default();
    let settled = pump_until(&dispatcher, &mut log, WAIT_TIMEOUT, |log| {
        let stats = executor.stats();
        log.results.len() == 4 && stats.running == 1 && stats.idle == 1
    });

    assert!(settled, "pool never settled: {:?}", executor.stats());
    let stats = executor.stats();
    assert!(stats.spawned > 1, "requests should have fanned out");
    assert_eq!(stats.exited, stats.spawned - 1);
    assert_eq!(
        reporter.count(|event| matches!(event, HealthEvent::WorkerExited(_))),
        stats.exited
    );
}

#[rstest]
fn shutdown_stops_idle_and_busy_workers_alike() {
    let (dispatcher, executor, reporter) = executor(ExecutorSettings::new(4, 4));
    for _ in 0..4 {
        submit_recorded(&executor, idle_select(Duration::from_millis(30)))
            .expect("submit should succeed");
    }
    let mut log = Completions::default();
    let parked = pump_until(&dispatcher, &mut log, WAIT_TIMEOUT, |log| {
        log.results.len() == 4 && executor.stats().idle == 4
    });
    assert!(parked, "workers never parked: {:?}", executor.stats());

    for _ in 0..2 {
        submit_recorded(&executor, idle_select(Duration::from_millis(300)))
            .expect("submit should succeed");
    }
    let busy = pump_until(&dispatcher, &mut log, WAIT_TIMEOUT, |_| {
        let stats = executor.stats();
        stats.queued == 0 && stats.idle == 2
    });
    assert!(busy, "parked workers never took the work: {:?}", executor.stats());
    let before = executor.stats();
    let (idle, running) = (before.idle, before.running - before.idle);
    assert_eq!((idle, running), (2, 2));

    executor.trigger_shutdown();
    let tracker = executor.tracker();
    let stopped = run_until(&dispatcher, &mut log, WAIT_TIMEOUT, move |_| {
        tracker.state() == ShutdownState::Stopped
    });

    assert!(stopped, "executor should report stopped");
    assert_eq!(log.results.len(), 6);
    assert_eq!(executor.stats().spawned, idle + running);
    assert_eq!(
        reporter.count(|event| matches!(event, HealthEvent::WorkerExited(_))),
        idle + running
    );
    assert_eq!(
        reporter.events().last(),
        Some(&HealthEvent::ExecutorStopped)
    );
}

#[rstest]
fn completed_requests_keep_their_parameters() {
    let mut file = NamedTempFile::new().expect("temporary file");
    file.write_all(b"0123456789").expect("seed file");
    let fd = file.as_raw_fd();
    let path = file.path().to_path_buf();
    let (dispatcher, executor, _) = executor(ExecutorSettings::new(4, 4));
    for op in [
        AsyncOp::seek_read(fd, 4, 3),
        AsyncOp::SeekWrite {
            fd,
            data: b"xy".to_vec(),
            offset: 12,
        },
        AsyncOp::stat(path.clone()),
        AsyncOp::Fstat { fd, stat: None },
    ] {
        submit_kept(&executor, op).expect("submit should succeed");
    }

    let mut log = Completions::default();
    let finished = run_until(&dispatcher, &mut log, WAIT_TIMEOUT, |log| {
        log.requests.len() == 4
    });
    assert!(finished, "only {} of 4 requests completed", log.requests.len());

    let by_kind: HashMap<AsyncKind, &AsyncRequest> = log
        .requests
        .iter()
        .map(|request| (request.kind(), request))
        .collect();
    let read = by_kind[&AsyncKind::SeekRead];
    assert!(matches!(read.op(), AsyncOp::SeekRead { fd: f, offset: 3, .. } if *f == fd));
    assert_eq!(read.received(), Some(&b"3456"[..]));
    let written = by_kind[&AsyncKind::SeekWrite];
    assert!(matches!(
        written.op(),
        AsyncOp::SeekWrite { fd: f, data, offset: 12 } if *f == fd && data == b"xy"
    ));
    assert_eq!(written.rval(), 2);
    assert!(matches!(
        by_kind[&AsyncKind::Stat].op(),
        AsyncOp::Stat { path: p, stat: Some(stat) } if *p == path && stat.is_file()
    ));
    assert!(matches!(
        by_kind[&AsyncKind::Fstat].op(),
        AsyncOp::Fstat { fd: f, stat: Some(_) } if *f == fd
    ));
}
