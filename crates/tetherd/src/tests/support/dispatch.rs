//! Helpers for driving a dispatcher from a test thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_config::ExecutorSettings;

use crate::agent::Agent;
use crate::dispatcher::{Dispatcher, Poster};
use crate::health::HealthReporter;
use crate::peer::HostIdentity;

use super::reporter::RecordingHealthReporter;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const PUMP_SLICE: Duration = Duration::from_millis(20);

/// Upper bound for any single wait in the suite.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds an agent bound to a fresh dispatcher.
#[must_use]
pub fn test_agent(
    settings: ExecutorSettings,
) -> (Dispatcher<Agent>, Agent, Arc<RecordingHealthReporter>) {
    let dispatcher = Dispatcher::new();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let shared: Arc<dyn HealthReporter> = reporter.clone();
    let agent = Agent::new(
        dispatcher.poster(),
        settings,
        HostIdentity::named("Test Agent"),
        shared,
    );
    (dispatcher, agent, reporter)
}

/// Runs `dispatcher` until `done` holds for the context or `timeout`
/// passes, then returns the final value of `done`.
pub fn run_until<C, F>(
    dispatcher: &Dispatcher<C>,
    context: &mut C,
    timeout: Duration,
    done: F,
) -> bool
where
    C: 'static,
    F: Fn(&C) -> bool + Send + Sync + 'static,
{
    let done = Arc::new(done);
    let deadline = Instant::now() + timeout;
    let poster = dispatcher.poster();
    let check = Arc::clone(&done);
    let next = poster.clone();
    poster.post(move |context: &mut C| poll(context, &next, deadline, check));
    dispatcher.run(context);
    done(context)
}

/// Runs `dispatcher` in short slices until `done` holds or `timeout`
/// passes. `done` runs on the calling thread between slices, so it may
/// inspect state that is not `Send`.
pub fn pump_until<C, F>(
    dispatcher: &Dispatcher<C>,
    context: &mut C,
    timeout: Duration,
    mut done: F,
) -> bool
where
    C: 'static,
    F: FnMut(&C) -> bool,
{
    let deadline = Instant::now() + timeout;
    while !done(context) {
        if Instant::now() >= deadline {
            return false;
        }
        run_until(dispatcher, context, PUMP_SLICE, |_| false);
    }
    true
}

fn poll<C, F>(context: &mut C, poster: &Poster<C>, deadline: Instant, done: Arc<F>)
where
    C: 'static,
    F: Fn(&C) -> bool + Send + Sync + 'static,
{
    if done(context) || Instant::now() >= deadline {
        poster.cancel();
        return;
    }
    let next = poster.clone();
    poster.post_delayed(POLL_INTERVAL, move |context: &mut C| {
        poll(context, &next, deadline, done);
    });
}
