//! Test suites for the Tether agent transport core.

mod executor_behaviour;
mod lib_api;
mod support;
