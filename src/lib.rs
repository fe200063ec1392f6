//! Backlogsmith - cancellable AI generation jobs
//!
//! Turns a project proposal into a validated, four-level backlog while a
//! registry and watchdog keep every job cancellable and bounded in time.

pub mod cli;
pub mod core;
pub mod fs;
pub mod logging;
