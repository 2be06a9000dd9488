//! State module for tracking crawl progress
//!
//! `TaskState` is the lifecycle of a single URL inside the frontier.

mod task_state;

pub use task_state::TaskState;
