//! Poller
//!
//! The fixed-interval loop that pulls weather for every configured location
//! and pushes it into the metric sink.

mod poll_loop;

pub use poll_loop::{CycleReport, PollLoop, PollLoopConfig, PollState};
