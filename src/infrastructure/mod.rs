//! Infrastructure Layer
//!
//! Cycle scheduling and process lifecycle.

pub mod scheduler;
pub mod shutdown;

pub use scheduler::Scheduler;
pub use shutdown::{shutdown_signal, CycleGuard, ShutdownController};
