// Retention - removes long-inactive accounts on a background timer.

mod purge_scheduler;
mod purge_service;

pub use purge_scheduler::PurgeScheduler;

#[allow(unused_imports)]
pub use purge_service::{compute_threshold, purge_once, MILLIS_PER_DAY};
