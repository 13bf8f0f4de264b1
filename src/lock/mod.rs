// ABOUTME: Lock module - filesystem-backed mutual exclusion for agent processes.
// ABOUTME: Contains the lock-file primitives, manager, and deadlock detector.

mod deadlock;
mod manager;
mod primitives;
mod record;

pub use deadlock::{DeadlockReport, find_cycle};
pub use manager::LockManager;
pub use primitives::{LockPrimitives, LockStatus};
pub use record::{LockMode, LockRecord, lock_file_name};
