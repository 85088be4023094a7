//! Synchronization primitives shared by the worker pool and the DB pool.
//!
//! Rust's `std::sync::{Mutex, Condvar}` already give RAII guards and
//! spurious-wakeup-safe `wait_while`/`wait_timeout_while`, so unlike the
//! source there is no need to hand-roll a `Mutex`/`ConditionVariable`
//! wrapper or a scoped-lock helper — `MutexGuard`'s `Drop` impl is that
//! helper.

pub mod queue;
