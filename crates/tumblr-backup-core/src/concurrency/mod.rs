//! Thread pool, main-thread recovery gate, and the one-slot async callable
//! the Coordinator uses to overlap API pagination with post processing.
//!
//! The source this was distilled from arbitrates everything through a single
//! recursive lock and a `MultiCondition` that lets the main thread wait on
//! the disjunction of several condition variables sharing that lock. Rust's
//! ownership rules make a literal port painful and error-prone (one mutex
//! guarding three unrelated predicates invites deadlock on recursive
//! locking). Instead the main loop here waits on a single channel of typed
//! [`Event`]s; workers and the API thread post events instead of signalling
//! condition variables directly, which is the same disjunction with none of
//! the shared-lock hazard.

mod callable;
mod gate;
mod pool;

pub use callable::AsyncCallable;
pub use gate::{Gate, GateState};
pub use pool::WorkerPool;

/// Typed events the main loop selects over, replacing the source's
/// `MultiCondition` of `queue.not_full`, `no_internet.cond`, `enospc.cond`.
#[derive(Debug, Clone)]
pub enum Event {
    ApiPageReady,
    QueueHasRoom,
    NoInternet,
    Enospc,
    Abort,
}
