//! Scheduler/Clock (C9): the only primitive C7/C8 use to defer work.
//! Deliberately thin — it wraps `tokio::time` directly rather than a
//! hand-rolled virtual clock, so tests drive it with
//! `#[tokio::test(start_paused = true)]` plus `tokio::time::advance`
//! (SPEC_FULL.md §10.5) and production code gets the real runtime clock for
//! free.

use async_trait::async_trait;
pub use tokio::time::{Duration, Instant};

#[async_trait]
pub trait Scheduler: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
