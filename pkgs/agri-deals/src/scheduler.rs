//! Fixed-interval background task with synchronous cancellation
//!
//! A [`Poller`] runs its tick future once immediately and then once per
//! period until cancelled. Cancelling fires the token and aborts the task in
//! the same call, so once [`Poller::cancel`] returns no new tick starts. A tick
//! that is mid-flight is dropped at its next suspension point.
//!
//! Chat sessions and the deal board each own exactly one poller. A push-based
//! transport can replace it without changing their public API.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to a running interval task
#[derive(Debug)]
pub struct Poller {
    name: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawn `tick` on the current tokio runtime, first run immediately.
    ///
    /// Must be called from within a runtime context.
    pub fn spawn<F, Fut>(name: impl Into<String>, period: Duration, tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_token(name, period, CancellationToken::new(), tick)
    }

    /// Like [`Poller::spawn`], but the task also stops when `token` is
    /// cancelled elsewhere, e.g. through a parent token held by another task.
    pub fn spawn_with_token<F, Fut>(
        name: impl Into<String>,
        period: Duration,
        token: CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let task_token = token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if task_token.is_cancelled() {
                    break;
                }

                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = tick() => {}
                }
            }

            debug!("Poller {} stopped", task_name);
        });

        debug!("Poller {} started with period {:?}", name, period);

        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel();
    }
}
