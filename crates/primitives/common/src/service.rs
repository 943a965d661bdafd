//! Cooperative cancellation shared by the sync pipeline tasks.
//!
//! A single global [ServiceContext] is created at startup and handed (cloned) to every long-running task. Tasks race
//! their blocking awaits against [ServiceContext::cancelled], so that an interrupt drains the pipeline instead of
//! killing the process mid-delivery.
use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Cancellation context associated to a pipeline task.
///
/// # Scope
///
/// Tasks are said to be in the same _local scope_ if they inherit the same `token_local` [CancellationToken]. A
/// context created with [ServiceContext::child] can cancel itself and its own children without affecting its parent.
///
/// All contexts derived from the same root are in the same _global scope_: any of them can cancel every other
/// context with [ServiceContext::cancel_global].
#[derive(Clone, Debug, Default)]
pub struct ServiceContext {
    token_global: CancellationToken,
    token_local: Option<CancellationToken>,
}

impl ServiceContext {
    /// Creates a new [Default] [ServiceContext]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops all tasks under the same global context scope.
    pub fn cancel_global(&self) {
        tracing::info!("🔌 Gracefully shutting down");

        self.token_global.cancel();
    }

    /// Stops all tasks under the same local context scope.
    pub fn cancel_local(&self) {
        self.token_local.as_ref().unwrap_or(&self.token_global).cancel();
    }

    /// A future which completes when this context is cancelled, either locally or globally.
    ///
    /// Use this to race against other futures in a [tokio::select].
    pub async fn cancelled(&self) {
        let token_local = self.token_local.as_ref().unwrap_or(&self.token_global);
        tokio::select! {
            _ = self.token_global.cancelled() => {},
            _ = token_local.cancelled() => {},
        }
    }

    /// Checks if this context was cancelled.
    ///
    /// Only suitable for synchronous checks between awaits. When waiting on a future, use
    /// [ServiceContext::run_until_cancelled] instead.
    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.token_global.is_cancelled() || self.token_local.as_ref().map(|t| t.is_cancelled()).unwrap_or(false)
    }

    /// Runs a [Future] until this context is cancelled.
    ///
    /// # Cancellation safety
    ///
    /// The future is dropped at its current await point when cancellation wins the race. It must therefore not
    /// leave anything half-written behind.
    ///
    /// # Returns
    ///
    /// The return value of the future wrapped in [Some], or [None] if the context was cancelled.
    pub async fn run_until_cancelled<T, F>(&self, f: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            // Cancellation is checked first so that an already-cancelled context never starts new work.
            biased;
            _ = self.cancelled() => None,
            res = f => Some(res),
        }
    }

    /// Creates a new [ServiceContext] as a child of the current context.
    pub fn child(&self) -> Self {
        let token_local = self.token_local.as_ref().unwrap_or(&self.token_global).child_token();

        Self { token_local: Some(token_local), ..Clone::clone(self) }
    }
}
