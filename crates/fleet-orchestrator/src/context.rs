//! Deadline and cancellation carried through every lifecycle operation.
//!
//! Polling loops race `OpContext::done` against their ticker once per
//! iteration. An in-flight call is never interrupted.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The deadline elapsed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The cancellation signal fired.
    #[error("context cancelled")]
    Cancelled,
}

/// Deadline plus optional cancellation signal.
#[derive(Debug, Clone)]
pub struct OpContext {
    deadline: Instant,
    cancel: Option<watch::Receiver<bool>>,
}

impl OpContext {
    /// Context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context expiring at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline,
            cancel: None,
        }
    }

    /// Attach a cancellation signal; sending `true` cancels the context.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Derived context bounded by both this deadline and `timeout` from now.
    pub fn child(&self, timeout: Duration) -> Self {
        Self {
            deadline: self.deadline.min(Instant::now() + timeout),
            cancel: self.cancel.clone(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Non-blocking check.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(ContextError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Some(ContextError::DeadlineExceeded);
        }
        None
    }

    /// Resolves once the context is finished.
    pub async fn done(&self) -> ContextError {
        let expired = tokio::time::sleep_until(self.deadline);
        match &self.cancel {
            None => {
                expired.await;
                ContextError::DeadlineExceeded
            }
            Some(rx) => {
                let mut rx = rx.clone();
                tokio::select! {
                    _ = expired => ContextError::DeadlineExceeded,
                    _ = cancelled(&mut rx) => ContextError::Cancelled,
                }
            }
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: cancellation can no longer happen.
            std::future::pending::<()>().await;
        }
    }
}
