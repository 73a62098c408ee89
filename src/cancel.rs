//! Run-wide cancellation signal
//!
//! Daemon, registry and builder calls have no intrinsic deadline. Every such
//! await goes through [`Cancellation::run`] so ctrl-c or a run deadline
//! aborts it promptly with [`SkiffError::Cancelled`].

use crate::error::{SkiffError, SkiffResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Sending side: triggers cancellation for every clone of the paired signal
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<Option<String>>>,
}

/// Receiving side, cheap to clone into workers
#[derive(Clone)]
pub struct Cancellation {
    rx: watch::Receiver<Option<String>>,
}

/// Create a connected handle/signal pair
pub fn channel() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(None);
    (CancelHandle { tx: Arc::new(tx) }, Cancellation { rx })
}

impl CancelHandle {
    /// Cancel the run. The first reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            debug!("Cancelling run: {}", reason);
            *current = Some(reason);
            true
        });
    }

    /// Cancel the run once `deadline` has elapsed
    pub fn cancel_after(&self, deadline: Duration) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            handle.cancel(format!("deadline of {}s exceeded", deadline.as_secs()));
        });
    }
}

impl Cancellation {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_, signal) = channel();
        signal
    }

    /// The cancellation reason, if cancelled
    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Fail fast if already cancelled
    pub fn check(&self) -> SkiffResult<()> {
        match self.reason() {
            Some(reason) => Err(SkiffError::Cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Resolve with the reason once cancelled
    pub async fn cancelled(&self) -> String {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Every handle dropped, nothing can cancel us anymore
                std::future::pending::<()>().await;
            }
        }
    }

    /// Race `fut` against cancellation
    pub async fn run<T, F>(&self, fut: F) -> SkiffResult<T>
    where
        F: Future<Output = SkiffResult<T>>,
    {
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(SkiffError::Cancelled(reason)),
            result = fut => result,
        }
    }

    /// Race `fut` against cancellation and a per-call timeout
    pub async fn run_with_timeout<T, F>(
        &self,
        operation: &str,
        timeout: Duration,
        fut: F,
    ) -> SkiffResult<T>
    where
        F: Future<Output = SkiffResult<T>>,
    {
        self.run(async {
            tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| SkiffError::Timeout {
                    operation: operation.to_string(),
                    secs: timeout.as_secs(),
                })?
        })
        .await
    }
}
