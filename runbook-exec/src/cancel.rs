use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// Cancellation signal threaded through a run and every nested run.
#[derive(Clone, Debug)]
pub struct Cancellation {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel` has been called on any handle.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means the sender is gone; it lives as long as any handle, so wait forever.
        let fired = rx.wait_for(|c| *c).await.map(|_| ()).is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless cancellation fires first.
    pub async fn guard<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            out = fut => Some(out),
            _ = self.cancelled() => None,
        }
    }

    /// Sleep for `d`; returns `false` when interrupted by cancellation.
    pub async fn sleep(&self, d: Duration) -> bool {
        if d.is_zero() {
            return !self.is_cancelled();
        }
        self.guard(tokio::time::sleep(d)).await.is_some()
    }
}
