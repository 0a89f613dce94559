/// External stop signal for a dispatch run.
use std::sync::Arc;
use tokio::sync::watch;

/// Raises the stop flag. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes the stop flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked canceller/signal pair.
pub fn cancellation() -> (Canceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl Canceller {
    /// Stop admitting new requests. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = cancellation();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is raised. Pends forever if every canceller
    /// was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
