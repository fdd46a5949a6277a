//! Cancellation token bridged from Ctrl+C.

use tokio::sync::watch;
use tracing::{info, warn};

/// Cancellation side held by whoever may abort work.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side passed to every supervision point.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Creates a linked handle/token pair.
pub fn channel() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

impl CancelHandle {
    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns a new observer for this handle.
    pub fn token(&self) -> Cancellation {
        Cancellation {
            rx: self.tx.subscribe(),
        }
    }
}

impl Cancellation {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (handle, token) = channel();
        // Keep the sender alive so `cancelled()` pends forever.
        std::mem::forget(handle);
        token
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when cancellation is requested.
    ///
    /// Pends forever if every handle was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Spawns a task translating the first Ctrl+C into a cancellation request.
pub fn install_ctrl_c() -> Cancellation {
    let (handle, token) = channel();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Caught ctrl+c, aborting");
                handle.cancel();
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for ctrl+c");
                // Park the handle so the token never reports a spurious close.
                std::future::pending::<()>().await;
            }
        }
    });

    token
}
