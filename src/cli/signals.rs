//! Ctrl-C handling for the follow-up command
//!
//! Patching itself is synchronous and each write is atomic, so only the
//! follow-up command needs to be interruptible.

use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation token for async operations
#[derive(Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel `token` on SIGINT or SIGTERM
pub async fn setup_signal_handlers(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(int), Ok(term)) => (int, term),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "cannot install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => tracing::warn!("received SIGINT, stopping follow-up command"),
            _ = sigterm.recv() => tracing::warn!("received SIGTERM, stopping follow-up command"),
        }
        token.cancel();
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot install Ctrl+C handler");
            return;
        }
        tracing::warn!("received Ctrl+C, stopping follow-up command");
        token.cancel();
    }
}

/// Run `future` unless `token` is cancelled first; `None` on cancellation
pub async fn with_cancellation<F, T>(token: CancellationToken, future: F) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    let mut cancel_receiver = token.receiver.clone();

    tokio::select! {
        result = future => Some(result),
        _ = async {
            while !*cancel_receiver.borrow() {
                if cancel_receiver.changed().await.is_err() {
                    // Sender gone: cancellation can no longer happen
                    std::future::pending::<()>().await;
                }
            }
        } => None,
    }
}
