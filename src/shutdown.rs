//! Cooperative shutdown flag shared by the input loops and the supervisor

use tokio_util::sync::CancellationToken;

/// One-way shutdown flag
///
/// Starts untriggered; any holder may trigger it and nothing ever resets it.
/// Cloning is cheap and every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create an untriggered flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("shutdown requested");
        }
        self.token.cancel();
    }

    /// Check the flag without waiting
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once shutdown has been requested
    ///
    /// Intended for `tokio::select!` so a blocking wait can be abandoned.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Trigger the flag when the process receives Ctrl-C (or SIGTERM on unix)
    pub fn listen_for_signals(&self) -> tokio::task::JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = wait_for_signal() => {
                    tracing::info!("interrupt received");
                    shutdown.trigger();
                }
                () = shutdown.triggered() => {}
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_untriggered() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
    }

    #[test]
    fn trigger_is_visible_to_clones_and_idempotent() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();

        shutdown.trigger();
        shutdown.trigger();

        assert!(observer.is_triggered());
    }

    #[tokio::test]
    async fn triggered_future_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();

        let handle = tokio::spawn(async move { waiter.triggered().await });
        shutdown.trigger();

        handle.await.unwrap();
    }
}
