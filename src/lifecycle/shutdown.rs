//! Shutdown coordination for the server host.

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks subscribe and stop when the signal fires. Clones share
/// the same channel.
#[derive(Clone, Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Returns how many subscribers were notified.
    pub fn trigger(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// A future that resolves once the signal fires.
    pub fn signalled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            // A lagged or closed channel also means shutdown.
            let _ = rx.recv().await;
        }
    }

    /// Trigger on Ctrl+C.
    pub fn trigger_on_ctrl_c(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    shutdown.trigger();
                }
                Err(e) => tracing::error!(error = %e, "Failed to install Ctrl+C handler"),
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let signalled = shutdown.signalled();
        assert_eq!(shutdown.receiver_count(), 1);

        assert_eq!(shutdown.trigger(), 1);
        tokio::time::timeout(Duration::from_secs(1), signalled)
            .await
            .unwrap();
    }

    #[test]
    fn test_trigger_without_subscribers() {
        assert_eq!(Shutdown::new().trigger(), 0);
    }
}
