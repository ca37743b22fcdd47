//! Cancellation signal with a self-triggering deadline.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A node's cancellation token plus the timer that fires it once the
/// update deadline passes.
#[derive(Debug)]
pub(crate) struct CancelSignal {
    token: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl CancelSignal {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            timer: None,
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Replace the token with a fresh one and drop any pending deadline.
    pub(crate) fn rearm(&mut self) -> CancellationToken {
        self.stop_timer();
        self.token = CancellationToken::new();
        self.token.clone()
    }

    /// Start the deadline clock for the current token.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start_deadline(&mut self, node: &'static str, deadline: Duration) -> CancellationToken {
        self.stop_timer();

        let token = self.token.clone();
        let timer_token = token.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = timer_token.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    debug!(node, ?deadline, "update deadline elapsed; cancelling");
                    timer_token.cancel();
                }
            }
        }));

        token
    }

    /// Cancel the token and stop the timer.
    pub(crate) fn close(&mut self) {
        self.stop_timer();
        self.token.cancel();
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for CancelSignal {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_token() {
        let mut signal = CancelSignal::new();
        let token = signal.start_deadline("test", Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(!token.is_cancelled());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(token.is_cancelled());
        assert!(signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_discards_deadline() {
        let mut signal = CancelSignal::new();
        let old = signal.start_deadline("test", Duration::from_secs(1));
        let fresh = signal.rearm();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!old.is_cancelled());
        assert!(!fresh.is_cancelled());
    }

    #[test]
    fn close_cancels() {
        let mut signal = CancelSignal::new();
        let token = signal.token();
        signal.close();
        assert!(token.is_cancelled());
    }
}
