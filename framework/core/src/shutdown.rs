use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// Broadcasts a one-shot stop signal.
///
/// The same type is used for the process-wide shutdown (Ctrl-C or the run finishing) and for
/// stopping an individual virtual user. Signalling is idempotent, and a listener created before
/// the signal is sent will always observe it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown(&self) {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = self.sender.send(()) {
            // Will fail if nobody is listening for a shutdown signal, in which case the log message
            // can be ignored.
            log::trace!("Failed to send shutdown signal: {e:?}");
        }
    }

    /// Whether [ShutdownHandle::shutdown] has been called on this handle or any of its clones.
    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe(), self.triggered.clone())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<()>>>,
    triggered: Arc<AtomicBool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>, triggered: Arc<AtomicBool>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            triggered,
        }
    }

    /// Point in time check if the shutdown signal has been sent. If this returns true then work
    /// should be stopped at the next convenient point.
    ///
    /// Unlike [DelegatedShutdownListener::wait_for_shutdown], this does not consume anything, so it
    /// keeps returning true once the signal has been sent.
    pub fn should_shutdown(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Wait for the shutdown signal to be received. It is safe to race this with another future so
    /// that the shutdown signal can be used to cut short a wait, such as the pause between
    /// iterations.
    ///
    /// Returns immediately if the signal was already sent. If every [ShutdownHandle] has been
    /// dropped then nothing can signal any more, and this also returns.
    pub async fn wait_for_shutdown(&mut self) {
        if self.should_shutdown() {
            return;
        }

        let mut receiver = self.receiver.lock().await;
        if let Err(tokio::sync::broadcast::error::RecvError::Closed) = receiver.recv().await {
            log::trace!("Shutdown sender dropped while waiting for a signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn listener_observes_shutdown() {
        let handle = ShutdownHandle::new();
        let listener = handle.new_listener();

        assert!(!listener.should_shutdown());
        handle.shutdown();
        assert!(listener.should_shutdown());
        // Checking again must not consume the signal.
        assert!(listener.should_shutdown());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let handle = ShutdownHandle::new();
        let listener = handle.new_listener();

        handle.shutdown();
        handle.clone().shutdown();

        assert!(handle.is_shutdown());
        assert!(listener.should_shutdown());
    }

    #[tokio::test]
    async fn wait_returns_once_signalled() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        let signaller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signaller.shutdown();
        });

        tokio::time::timeout(Duration::from_secs(5), listener.wait_for_shutdown())
            .await
            .expect("Listener should have been woken by the shutdown signal");

        // A second wait on the same listener returns straight away.
        tokio::time::timeout(Duration::from_millis(100), listener.wait_for_shutdown())
            .await
            .expect("Listener should not wait again after shutdown");
    }

    #[tokio::test]
    async fn wait_does_not_return_without_signal() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        let result =
            tokio::time::timeout(Duration::from_millis(50), listener.wait_for_shutdown()).await;
        assert!(result.is_err());
        drop(handle);
    }
}
