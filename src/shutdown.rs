// src/shutdown.rs
//
// Cooperative shutdown shared by every control loop. One trigger, any number
// of listeners; once set it stays set.

use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered. Also resolves if the
    /// `Shutdown` handle is dropped, since nobody can cancel the loops
    /// anymore.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|&stop| stop).await;
    }

    /// Blocking wait of at most `timeout`, for loops running on blocking
    /// threads. Returns true if shutdown fired.
    ///
    /// Must be called from a thread that is inside the runtime context but
    /// not on an async worker, e.g. within `spawn_blocking`.
    pub fn wait_blocking(&mut self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        let handle = tokio::runtime::Handle::current();
        let mut rx = self.rx.clone();
        let fired = handle.block_on(async move {
            tokio::time::timeout(timeout, rx.wait_for(|&stop| stop))
                .await
                .is_ok()
        });
        fired || self.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_every_listener() {
        let shutdown = Shutdown::new();
        let a = shutdown.listener();
        let mut b = shutdown.listener();
        assert!(!a.is_triggered());

        shutdown.trigger();
        assert!(a.is_triggered());
        b.triggered().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_listener_created_after_trigger_sees_it() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut late = shutdown.listener();
        assert!(late.is_triggered());
        late.triggered().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_wait_times_out_then_fires() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.listener();

        let timed_out = tokio::task::spawn_blocking(move || {
            let first = listener.wait_blocking(Duration::from_millis(10));
            (first, listener)
        })
        .await
        .unwrap();
        assert!(!timed_out.0);

        let mut listener = timed_out.1;
        let waiter =
            tokio::task::spawn_blocking(move || listener.wait_blocking(Duration::from_secs(30)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
        assert!(waiter.await.unwrap());
    }
}
