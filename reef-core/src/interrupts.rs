//! Cooperative interruption.

use tokio::sync::watch;

/// A shared cancellation flag.
///
/// The interpreter owns the sending side; every foreground frame holds a
/// receiver cloned from the same channel. Background pipelines get a
/// detached receiver at fork time, so an interrupt aimed at the foreground
/// never reaches them.
#[derive(Clone, Debug)]
pub struct Interrupts {
    rx: watch::Receiver<bool>,
}

impl Interrupts {
    pub(crate) fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A receiver that never fires.
    pub(crate) fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether an interrupt is currently pending. Cheap enough to poll at
    /// every chunk and pipeline boundary.
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when an interrupt is raised. Never resolves on a detached
    /// receiver.
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone; this receiver can never fire.
                futures::future::pending::<()>().await;
            }
        }
    }
}
