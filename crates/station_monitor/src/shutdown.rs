use std::sync::Arc;

use tokio::sync::watch;

/// Sending half of the shutdown signal.
#[derive(Debug)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

/// Receiving half, cloned into every station task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
    // Only set by `never`, so the channel cannot close.
    _sender: Option<Arc<watch::Sender<bool>>>,
}

impl Shutdown {
    /// Create a connected sender/receiver pair.
    pub fn new() -> (Self, ShutdownSignal) {
        let (sender, receiver) = watch::channel(false);
        (
            Self { sender },
            ShutdownSignal {
                receiver,
                _sender: None,
            },
        )
    }

    /// Ask every holder of a [`ShutdownSignal`] to stop.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

impl ShutdownSignal {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown is requested, or when the sender is gone.
    pub async fn triggered(&mut self) {
        // An Err means the sender was dropped, which also means stop.
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }

    /// A signal that never fires, for one-shot commands.
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            _sender: Some(Arc::new(sender)),
        }
    }
}
