//! Shutdown coordination for the event loop.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::Waker;

/// Handle that stops a running event loop from any thread.
///
/// Triggering sets a flag and wakes the poller; the loop observes the flag
/// on its waker token, drops every connection and returns.
#[derive(Debug, Clone)]
pub struct Shutdown {
    waker: Arc<Waker>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub(crate) fn new(waker: Waker) -> Self {
        Self {
            waker: Arc::new(waker),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request shutdown and wake the poller.
    pub fn trigger(&self) -> io::Result<()> {
        self.triggered.store(true, Ordering::SeqCst);
        self.waker.wake()
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}
