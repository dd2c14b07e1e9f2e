//! One-shot inline receivers.
//!
//! A [`Recv`] is a transient intercept registration that resolves a single
//! awaited packet: the first matching intercept is deep-copied into a
//! one-slot channel and the registration removes itself. Receivers carry a
//! deadline (60 seconds unless changed), an optional condition, an
//! optional block flag, and can be cancelled from another task through a
//! [`RecvHandle`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use tether_protocol::{Identifier, Packet};

use crate::error::Result;
use crate::intercept::Intercept;
use crate::Extension;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

type CondFn = Box<dyn Fn(&mut Packet) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvState {
    Armed,
    Fulfilled,
    Cancelled,
    TimedOut,
}

struct RecvShared {
    state: Mutex<RecvState>,
    cancel_tx: watch::Sender<bool>,
}

/// An inline receiver for the next packet matching a set of identifiers.
///
/// Built with [`Extension::recv`], configured with the chainable methods,
/// resolved with [`wait`](Self::wait). The registration is armed when
/// `wait` is called.
#[must_use = "call wait() to receive the packet"]
pub struct Recv {
    ext: Extension,
    identifiers: Vec<Identifier>,
    cond: Option<CondFn>,
    block: bool,
    timeout: Duration,
    shared: Arc<RecvShared>,
    cancel_rx: watch::Receiver<bool>,
    tx: mpsc::Sender<Packet>,
    rx: mpsc::Receiver<Packet>,
}

/// A clonable handle that can cancel a [`Recv`] from another task.
#[derive(Clone)]
pub struct RecvHandle {
    shared: Arc<RecvShared>,
}

impl RecvHandle {
    /// Cancels the receiver. A pending [`Recv::wait`] returns `None`
    /// immediately and later matches are not delivered.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if *state == RecvState::Armed {
            *state = RecvState::Cancelled;
        }
        drop(state);
        let _ = self.shared.cancel_tx.send(true);
    }
}

impl Recv {
    pub(crate) fn new(ext: Extension, identifiers: Vec<Identifier>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            ext,
            identifiers,
            cond: None,
            block: false,
            timeout: DEFAULT_TIMEOUT,
            shared: Arc::new(RecvShared {
                state: Mutex::new(RecvState::Armed),
                cancel_tx,
            }),
            cancel_rx,
            tx,
            rx,
        }
    }

    /// Only fulfills on packets for which `cond` returns true. The
    /// condition may read from the packet; the cursor is reset afterwards.
    pub fn if_cond(mut self, cond: impl Fn(&mut Packet) -> bool + Send + Sync + 'static) -> Self {
        self.cond = Some(Box::new(cond));
        self
    }

    /// Blocks the matching packet when the receiver fulfills.
    pub fn block(mut self) -> Self {
        self.block = true;
        self
    }

    /// Replaces the deadline. Defaults to 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a handle that can cancel this receiver from another task.
    pub fn handle(&self) -> RecvHandle {
        RecvHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancels the receiver.
    pub fn cancel(&self) {
        self.handle().cancel();
    }

    /// Arms the receiver and waits for the next matching packet.
    ///
    /// Returns a deep copy of the packet, or `None` when the deadline
    /// passes or the receiver is cancelled. Failing to resolve an
    /// identifier on an active connection is an error.
    pub async fn wait(mut self) -> Result<Option<Packet>> {
        let deadline = Instant::now() + self.timeout;

        let shared = Arc::clone(&self.shared);
        let cond = self.cond.take();
        let block = self.block;
        let tx = self.tx.clone();
        let handler = move |intercept: &mut Intercept| -> crate::intercept::HandlerResult {
            {
                let mut state = shared.state.lock();
                if *state != RecvState::Armed {
                    intercept.deregister();
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    *state = RecvState::TimedOut;
                    intercept.deregister();
                    return Ok(());
                }
            }
            // The condition is user code; run it without holding the
            // state lock.
            if let Some(cond) = &cond {
                if !cond(&mut intercept.packet) {
                    return Ok(());
                }
            }
            let mut state = shared.state.lock();
            if *state == RecvState::Armed && tx.try_send(intercept.packet.copy()).is_ok() {
                if block {
                    intercept.block();
                }
                *state = RecvState::Fulfilled;
            }
            intercept.deregister();
            Ok(())
        };

        let reg = self
            .ext
            .intercept(self.identifiers.clone())
            .transient()
            .with(handler)?;

        let mut cancel_rx = self.cancel_rx.clone();
        let result = tokio::select! {
            biased;
            packet = self.rx.recv() => packet,
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => None,
            _ = tokio::time::sleep_until(deadline) => {
                let mut state = self.shared.state.lock();
                if *state == RecvState::Armed {
                    *state = RecvState::TimedOut;
                }
                None
            }
        };
        reg.deregister();
        Ok(result)
    }
}
