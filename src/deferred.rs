//! Deferred local echo: a bounded queue drained by a dedicated task.
//!
//! The producer side formats into a capped [`DeferredMessage`] and performs a
//! non-blocking enqueue, so a slow echo writer never stalls a log call. The
//! consumer task blocks on the queue and writes each message in FIFO order.
//!
//! Lifecycle: `Uninitialised -> QueueCreated -> Running`. Stopping the task
//! returns the queue's receiver to the holder, putting the state back to
//! `QueueCreated`, so the task can be started again without losing queued
//! messages.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, select};
use log::warn;

use crate::echo::EchoWriter;
use crate::error::{DeferredError, RedirectError};
use crate::serializer::DeferredMessage;

const WORKER_NAME: &str = "socket-log-echo";

/// Observable state of the deferred echo task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferredState {
    Uninitialised,
    QueueCreated,
    Running,
}

struct EchoWorker {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<Receiver<DeferredMessage>>,
}

/// Queue plus optional consumer task.
pub(crate) struct DeferredEcho {
    capacity: usize,
    tx: Sender<DeferredMessage>,
    idle_rx: Option<Receiver<DeferredMessage>>,
    worker: Option<EchoWorker>,
}

impl DeferredEcho {
    /// Create the bounded queue; the consumer task is not started.
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            capacity,
            tx,
            idle_rx: Some(rx),
            worker: None,
        }
    }

    pub(crate) fn sender(&self) -> Sender<DeferredMessage> {
        self.tx.clone()
    }

    pub(crate) fn state(&self) -> DeferredState {
        if self.worker.is_some() {
            DeferredState::Running
        } else {
            DeferredState::QueueCreated
        }
    }

    /// Number of messages waiting in the queue.
    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.tx.len()
    }

    /// Spawn the consumer task. Returns `Ok(false)` when it is already running.
    pub(crate) fn start(&mut self, echo: EchoWriter) -> Result<bool, RedirectError> {
        if self.worker.is_some() {
            return Ok(false);
        }
        let rx = match self.idle_rx.take() {
            Some(rx) => rx,
            None => self.recreate_queue(),
        };
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let spawned = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || worker_loop(rx, shutdown_rx, echo));
        match spawned {
            Ok(handle) => {
                self.worker = Some(EchoWorker {
                    shutdown_tx,
                    handle,
                });
                Ok(true)
            }
            Err(source) => {
                // The receiver went down with the closure; keep the queue usable.
                let rx = self.recreate_queue();
                self.idle_rx = Some(rx);
                Err(RedirectError::Spawn {
                    name: WORKER_NAME,
                    source,
                })
            }
        }
    }

    /// Signal the consumer task, let it drain what is queued, and join it.
    pub(crate) fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.shutdown_tx.send(());
        match worker.handle.join() {
            Ok(rx) => self.idle_rx = Some(rx),
            Err(_) => {
                warn!("deferred echo worker panicked; recreating its queue");
                let rx = self.recreate_queue();
                self.idle_rx = Some(rx);
            }
        }
    }

    fn recreate_queue(&mut self) -> Receiver<DeferredMessage> {
        let (tx, rx) = bounded(self.capacity);
        self.tx = tx;
        rx
    }
}

impl Drop for DeferredEcho {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Hand `message` to the queue without blocking.
///
/// A rejected message is dropped here, which returns its buffer to the
/// allocator.
pub(crate) fn enqueue(
    tx: &Sender<DeferredMessage>,
    message: DeferredMessage,
) -> Result<(), DeferredError> {
    match tx.try_send(message) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => Err(DeferredError::QueueFull),
        Err(TrySendError::Disconnected(_)) => Err(DeferredError::Closed),
    }
}

fn should_shutdown_now(shutdown_rx: &Receiver<()>) -> bool {
    matches!(
        shutdown_rx.try_recv(),
        Ok(()) | Err(TryRecvError::Disconnected)
    )
}

fn drain_remaining(rx: &Receiver<DeferredMessage>, echo: &EchoWriter) {
    while let Ok(message) = rx.try_recv() {
        echo.write_bytes(message.as_bytes());
    }
}

/// Consumer loop. Returns the receiver so the queue outlives the task.
///
/// The shutdown channel is polled before every blocking wait so a saturated
/// queue cannot starve a stop request.
fn worker_loop(
    rx: Receiver<DeferredMessage>,
    shutdown_rx: Receiver<()>,
    echo: EchoWriter,
) -> Receiver<DeferredMessage> {
    loop {
        if should_shutdown_now(&shutdown_rx) {
            drain_remaining(&rx, &echo);
            break;
        }
        select! {
            recv(shutdown_rx) -> _ => {
                drain_remaining(&rx, &echo);
                break;
            },
            recv(rx) -> message => match message {
                Ok(message) => {
                    echo.write_bytes(message.as_bytes());
                }
                Err(_) => break,
            },
        }
    }
    rx
}
