//! Cross-thread handoff into the runtime context
//!
//! OS delivery threads push [`PendingEvent`]s onto a FIFO channel and block on
//! a per-event [`ReplyWaiter`]. A single consumer loop owned by the runtime
//! context pops them one at a time, runs the handler, and answers each event
//! before taking the next one, so handler executions never overlap.
//!
//! Capacity is unbounded by default. With a capacity configured, producers
//! block until the queue has room.

use std::panic::{AssertUnwindSafe, catch_unwind};

use smol::channel::{self, Receiver, Sender};

use crate::config::BridgeConfig;
use crate::dispatch::{DispatchCallback, HandlerResult, panic_message};
use crate::error::{Error, HandlerError, Result};
use crate::event::EventSnapshot;

/// An event accepted by the handoff and waiting for its handler
pub struct PendingEvent {
    snapshot: EventSnapshot,
    responder: Sender<HandlerResult>,
}

/// The OS-thread side of a [`PendingEvent`]
pub struct ReplyWaiter {
    rx: Receiver<HandlerResult>,
}

impl PendingEvent {
    pub fn new(snapshot: EventSnapshot) -> (Self, ReplyWaiter) {
        let (responder, rx) = channel::bounded(1);
        (
            Self {
                snapshot,
                responder,
            },
            ReplyWaiter { rx },
        )
    }

    pub fn snapshot(&self) -> &EventSnapshot {
        &self.snapshot
    }

    /// Answer the event, waking the OS thread waiting on it
    pub fn respond(self, result: HandlerResult) {
        if self.responder.try_send(result).is_err() {
            tracing::debug!(suite = %self.snapshot.suite(), event = %self.snapshot.event(), "reply waiter already gone");
        }
    }
}

impl ReplyWaiter {
    /// Block until the event is answered
    ///
    /// Fails with [`Error::RuntimeClosed`] if the event is dropped unanswered.
    pub fn wait(self) -> Result<HandlerResult> {
        self.rx.recv_blocking().map_err(|_| Error::RuntimeClosed)
    }
}

/// Create a connected handoff pair
pub fn handoff(config: &BridgeConfig) -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = match config.handoff_capacity() {
        Some(capacity) => channel::bounded(capacity),
        None => channel::unbounded(),
    };
    (
        HandoffSender { tx },
        HandoffReceiver {
            rx,
            failure_code: config.failure_error_code(),
        },
    )
}

/// Producer half, installed as the bridge's dispatch callback
#[derive(Clone)]
pub struct HandoffSender {
    tx: Sender<PendingEvent>,
}

impl DispatchCallback for HandoffSender {
    fn dispatch(&self, snapshot: EventSnapshot) -> Result<HandlerResult> {
        let (pending, waiter) = PendingEvent::new(snapshot);
        self.tx
            .send_blocking(pending)
            .map_err(|_| Error::RuntimeClosed)?;
        waiter.wait()
    }
}

/// Consumer half, owned by the runtime context
pub struct HandoffReceiver {
    rx: Receiver<PendingEvent>,
    failure_code: i32,
}

impl HandoffReceiver {
    /// Next queued event, or `None` once every sender is gone
    pub async fn recv(&self) -> Option<PendingEvent> {
        self.rx.recv().await.ok()
    }

    /// Number of events accepted but not yet taken
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Answer events with `handler` until every sender is gone
    ///
    /// A panicking handler answers its event with an error and the loop keeps
    /// going.
    pub async fn run<F>(self, mut handler: F)
    where
        F: FnMut(&EventSnapshot) -> HandlerResult,
    {
        while let Some(pending) = self.recv().await {
            let result = catch_unwind(AssertUnwindSafe(|| handler(pending.snapshot())))
                .unwrap_or_else(|panic| {
                    let message = panic_message(&*panic);
                    tracing::warn!(panic = %message, "event handler panicked");
                    Err(HandlerError::new(self.failure_code, message))
                });
            pending.respond(result);
        }
        tracing::debug!("handoff closed");
    }

    /// Drive [`run`](Self::run) on the current thread
    pub fn run_blocking<F>(self, handler: F)
    where
        F: FnMut(&EventSnapshot) -> HandlerResult,
    {
        smol::block_on(self.run(handler));
    }
}
