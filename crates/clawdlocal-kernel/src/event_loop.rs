//! Single-consumer event dispatch loop.
//!
//! Producers call [`EventLoop::emit`], which never waits: it either places the
//! event on a bounded FIFO queue or fails immediately with
//! [`KernelError::QueueFull`] / [`KernelError::NotRunning`].  One background
//! tokio task consumes the queue and, for each event, invokes every matching
//! [`EventHandler`] in registration order.
//!
//! Shutdown never closes the queue under the producers' feet.  Producers
//! check the `accepting` gate and send while holding its read lock; `stop`
//! closes the gate under the write lock, cancels the consumer, awaits its
//! task and then drains whatever is left.  The consumer holds the queue
//! receiver through an owned lock guard, so the receiver survives any exit
//! of the task and the loop can always be started again.
//!
//! Panics in [`EventHandler::can_handle`] or [`EventHandler::handle`] are
//! contained: a panicking predicate counts as "no match", a panicking
//! handler is logged like a failing one.
//!
//! A handler may call [`EventLoop::stop`] on the loop that is running it.
//! That call closes the gate and cancels the consumer without touching the
//! lifecycle lock and without waiting: the consumer exits once the current
//! event is finished, and the next `start` or `stop` from outside the loop
//! reaps it.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::HandlerContext;
use crate::error::{KernelError, Result};
use crate::event::{Event, EventHandler};

/// Default queue capacity when none is configured.
pub const DEFAULT_CAPACITY: usize = 1000;

tokio::task_local! {
    /// Set on every consumer task: which loop it belongs to and the token
    /// that cancels it.
    static CONSUMER: ConsumerScope;
}

#[derive(Clone)]
struct ConsumerScope {
    loop_id: usize,
    token: CancellationToken,
}

type HandlerList = Arc<RwLock<Vec<Arc<dyn EventHandler>>>>;
type SharedReceiver = Arc<Mutex<mpsc::Receiver<Envelope>>>;
type Gate = Arc<RwLock<bool>>;

/// An event on the queue, plus the optional channel its processed form is
/// returned on.
struct Envelope {
    event: Event,
    reply: Option<oneshot::Sender<Event>>,
}

/// The running consumer task.
struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

/// Closes the gate when the consumer task exits, however it exits.
struct CloseOnExit(Gate);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = false;
        tracing::debug!("event loop consumer exited");
    }
}

struct EventLoopInner {
    capacity: usize,
    sender: mpsc::Sender<Envelope>,
    receiver: SharedReceiver,
    handlers: HandlerList,
    accepting: Gate,
    worker: Mutex<Option<Worker>>,
}

// ---------------------------------------------------------------------------
// EventLoop
// ---------------------------------------------------------------------------

/// Bounded, FIFO, single-consumer event loop.
///
/// Cheaply cloneable; clones share the same queue and handlers.
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<EventLoopInner>,
}

impl EventLoop {
    /// Create a stopped loop whose queue holds at most `capacity` events
    /// (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            inner: Arc::new(EventLoopInner {
                capacity,
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
                handlers: Arc::new(RwLock::new(Vec::new())),
                accepting: Arc::new(RwLock::new(false)),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Spawn the consumer task.  Calling `start` on a running loop is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Internal`] when called from one of this loop's
    /// own handlers after that handler stopped the loop.
    pub async fn start(&self) -> Result<()> {
        if let Some(own) = self.own_consumer_token() {
            if own.is_cancelled() {
                return Err(KernelError::Internal(
                    "event loop cannot be restarted from one of its own handlers".into(),
                ));
            }
            return Ok(());
        }

        let mut worker = self.inner.worker.lock().await;
        if let Some(current) = worker.as_ref() {
            if current.is_live() {
                tracing::debug!("event loop already running");
                return Ok(());
            }
            if let Some(stale) = worker.take() {
                self.reap(stale).await;
            }
        }

        let token = CancellationToken::new();
        let consumer = Self::consume(
            Arc::clone(&self.inner.handlers),
            Arc::clone(&self.inner.receiver),
            Arc::clone(&self.inner.accepting),
            token.clone(),
        );
        let scope = ConsumerScope {
            loop_id: self.id(),
            token: token.clone(),
        };
        let handle = tokio::spawn(CONSUMER.scope(scope, consumer));
        *worker = Some(Worker { token, handle });
        *self.gate_mut() = true;

        tracing::info!(capacity = self.inner.capacity, "event loop started");
        Ok(())
    }

    /// Stop accepting events, cancel the consumer and wait for it to exit.
    ///
    /// An event already being dispatched runs to completion; events still
    /// queued are dropped.  Calling `stop` on a stopped loop is a no-op.
    /// From inside one of the loop's own handlers the call returns without
    /// waiting.
    pub async fn stop(&self) {
        if let Some(own) = self.own_consumer_token() {
            *self.gate_mut() = false;
            own.cancel();
            tracing::warn!("event loop stopped from its own handler; consumer exits after this event");
            return;
        }

        let mut worker = self.inner.worker.lock().await;
        let Some(current) = worker.take() else {
            return;
        };

        *self.gate_mut() = false;
        self.reap(current).await;
        tracing::info!("event loop stopped");
    }

    /// Enqueue an event without waiting.
    pub fn emit(&self, event: Event) -> Result<()> {
        self.enqueue(Envelope { event, reply: None })
    }

    /// Enqueue an event and receive it back, with every handler output
    /// attached, once dispatch has finished.
    ///
    /// The receiver resolves to an error if the event is dropped before it
    /// is dispatched (for example because the loop was stopped).
    pub fn emit_with_reply(&self, event: Event) -> Result<oneshot::Receiver<Event>> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Envelope {
            event,
            reply: Some(tx),
        })?;
        Ok(rx)
    }

    /// Append a handler.  Safe to call while the loop is dispatching; the
    /// new handler sees events dequeued after this call returns.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        tracing::debug!(handler = %handler.name(), "event handler registered");
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Whether the loop currently accepts events.
    pub fn is_running(&self) -> bool {
        *self.gate()
    }

    /// Number of events waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.inner.sender.max_capacity() - self.inner.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn handler_count(&self) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // -- Private helpers ----------------------------------------------------

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// The cancellation token of this loop's consumer, when called from
    /// inside it.
    fn own_consumer_token(&self) -> Option<CancellationToken> {
        CONSUMER
            .try_with(|scope| (scope.loop_id == self.id()).then(|| scope.token.clone()))
            .ok()
            .flatten()
    }

    fn gate(&self) -> RwLockReadGuard<'_, bool> {
        self.inner
            .accepting
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn gate_mut(&self) -> RwLockWriteGuard<'_, bool> {
        self.inner
            .accepting
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, envelope: Envelope) -> Result<()> {
        // Held across the send so `stop` cannot close the gate mid-send.
        let accepting = self.gate();
        if !*accepting {
            return Err(KernelError::NotRunning);
        }

        let event_id = envelope.event.id.clone();
        let event_type = envelope.event.event_type.clone();

        self.inner.sender.try_send(envelope).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(
                    event_id = %event_id,
                    capacity = self.inner.capacity,
                    "event queue full"
                );
                KernelError::QueueFull {
                    capacity: self.inner.capacity,
                }
            }
            mpsc::error::TrySendError::Closed(_) => KernelError::NotRunning,
        })?;
        drop(accepting);

        tracing::debug!(event_id = %event_id, event_type = %event_type, "event emitted");
        Ok(())
    }

    /// Wait for a cancelled consumer to exit, then drop every event still
    /// queued.
    async fn reap(&self, worker: Worker) {
        worker.token.cancel();
        if let Err(e) = worker.handle.await {
            tracing::error!(error = %e, "event loop consumer task failed");
        }

        let mut receiver = self.inner.receiver.lock().await;
        let mut dropped = 0usize;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "pending events dropped on stop");
        }
    }

    /// Consumer task.  Runs until cancelled or until every sender is gone.
    async fn consume(
        handlers: HandlerList,
        receiver: SharedReceiver,
        accepting: Gate,
        token: CancellationToken,
    ) {
        let mut receiver = receiver.lock_owned().await;
        let _close = CloseOnExit(accepting);
        let ctx = HandlerContext::with_token(token.clone());

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(envelope) => {
                        let dispatched = AssertUnwindSafe(Self::dispatch(&handlers, &ctx, envelope))
                            .catch_unwind()
                            .await;
                        if dispatched.is_err() {
                            tracing::error!("event dispatch panicked");
                        }
                    }
                    None => break,
                },
            }
        }
    }

    /// Whether `handler` accepts `event`.  A panicking predicate does not.
    fn accepts(handler: &dyn EventHandler, event: &Event) -> bool {
        std::panic::catch_unwind(AssertUnwindSafe(|| handler.can_handle(&event.event_type)))
            .unwrap_or_else(|_| {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    handler = %handler.name(),
                    "event handler predicate panicked"
                );
                false
            })
    }

    /// Run every matching handler for one event, in registration order.
    async fn dispatch(handlers: &HandlerList, ctx: &HandlerContext, envelope: Envelope) {
        let Envelope { mut event, reply } = envelope;

        let snapshot: Vec<Arc<dyn EventHandler>> = handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let matching: Vec<Arc<dyn EventHandler>> = snapshot
            .into_iter()
            .filter(|h| Self::accepts(h.as_ref(), &event))
            .collect();

        if matching.is_empty() {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                "unhandled event"
            );
        }

        for handler in matching {
            let outcome = AssertUnwindSafe(handler.handle(ctx, &mut event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    tracing::trace!(
                        event_id = %event.id,
                        handler = %handler.name(),
                        "event handled"
                    );
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        handler = %handler.name(),
                        error = %e,
                        "event handler failed"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        handler = %handler.name(),
                        "event handler panicked"
                    );
                }
            }
        }

        if let Some(reply) = reply {
            // The producer may have stopped waiting.
            let _ = reply.send(event);
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
