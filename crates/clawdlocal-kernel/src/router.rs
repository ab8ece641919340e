//! Priority-ordered message router.
//!
//! The router keeps, for every known [`MessageType`], the list of handlers
//! that accept it, sorted by ascending [`MessageHandler::priority`].  Ties
//! keep registration order, so the sort is stable across repeated
//! registrations.
//!
//! Handlers are matched once, at registration time, by checking
//! [`MessageHandler::can_handle`] against the router's known type set (the
//! built-in [`MessageType`]s by default).  Types added later through
//! [`MessageRouter::register_type`] re-check every handler already
//! registered.
//!
//! A handler that panics, in `can_handle` or in `handle`, never takes the
//! caller down.  A panicking `can_handle` counts as "does not handle"; a panicking
//! `handle` is reported like a failing one and later handlers still run.
//!
//! # Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use async_trait::async_trait;
//! # use clawdlocal_kernel::{HandlerContext, HandlerResult, Message, MessageHandler, MessageRouter, MessageType};
//! struct Greeter;
//!
//! #[async_trait]
//! impl MessageHandler for Greeter {
//!     fn can_handle(&self, t: &MessageType) -> bool { *t == MessageType::USER_INPUT }
//!     async fn handle(&self, _ctx: &HandlerContext, msg: &mut Message) -> HandlerResult {
//!         msg.push_output("greeter", serde_json::json!("hello"));
//!         Ok(())
//!     }
//! }
//!
//! # tokio_test_block(async {
//! let router = MessageRouter::new();
//! router.register_handler(Arc::new(Greeter));
//!
//! let mut msg = Message::new(MessageType::USER_INPUT, "cli", "agent", serde_json::Value::Null);
//! router.route(&HandlerContext::new(), &mut msg).await.unwrap();
//! assert_eq!(msg.outputs.len(), 1);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;

use crate::context::{HandlerContext, HandlerError};
use crate::error::{KernelError, Result};
use crate::message::{Message, MessageHandler, MessageType};

// ---------------------------------------------------------------------------
// Routing table
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RouterTable {
    /// Types every handler is checked against.
    known_types: Vec<MessageType>,
    /// Every handler ever registered, in registration order.
    registered: Vec<Arc<dyn MessageHandler>>,
    /// Per-type handler lists in ascending priority order.
    by_type: HashMap<MessageType, Vec<Arc<dyn MessageHandler>>>,
}

/// Whether `handler` accepts `message_type`.  A panicking predicate does not.
fn accepts_type(handler: &dyn MessageHandler, message_type: &MessageType) -> bool {
    std::panic::catch_unwind(AssertUnwindSafe(|| handler.can_handle(message_type)))
        .unwrap_or_else(|_| {
            tracing::error!(
                handler = %handler.name(),
                message_type = %message_type,
                "message handler predicate panicked"
            );
            false
        })
}

impl RouterTable {
    /// Insert `handler` after every handler whose priority is lower than or
    /// equal to its own.
    fn insert_sorted(&mut self, message_type: MessageType, handler: Arc<dyn MessageHandler>) {
        let list = self.by_type.entry(message_type).or_default();
        let priority = handler.priority();
        let at = list.partition_point(|h| h.priority() <= priority);
        list.insert(at, handler);
    }
}

// ---------------------------------------------------------------------------
// MessageRouter
// ---------------------------------------------------------------------------

/// Maps message types to priority-ordered handler lists.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct MessageRouter {
    table: Arc<RwLock<RouterTable>>,
}

impl MessageRouter {
    /// Create a router that knows the built-in message types.
    #[must_use]
    pub fn new() -> Self {
        Self::with_types(MessageType::builtin())
    }

    /// Create a router with an explicit known type set.
    #[must_use]
    pub fn with_types(types: impl IntoIterator<Item = MessageType>) -> Self {
        let mut known_types: Vec<MessageType> = Vec::new();
        for t in types {
            if !known_types.contains(&t) {
                known_types.push(t);
            }
        }

        Self {
            table: Arc::new(RwLock::new(RouterTable {
                known_types,
                ..RouterTable::default()
            })),
        }
    }

    /// Register a handler for every known type it accepts.
    pub fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);

        let accepted: Vec<MessageType> = table
            .known_types
            .iter()
            .filter(|t| accepts_type(handler.as_ref(), t))
            .cloned()
            .collect();

        tracing::debug!(
            handler = %handler.name(),
            priority = handler.priority(),
            types = ?accepted.iter().map(MessageType::as_str).collect::<Vec<_>>(),
            "message handler registered"
        );

        for message_type in accepted {
            table.insert_sorted(message_type, Arc::clone(&handler));
        }
        table.registered.push(handler);
    }

    /// Add a message type to the known set and check every previously
    /// registered handler against it.  Returns `false` if the type was
    /// already known.
    pub fn register_type(&self, message_type: impl Into<MessageType>) -> bool {
        let message_type = message_type.into();
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);

        if table.known_types.contains(&message_type) {
            return false;
        }
        table.known_types.push(message_type.clone());

        let matching: Vec<Arc<dyn MessageHandler>> = table
            .registered
            .iter()
            .filter(|h| accepts_type(h.as_ref(), &message_type))
            .cloned()
            .collect();
        for handler in matching {
            table.insert_sorted(message_type.clone(), handler);
        }

        tracing::debug!(message_type = %message_type, "message type registered");
        true
    }

    /// Route a message to every handler registered for its type.
    ///
    /// All handlers run, in priority order, even when an earlier one fails;
    /// the first failure is returned afterwards.  The handler list is
    /// snapshotted before dispatch, so no lock is held while handlers run.
    pub async fn route(&self, ctx: &HandlerContext, message: &mut Message) -> Result<()> {
        let handlers = self.get_handlers(&message.message_type);
        if handlers.is_empty() {
            tracing::warn!(
                message_id = %message.id,
                message_type = %message.message_type,
                "no handlers for message type"
            );
            return Err(KernelError::NoHandlersForType {
                message_type: message.message_type.to_string(),
            });
        }

        tracing::debug!(
            message_id = %message.id,
            message_type = %message.message_type,
            handlers = handlers.len(),
            "routing message"
        );

        let mut first_error = None;
        for handler in handlers {
            let outcome = AssertUnwindSafe(handler.handle(ctx, message))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(HandlerError::from("handler panicked")));
            if let Err(e) = outcome {
                tracing::error!(
                    message_id = %message.id,
                    handler = %handler.name(),
                    error = %e,
                    "message handler failed"
                );
                if first_error.is_none() {
                    first_error = Some(KernelError::Handler {
                        handler: handler.name().to_owned(),
                        source: e,
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Copy of the ordered handler list for `message_type`.
    pub fn get_handlers(&self, message_type: &MessageType) -> Vec<Arc<dyn MessageHandler>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_type.get(message_type).cloned().unwrap_or_default()
    }

    /// Number of handlers registered for `message_type`.
    pub fn handler_count(&self, message_type: &MessageType) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_type.get(message_type).map_or(0, Vec::len)
    }

    /// The known type set, in the order types were added.
    pub fn message_types(&self) -> Vec<MessageType> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.known_types.clone()
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
