//! Handler capability
//!
//! Callers implement [`ReplyHandler`] and keep ownership of it behind an
//! `Rc<RefCell<_>>`. The client only stores a [`HandlerRef`], a weak handle
//! tagged with the owner that registered it, so a dropped handler can never
//! be dispatched to and an owner sweep can find everything it registered.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::protocol::Reply;

/// Callback contract for reply consumers
///
/// Callbacks run synchronously on the reactor thread. A handler must not be
/// borrowed elsewhere while the client may dispatch to it, and must not call
/// back into the client from a callback; defer follow-up work instead. A
/// callback that arrives while the handler is borrowed cannot be delivered.
/// Debug builds panic on it; release builds log a warning and drop it, so
/// the exactly-once failure guarantee does not hold for that handler.
pub trait ReplyHandler {
    /// A non-error reply arrived
    fn on_result(&mut self, reply: &Reply);

    /// The backend answered with an error, or the request was abandoned
    fn on_error(&mut self, reason: &str);
}

/// Identity of the component that registered a handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Non-owning reference to a caller's handler
#[derive(Clone)]
pub struct HandlerRef {
    /// Component that registered the handler
    owner: OwnerId,

    /// Never upgraded beyond a single dispatch
    target: Weak<RefCell<dyn ReplyHandler>>,
}

impl HandlerRef {
    pub fn new<H: ReplyHandler + 'static>(owner: OwnerId, handler: &Rc<RefCell<H>>) -> Self {
        let shared: Rc<RefCell<dyn ReplyHandler>> = handler.clone();
        Self {
            owner,
            target: Rc::downgrade(&shared),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// False once the caller has dropped the handler
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Deliver a reply, routing `Reply::Error` to `on_error`
    pub(crate) fn dispatch(&self, reply: &Reply) {
        let Some(target) = self.target.upgrade() else {
            tracing::debug!(owner = %self.owner, "handler dropped before its reply arrived");
            return;
        };
        let borrowed = target.try_borrow_mut();
        debug_assert!(borrowed.is_ok(), "handler of {} is busy, reply undeliverable", self.owner);
        let Ok(mut handler) = borrowed else {
            tracing::warn!(owner = %self.owner, "handler busy, dropping re-entrant reply");
            return;
        };

        match reply {
            Reply::Error(reason) => handler.on_error(reason),
            _ => handler.on_result(reply),
        }
    }

    /// Deliver a failure
    pub(crate) fn fail(&self, reason: &str) {
        let Some(target) = self.target.upgrade() else {
            tracing::debug!(owner = %self.owner, "handler dropped before its failure arrived");
            return;
        };
        let borrowed = target.try_borrow_mut();
        debug_assert!(borrowed.is_ok(), "handler of {} is busy, failure undeliverable", self.owner);
        let Ok(mut handler) = borrowed else {
            tracing::warn!(owner = %self.owner, "handler busy, dropping re-entrant failure");
            return;
        };

        handler.on_error(reason);
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRef")
            .field("owner", &self.owner)
            .field("alive", &self.is_alive())
            .finish()
    }
}
