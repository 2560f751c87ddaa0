//! Outstanding request queue
//!
//! The Nth reply on a connection answers the Nth entry pushed here.
//! Entries are never removed out of order: an owner sweep turns an entry
//! into a placeholder so that every later reply stays aligned.

use std::collections::VecDeque;

use super::{HandlerRef, OwnerId, TransactionBatch};

/// One request awaiting its reply
#[derive(Debug)]
pub enum Pending {
    /// Placeholder; the reply is read and discarded
    Discard,

    /// A caller waiting for the reply
    Handler(HandlerRef),

    /// An EXEC whose Multi reply is fanned out to the batch
    Transaction(TransactionBatch),
}

impl From<Option<HandlerRef>> for Pending {
    fn from(handler: Option<HandlerRef>) -> Self {
        handler.map_or(Pending::Discard, Pending::Handler)
    }
}

/// FIFO of pending entries for one connection
#[derive(Debug, Default)]
pub struct OutstandingQueue {
    entries: VecDeque<Pending>,
}

impl OutstandingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, entry: Pending) {
        self.entries.push_back(entry);
    }

    /// Jump the queue; used for the connect handshake only
    pub fn push_front(&mut self, entry: Pending) {
        self.entries.push_front(entry);
    }

    pub fn pop_front(&mut self) -> Option<Pending> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that still reach a caller
    pub fn waiting_handlers(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Pending::Discard => 0,
                Pending::Handler(_) => 1,
                Pending::Transaction(batch) => batch.len(),
            })
            .sum()
    }

    /// Empty the queue, failing every handler once
    ///
    /// Returns the number of handlers notified.
    pub fn fail_all(&mut self, reason: &str) -> usize {
        let mut notified = 0;
        for entry in self.entries.drain(..) {
            match entry {
                Pending::Discard => {}
                Pending::Handler(handler) => {
                    handler.fail(reason);
                    notified += 1;
                }
                Pending::Transaction(mut batch) => notified += batch.fail_all(reason),
            }
        }
        notified
    }

    /// Fail and detach every handler registered by `owner`
    pub fn sweep_owner(&mut self, owner: &OwnerId, reason: &str) -> usize {
        let mut notified = 0;
        for entry in self.entries.iter_mut() {
            let swept = match entry {
                Pending::Handler(handler) if handler.owner() == owner => {
                    handler.fail(reason);
                    true
                }
                Pending::Transaction(batch) => {
                    notified += batch.sweep_owner(owner, reason);
                    false
                }
                _ => false,
            };

            if swept {
                *entry = Pending::Discard;
                notified += 1;
            }
        }
        notified
    }
}
