//! Transaction aggregation
//!
//! ## State Machine
//! ```text
//!   Idle ──begin──► Open ──commit──► Idle
//!                    │                 │
//!                    │                 └─► TransactionBatch rides the FIFO
//!                    │                     as the EXEC entry (Committing)
//!                    └─ connection lost ─► Aborted ──commit──► Idle
//! ```
//!
//! `Aborted` holds until the caller commits. Until then commands are refused
//! instead of running outside the MULTI they were meant for.
//!
//! While open, each command's handler waits here and the connection FIFO
//! gets a placeholder that swallows the backend's `+QUEUED`. Commit hands
//! the queued handlers to a [`TransactionBatch`], which the EXEC reply
//! demultiplexes in order.

use std::collections::VecDeque;

use super::{HandlerRef, OwnerId, SHUTTING_DOWN, TRANSACTION_ABORTED};
use crate::error::{LinkError, Result};
use crate::protocol::Reply;

/// Aggregator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Open,

    /// The connection backing the transaction was lost
    Aborted,
}

/// Collects handlers for commands issued between MULTI and EXEC
#[derive(Debug)]
pub struct TransactionAggregator {
    /// Where the caller is between begin and commit
    state: TransactionState,

    /// Handlers in command order; `None` for fire-and-forget commands and
    /// swept owners
    queued: VecDeque<Option<HandlerRef>>,
}

impl Default for TransactionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionAggregator {
    pub fn new() -> Self {
        Self {
            state: TransactionState::Idle,
            queued: VecDeque::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    pub fn is_aborted(&self) -> bool {
        self.state == TransactionState::Aborted
    }

    /// Number of commands queued in the open transaction
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Open a transaction
    ///
    /// # Errors
    ///
    /// `TransactionAlreadyOpen` if one is open, or aborted and not yet
    /// committed.
    pub fn begin(&mut self) -> Result<()> {
        if self.state != TransactionState::Idle {
            return Err(LinkError::TransactionAlreadyOpen);
        }
        self.state = TransactionState::Open;
        Ok(())
    }

    /// Queue the handler of a command sent inside the transaction
    pub fn enqueue(&mut self, handler: Option<HandlerRef>) {
        self.queued.push_back(handler);
    }

    /// Close the transaction and hand its handlers to a batch
    ///
    /// # Errors
    ///
    /// `NoTransaction` if none is open. `TransactionAborted` if it was
    /// aborted; the aggregator is idle again afterwards.
    pub fn commit(&mut self) -> Result<TransactionBatch> {
        match self.state {
            TransactionState::Idle => return Err(LinkError::NoTransaction),
            TransactionState::Aborted => {
                self.state = TransactionState::Idle;
                return Err(LinkError::TransactionAborted);
            }
            TransactionState::Open => {}
        }
        self.state = TransactionState::Idle;
        Ok(TransactionBatch {
            handlers: std::mem::take(&mut self.queued),
        })
    }

    /// Drop the transaction, failing each queued handler once
    pub fn abort(&mut self, reason: &str) -> usize {
        self.state = TransactionState::Idle;
        fail_queue(&mut self.queued, reason)
    }

    /// Fail the queued handlers of an open transaction and refuse further
    /// commands until the caller commits
    pub fn mark_lost(&mut self, reason: &str) -> usize {
        if !self.is_open() {
            return 0;
        }
        self.state = TransactionState::Aborted;
        fail_queue(&mut self.queued, reason)
    }

    pub fn sweep_owner(&mut self, owner: &OwnerId, reason: &str) -> usize {
        sweep_queue(&mut self.queued, owner, reason)
    }
}

impl Drop for TransactionAggregator {
    fn drop(&mut self) {
        fail_queue(&mut self.queued, SHUTTING_DOWN);
    }
}

/// Handlers of a committed transaction, waiting for the EXEC reply
#[derive(Debug, Default)]
pub struct TransactionBatch {
    handlers: VecDeque<Option<HandlerRef>>,
}

impl TransactionBatch {
    pub fn len(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fan the EXEC reply out to the queued handlers
    pub fn dispatch(mut self, reply: &Reply) {
        match reply {
            Reply::Multi(results) => {
                tracing::debug!("transaction complete with {} results", results.len());

                for result in results {
                    let Some(slot) = self.handlers.pop_front() else {
                        tracing::debug!("transaction returned more results than queued commands");
                        break;
                    };
                    if let Some(handler) = slot {
                        handler.dispatch(result);
                    }
                }

                if !self.handlers.is_empty() {
                    tracing::warn!(
                        "transaction returned {} results for {} commands",
                        results.len(),
                        results.len() + self.handlers.len()
                    );
                    self.fail_all("missing transaction result");
                }
            }
            Reply::Error(reason) => {
                tracing::debug!("transaction rejected: {}", reason);
                self.fail_all(reason);
            }
            Reply::Bulk(None) => {
                self.fail_all(TRANSACTION_ABORTED);
            }
            other => {
                tracing::warn!("unexpected {} reply to EXEC", other.kind());
                self.fail_all(TRANSACTION_ABORTED);
            }
        }
    }

    pub fn fail_all(&mut self, reason: &str) -> usize {
        fail_queue(&mut self.handlers, reason)
    }

    pub fn sweep_owner(&mut self, owner: &OwnerId, reason: &str) -> usize {
        sweep_queue(&mut self.handlers, owner, reason)
    }
}

fn fail_queue(queue: &mut VecDeque<Option<HandlerRef>>, reason: &str) -> usize {
    let mut notified = 0;
    for handler in queue.drain(..).flatten() {
        handler.fail(reason);
        notified += 1;
    }
    notified
}

/// Swept slots stay in place so sub-replies keep their positions
fn sweep_queue(queue: &mut VecDeque<Option<HandlerRef>>, owner: &OwnerId, reason: &str) -> usize {
    let mut notified = 0;
    for slot in queue.iter_mut() {
        if slot.as_ref().is_some_and(|h| h.owner() == owner) {
            if let Some(handler) = slot.take() {
                handler.fail(reason);
                notified += 1;
            }
        }
    }
    notified
}
