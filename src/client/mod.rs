//! Client Module
//!
//! Correlates replies with the requests that produced them.
//!
//! ## Data Flow
//! ```text
//!   caller ── send(handler, args) ──► ProtocolService
//!                                         │
//!                    ┌────────────────────┴────────────────────┐
//!                    ▼                                         ▼
//!          Connection (command)                     Connection (subscriber)
//!          write buffer + FIFO                      write buffer
//!                    │                                         │
//!     reactor bytes ─┤                          reactor bytes ─┤
//!                    ▼                                         ▼
//!             ReplyDecoder                              ReplyDecoder
//!                    │                                         │
//!         pop oldest FIFO entry                     SubscriptionRouter
//!        ┌───────────┼────────────┐                  (by channel name)
//!        ▼           ▼            ▼
//!    Discard     HandlerRef   TransactionBatch ── one sub-reply per handler
//! ```
//!
//! Everything here runs on the reactor thread. Handlers are invoked
//! synchronously from the readable callback and must not block.

mod handler;
mod queue;
mod transaction;
mod subscription;
mod connection;
mod service;

pub use handler::{HandlerRef, OwnerId, ReplyHandler};
pub use queue::{OutstandingQueue, Pending};
pub use transaction::{TransactionAggregator, TransactionBatch, TransactionState};
pub use subscription::SubscriptionRouter;
pub use connection::{Connection, ConnectionState, Role};
pub use service::ProtocolService;

/// Reason delivered when a connection fails or is closed by the peer
pub const CONNECTION_LOST: &str = "connection lost";

/// Reason delivered when a handler's owner is torn down
pub const OWNER_UNLOADING: &str = "owner unloading";

/// Reason delivered when a service is shut down or reconfigured
pub const SHUTTING_DOWN: &str = "interface going away";

/// Reason delivered when the backend discards a queued transaction
pub const TRANSACTION_ABORTED: &str = "transaction aborted";
