//! Protocol service
//!
//! Façade over one backend: a command connection, a subscribe connection,
//! the transaction aggregator and the subscription router.
//!
//! ## Responsibilities
//! - Create connections lazily and again after a connection fault
//! - Route `send` through the aggregator while a transaction is open
//! - Forward reactor callbacks to the right connection
//! - Sweep handlers of a departing owner out of every queue

use std::rc::Rc;

use super::{
    Connection, HandlerRef, OwnerId, Pending, Role, SubscriptionRouter, TransactionAggregator,
    TransactionState, CONNECTION_LOST, SHUTTING_DOWN,
};
use crate::config::{BackendConfig, Config};
use crate::error::{LinkError, Result};
use crate::network::TransportFactory;
use crate::protocol::split_command;

/// Client for a single named backend
pub struct ProtocolService {
    /// Backend this service talks to
    backend: BackendConfig,

    /// Announced with `CLIENT SETNAME` on every new connection
    client_name: String,

    /// Bulk size limit handed to each connection's decoder
    max_bulk_len: usize,

    /// Creates sockets for new and replacement connections
    factory: Rc<dyn TransportFactory>,

    /// Request/reply connection; `None` until first use or after a fault
    command: Option<Connection>,

    /// Pub/sub connection; `None` until first subscribe or after a fault
    subscriber: Option<Connection>,

    /// Handlers of the transaction being built on `command`
    transaction: TransactionAggregator,

    /// Channel handlers for messages on `subscriber`
    router: SubscriptionRouter,
}

impl ProtocolService {
    /// Create a service; no connection is opened until first use
    pub fn new(backend: BackendConfig, config: &Config, factory: Rc<dyn TransportFactory>) -> Self {
        Self {
            backend,
            client_name: config.client_name.clone(),
            max_bulk_len: config.max_bulk_len,
            factory,
            command: None,
            subscriber: None,
            transaction: TransactionAggregator::new(),
            router: SubscriptionRouter::new(),
        }
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn name(&self) -> &str {
        &self.backend.name
    }

    /// Open both connections now instead of on first use
    pub fn connect(&mut self) -> Result<()> {
        self.ensure(Role::Command)?;
        self.ensure(Role::Subscriber)?;
        Ok(())
    }

    pub fn is_connected(&self, role: Role) -> bool {
        self.connection(role).is_some_and(|c| !c.is_closed())
    }

    pub fn connection(&self, role: Role) -> Option<&Connection> {
        match role {
            Role::Command => self.command.as_ref(),
            Role::Subscriber => self.subscriber.as_ref(),
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_open()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction.state()
    }

    pub fn subscriptions(&self) -> &SubscriptionRouter {
        &self.router
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Send a command; `handler` receives its reply
    ///
    /// Inside a transaction the handler waits in the aggregator and receives
    /// its element of the EXEC reply instead.
    ///
    /// # Errors
    ///
    /// `EmptyCommand` for an empty argument list, `TransactionAborted` while
    /// an aborted transaction awaits its commit, `Connection` if no
    /// connection could be established. The handler is not called and
    /// nothing is written in any of these cases.
    pub fn send<A: AsRef<[u8]>>(&mut self, handler: Option<HandlerRef>, args: &[A]) -> Result<()> {
        if args.is_empty() {
            return Err(LinkError::EmptyCommand);
        }

        self.reap();
        if self.transaction.is_aborted() {
            return Err(LinkError::TransactionAborted);
        }
        let in_transaction = self.transaction.is_open();
        let entry = if in_transaction {
            // Swallows the +QUEUED acknowledgement
            Pending::Discard
        } else {
            Pending::from(handler.clone())
        };

        self.ensure(Role::Command)?.send(args, entry)?;

        if in_transaction {
            self.transaction.enqueue(handler);
        }
        self.reap();
        Ok(())
    }

    /// Send a whitespace separated command line
    pub fn send_command(&mut self, handler: Option<HandlerRef>, line: &str) -> Result<()> {
        self.send(handler, &split_command(line))
    }

    /// Flush and run one blocking read on the command connection
    ///
    /// Stalls the reactor; meant for startup synchronization only.
    /// Returns true while replies are still outstanding.
    pub fn block_and_process(&mut self) -> Result<bool> {
        let result = match self.command.as_mut() {
            Some(conn) => conn.block_and_process(&self.router),
            None => Ok(false),
        };
        self.reap();
        result
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Send MULTI and start queueing handlers
    ///
    /// # Errors
    ///
    /// `TransactionAlreadyOpen` if a transaction is already open, or was
    /// aborted and has not been committed yet.
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.reap();
        if self.transaction.state() != TransactionState::Idle {
            return Err(LinkError::TransactionAlreadyOpen);
        }

        self.ensure(Role::Command)?.send(&["MULTI"], Pending::Discard)?;
        self.transaction.begin()
    }

    /// Send EXEC; its Multi reply is fanned out to the queued handlers
    ///
    /// # Errors
    ///
    /// `NoTransaction` if no transaction is open. `TransactionAborted` if
    /// its connection failed before the commit; the service is then ready
    /// for a new transaction.
    pub fn commit_transaction(&mut self) -> Result<()> {
        self.reap();
        let mut batch = self.transaction.commit()?;

        let conn = match self.ensure(Role::Command) {
            Ok(conn) => conn,
            Err(e) => {
                batch.fail_all(CONNECTION_LOST);
                return Err(e);
            }
        };
        conn.send(&["EXEC"], Pending::Transaction(batch))?;
        self.reap();
        Ok(())
    }

    // =========================================================================
    // Pub/Sub
    // =========================================================================

    /// Route messages on `channel` to `handler`, replacing any previous one
    pub fn subscribe(&mut self, handler: HandlerRef, channel: &str) -> Result<()> {
        self.ensure(Role::Subscriber)?
            .send(&["SUBSCRIBE", channel], Pending::Discard)?;

        if self.router.insert(channel, handler).is_some() {
            tracing::debug!(backend = %self.backend.name, "replaced handler for channel {}", channel);
        }
        self.reap();
        Ok(())
    }

    /// Forget `channel`; a prior successful subscribe is not required
    pub fn unsubscribe(&mut self, channel: &str) -> Result<()> {
        self.router.remove(channel);
        self.send_unsubscribe(channel)
    }

    fn send_unsubscribe(&mut self, channel: &str) -> Result<()> {
        if let Some(conn) = self.subscriber.as_mut().filter(|c| !c.is_closed()) {
            conn.send(&["UNSUBSCRIBE", channel], Pending::Discard)?;
        }
        self.reap();
        Ok(())
    }

    // =========================================================================
    // Reactor Callbacks
    // =========================================================================

    pub fn on_connect(&mut self, role: Role) {
        if let Some(conn) = self.slot(role).as_mut() {
            conn.on_connect();
        }
        self.reap();
    }

    pub fn on_readable(&mut self, role: Role, bytes: &[u8]) -> usize {
        let conn = match role {
            Role::Command => self.command.as_mut(),
            Role::Subscriber => self.subscriber.as_mut(),
        };
        let consumed = match conn {
            Some(conn) => conn.on_readable(bytes, &self.router),
            None => 0,
        };
        self.reap();
        consumed
    }

    pub fn on_writable(&mut self, role: Role) {
        if let Some(conn) = self.slot(role).as_mut() {
            conn.on_writable();
        }
        self.reap();
    }

    pub fn on_error(&mut self, role: Role, reason: &str) {
        if let Some(conn) = self.slot(role).as_mut() {
            conn.on_error(reason);
        }
        self.reap();
    }

    /// Drive both connections without blocking
    pub fn poll(&mut self) {
        if let Some(conn) = self.command.as_mut() {
            conn.poll(&self.router);
        }
        if let Some(conn) = self.subscriber.as_mut() {
            conn.poll(&self.router);
        }
        self.reap();
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Fail and detach every handler registered by `owner`
    ///
    /// Covers both FIFOs, the open transaction and the subscription map.
    /// Returns the number of handlers notified.
    pub fn unload_owner(&mut self, owner: &OwnerId, reason: &str) -> usize {
        let mut notified = 0;

        if let Some(conn) = self.command.as_mut() {
            notified += conn.sweep_owner(owner, reason);
        }
        if let Some(conn) = self.subscriber.as_mut() {
            notified += conn.sweep_owner(owner, reason);
        }
        notified += self.transaction.sweep_owner(owner, reason);

        let channels = self.router.sweep_owner(owner, reason);
        notified += channels.len();
        for channel in &channels {
            if let Err(e) = self.send_unsubscribe(channel) {
                tracing::debug!(backend = %self.backend.name, "unsubscribe {} failed: {}", channel, e);
            }
        }

        if notified > 0 {
            tracing::debug!(backend = %self.backend.name, "swept {} handlers of {}", notified, owner);
        }
        notified
    }

    /// Close both connections and drop any open transaction
    pub fn shutdown(&mut self) -> usize {
        let mut notified = self.transaction.abort(SHUTTING_DOWN);
        if let Some(mut conn) = self.command.take() {
            notified += conn.shutdown(SHUTTING_DOWN);
        }
        if let Some(mut conn) = self.subscriber.take() {
            notified += conn.shutdown(SHUTTING_DOWN);
        }
        notified
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn slot(&mut self, role: Role) -> &mut Option<Connection> {
        match role {
            Role::Command => &mut self.command,
            Role::Subscriber => &mut self.subscriber,
        }
    }

    /// Live connection for `role`, created if needed
    fn ensure(&mut self, role: Role) -> Result<&mut Connection> {
        self.reap();

        let backend = &self.backend;
        let client_name = &self.client_name;
        let max_bulk_len = self.max_bulk_len;
        let factory = &self.factory;

        let slot = match role {
            Role::Command => &mut self.command,
            Role::Subscriber => &mut self.subscriber,
        };

        let conn = match slot.take() {
            Some(conn) => conn,
            None => {
                tracing::debug!(backend = %backend.name, %role, "opening connection");
                let transport = factory.create(backend, role);
                Connection::open(role, backend, client_name, max_bulk_len, transport)?
            }
        };
        Ok(slot.insert(conn))
    }

    /// Discard closed connections
    ///
    /// Losing the command connection also loses the backend's MULTI state,
    /// so an open transaction is aborted with it.
    fn reap(&mut self) {
        if self.command.as_ref().is_some_and(Connection::is_closed) {
            self.command = None;
            if self.transaction.is_open() {
                let failed = self.transaction.mark_lost(CONNECTION_LOST);
                tracing::warn!(
                    backend = %self.backend.name,
                    "transaction aborted with its connection ({} handlers failed)",
                    failed
                );
            }
        }
        if self.subscriber.as_ref().is_some_and(Connection::is_closed) {
            tracing::debug!(
                backend = %self.backend.name,
                "subscribe connection lost; {} subscriptions need renewing",
                self.router.len()
            );
            self.subscriber = None;
        }
    }
}

impl Drop for ProtocolService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ProtocolService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolService")
            .field("backend", &self.backend)
            .field("command", &self.command)
            .field("subscriber", &self.subscriber)
            .field("transaction", &self.transaction.state())
            .field("subscriptions", &self.router.len())
            .finish()
    }
}
