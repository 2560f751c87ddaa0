//! Subscription routing
//!
//! Messages on the subscribe connection are keyed by channel name, the
//! second element of every pub/sub Multi:
//! ```text
//!   ["subscribe", <channel>, <count>]
//!   ["message",   <channel>, <payload>]
//! ```
//!
//! The mapping outlives the subscribe connection. After a reconnect the
//! caller is responsible for subscribing again.

use std::collections::HashMap;

use super::{HandlerRef, OwnerId};
use crate::protocol::Reply;

/// Channel name to handler mapping
#[derive(Debug, Default)]
pub struct SubscriptionRouter {
    /// Current handler per subscribed channel
    channels: HashMap<String, HandlerRef>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `channel` to `handler`, returning the handler it replaces
    pub fn insert(&mut self, channel: impl Into<String>, handler: HandlerRef) -> Option<HandlerRef> {
        self.channels.insert(channel.into(), handler)
    }

    pub fn remove(&mut self, channel: &str) -> Option<HandlerRef> {
        self.channels.remove(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Deliver `reply` to the handler of its channel
    ///
    /// Returns false when the reply names no subscribed channel; such
    /// messages are dropped without error.
    pub fn route(&self, reply: &Reply) -> bool {
        let Some(channel) = reply
            .as_multi()
            .and_then(|items| items.get(1))
            .and_then(Reply::as_str)
        else {
            tracing::trace!("dropping non pub/sub {} reply", reply.kind());
            return false;
        };

        match self.channels.get(channel) {
            Some(handler) => {
                handler.dispatch(reply);
                true
            }
            None => {
                tracing::trace!("no subscription for channel {}", channel);
                false
            }
        }
    }

    /// Fail and remove every subscription held by `owner`
    ///
    /// Returns the channels that were removed.
    pub fn sweep_owner(&mut self, owner: &OwnerId, reason: &str) -> Vec<String> {
        let channels: Vec<String> = self
            .channels
            .iter()
            .filter(|(_, handler)| handler.owner() == owner)
            .map(|(channel, _)| channel.clone())
            .collect();

        for channel in &channels {
            if let Some(handler) = self.channels.remove(channel) {
                handler.fail(reason);
            }
        }
        channels
    }
}
