//! Message bus used for audit notifications and subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use sensordb_proto::DatapointArray;

use crate::error::{Error, Result};

/// Publish/subscribe transport for datapoints addressed by entity path.
pub trait MessageBus: Send + Sync {
    /// Publish datapoints to an address such as `alice/user/log`.
    fn publish(&self, address: &str, datapoints: &DatapointArray) -> Result<()>;

    /// Subscribe to an address, and with [`SubscriptionScope::Subtree`] to
    /// everything below it. Returns the subscription id.
    fn subscribe(&self, subscriber: &str, address: &str, scope: SubscriptionScope)
        -> Result<u64>;

    fn unsubscribe(&self, subscription_id: u64) -> Result<()>;
}

/// Which published addresses a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionScope {
    /// Only messages published to the address itself.
    Exact,
    /// The address and every address below it.
    Subtree,
}

/// A bus that drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBus;

impl MessageBus for NullBus {
    fn publish(&self, _address: &str, _datapoints: &DatapointArray) -> Result<()> {
        Ok(())
    }

    fn subscribe(
        &self,
        _subscriber: &str,
        _address: &str,
        _scope: SubscriptionScope,
    ) -> Result<u64> {
        Ok(0)
    }

    fn unsubscribe(&self, _subscription_id: u64) -> Result<()> {
        Ok(())
    }
}

/// A message delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub address: String,
    pub datapoints: DatapointArray,
}

struct SubscriptionEntry {
    subscriber: String,
    address: String,
    scope: SubscriptionScope,
    pending: Vec<Message>,
}

impl SubscriptionEntry {
    fn matches(&self, address: &str) -> bool {
        if address == self.address {
            return true;
        }
        self.scope == SubscriptionScope::Subtree
            && address
                .strip_prefix(self.address.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// An in-process bus that queues messages per subscription.
pub struct MemoryBus {
    subscriptions: RwLock<HashMap<u64, SubscriptionEntry>>,
    next_subscription_id: AtomicU64,
    published: AtomicU64,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
        }
    }

    /// Take every message queued for a subscription.
    pub fn drain(&self, subscription_id: u64) -> Vec<Message> {
        self.subscriptions
            .write()
            .get_mut(&subscription_id)
            .map(|entry| std::mem::take(&mut entry.pending))
            .unwrap_or_default()
    }

    /// Number of publish calls so far.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for MemoryBus {
    fn publish(&self, address: &str, datapoints: &DatapointArray) -> Result<()> {
        self.published.fetch_add(1, Ordering::Relaxed);
        let mut subscriptions = self.subscriptions.write();
        let mut delivered = 0usize;
        for entry in subscriptions.values_mut().filter(|e| e.matches(address)) {
            entry.pending.push(Message {
                address: address.to_string(),
                datapoints: datapoints.clone(),
            });
            delivered += 1;
        }
        tracing::trace!(address, delivered, "published message");
        Ok(())
    }

    fn subscribe(
        &self,
        subscriber: &str,
        address: &str,
        scope: SubscriptionScope,
    ) -> Result<u64> {
        let subscription_id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.write().insert(
            subscription_id,
            SubscriptionEntry {
                subscriber: subscriber.to_string(),
                address: address.to_string(),
                scope,
                pending: Vec::new(),
            },
        );
        tracing::debug!(subscription_id, subscriber, address, ?scope, "subscription created");
        Ok(subscription_id)
    }

    fn unsubscribe(&self, subscription_id: u64) -> Result<()> {
        let entry = self
            .subscriptions
            .write()
            .remove(&subscription_id)
            .ok_or_else(|| Error::Bus(format!("subscription {} not found", subscription_id)))?;
        tracing::debug!(
            subscription_id,
            subscriber = %entry.subscriber,
            address = %entry.address,
            "subscription removed"
        );
        Ok(())
    }
}
