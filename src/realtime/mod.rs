//! Realtime subscription manager.
//!
//! A [`Channel`] binds one or more (table, filter) pairs. Subscribing spawns a
//! listener per binding that invokes the callback on every change; the
//! returned [`Subscription`] closes all of them when unsubscribed or dropped.

mod hub;

pub use hub::*;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::errors::AppError;
use crate::gateway::{Gateway, RowFilter, Table};

/// One (table, filter) pair a channel listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub table: Table,
    pub filter: Option<RowFilter>,
}

/// Named set of bindings opened and closed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    name: String,
    bindings: Vec<Binding>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    pub fn on(mut self, table: Table, filter: Option<RowFilter>) -> Self {
        self.bindings.push(Binding { table, filter });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
}

#[derive(Clone)]
pub struct RealtimeManager {
    gateway: Gateway,
}

impl RealtimeManager {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Open `channel` and call `on_change` for every change it sees.
    pub async fn subscribe<F>(&self, channel: Channel, on_change: F) -> Result<Subscription, AppError>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let on_change = Arc::new(on_change);
        let mut subscription = Subscription {
            channel: channel.name.clone(),
            tasks: Vec::with_capacity(channel.bindings.len()),
            closed: false,
        };

        for Binding { table, filter } in channel.bindings {
            // On error the partial subscription is dropped, which closes the open bindings.
            let mut stream = self
                .gateway
                .changes(table, filter)
                .await?;
            let callback = on_change.clone();
            let name = channel.name.clone();

            subscription.tasks.push(tokio::spawn(async move {
                while let Some(change) = stream.next().await {
                    tracing::debug!("Channel {} got {:?} on {}", name, change.kind, change.table);
                    callback(&change);
                }
                tracing::debug!("Channel {} stream ended for {}", name, table);
            }));
        }

        tracing::info!("Subscribed to channel {}", subscription.channel);
        Ok(subscription)
    }
}

/// Handle to an open channel.
pub struct Subscription {
    channel: String,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        !self.closed
    }

    /// Close the channel. Calling it again does nothing.
    pub fn unsubscribe(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        tracing::info!("Unsubscribed from channel {}", self.channel);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_collects_bindings() {
        let user = uuid::Uuid::new_v4();
        let channel = Channel::new("teams")
            .on(Table::Teams, None)
            .on(Table::TeamMembers, Some(RowFilter::eq("user_id", user)));

        assert_eq!(channel.name(), "teams");
        assert_eq!(channel.bindings().len(), 2);
        assert_eq!(
            channel.bindings()[1].filter.as_ref().map(|f| f.to_string()),
            Some(format!("user_id=eq.{}", user))
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let mut subscription = Subscription {
            channel: "tasks".to_string(),
            tasks: vec![tokio::spawn(std::future::pending::<()>())],
            closed: false,
        };

        subscription.unsubscribe();
        assert!(!subscription.is_active());
        subscription.unsubscribe();
        assert!(subscription.tasks.is_empty());
    }
}
