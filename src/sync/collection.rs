//! A server-owned collection kept fresh by full reloads.
//!
//! Any realtime change on the source's channel invalidates the collection and
//! schedules a reload. Every load takes a ticket; results older than the last
//! applied ticket, or arriving after unmount, are dropped.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::notices::{Notice, Notices};
use super::session::{EditSession, Submission};
use crate::errors::AppError;
use crate::realtime::{Channel, RealtimeManager, Subscription};

/// Where a collection's rows come from and which changes invalidate them.
pub trait Source: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    fn fetch(&self) -> impl Future<Output = Result<Vec<Self::Item>, AppError>> + Send;

    fn channel(&self) -> Channel;
}

struct State<T> {
    items: Vec<T>,
    loading: bool,
    issued: u64,
    applied: u64,
    torn_down: bool,
}

pub struct LiveCollection<S: Source> {
    source: S,
    realtime: RealtimeManager,
    state: Mutex<State<S::Item>>,
    subscription: Mutex<Option<Subscription>>,
    notices: Notices,
}

impl<S: Source> LiveCollection<S> {
    pub fn new(source: S, realtime: RealtimeManager) -> Arc<Self> {
        Arc::new(Self {
            source,
            realtime,
            state: Mutex::new(State {
                items: Vec::new(),
                loading: false,
                issued: 0,
                applied: 0,
                torn_down: false,
            }),
            subscription: Mutex::new(None),
            notices: Notices::default(),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub async fn items(&self) -> Vec<S::Item> {
        self.state.lock().await.items.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.loading
    }

    pub async fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .await
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Subscribe to the source's channel, then load.
    pub async fn mount(self: &Arc<Self>) {
        let channel = self.source.channel();
        let name = channel.name().to_string();
        let view = Arc::downgrade(self);

        let subscribed = self
            .realtime
            .subscribe(channel, move |_change| {
                // The view may be gone; realtime never keeps it alive.
                if let Some(view) = view.upgrade() {
                    tokio::spawn(async move { view.reload().await });
                }
            })
            .await;

        match subscribed {
            Ok(subscription) => *self.subscription.lock().await = Some(subscription),
            Err(e) => {
                tracing::warn!("Could not subscribe to {}: {}", name, e);
                self.notices.push(Notice::from_error(&e)).await;
            }
        }

        self.reload().await;
    }

    /// Fetch the whole collection and replace the local copy.
    pub async fn reload(&self) {
        let ticket = {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            state.issued += 1;
            state.loading = true;
            state.issued
        };

        let result = self.source.fetch().await;

        let mut state = self.state.lock().await;
        if ticket == state.issued {
            state.loading = false;
        }
        if state.torn_down {
            tracing::debug!("Dropping load {} that finished after unmount", ticket);
            return;
        }

        match result {
            Ok(items) if ticket > state.applied => {
                state.items = items;
                state.applied = ticket;
            }
            Ok(_) => tracing::debug!("Dropping stale load {} (applied {})", ticket, state.applied),
            Err(e) => {
                tracing::warn!("Load {} failed: {}", ticket, e);
                drop(state);
                self.notices.push(Notice::from_error(&e)).await;
            }
        }
    }

    /// Close the channel; later and in-flight loads are ignored.
    pub async fn unmount(&self) {
        {
            let mut state = self.state.lock().await;
            state.torn_down = true;
            state.loading = false;
        }
        if let Some(mut subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
        }
    }

    /// Run a mutation, report the outcome as a notice and reload on success.
    pub async fn run_action<T, F>(&self, success: &str, action: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match action.await {
            Ok(value) => {
                self.notices.push(Notice::success(success)).await;
                self.reload().await;
                Ok(value)
            }
            Err(e) => {
                self.notices.push(Notice::from_error(&e)).await;
                Err(e)
            }
        }
    }

    /// Submit the open edit session through `perform`.
    pub async fn submit<D, F, Fut>(
        &self,
        session: &Mutex<EditSession<D>>,
        success: &str,
        perform: F,
    ) -> Result<(), AppError>
    where
        D: Clone,
        F: FnOnce(Submission<D>) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let submission = session.lock().await.begin_submit()?;
        let result = self.run_action(success, perform(submission)).await;
        session.lock().await.finish_submit(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use crate::db::{init_database, Repository};
    use crate::gateway::{Gateway, Table};

    /// Each fetch returns its call number; the first call is slow.
    struct Counting {
        calls: AtomicU64,
    }

    impl Source for Counting {
        type Item = u64;

        async fn fetch(&self) -> Result<Vec<u64>, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == 1 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(vec![call])
        }

        fn channel(&self) -> Channel {
            Channel::new("counting").on(Table::Tasks, None)
        }
    }

    async fn manager(dir: &tempfile::TempDir) -> RealtimeManager {
        let pool = init_database(&dir.path().join("sync.sqlite")).await.unwrap();
        RealtimeManager::new(Gateway::local(Repository::new(pool)))
    }

    #[tokio::test]
    async fn test_stale_load_is_discarded() {
        let dir = tempfile::TempDir::new().unwrap();
        let collection = LiveCollection::new(
            Counting {
                calls: AtomicU64::new(0),
            },
            manager(&dir).await,
        );

        let slow = {
            let collection = collection.clone();
            tokio::spawn(async move { collection.reload().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        collection.reload().await;
        slow.await.unwrap();

        assert_eq!(collection.items().await, vec![2]);
        assert!(!collection.is_loading().await);
    }

    #[tokio::test]
    async fn test_unmount_drops_in_flight_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let collection = LiveCollection::new(
            Counting {
                calls: AtomicU64::new(0),
            },
            manager(&dir).await,
        );

        let slow = {
            let collection = collection.clone();
            tokio::spawn(async move { collection.reload().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        collection.unmount().await;
        slow.await.unwrap();

        assert!(collection.items().await.is_empty());
        assert!(!collection.is_loading().await);
        collection.reload().await;
        assert!(collection.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_action_leaves_notice() {
        let dir = tempfile::TempDir::new().unwrap();
        let collection = LiveCollection::new(
            Counting {
                calls: AtomicU64::new(0),
            },
            manager(&dir).await,
        );

        let result: Result<(), _> = collection
            .run_action("Saved", async {
                Err(AppError::Validation("Task title is required".to_string()))
            })
            .await;

        assert!(result.is_err());
        let notices = collection.notices().drain().await;
        assert_eq!(notices, vec![Notice::error("Task title is required")]);
    }
}
