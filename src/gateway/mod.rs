//! Remote data gateway: the only component that talks to the backend.
//!
//! Every table operation, procedure call and auth call goes through a
//! [`Gateway`]. It holds the current session and forwards to one of two
//! transports: the in-process local backend or the HTTP surface.

mod http;
mod query;

pub use http::{HttpTransport, SseStream};
pub use query::*;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Identity, Session};
use crate::realtime::{ChangeEvent, ChangeFeed};

#[derive(Clone)]
enum Transport {
    Local(Repository),
    Http(HttpTransport),
}

/// Cheaply cloneable handle to the backend plus the signed-in session.
#[derive(Clone)]
pub struct Gateway {
    transport: Transport,
    session: Arc<RwLock<Option<Session>>>,
}

impl Gateway {
    /// Gateway over the in-process local backend.
    pub fn local(repo: Repository) -> Self {
        Self {
            transport: Transport::Local(repo),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Gateway over HTTP.
    pub fn http(config: &ClientConfig) -> Result<Self, AppError> {
        Ok(Self {
            transport: Transport::Http(HttpTransport::new(config)?),
            session: Arc::new(RwLock::new(None)),
        })
    }

    // ==================== AUTH ====================

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// The signed-in user, if any. Never touches the network.
    pub async fn current_user(&self) -> Option<Identity> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    async fn token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Identity, AppError> {
        let session = match &self.transport {
            Transport::Local(repo) => repo.sign_up(email, password, full_name).await?,
            Transport::Http(http) => http.sign_up(email, password, full_name).await?,
        };
        Ok(self.store(session).await)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        let session = match &self.transport {
            Transport::Local(repo) => repo.sign_in(email, password).await?,
            Transport::Http(http) => http.sign_in(email, password).await?,
        };
        Ok(self.store(session).await)
    }

    /// Revoke the session. The local session is cleared even if revocation fails.
    pub async fn sign_out(&self) -> Result<(), AppError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };

        match &self.transport {
            Transport::Local(repo) => repo.sign_out(&session.access_token).await,
            Transport::Http(http) => http.sign_out(&session.access_token).await,
        }
    }

    pub async fn update_password(&self, password: &str) -> Result<(), AppError> {
        let session = self
            .session()
            .await
            .ok_or_else(|| AppError::Unauthenticated("Not signed in".to_string()))?;

        match &self.transport {
            Transport::Local(repo) => repo.update_password(&session.user, password).await,
            Transport::Http(http) => {
                http.update_password(&session.access_token, password)
                    .await
            }
        }
    }

    async fn store(&self, session: Session) -> Identity {
        let user = session.user.clone();
        *self.session.write().await = Some(session);
        user
    }

    // ==================== TABLES ====================

    /// Rows of `table` matching `query`. Empty without a session.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: Table,
        query: &Query,
    ) -> Result<Vec<T>, AppError> {
        let Some(session) = self.session().await else {
            return Ok(Vec::new());
        };

        let rows = match &self.transport {
            Transport::Local(repo) => repo.select(Some(&session.user), table, query).await?,
            Transport::Http(http) => http.select(&session.access_token, table, query).await?,
        };
        tracing::debug!("Selected {} rows from {}", rows.len(), table);

        rows.into_iter().map(decode).collect()
    }

    pub async fn insert<B, T>(&self, table: Table, row: &B) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let session = self.require_session().await?;
        let created = match &self.transport {
            Transport::Local(repo) => {
                repo.insert(Some(&session.user), table, serde_json::to_value(row)?)
                    .await?
            }
            Transport::Http(http) => http.insert(&session.access_token, table, row).await?,
        };
        decode(created)
    }

    pub async fn update<P, T>(&self, table: Table, id: Uuid, patch: &P) -> Result<T, AppError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let session = self.require_session().await?;
        let id = id.to_string();
        let updated = match &self.transport {
            Transport::Local(repo) => {
                repo.update(Some(&session.user), table, &id, serde_json::to_value(patch)?)
                    .await?
            }
            Transport::Http(http) => {
                http.update(&session.access_token, table, &id, patch)
                    .await?
            }
        };
        decode(updated)
    }

    pub async fn delete(&self, table: Table, id: Uuid) -> Result<(), AppError> {
        let session = self.require_session().await?;
        let id = id.to_string();
        match &self.transport {
            Transport::Local(repo) => repo.delete(Some(&session.user), table, &id).await,
            Transport::Http(http) => http.delete(&session.access_token, table, &id).await,
        }
    }

    /// Invoke a stored procedure.
    pub async fn call<A, T>(&self, procedure: Procedure, args: &A) -> Result<T, AppError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let session = self.require_session().await?;
        let result = match &self.transport {
            Transport::Local(repo) => {
                repo.call(Some(&session.user), procedure, serde_json::to_value(args)?)
                    .await?
            }
            Transport::Http(http) => http.call(&session.access_token, procedure, args).await?,
        };
        decode(result)
    }

    async fn require_session(&self) -> Result<Session, AppError> {
        self.session()
            .await
            .ok_or_else(|| AppError::Unauthenticated("Not signed in".to_string()))
    }

    // ==================== REALTIME ====================

    /// Open a stream of changes to `table`, optionally narrowed to one column value.
    pub async fn changes(
        &self,
        table: Table,
        filter: Option<RowFilter>,
    ) -> Result<ChangeStream, AppError> {
        let session = self.session().await;
        match &self.transport {
            Transport::Local(repo) => Ok(ChangeStream::Local(repo.changes(
                session.map(|s| s.user),
                table,
                filter,
            ))),
            Transport::Http(http) => {
                let token = session.map(|s| s.access_token);
                let stream = http
                    .changes(token.as_deref(), table, filter.as_ref())
                    .await?;
                Ok(ChangeStream::Http(stream))
            }
        }
    }
}

/// A live stream of row changes; dropping it closes the channel.
pub enum ChangeStream {
    Local(ChangeFeed),
    Http(SseStream),
}

impl ChangeStream {
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        match self {
            ChangeStream::Local(feed) => feed.next().await,
            ChangeStream::Http(stream) => stream.next().await,
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|e| {
        tracing::error!("Unexpected row shape: {}", e);
        AppError::Internal(format!("Unexpected response shape: {}", e))
    })
}
