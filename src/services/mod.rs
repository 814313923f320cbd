//! Domain services: typed CRUD per entity on top of the gateway.
//!
//! Operations that have a stored procedure call it first and fall back to
//! direct table access only when the backend reports the procedure missing.

mod auth;
mod documents;
mod events;
mod profiles;
mod tasks;
mod teams;

pub use auth::AuthService;
pub use documents::DocumentService;
pub use events::EventService;
pub use profiles::ProfileService;
pub use tasks::TaskService;
pub use teams::TeamService;

use std::collections::HashMap;
use std::future::Future;

use uuid::Uuid;

use crate::errors::AppError;
use crate::gateway::{Gateway, Procedure, Query, Table};
use crate::models::{Identity, Profile};
use crate::realtime::RealtimeManager;

/// Every service over one shared gateway.
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub events: EventService,
    pub tasks: TaskService,
    pub teams: TeamService,
    pub documents: DocumentService,
    pub profiles: ProfileService,
    pub realtime: RealtimeManager,
    gateway: Gateway,
}

impl Services {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            auth: AuthService::new(gateway.clone()),
            events: EventService::new(gateway.clone()),
            tasks: TaskService::new(gateway.clone()),
            teams: TeamService::new(gateway.clone()),
            documents: DocumentService::new(gateway.clone()),
            profiles: ProfileService::new(gateway.clone()),
            realtime: RealtimeManager::new(gateway.clone()),
            gateway,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}

/// Run the procedure form; on "procedure not found" run the direct form instead.
pub(crate) async fn with_fallback<T, P, D, F>(
    procedure: Procedure,
    rpc: P,
    direct: D,
) -> Result<T, AppError>
where
    P: Future<Output = Result<T, AppError>>,
    D: FnOnce() -> F,
    F: Future<Output = Result<T, AppError>>,
{
    match rpc.await {
        Err(e) if e.is_procedure_unavailable() => {
            tracing::warn!("Procedure {} unavailable, using direct table access", procedure);
            direct().await.map_err(|e| {
                tracing::error!("Direct fallback for {} failed: {}", procedure, e);
                e
            })
        }
        other => other,
    }
}

pub(crate) async fn require_user(gateway: &Gateway) -> Result<Identity, AppError> {
    gateway
        .current_user()
        .await
        .ok_or_else(|| AppError::Unauthenticated("Not signed in".to_string()))
}

/// Profiles of the given users, keyed by id.
pub(crate) async fn profiles_by_id(
    gateway: &Gateway,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, Profile>, AppError> {
    let mut ids: Vec<Uuid> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let profiles: Vec<Profile> = gateway
        .select(Table::Profiles, &Query::new().in_list("id", ids))
        .await?;
    Ok(profiles.into_iter().map(|p| (p.id, p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fallback_runs_only_on_missing_procedure() {
        let result = with_fallback(
            Procedure::GetUserTasks,
            async { Err::<u32, _>(AppError::ProcedureUnavailable("gone".to_string())) },
            || async { Ok(7) },
        )
        .await;
        assert_eq!(result, Ok(7));

        let result = with_fallback(
            Procedure::GetUserTasks,
            async { Err::<u32, _>(AppError::Rejected("policy".to_string())) },
            || async { Ok(7) },
        )
        .await;
        assert_eq!(result, Err(AppError::Rejected("policy".to_string())));
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let result = with_fallback(
            Procedure::CreateTask,
            async { Err::<u32, _>(AppError::ProcedureUnavailable("gone".to_string())) },
            || async { Err(AppError::Network("offline".to_string())) },
        )
        .await;
        assert_eq!(result, Err(AppError::Network("offline".to_string())));
    }
}
