use uuid::Uuid;

use super::require_user;
use crate::errors::AppError;
use crate::gateway::{Gateway, Query, Table};
use crate::models::{Profile, ProfilePatch};

#[derive(Clone)]
pub struct ProfileService {
    gateway: Gateway,
}

impl ProfileService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profiles: Vec<Profile> = self
            .gateway
            .select(Table::Profiles, &Query::new().eq("id", user_id))
            .await?;
        Ok(profiles.into_iter().next())
    }

    /// Profile of the signed-in user.
    pub async fn current(&self) -> Result<Option<Profile>, AppError> {
        match self.gateway.current_user().await {
            Some(user) => self.get(user.id).await,
            None => Ok(None),
        }
    }

    pub async fn update(&self, patch: &ProfilePatch) -> Result<Profile, AppError> {
        let user = require_user(&self.gateway).await?;
        let profile: Profile = self
            .gateway
            .update(Table::Profiles, user.id, patch)
            .await?;
        tracing::info!("Updated profile {}", user.id);
        Ok(profile)
    }
}
