use serde::Serialize;
use uuid::Uuid;

use super::{profiles_by_id, require_user, with_fallback};
use crate::errors::AppError;
use crate::gateway::{Gateway, Procedure, Query, Table};
use crate::models::{DocumentPatch, NewDocument, Owned, TeamDocument};

#[derive(Serialize)]
struct TeamArgs {
    p_team_id: Uuid,
}

#[derive(Clone)]
pub struct DocumentService {
    gateway: Gateway,
}

impl DocumentService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Documents of a team with their creators' names, newest first.
    pub async fn list_for_team(&self, team_id: Uuid) -> Result<Vec<TeamDocument>, AppError> {
        if self.gateway.current_user().await.is_none() {
            return Ok(Vec::new());
        }

        with_fallback(
            Procedure::GetTeamDocuments,
            self.gateway
                .call(Procedure::GetTeamDocuments, &TeamArgs { p_team_id: team_id }),
            || self.list_direct(team_id),
        )
        .await
    }

    async fn list_direct(&self, team_id: Uuid) -> Result<Vec<TeamDocument>, AppError> {
        let documents: Vec<TeamDocument> = self
            .gateway
            .select(
                Table::TeamDocuments,
                &Query::new()
                    .eq("team_id", team_id)
                    .order_by("created_at", false),
            )
            .await?;

        let creators = profiles_by_id(&self.gateway, documents.iter().map(|d| d.created_by)).await?;
        Ok(documents
            .into_iter()
            .map(|mut doc| {
                if let Some(profile) = creators.get(&doc.created_by) {
                    doc.creator_name = profile.full_name.clone();
                    doc.creator_avatar = profile.avatar_url.clone();
                }
                doc
            })
            .collect())
    }

    /// Title and URL are checked before anything is sent.
    pub async fn create(&self, fields: &NewDocument) -> Result<TeamDocument, AppError> {
        fields.validate()?;
        let user = require_user(&self.gateway).await?;

        let doc: TeamDocument = self
            .gateway
            .insert(Table::TeamDocuments, &Owned::new(&fields.normalized(), user.id))
            .await?;
        tracing::info!("Created document {} in team {}", doc.id, doc.team_id);
        Ok(doc)
    }

    pub async fn update(&self, id: Uuid, patch: &DocumentPatch) -> Result<TeamDocument, AppError> {
        patch.validate()?;
        require_user(&self.gateway).await?;

        let doc: TeamDocument = self
            .gateway
            .update(Table::TeamDocuments, id, &patch.normalized())
            .await?;
        tracing::info!("Updated document {}", id);
        Ok(doc)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        require_user(&self.gateway).await?;
        self.gateway.delete(Table::TeamDocuments, id).await?;
        tracing::info!("Deleted document {}", id);
        Ok(())
    }
}
