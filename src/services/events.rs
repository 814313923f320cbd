use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{require_user, with_fallback};
use crate::errors::AppError;
use crate::gateway::{Gateway, Procedure, Query, Table};
use crate::models::{
    merge_unique, CalendarEvent, Event, EventPatch, Identity, NewEvent, Owned, TeamMember,
    TeamSummary,
};

#[derive(Serialize)]
struct UserArgs {
    p_user_id: Uuid,
}

#[derive(Serialize)]
struct CreateEventArgs<'a> {
    p_title: &'a str,
    p_description: Option<&'a str>,
    p_start_time: DateTime<Utc>,
    p_end_time: DateTime<Utc>,
    p_all_day: bool,
    p_team_id: Option<Uuid>,
    p_created_by: Uuid,
}

#[derive(Serialize)]
struct EventIdArgs {
    p_event_id: Uuid,
}

#[derive(Clone)]
pub struct EventService {
    gateway: Gateway,
}

impl EventService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Own events and events of every team the signed-in user belongs to,
    /// ordered by start time. Empty when signed out.
    pub async fn list_for_user(&self) -> Result<Vec<CalendarEvent>, AppError> {
        let Some(user) = self.gateway.current_user().await else {
            return Ok(Vec::new());
        };

        with_fallback(
            Procedure::GetUserEvents,
            self.gateway.call(
                Procedure::GetUserEvents,
                &UserArgs { p_user_id: user.id },
            ),
            || self.list_direct(&user),
        )
        .await
    }

    async fn list_direct(&self, user: &Identity) -> Result<Vec<CalendarEvent>, AppError> {
        let own: Vec<Event> = self
            .gateway
            .select(Table::Events, &Query::new().eq("created_by", user.id))
            .await?;

        let team_ids = self.member_team_ids(user).await?;
        let team_events: Vec<Event> = if team_ids.is_empty() {
            Vec::new()
        } else {
            self.gateway
                .select(Table::Events, &Query::new().in_list("team_id", &team_ids))
                .await?
        };

        let mut events = merge_unique(own.into_iter().chain(team_events));
        events.sort_by_key(|e| e.start_time);

        let names: HashMap<Uuid, String> = self
            .teams(&team_ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();

        Ok(events
            .into_iter()
            .map(|event| {
                let team_name = event.team_id.and_then(|id| names.get(&id).cloned());
                CalendarEvent { event, team_name }
            })
            .collect())
    }

    pub async fn create(&self, fields: &NewEvent) -> Result<Event, AppError> {
        fields.validate()?;
        let user = require_user(&self.gateway).await?;
        let stored = fields.normalized();
        let fields = &stored;

        let args = CreateEventArgs {
            p_title: &fields.title,
            p_description: fields.description.as_deref(),
            p_start_time: fields.start_time,
            p_end_time: fields.end_time,
            p_all_day: fields.all_day,
            p_team_id: fields.team_id,
            p_created_by: user.id,
        };

        let event: Event = with_fallback(
            Procedure::CreateEvent,
            self.gateway.call(Procedure::CreateEvent, &args),
            || async move {
                self.gateway
                    .insert(Table::Events, &Owned::new(fields, user.id))
                    .await
            },
        )
        .await?;

        tracing::info!("Created event {}", event.id);
        Ok(event)
    }

    pub async fn update(&self, id: Uuid, patch: &EventPatch) -> Result<Event, AppError> {
        patch.validate()?;
        require_user(&self.gateway).await?;

        let args = procedure_patch(id, patch)?;
        let event: Event = with_fallback(
            Procedure::UpdateEvent,
            self.gateway.call(Procedure::UpdateEvent, &args),
            || self.gateway.update(Table::Events, id, patch),
        )
        .await?;

        tracing::info!("Updated event {}", id);
        Ok(event)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        require_user(&self.gateway).await?;

        with_fallback(
            Procedure::DeleteEvent,
            self.gateway
                .call(Procedure::DeleteEvent, &EventIdArgs { p_event_id: id }),
            || self.gateway.delete(Table::Events, id),
        )
        .await?;

        tracing::info!("Deleted event {}", id);
        Ok(())
    }

    /// Teams the signed-in user belongs to, for the event dialog's team selector.
    pub async fn user_teams(&self) -> Result<Vec<TeamSummary>, AppError> {
        let Some(user) = self.gateway.current_user().await else {
            return Ok(Vec::new());
        };
        let ids = self.member_team_ids(&user).await?;
        self.teams(&ids).await
    }

    async fn member_team_ids(&self, user: &Identity) -> Result<Vec<Uuid>, AppError> {
        let memberships: Vec<TeamMember> = self
            .gateway
            .select(Table::TeamMembers, &Query::new().eq("user_id", user.id))
            .await?;
        Ok(memberships.into_iter().map(|m| m.team_id).collect())
    }

    async fn teams(&self, ids: &[Uuid]) -> Result<Vec<TeamSummary>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.gateway
            .select(
                Table::Teams,
                &Query::new().in_list("id", ids).order_by("name", true),
            )
            .await
    }
}

/// `update_event` takes the event id plus every changed column prefixed with `p_`.
fn procedure_patch(id: Uuid, patch: &EventPatch) -> Result<Value, AppError> {
    let Value::Object(columns) = serde_json::to_value(patch)? else {
        return Err(AppError::Internal("Event patch is not an object".to_string()));
    };

    let mut args = Map::new();
    args.insert("p_event_id".to_string(), Value::String(id.to_string()));
    for (column, value) in columns {
        args.insert(format!("p_{}", column), value);
    }
    Ok(Value::Object(args))
}
