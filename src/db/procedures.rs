//! Stored procedures of the local backend.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::Row;
use uuid::Uuid;

use super::repository::{insert_raw, membership_role, require_viewer, Repository};
use super::schema;
use crate::errors::AppError;
use crate::gateway::{Procedure, Table};
use crate::models::{Identity, TeamKind, TeamRole};
use crate::realtime::ChangeEvent;

impl Repository {
    /// Invoke a stored procedure as `viewer`.
    pub async fn call(
        &self,
        viewer: Option<&Identity>,
        procedure: Procedure,
        args: Value,
    ) -> Result<Value, AppError> {
        if !self.is_installed(procedure) {
            return Err(AppError::ProcedureUnavailable(format!(
                "Could not find the function public.{} in the schema cache",
                procedure
            )));
        }
        let viewer = require_viewer(viewer)?;
        tracing::debug!("Calling {} for {}", procedure, viewer.id);

        match procedure {
            Procedure::GetUserEvents => {
                let args: UserArgs = parse_args(procedure, args)?;
                ensure_self(viewer, args.p_user_id)?;
                self.user_events(viewer).await
            }
            Procedure::CreateEvent => {
                let args: CreateEventArgs = parse_args(procedure, args)?;
                ensure_self(viewer, args.p_created_by)?;
                let row = json!({
                    "title": args.p_title,
                    "description": args.p_description,
                    "start_time": args.p_start_time,
                    "end_time": args.p_end_time,
                    "all_day": args.p_all_day,
                    "team_id": args.p_team_id,
                    "created_by": args.p_created_by,
                });
                self.insert(Some(viewer), Table::Events, row).await
            }
            Procedure::UpdateEvent => {
                let (id, patch) = split_event_update(args)?;
                self.update(Some(viewer), Table::Events, &id, patch).await
            }
            Procedure::DeleteEvent => {
                let args: EventIdArgs = parse_args(procedure, args)?;
                self.delete(Some(viewer), Table::Events, &args.p_event_id.to_string())
                    .await?;
                Ok(Value::Null)
            }
            Procedure::GetUserTeams => {
                let args: UserArgs = parse_args(procedure, args)?;
                ensure_self(viewer, args.p_user_id)?;
                self.user_teams(viewer).await
            }
            Procedure::CreateTeamWithOwner => {
                let args: CreateTeamArgs = parse_args(procedure, args)?;
                ensure_self(viewer, args.p_user_id)?;
                self.create_team_with_owner(viewer, args).await
            }
            Procedure::InviteTeamMember => {
                let args: InviteArgs = parse_args(procedure, args)?;
                ensure_self(viewer, args.p_inviter_id)?;
                self.invite_team_member(viewer, args).await
            }
            Procedure::GetUserTasks => {
                let args: UserArgs = parse_args(procedure, args)?;
                ensure_self(viewer, args.p_user_id)?;
                self.user_tasks(viewer).await
            }
            Procedure::CreateTask => {
                let args: CreateTaskArgs = parse_args(procedure, args)?;
                ensure_self(viewer, args.p_created_by)?;
                let mut row = Map::new();
                row.insert("title".into(), json!(args.p_title));
                row.insert("description".into(), json!(args.p_description));
                if let Some(status) = args.p_status {
                    row.insert("status".into(), json!(status));
                }
                if let Some(priority) = args.p_priority {
                    row.insert("priority".into(), json!(priority));
                }
                row.insert("due_date".into(), json!(args.p_due_date));
                row.insert("assigned_to".into(), json!(args.p_assigned_to));
                row.insert("team_id".into(), json!(args.p_team_id));
                row.insert("created_by".into(), json!(args.p_created_by));
                self.insert(Some(viewer), Table::Tasks, Value::Object(row))
                    .await
            }
            Procedure::GetTeamDocuments => {
                let args: TeamArgs = parse_args(procedure, args)?;
                self.team_documents(viewer, args.p_team_id).await
            }
        }
    }

    async fn user_events(&self, viewer: &Identity) -> Result<Value, AppError> {
        let uid = viewer.id.to_string();
        let rows = sqlx::query(
            r#"
            SELECT e.*, t.name AS team_name
            FROM events e
            LEFT JOIN teams t ON t.id = e.team_id
            WHERE e.created_by = ?
               OR e.team_id IN (SELECT team_id FROM team_members WHERE user_id = ?)
            ORDER BY e.start_time ASC
            "#,
        )
        .bind(&uid)
        .bind(&uid)
        .fetch_all(self.pool())
        .await?;

        let events = rows
            .iter()
            .map(|row| schema::row_to_json(Table::Events, row, &["team_name"]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(events))
    }

    async fn user_teams(&self, viewer: &Identity) -> Result<Value, AppError> {
        let uid = viewer.id.to_string();

        let team_rows = sqlx::query(
            r#"
            SELECT t.*, m.role AS user_role
            FROM teams t
            JOIN team_members m ON m.team_id = t.id AND m.user_id = ?
            ORDER BY t.created_at ASC
            "#,
        )
        .bind(&uid)
        .fetch_all(self.pool())
        .await?;

        let member_rows = sqlx::query(
            r#"
            SELECT m.*, p.full_name AS full_name, p.avatar_url AS avatar_url
            FROM team_members m
            LEFT JOIN profiles p ON p.id = m.user_id
            WHERE m.team_id IN (SELECT team_id FROM team_members WHERE user_id = ?)
            ORDER BY m.joined_at ASC
            "#,
        )
        .bind(&uid)
        .fetch_all(self.pool())
        .await?;

        let members = member_rows
            .iter()
            .map(|row| schema::row_to_json(Table::TeamMembers, row, &["full_name", "avatar_url"]))
            .collect::<Result<Vec<_>, _>>()?;

        let mut teams = Vec::with_capacity(team_rows.len());
        for row in &team_rows {
            let mut team = schema::row_to_json(Table::Teams, row, &["user_role"])?;
            let team_id = schema::json_str(&team, "id").unwrap_or_default().to_string();
            let roster: Vec<Value> = members
                .iter()
                .filter(|m| schema::json_str(m, "team_id") == Some(team_id.as_str()))
                .cloned()
                .collect();
            if let Value::Object(fields) = &mut team {
                fields.insert("team_members".to_string(), Value::Array(roster));
            }
            teams.push(team);
        }

        Ok(Value::Array(teams))
    }

    async fn create_team_with_owner(
        &self,
        viewer: &Identity,
        args: CreateTeamArgs,
    ) -> Result<Value, AppError> {
        let name = args.p_name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Team name is required".to_string()));
        }
        let kind = args.p_type.unwrap_or_default();

        let mut team = Map::new();
        team.insert("name".into(), json!(name));
        team.insert("type".into(), json!(kind.as_str()));
        team.insert("created_by".into(), json!(viewer.id));

        // Team and owner membership commit together or not at all.
        let mut tx = self.pool().begin().await?;
        let created = insert_raw(&mut tx, Table::Teams, &team).await?;
        let team_id = schema::json_str(&created, "id")
            .unwrap_or_default()
            .to_string();

        let mut owner = Map::new();
        owner.insert("team_id".into(), json!(team_id));
        owner.insert("user_id".into(), json!(viewer.id));
        owner.insert("role".into(), json!(TeamRole::Owner.as_str()));
        let membership = insert_raw(&mut tx, Table::TeamMembers, &owner).await?;
        tx.commit().await?;

        tracing::info!("Created team {} owned by {}", team_id, viewer.id);
        self.hub()
            .publish(ChangeEvent::insert(Table::Teams, created));
        self.hub()
            .publish(ChangeEvent::insert(Table::TeamMembers, membership));

        Ok(Value::String(team_id))
    }

    async fn invite_team_member(
        &self,
        viewer: &Identity,
        args: InviteArgs,
    ) -> Result<Value, AppError> {
        let role = TeamRole::parse(&args.p_role)
            .filter(|role| *role != TeamRole::Owner)
            .ok_or_else(|| {
                AppError::Validation(format!("Invalid invite role: {}", args.p_role))
            })?;
        let team_id = args.p_team_id.to_string();

        let mut conn = self.pool().acquire().await?;
        let caller = membership_role(&mut conn, &team_id, &viewer.id.to_string()).await?;
        if !caller.is_some_and(|r| r.can_manage_members()) {
            return Err(AppError::Rejected(
                "Only owners and admins can invite members".to_string(),
            ));
        }

        let invitee = sqlx::query("SELECT id FROM profiles WHERE lower(email) = lower(?)")
            .bind(args.p_email.trim())
            .fetch_optional(&mut *conn)
            .await?
            .map(|row| row.get::<String, _>("id"))
            .ok_or_else(|| {
                AppError::Rejected(format!("No user registered with email {}", args.p_email.trim()))
            })?;

        if membership_role(&mut conn, &team_id, &invitee).await?.is_some() {
            return Err(AppError::Rejected(
                "User is already a member of this team".to_string(),
            ));
        }
        drop(conn);

        let member = json!({
            "team_id": team_id,
            "user_id": invitee,
            "role": role.as_str(),
        });
        let created = self.insert(Some(viewer), Table::TeamMembers, member).await?;
        Ok(created.get("id").cloned().unwrap_or(Value::Null))
    }

    async fn user_tasks(&self, viewer: &Identity) -> Result<Value, AppError> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE created_by = ? OR assigned_to = ? ORDER BY created_at DESC",
            schema::column_list(Table::Tasks)
        );
        let uid = viewer.id.to_string();
        let rows = sqlx::query(&sql)
            .bind(&uid)
            .bind(&uid)
            .fetch_all(self.pool())
            .await?;

        let tasks = rows
            .iter()
            .map(|row| schema::row_to_json(Table::Tasks, row, &[]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(tasks))
    }

    async fn team_documents(&self, viewer: &Identity, team_id: Uuid) -> Result<Value, AppError> {
        let team_id = team_id.to_string();
        let mut conn = self.pool().acquire().await?;
        if membership_role(&mut conn, &team_id, &viewer.id.to_string())
            .await?
            .is_none()
        {
            return Ok(Value::Array(Vec::new()));
        }

        let rows = sqlx::query(
            r#"
            SELECT d.*, p.full_name AS creator_name, p.avatar_url AS creator_avatar
            FROM team_documents d
            LEFT JOIN profiles p ON p.id = d.created_by
            WHERE d.team_id = ?
            ORDER BY d.created_at DESC
            "#,
        )
        .bind(&team_id)
        .fetch_all(&mut *conn)
        .await?;

        let documents = rows
            .iter()
            .map(|row| {
                schema::row_to_json(Table::TeamDocuments, row, &["creator_name", "creator_avatar"])
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(documents))
    }
}

#[derive(Deserialize)]
struct UserArgs {
    p_user_id: Uuid,
}

#[derive(Deserialize)]
struct TeamArgs {
    p_team_id: Uuid,
}

#[derive(Deserialize)]
struct EventIdArgs {
    p_event_id: Uuid,
}

#[derive(Deserialize)]
struct CreateEventArgs {
    p_title: String,
    #[serde(default)]
    p_description: Option<String>,
    p_start_time: String,
    p_end_time: String,
    #[serde(default)]
    p_all_day: bool,
    #[serde(default)]
    p_team_id: Option<Uuid>,
    p_created_by: Uuid,
}

#[derive(Deserialize)]
struct CreateTeamArgs {
    p_name: String,
    p_user_id: Uuid,
    #[serde(default)]
    p_type: Option<TeamKind>,
}

#[derive(Deserialize)]
struct InviteArgs {
    p_team_id: Uuid,
    p_email: String,
    p_role: String,
    p_inviter_id: Uuid,
}

#[derive(Deserialize)]
struct CreateTaskArgs {
    p_title: String,
    #[serde(default)]
    p_description: Option<String>,
    #[serde(default)]
    p_status: Option<String>,
    #[serde(default)]
    p_priority: Option<String>,
    #[serde(default)]
    p_due_date: Option<String>,
    #[serde(default)]
    p_assigned_to: Option<Uuid>,
    #[serde(default)]
    p_team_id: Option<Uuid>,
    p_created_by: Uuid,
}

fn parse_args<T: DeserializeOwned>(procedure: Procedure, args: Value) -> Result<T, AppError> {
    serde_json::from_value(args).map_err(|e| {
        AppError::BadRequest(format!("Invalid arguments for {}: {}", procedure, e))
    })
}

/// Procedures act on behalf of the caller only.
fn ensure_self(viewer: &Identity, claimed: Uuid) -> Result<(), AppError> {
    if viewer.id == claimed {
        Ok(())
    } else {
        Err(AppError::Rejected(
            "Cannot act on behalf of another user".to_string(),
        ))
    }
}

/// `{p_event_id, p_title, ...}` into the event id and a column patch.
fn split_event_update(args: Value) -> Result<(String, Value), AppError> {
    let Value::Object(args) = args else {
        return Err(AppError::BadRequest(
            "update_event expects an object".to_string(),
        ));
    };

    let mut id = None;
    let mut patch = Map::new();
    for (key, value) in args {
        if key == "p_event_id" {
            id = value.as_str().map(str::to_string);
            continue;
        }
        let column = key.strip_prefix("p_").ok_or_else(|| {
            AppError::BadRequest(format!("Unexpected update_event argument: {}", key))
        })?;
        patch.insert(column.to_string(), value);
    }

    let id = id.ok_or_else(|| AppError::BadRequest("p_event_id is required".to_string()))?;
    Ok((id, Value::Object(patch)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_event_update_strips_prefixes() {
        let (id, patch) = split_event_update(json!({
            "p_event_id": "e1",
            "p_title": "Dinner",
            "p_team_id": null,
        }))
        .unwrap();
        assert_eq!(id, "e1");
        assert_eq!(patch, json!({ "title": "Dinner", "team_id": null }));
    }

    #[test]
    fn test_split_event_update_requires_id() {
        assert!(split_event_update(json!({ "p_title": "x" })).is_err());
        assert!(split_event_update(json!({ "p_event_id": "e1", "title": "x" })).is_err());
    }

    #[test]
    fn test_ensure_self() {
        let me = Identity {
            id: Uuid::new_v4(),
            email: "me@example.com".to_string(),
        };
        assert!(ensure_self(&me, me.id).is_ok());
        assert!(matches!(
            ensure_self(&me, Uuid::new_v4()),
            Err(AppError::Rejected(_))
        ));
    }
}
