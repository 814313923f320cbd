use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::{require_user, with_fallback};
use crate::errors::AppError;
use crate::gateway::{Gateway, Procedure, Query, Table};
use crate::models::{NewTask, Owned, Task, TaskPatch, TaskPriority, TaskStatus};

#[derive(Serialize)]
struct UserArgs {
    p_user_id: Uuid,
}

#[derive(Serialize)]
struct CreateTaskArgs<'a> {
    p_title: &'a str,
    p_description: Option<&'a str>,
    p_status: TaskStatus,
    p_priority: TaskPriority,
    p_due_date: Option<NaiveDate>,
    p_assigned_to: Option<Uuid>,
    p_team_id: Option<Uuid>,
    p_created_by: Uuid,
}

#[derive(Clone)]
pub struct TaskService {
    gateway: Gateway,
}

impl TaskService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Tasks the signed-in user created or is assigned to, newest first.
    pub async fn list_for_user(&self) -> Result<Vec<Task>, AppError> {
        let Some(user) = self.gateway.current_user().await else {
            return Ok(Vec::new());
        };

        with_fallback(
            Procedure::GetUserTasks,
            self.gateway
                .call(Procedure::GetUserTasks, &UserArgs { p_user_id: user.id }),
            || async move {
                self.gateway
                    .select(
                        Table::Tasks,
                        &Query::new()
                            .any_of(&[("created_by", user.id), ("assigned_to", user.id)])
                            .order_by("created_at", false),
                    )
                    .await
            },
        )
        .await
    }

    pub async fn list_for_team(&self, team_id: Uuid) -> Result<Vec<Task>, AppError> {
        self.gateway
            .select(
                Table::Tasks,
                &Query::new()
                    .eq("team_id", team_id)
                    .order_by("created_at", false),
            )
            .await
    }

    pub async fn create(&self, fields: &NewTask) -> Result<Task, AppError> {
        fields.validate()?;
        let user = require_user(&self.gateway).await?;
        let stored = fields.normalized();
        let fields = &stored;

        let args = CreateTaskArgs {
            p_title: &fields.title,
            p_description: fields.description.as_deref(),
            p_status: fields.status,
            p_priority: fields.priority,
            p_due_date: fields.due_date,
            p_assigned_to: fields.assigned_to,
            p_team_id: fields.team_id,
            p_created_by: user.id,
        };

        let task: Task = with_fallback(
            Procedure::CreateTask,
            self.gateway.call(Procedure::CreateTask, &args),
            || async move {
                self.gateway
                    .insert(Table::Tasks, &Owned::new(fields, user.id))
                    .await
            },
        )
        .await?;

        tracing::info!("Created task {}", task.id);
        Ok(task)
    }

    pub async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<Task, AppError> {
        patch.validate()?;
        require_user(&self.gateway).await?;

        let task: Task = self.gateway.update(Table::Tasks, id, patch).await?;
        tracing::info!("Updated task {}", id);
        Ok(task)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        require_user(&self.gateway).await?;
        self.gateway.delete(Table::Tasks, id).await?;
        tracing::info!("Deleted task {}", id);
        Ok(())
    }

    /// Checkbox shortcut: `done` goes back to `todo`, anything else becomes `done`.
    pub async fn toggle(&self, task: &Task) -> Result<Task, AppError> {
        self.update(task.id, &TaskPatch::status(task.status.toggled()))
            .await
    }
}
