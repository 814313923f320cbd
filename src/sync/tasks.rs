use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::collection::{LiveCollection, Source};
use super::notices::Notices;
use super::session::{EditSession, Submission};
use crate::errors::AppError;
use crate::gateway::{RowFilter, Table};
use crate::models::{NewTask, Task, TaskPatch, TaskStatus};
use crate::realtime::Channel;
use crate::services::{Services, TaskService};

/// Which tasks a board shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// Tasks the user created or is assigned to
    Personal,
    Team(Uuid),
}

pub struct TaskSource {
    tasks: TaskService,
    scope: TaskScope,
}

impl Source for TaskSource {
    type Item = Task;

    async fn fetch(&self) -> Result<Vec<Task>, AppError> {
        match self.scope {
            TaskScope::Personal => self.tasks.list_for_user().await,
            TaskScope::Team(team_id) => self.tasks.list_for_team(team_id).await,
        }
    }

    fn channel(&self) -> Channel {
        match self.scope {
            TaskScope::Personal => Channel::new("tasks").on(Table::Tasks, None),
            TaskScope::Team(team_id) => Channel::new(format!("team-tasks-{}", team_id))
                .on(Table::Tasks, Some(RowFilter::eq("team_id", team_id))),
        }
    }
}

pub const BOARD_COLUMNS: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

/// Split tasks into the board's columns, keeping their order.
pub fn board_columns(tasks: &[Task]) -> [(TaskStatus, Vec<Task>); 3] {
    BOARD_COLUMNS.map(|status| {
        let column = tasks.iter().filter(|t| t.status == status).cloned().collect();
        (status, column)
    })
}

/// Task board state for personal or team tasks.
pub struct TaskBoard {
    tasks: Arc<LiveCollection<TaskSource>>,
    service: TaskService,
    scope: TaskScope,
    session: Mutex<EditSession<NewTask>>,
}

impl TaskBoard {
    pub fn new(services: &Services, scope: TaskScope) -> Self {
        Self {
            tasks: LiveCollection::new(
                TaskSource {
                    tasks: services.tasks.clone(),
                    scope,
                },
                services.realtime.clone(),
            ),
            service: services.tasks.clone(),
            scope,
            session: Mutex::new(EditSession::new()),
        }
    }

    pub fn scope(&self) -> TaskScope {
        self.scope
    }

    pub async fn mount(&self) {
        self.tasks.mount().await;
    }

    pub async fn reload(&self) {
        self.tasks.reload().await;
    }

    pub async fn unmount(&self) {
        self.tasks.unmount().await;
    }

    pub fn notices(&self) -> &Notices {
        self.tasks.notices()
    }

    pub async fn is_loading(&self) -> bool {
        self.tasks.is_loading().await
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.tasks.items().await
    }

    pub async fn column(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks
            .items()
            .await
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    pub async fn columns(&self) -> [(TaskStatus, Vec<Task>); 3] {
        board_columns(&self.tasks.items().await)
    }

    pub async fn toggle(&self, id: Uuid) -> Result<(), AppError> {
        let task = self
            .tasks
            .items()
            .await
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Task {} is not on this board", id)))?;

        self.tasks
            .run_action("Task updated", async { self.service.toggle(&task).await.map(|_| ()) })
            .await
    }

    pub async fn set_status(&self, id: Uuid, status: TaskStatus) -> Result<(), AppError> {
        self.tasks
            .run_action("Task updated", async {
                self.service
                    .update(id, &TaskPatch::status(status))
                    .await
                    .map(|_| ())
            })
            .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.tasks
            .run_action("Task deleted", self.service.delete(id))
            .await
    }

    // ==================== TASK DIALOG ====================

    /// Open a blank dialog; team boards preset the team.
    pub async fn open_create(&self) -> Result<(), AppError> {
        let draft = NewTask {
            team_id: match self.scope {
                TaskScope::Personal => None,
                TaskScope::Team(team_id) => Some(team_id),
            },
            ..NewTask::default()
        };
        self.session.lock().await.open_create(draft)
    }

    pub async fn open_edit(&self, task: &Task) -> Result<(), AppError> {
        self.session
            .lock()
            .await
            .open_edit(task.id, NewTask::from(task))
    }

    pub async fn edit_draft(&self, edit: impl FnOnce(&mut NewTask)) {
        if let Some(draft) = self.session.lock().await.draft_mut() {
            edit(draft);
        }
    }

    pub async fn draft(&self) -> Option<NewTask> {
        self.session.lock().await.draft().cloned()
    }

    pub async fn is_editing(&self) -> bool {
        self.session.lock().await.is_open()
    }

    pub async fn cancel(&self) {
        self.session.lock().await.cancel();
    }

    pub async fn submit(&self) -> Result<(), AppError> {
        self.tasks
            .submit(&self.session, "Task saved", |submission| async move {
                match submission {
                    Submission::Create(draft) => self.service.create(&draft).await.map(|_| ()),
                    Submission::Update(id, draft) => self
                        .service
                        .update(id, &TaskPatch::from(draft))
                        .await
                        .map(|_| ()),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(status: TaskStatus) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Chore".to_string(),
            description: None,
            status,
            priority: Default::default(),
            due_date: None,
            assigned_to: None,
            created_by: Uuid::nil(),
            team_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_board_columns() {
        let tasks = vec![
            task(TaskStatus::Done),
            task(TaskStatus::Todo),
            task(TaskStatus::InProgress),
            task(TaskStatus::Todo),
        ];

        let [(todo_status, todo), (_, in_progress), (_, done)] = board_columns(&tasks);
        assert_eq!(todo_status, TaskStatus::Todo);
        assert_eq!(todo.len(), 2);
        assert_eq!(in_progress.len(), 1);
        assert_eq!(done.len(), 1);
        assert_eq!(todo[0].id, tasks[1].id);
    }

    #[test]
    fn test_team_board_channel_is_filtered() {
        let team = Uuid::new_v4();
        let gateway = crate::gateway::Gateway::http(&crate::config::ClientConfig {
            url: "http://127.0.0.1:1".to_string(),
            api_key: None,
        })
        .unwrap();
        let source = TaskSource {
            tasks: TaskService::new(gateway),
            scope: TaskScope::Team(team),
        };

        let channel = source.channel();
        assert_eq!(
            channel.bindings()[0].filter,
            Some(RowFilter::eq("team_id", team))
        );
    }
}
