use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::AppError;

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// User-facing text for a failure. Infrastructure errors get a generic message.
    pub fn from_error(err: &AppError) -> Self {
        match err {
            AppError::Validation(m)
            | AppError::Rejected(m)
            | AppError::Unauthenticated(m)
            | AppError::NotFound(m) => Self::error(m.clone()),
            _ => Self::error(GENERIC_FAILURE),
        }
    }
}

/// Queue of notices a view has raised and nobody has shown yet.
#[derive(Debug, Clone, Default)]
pub struct Notices {
    queue: Arc<Mutex<VecDeque<Notice>>>,
}

impl Notices {
    pub async fn push(&self, notice: Notice) {
        self.queue.lock().await.push_back(notice);
    }

    pub async fn drain(&self) -> Vec<Notice> {
        self.queue.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_errors_are_generic() {
        let notice = Notice::from_error(&AppError::Database("disk I/O error".to_string()));
        assert_eq!(notice.message, GENERIC_FAILURE);

        let notice = Notice::from_error(&AppError::Validation("Task title is required".to_string()));
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Task title is required");
    }

    #[tokio::test]
    async fn test_drain_empties_queue() {
        let notices = Notices::default();
        notices.push(Notice::success("Saved")).await;
        notices.push(Notice::error("Nope")).await;

        assert_eq!(notices.len().await, 2);
        let drained = notices.drain().await;
        assert_eq!(drained[0], Notice::success("Saved"));
        assert_eq!(notices.len().await, 0);
    }
}
