//! View-state synchronizer.
//!
//! Views hold the in-memory copy of a server-owned collection, keep it fresh
//! through realtime invalidation and full reloads, and drive the edit dialogs.

mod calendar;
mod collection;
mod documents;
mod notices;
mod session;
mod tasks;
mod teams;

pub use calendar::{filter_by_teams, CalendarView, EventSource};
pub use collection::{LiveCollection, Source};
pub use documents::{DocumentSource, DocumentsView};
pub use notices::{Notice, NoticeLevel, Notices};
pub use session::{EditSession, EditState, Submission};
pub use tasks::{board_columns, TaskBoard, TaskScope, TaskSource, BOARD_COLUMNS};
pub use teams::{TeamSource, TeamsView};
