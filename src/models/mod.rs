//! Data models for compass.
//!
//! Field names match the backend schema exactly so rows round-trip without renaming.

mod account;
mod document;
mod event;
mod profile;
mod task;
mod team;

pub use account::*;
pub use document::*;
pub use event::*;
pub use profile::*;
pub use task::*;
pub use team::*;

use serde::Serialize;
use uuid::Uuid;

/// Insert payload: the entity's own fields plus the creator column the backend checks.
#[derive(Debug, Clone, Serialize)]
pub struct Owned<'a, T: Serialize> {
    #[serde(flatten)]
    pub fields: &'a T,
    pub created_by: Uuid,
}

impl<'a, T: Serialize> Owned<'a, T> {
    pub fn new(fields: &'a T, created_by: Uuid) -> Self {
        Self { fields, created_by }
    }
}

/// Anything keyed by a row identifier.
pub trait Keyed {
    fn key(&self) -> Uuid;
}

impl Keyed for Task {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Keyed for Event {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Keyed for CalendarEvent {
    fn key(&self) -> Uuid {
        self.event.id
    }
}

impl Keyed for TeamWithMembers {
    fn key(&self) -> Uuid {
        self.team.id
    }
}

impl Keyed for TeamDocument {
    fn key(&self) -> Uuid {
        self.id
    }
}

/// Merge result sets by identifier. The first occurrence keeps its position,
/// the last occurrence supplies the value.
pub fn merge_unique<T: Keyed>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut merged: Vec<T> = Vec::new();
    let mut positions = std::collections::HashMap::new();

    for item in items {
        match positions.get(&item.key()) {
            Some(&index) => merged[index] = item,
            None => {
                positions.insert(item.key(), merged.len());
                merged.push(item);
            }
        }
    }

    merged
}
