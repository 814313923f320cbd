//! Calendar event models matching the `events` and `event_attendees` tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// A calendar event, personal or owned by a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub all_day: bool,
    pub created_by: Uuid,
    pub team_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event as shown on the calendar, with the owning team's name attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    #[serde(flatten)]
    pub event: Event,
    #[serde(default)]
    pub team_name: Option<String>,
}

impl From<Event> for CalendarEvent {
    fn from(event: Event) -> Self {
        Self {
            event,
            team_name: None,
        }
    }
}

/// Fields for a new event. Also the draft of the event dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub all_day: bool,
    pub team_id: Option<Uuid>,
}

impl NewEvent {
    /// A blank draft for the given calendar slot.
    pub fn for_slot(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            title: String::new(),
            description: None,
            start_time,
            end_time,
            all_day: false,
            team_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("Event title is required".to_string()));
        }
        Ok(())
    }

    /// The fields as they are stored: title trimmed.
    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            ..self.clone()
        }
    }
}

impl From<&Event> for NewEvent {
    fn from(event: &Event) -> Self {
        Self {
            title: event.title.clone(),
            description: event.description.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            all_day: event.all_day,
            team_id: event.team_id,
        }
    }
}

/// Partial update of an event. `None` leaves a column untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<Option<Uuid>>,
}

impl EventPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.title {
            Some(title) if title.trim().is_empty() => {
                Err(AppError::Validation("Event title is required".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl From<NewEvent> for EventPatch {
    fn from(fields: NewEvent) -> Self {
        Self {
            title: Some(fields.title),
            description: Some(fields.description),
            start_time: Some(fields.start_time),
            end_time: Some(fields.end_time),
            all_day: Some(fields.all_day),
            team_id: Some(fields.team_id),
        }
    }
}

/// RSVP state of an attendee.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

/// Row of the `event_attendees` table. The schema declares it; no flow writes it yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventAttendee {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: AttendeeStatus,
}
