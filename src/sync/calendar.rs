use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::collection::{LiveCollection, Source};
use super::notices::{Notice, Notices};
use super::session::{EditSession, Submission};
use crate::errors::AppError;
use crate::gateway::Table;
use crate::models::{CalendarEvent, EventPatch, NewEvent, TeamSummary};
use crate::realtime::Channel;
use crate::services::{EventService, Services};

pub struct EventSource {
    events: EventService,
}

impl Source for EventSource {
    type Item = CalendarEvent;

    async fn fetch(&self) -> Result<Vec<CalendarEvent>, AppError> {
        self.events.list_for_user().await
    }

    fn channel(&self) -> Channel {
        Channel::new("events").on(Table::Events, None)
    }
}

/// Empty selection shows everything; otherwise personal events plus events of selected teams.
pub fn filter_by_teams(events: &[CalendarEvent], selected: &HashSet<Uuid>) -> Vec<CalendarEvent> {
    events
        .iter()
        .filter(|e| {
            selected.is_empty() || e.event.team_id.map_or(true, |team| selected.contains(&team))
        })
        .cloned()
        .collect()
}

/// Calendar screen state: events, team filter and the event dialog.
pub struct CalendarView {
    events: Arc<LiveCollection<EventSource>>,
    service: EventService,
    teams: Mutex<Vec<TeamSummary>>,
    selected: Mutex<HashSet<Uuid>>,
    session: Mutex<EditSession<NewEvent>>,
}

impl CalendarView {
    pub fn new(services: &Services) -> Self {
        Self {
            events: LiveCollection::new(
                EventSource {
                    events: services.events.clone(),
                },
                services.realtime.clone(),
            ),
            service: services.events.clone(),
            teams: Mutex::new(Vec::new()),
            selected: Mutex::new(HashSet::new()),
            session: Mutex::new(EditSession::new()),
        }
    }

    pub async fn mount(&self) {
        self.events.mount().await;
        self.load_teams().await;
    }

    pub async fn reload(&self) {
        self.events.reload().await;
    }

    pub async fn unmount(&self) {
        self.events.unmount().await;
    }

    async fn load_teams(&self) {
        match self.service.user_teams().await {
            Ok(teams) => *self.teams.lock().await = teams,
            Err(e) => {
                tracing::warn!("Could not load team options: {}", e);
                self.events
                    .notices()
                    .push(Notice::from_error(&e))
                    .await;
            }
        }
    }

    pub fn notices(&self) -> &Notices {
        self.events.notices()
    }

    pub async fn is_loading(&self) -> bool {
        self.events.is_loading().await
    }

    pub async fn all_events(&self) -> Vec<CalendarEvent> {
        self.events.items().await
    }

    /// Events passing the team filter.
    pub async fn visible_events(&self) -> Vec<CalendarEvent> {
        let events = self.events.items().await;
        let selected = self.selected.lock().await;
        filter_by_teams(&events, &selected)
    }

    pub async fn team_options(&self) -> Vec<TeamSummary> {
        self.teams.lock().await.clone()
    }

    pub async fn set_team_filter(&self, teams: HashSet<Uuid>) {
        *self.selected.lock().await = teams;
    }

    pub async fn toggle_team(&self, team_id: Uuid) {
        let mut selected = self.selected.lock().await;
        if !selected.remove(&team_id) {
            selected.insert(team_id);
        }
    }

    // ==================== EVENT DIALOG ====================

    /// Open a blank dialog for a clicked slot.
    pub async fn open_create(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
        self.session
            .lock()
            .await
            .open_create(NewEvent::for_slot(start, end))
    }

    pub async fn open_edit(&self, event: &CalendarEvent) -> Result<(), AppError> {
        self.session
            .lock()
            .await
            .open_edit(event.event.id, NewEvent::from(&event.event))
    }

    pub async fn edit_draft(&self, edit: impl FnOnce(&mut NewEvent)) {
        if let Some(draft) = self.session.lock().await.draft_mut() {
            edit(draft);
        }
    }

    pub async fn draft(&self) -> Option<NewEvent> {
        self.session.lock().await.draft().cloned()
    }

    pub async fn is_editing(&self) -> bool {
        self.session.lock().await.is_open()
    }

    pub async fn cancel(&self) {
        self.session.lock().await.cancel();
    }

    pub async fn submit(&self) -> Result<(), AppError> {
        self.events
            .submit(&self.session, "Event saved", |submission| async move {
                match submission {
                    Submission::Create(draft) => self.service.create(&draft).await.map(|_| ()),
                    Submission::Update(id, draft) => self
                        .service
                        .update(id, &EventPatch::from(draft))
                        .await
                        .map(|_| ()),
                }
            })
            .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.events
            .run_action("Event deleted", self.service.delete(id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;

    fn event(team_id: Option<Uuid>) -> CalendarEvent {
        let now = Utc::now();
        CalendarEvent::from(Event {
            id: Uuid::new_v4(),
            title: "Standup".to_string(),
            description: None,
            start_time: now,
            end_time: now,
            all_day: false,
            created_by: Uuid::nil(),
            team_id,
            created_at: now,
            updated_at: now,
        })
    }

    #[test]
    fn test_team_filter() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let events = vec![event(None), event(Some(a)), event(Some(b))];

        assert_eq!(filter_by_teams(&events, &HashSet::new()).len(), 3);

        let only_a = filter_by_teams(&events, &HashSet::from([a]));
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|e| e.event.team_id != Some(b)));
    }
}
