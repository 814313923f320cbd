use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::collection::{LiveCollection, Source};
use super::notices::Notices;
use super::session::{EditSession, Submission};
use crate::errors::AppError;
use crate::gateway::{RowFilter, Table};
use crate::models::{NewTeam, TeamInvite, TeamRole, TeamWithMembers};
use crate::realtime::Channel;
use crate::services::{Services, TeamService};

pub struct TeamSource {
    teams: TeamService,
    user_id: Option<Uuid>,
}

impl Source for TeamSource {
    type Item = TeamWithMembers;

    async fn fetch(&self) -> Result<Vec<TeamWithMembers>, AppError> {
        self.teams.list_for_user().await
    }

    /// Team rows plus the user's own memberships.
    fn channel(&self) -> Channel {
        Channel::new("teams").on(Table::Teams, None).on(
            Table::TeamMembers,
            self.user_id.map(|id| RowFilter::eq("user_id", id)),
        )
    }
}

/// Teams screen: the user's teams with members, plus the team dialog.
pub struct TeamsView {
    teams: Arc<LiveCollection<TeamSource>>,
    service: TeamService,
    session: Mutex<EditSession<NewTeam>>,
}

impl TeamsView {
    pub async fn new(services: &Services) -> Self {
        let user_id = services.gateway().current_user().await.map(|u| u.id);
        Self {
            teams: LiveCollection::new(
                TeamSource {
                    teams: services.teams.clone(),
                    user_id,
                },
                services.realtime.clone(),
            ),
            service: services.teams.clone(),
            session: Mutex::new(EditSession::new()),
        }
    }

    pub async fn mount(&self) {
        self.teams.mount().await;
    }

    pub async fn reload(&self) {
        self.teams.reload().await;
    }

    pub async fn unmount(&self) {
        self.teams.unmount().await;
    }

    pub fn notices(&self) -> &Notices {
        self.teams.notices()
    }

    pub async fn is_loading(&self) -> bool {
        self.teams.is_loading().await
    }

    pub async fn teams(&self) -> Vec<TeamWithMembers> {
        self.teams.items().await
    }

    pub async fn team(&self, id: Uuid) -> Option<TeamWithMembers> {
        self.teams
            .items()
            .await
            .into_iter()
            .find(|t| t.team.id == id)
    }

    /// Whether the role selector should be enabled for this team.
    pub async fn can_manage_roles(&self, team_id: Uuid) -> bool {
        self.team(team_id)
            .await
            .is_some_and(|t| t.can_manage_roles())
    }

    pub async fn invite(&self, invite: TeamInvite) -> Result<Uuid, AppError> {
        self.teams
            .run_action("Invitation sent", self.service.invite(&invite))
            .await
    }

    pub async fn remove_member(&self, member_id: Uuid) -> Result<(), AppError> {
        self.teams
            .run_action("Member removed", self.service.remove_member(member_id))
            .await
    }

    pub async fn update_member_role(&self, member_id: Uuid, role: TeamRole) -> Result<(), AppError> {
        self.teams
            .run_action("Role updated", async {
                self.service
                    .update_member_role(member_id, role)
                    .await
                    .map(|_| ())
            })
            .await
    }

    pub async fn delete(&self, team_id: Uuid) -> Result<(), AppError> {
        self.teams
            .run_action("Team deleted", self.service.delete(team_id))
            .await
    }

    // ==================== TEAM DIALOG ====================

    pub async fn open_create(&self) -> Result<(), AppError> {
        self.session.lock().await.open_create(NewTeam::default())
    }

    /// Rename dialog for an existing team.
    pub async fn open_edit(&self, team: &TeamWithMembers) -> Result<(), AppError> {
        self.session.lock().await.open_edit(
            team.team.id,
            NewTeam::new(team.team.name.clone(), team.team.kind),
        )
    }

    pub async fn edit_draft(&self, edit: impl FnOnce(&mut NewTeam)) {
        if let Some(draft) = self.session.lock().await.draft_mut() {
            edit(draft);
        }
    }

    pub async fn draft(&self) -> Option<NewTeam> {
        self.session.lock().await.draft().cloned()
    }

    pub async fn cancel(&self) {
        self.session.lock().await.cancel();
    }

    pub async fn submit(&self) -> Result<(), AppError> {
        self.teams
            .submit(&self.session, "Team saved", |submission| async move {
                match submission {
                    Submission::Create(draft) => self.service.create(&draft).await.map(|_| ()),
                    Submission::Update(id, draft) => {
                        self.service.rename(id, &draft.name).await.map(|_| ())
                    }
                }
            })
            .await
    }
}
