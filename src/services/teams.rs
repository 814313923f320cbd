use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::{profiles_by_id, require_user, with_fallback};
use crate::errors::AppError;
use crate::gateway::{Gateway, Procedure, Query, Table};
use crate::models::{
    validate_team_name, Identity, NewTeam, Owned, Profile, Team, TeamInvite, TeamKind,
    TeamMember, TeamRole, TeamWithMembers,
};

#[derive(Serialize)]
struct UserArgs {
    p_user_id: Uuid,
}

#[derive(Serialize)]
struct CreateTeamArgs<'a> {
    p_name: &'a str,
    p_user_id: Uuid,
    p_type: TeamKind,
}

#[derive(Serialize)]
struct InviteArgs<'a> {
    p_team_id: Uuid,
    p_email: &'a str,
    p_role: TeamRole,
    p_inviter_id: Uuid,
}

#[derive(Clone)]
pub struct TeamService {
    gateway: Gateway,
}

impl TeamService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Teams of the signed-in user with the caller's role and every member.
    pub async fn list_for_user(&self) -> Result<Vec<TeamWithMembers>, AppError> {
        let Some(user) = self.gateway.current_user().await else {
            return Ok(Vec::new());
        };

        with_fallback(
            Procedure::GetUserTeams,
            self.gateway
                .call(Procedure::GetUserTeams, &UserArgs { p_user_id: user.id }),
            || self.list_direct(&user),
        )
        .await
    }

    async fn list_direct(&self, user: &Identity) -> Result<Vec<TeamWithMembers>, AppError> {
        let memberships: Vec<TeamMember> = self
            .gateway
            .select(Table::TeamMembers, &Query::new().eq("user_id", user.id))
            .await?;
        if memberships.is_empty() {
            return Ok(Vec::new());
        }

        let roles: HashMap<Uuid, TeamRole> = memberships
            .iter()
            .map(|m| (m.team_id, m.role))
            .collect();
        let team_ids: Vec<Uuid> = roles.keys().copied().collect();

        let teams: Vec<Team> = self
            .gateway
            .select(
                Table::Teams,
                &Query::new()
                    .in_list("id", &team_ids)
                    .order_by("created_at", true),
            )
            .await?;
        let members: Vec<TeamMember> = self
            .gateway
            .select(
                Table::TeamMembers,
                &Query::new()
                    .in_list("team_id", &team_ids)
                    .order_by("joined_at", true),
            )
            .await?;
        let members = self.with_profiles(members).await?;

        Ok(teams
            .into_iter()
            .map(|team| {
                let user_role = roles.get(&team.id).copied().unwrap_or_default();
                let team_members = members
                    .iter()
                    .filter(|m| m.team_id == team.id)
                    .cloned()
                    .collect();
                TeamWithMembers {
                    team,
                    user_role,
                    team_members,
                }
            })
            .collect())
    }

    /// Create a team owned by the signed-in user. Returns the team id.
    pub async fn create(&self, fields: &NewTeam) -> Result<Uuid, AppError> {
        fields.validate()?;
        let user = require_user(&self.gateway).await?;
        let stored = fields.normalized();
        let fields = &stored;

        let args = CreateTeamArgs {
            p_name: &fields.name,
            p_user_id: user.id,
            p_type: fields.kind,
        };

        let id = with_fallback(
            Procedure::CreateTeamWithOwner,
            self.gateway.call(Procedure::CreateTeamWithOwner, &args),
            || self.create_direct(fields, &user),
        )
        .await?;

        tracing::info!("Created team {}", id);
        Ok(id)
    }

    /// Team first, then the owner membership; the team is removed again if the
    /// membership cannot be written.
    async fn create_direct(&self, fields: &NewTeam, user: &Identity) -> Result<Uuid, AppError> {
        let team: Team = self
            .gateway
            .insert(Table::Teams, &Owned::new(fields, user.id))
            .await?;

        let owner = json!({
            "team_id": team.id,
            "user_id": user.id,
            "role": TeamRole::Owner,
        });
        let membership: Result<TeamMember, AppError> =
            self.gateway.insert(Table::TeamMembers, &owner).await;

        match membership {
            Ok(_) => Ok(team.id),
            Err(e) => {
                tracing::error!("Owner membership for team {} failed: {}", team.id, e);
                if let Err(cleanup) = self.gateway.delete(Table::Teams, team.id).await {
                    tracing::error!("Could not remove ownerless team {}: {}", team.id, cleanup);
                }
                Err(e)
            }
        }
    }

    pub async fn rename(&self, id: Uuid, name: &str) -> Result<Team, AppError> {
        validate_team_name(name)?;
        require_user(&self.gateway).await?;

        let team: Team = self
            .gateway
            .update(Table::Teams, id, &json!({ "name": name.trim() }))
            .await?;
        tracing::info!("Renamed team {}", id);
        Ok(team)
    }

    /// Delete a team together with its members, tasks, events and documents.
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        require_user(&self.gateway).await?;
        self.gateway.delete(Table::Teams, id).await?;
        tracing::info!("Deleted team {}", id);
        Ok(())
    }

    /// Add a registered user to a team by email. Returns the membership id.
    pub async fn invite(&self, invite: &TeamInvite) -> Result<Uuid, AppError> {
        invite.validate()?;
        let user = require_user(&self.gateway).await?;
        let email = invite.email.trim().to_lowercase();
        let email = email.as_str();

        let args = InviteArgs {
            p_team_id: invite.team_id,
            p_email: email,
            p_role: invite.role,
            p_inviter_id: user.id,
        };

        let id = with_fallback(
            Procedure::InviteTeamMember,
            self.gateway.call(Procedure::InviteTeamMember, &args),
            || self.invite_direct(invite, email),
        )
        .await?;

        tracing::info!("Invited {} to team {}", email, invite.team_id);
        Ok(id)
    }

    async fn invite_direct(&self, invite: &TeamInvite, email: &str) -> Result<Uuid, AppError> {
        let profiles: Vec<Profile> = self
            .gateway
            .select(Table::Profiles, &Query::new().eq("email", email))
            .await?;
        let invitee = profiles.into_iter().next().ok_or_else(|| {
            AppError::Rejected(format!("No user registered with email {}", email))
        })?;

        let member: TeamMember = self
            .gateway
            .insert(
                Table::TeamMembers,
                &json!({
                    "team_id": invite.team_id,
                    "user_id": invitee.id,
                    "role": invite.role,
                }),
            )
            .await?;
        Ok(member.id)
    }

    pub async fn remove_member(&self, member_id: Uuid) -> Result<(), AppError> {
        require_user(&self.gateway).await?;
        self.gateway.delete(Table::TeamMembers, member_id).await?;
        tracing::info!("Removed team member {}", member_id);
        Ok(())
    }

    /// Change a member's role. Only the owner may do this; ownership never moves.
    pub async fn update_member_role(
        &self,
        member_id: Uuid,
        role: TeamRole,
    ) -> Result<TeamMember, AppError> {
        if role == TeamRole::Owner {
            return Err(AppError::Validation(
                "Team ownership cannot be transferred".to_string(),
            ));
        }
        require_user(&self.gateway).await?;

        let member: TeamMember = self
            .gateway
            .update(Table::TeamMembers, member_id, &json!({ "role": role }))
            .await?;
        tracing::info!("Member {} is now {}", member_id, role.as_str());
        Ok(member)
    }

    /// Members of one team with their profile names, oldest first.
    pub async fn members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, AppError> {
        let members: Vec<TeamMember> = self
            .gateway
            .select(
                Table::TeamMembers,
                &Query::new()
                    .eq("team_id", team_id)
                    .order_by("joined_at", true),
            )
            .await?;
        self.with_profiles(members).await
    }

    async fn with_profiles(&self, members: Vec<TeamMember>) -> Result<Vec<TeamMember>, AppError> {
        let profiles = profiles_by_id(&self.gateway, members.iter().map(|m| m.user_id)).await?;

        Ok(members
            .into_iter()
            .map(|mut member| {
                if let Some(profile) = profiles.get(&member.user_id) {
                    member.full_name = profile.full_name.clone();
                    member.avatar_url = profile.avatar_url.clone();
                }
                member
            })
            .collect())
    }
}
