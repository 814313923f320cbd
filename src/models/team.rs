//! Team and membership models matching the `teams` and `team_members` tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Kind of team: a pair of two or a larger group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TeamKind {
    #[default]
    Couple,
    Team,
}

impl TeamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamKind::Couple => "couple",
            TeamKind::Team => "team",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "couple" => Some(TeamKind::Couple),
            "team" => Some(TeamKind::Team),
            _ => None,
        }
    }
}

/// Role of a member within a team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(TeamRole::Owner),
            "admin" => Some(TeamRole::Admin),
            "member" => Some(TeamRole::Member),
            _ => None,
        }
    }

    /// Owners and admins may invite and remove members.
    pub fn can_manage_members(&self) -> bool {
        matches!(self, TeamRole::Owner | TeamRole::Admin)
    }
}

/// A team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TeamKind,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Minimal team shape used by the calendar's team selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TeamKind,
}

/// Membership row, optionally carrying the member's profile name and avatar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A team together with the caller's role and the full member list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamWithMembers {
    #[serde(flatten)]
    pub team: Team,
    pub user_role: TeamRole,
    #[serde(default)]
    pub team_members: Vec<TeamMember>,
}

impl TeamWithMembers {
    /// Only the owner may change other members' roles; the control is disabled otherwise.
    pub fn can_manage_roles(&self) -> bool {
        self.user_role == TeamRole::Owner
    }

    pub fn owners(&self) -> impl Iterator<Item = &TeamMember> {
        self.team_members
            .iter()
            .filter(|member| member.role == TeamRole::Owner)
    }
}

/// Fields for a new team. Also the draft of the create-team dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NewTeam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TeamKind,
}

impl NewTeam {
    pub fn new(name: impl Into<String>, kind: TeamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_team_name(&self.name)
    }

    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            kind: self.kind,
        }
    }
}

pub fn validate_team_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Team name is required".to_string()));
    }
    Ok(())
}

/// Invitation of a registered user into a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamInvite {
    pub team_id: Uuid,
    pub email: String,
    pub role: TeamRole,
}

impl TeamInvite {
    pub fn validate(&self) -> Result<(), AppError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("A valid email is required".to_string()));
        }
        if self.role == TeamRole::Owner {
            return Err(AppError::Validation(
                "Invited members can only be admin or member".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(role: TeamRole) -> TeamMember {
        TeamMember {
            id: Uuid::new_v4(),
            team_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            role,
            joined_at: Utc::now(),
            full_name: None,
            avatar_url: None,
        }
    }

    #[test]
    fn test_only_owner_manages_roles() {
        let team = Team {
            id: Uuid::nil(),
            name: "Home".to_string(),
            kind: TeamKind::Couple,
            created_by: Uuid::nil(),
            created_at: Utc::now(),
        };
        let mut view = TeamWithMembers {
            team,
            user_role: TeamRole::Admin,
            team_members: vec![membership(TeamRole::Owner), membership(TeamRole::Admin)],
        };
        assert!(!view.can_manage_roles());
        assert_eq!(view.owners().count(), 1);

        view.user_role = TeamRole::Owner;
        assert!(view.can_manage_roles());
    }

    #[test]
    fn test_team_kind_serializes_as_type() {
        let draft = NewTeam::new("Flatmates", TeamKind::Team);
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["type"], "team");
    }

    #[test]
    fn test_invite_validation() {
        let invite = TeamInvite {
            team_id: Uuid::nil(),
            email: "partner@example.com".to_string(),
            role: TeamRole::Member,
        };
        assert!(invite.validate().is_ok());

        let owner = TeamInvite {
            role: TeamRole::Owner,
            ..invite.clone()
        };
        assert!(owner.validate().is_err());

        let bad_email = TeamInvite {
            email: "partner".to_string(),
            ..invite
        };
        assert!(bad_email.validate().is_err());
    }
}
