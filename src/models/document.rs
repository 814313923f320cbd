//! Shared team document links matching the `team_documents` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// A link shared with a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamDocument {
    pub id: Uuid,
    pub team_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub creator_name: Option<String>,
    #[serde(default)]
    pub creator_avatar: Option<String>,
}

/// Fields for a new document. Also the draft of the document dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    pub team_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
}

impl NewDocument {
    pub fn blank(team_id: Uuid) -> Self {
        Self {
            team_id,
            title: String::new(),
            url: String::new(),
            description: None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("Document title is required".to_string()));
        }
        validate_url(&self.url)
    }

    /// The fields as they are stored: title and URL trimmed.
    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            url: self.url.trim().to_string(),
            ..self.clone()
        }
    }
}

impl From<&TeamDocument> for NewDocument {
    fn from(doc: &TeamDocument) -> Self {
        Self {
            team_id: doc.team_id,
            title: doc.title.clone(),
            url: doc.url.clone(),
            description: doc.description.clone(),
        }
    }
}

/// Partial update of a document.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

impl DocumentPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(AppError::Validation("Document title is required".to_string()));
            }
        }
        match &self.url {
            Some(url) => validate_url(url),
            None => Ok(()),
        }
    }

    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.as_deref().map(|t| t.trim().to_string()),
            url: self.url.as_deref().map(|u| u.trim().to_string()),
            description: self.description.clone(),
        }
    }
}

impl From<NewDocument> for DocumentPatch {
    fn from(fields: NewDocument) -> Self {
        Self {
            title: Some(fields.title),
            url: Some(fields.url),
            description: Some(fields.description),
        }
    }
}

/// Reject anything that does not parse as an absolute URL.
pub fn validate_url(raw: &str) -> Result<(), AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation("URL is required".to_string()));
    }
    url::Url::parse(raw.trim())
        .map(|_| ())
        .map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(validate_url("https://docs.google.com/document/d/abc").is_ok());
        assert!(validate_url("mailto:us@example.com").is_ok());
        assert!(validate_url("docs.google.com/abc").is_err());
        assert!(validate_url("").is_err());
        assert!(validate_url("http://").is_err());
    }

    #[test]
    fn test_patch_without_url_skips_url_check() {
        let patch = DocumentPatch {
            title: Some("Budget".to_string()),
            ..DocumentPatch::default()
        };
        assert!(patch.validate().is_ok());

        let bad = DocumentPatch {
            url: Some("not a url".to_string()),
            ..DocumentPatch::default()
        };
        assert!(bad.validate().is_err());
    }
}
