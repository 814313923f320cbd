use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::collection::{LiveCollection, Source};
use super::notices::Notices;
use super::session::{EditSession, Submission};
use crate::errors::AppError;
use crate::gateway::{RowFilter, Table};
use crate::models::{DocumentPatch, NewDocument, TeamDocument};
use crate::realtime::Channel;
use crate::services::{DocumentService, Services};

pub struct DocumentSource {
    documents: DocumentService,
    team_id: Uuid,
}

impl Source for DocumentSource {
    type Item = TeamDocument;

    async fn fetch(&self) -> Result<Vec<TeamDocument>, AppError> {
        self.documents.list_for_team(self.team_id).await
    }

    fn channel(&self) -> Channel {
        Channel::new(format!("team-documents-{}", self.team_id)).on(
            Table::TeamDocuments,
            Some(RowFilter::eq("team_id", self.team_id)),
        )
    }
}

/// Shared links of one team.
pub struct DocumentsView {
    documents: Arc<LiveCollection<DocumentSource>>,
    service: DocumentService,
    team_id: Uuid,
    session: Mutex<EditSession<NewDocument>>,
}

impl DocumentsView {
    pub fn new(services: &Services, team_id: Uuid) -> Self {
        Self {
            documents: LiveCollection::new(
                DocumentSource {
                    documents: services.documents.clone(),
                    team_id,
                },
                services.realtime.clone(),
            ),
            service: services.documents.clone(),
            team_id,
            session: Mutex::new(EditSession::new()),
        }
    }

    pub fn team_id(&self) -> Uuid {
        self.team_id
    }

    pub async fn mount(&self) {
        self.documents.mount().await;
    }

    pub async fn reload(&self) {
        self.documents.reload().await;
    }

    pub async fn unmount(&self) {
        self.documents.unmount().await;
    }

    pub fn notices(&self) -> &Notices {
        self.documents.notices()
    }

    pub async fn is_loading(&self) -> bool {
        self.documents.is_loading().await
    }

    pub async fn documents(&self) -> Vec<TeamDocument> {
        self.documents.items().await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.documents
            .run_action("Document deleted", self.service.delete(id))
            .await
    }

    // ==================== DOCUMENT DIALOG ====================

    pub async fn open_create(&self) -> Result<(), AppError> {
        self.session
            .lock()
            .await
            .open_create(NewDocument::blank(self.team_id))
    }

    pub async fn open_edit(&self, doc: &TeamDocument) -> Result<(), AppError> {
        self.session
            .lock()
            .await
            .open_edit(doc.id, NewDocument::from(doc))
    }

    pub async fn edit_draft(&self, edit: impl FnOnce(&mut NewDocument)) {
        if let Some(draft) = self.session.lock().await.draft_mut() {
            edit(draft);
        }
    }

    pub async fn draft(&self) -> Option<NewDocument> {
        self.session.lock().await.draft().cloned()
    }

    pub async fn is_editing(&self) -> bool {
        self.session.lock().await.is_open()
    }

    pub async fn cancel(&self) {
        self.session.lock().await.cancel();
    }

    pub async fn submit(&self) -> Result<(), AppError> {
        self.documents
            .submit(&self.session, "Document saved", |submission| async move {
                match submission {
                    Submission::Create(draft) => self.service.create(&draft).await.map(|_| ()),
                    Submission::Update(id, draft) => self
                        .service
                        .update(id, &DocumentPatch::from(draft))
                        .await
                        .map(|_| ()),
                }
            })
            .await
    }
}
