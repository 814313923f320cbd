//! Integration tests: the local backend over HTTP and the sync layer on top of both transports.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::{ClientConfig, Config};
use crate::db::{init_database, Repository};
use crate::errors::AppError;
use crate::gateway::{Gateway, Procedure, Table};
use crate::models::{
    DocumentPatch, NewDocument, NewEvent, NewTask, NewTeam, Owned, Registration, Task,
    TaskStatus, Team, TeamInvite, TeamKind, TeamRole,
};
use crate::realtime::ChangeEvent;
use crate::services::Services;
use crate::sync::{CalendarView, DocumentsView, NoticeLevel, TaskBoard, TaskScope, TeamsView};
use crate::{create_router, AppState};

const API_KEY: &str = "test-api-key";
const PASSWORD: &str = "secret-password";

/// Test fixture serving the local backend on a random port.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Repository,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_key(Some(API_KEY.to_string())).await
    }

    async fn with_key(api_key: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Repository::new(pool).with_bcrypt_cost(4);

        let config = Config {
            api_key: api_key.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            disabled_procedures: HashSet::new(),
            bcrypt_cost: 4,
        };

        let state = AppState {
            repo: Arc::new(repo.clone()),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("apikey", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            repo,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Services talking to this server over HTTP.
    fn http_services(&self) -> Services {
        let gateway = Gateway::http(&ClientConfig {
            url: self.base_url.clone(),
            api_key: Some(API_KEY.to_string()),
        })
        .unwrap();
        Services::new(gateway)
    }

    /// Services talking to the same store in-process.
    fn local_services(&self) -> Services {
        Services::new(Gateway::local(self.repo.clone()))
    }

    async fn sign_up_raw(&self, email: &str) -> String {
        let resp = self
            .client
            .post(self.url("/auth/v1/signup"))
            .json(&json!({ "email": email, "password": PASSWORD, "data": { "full_name": "Test" } }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }
}

/// In-process store without a server.
async fn local_store(disabled: &[Procedure]) -> (Repository, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("local.sqlite"))
        .await
        .unwrap();
    let repo = Repository::new(pool)
        .with_bcrypt_cost(4)
        .with_disabled_procedures(disabled.iter().copied().collect());
    (repo, temp_dir)
}

fn registration(name: &str, email: &str) -> Registration {
    Registration {
        full_name: name.to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        confirm_password: PASSWORD.to_string(),
    }
}

async fn signed_up(repo: &Repository, name: &str, email: &str) -> Services {
    let services = Services::new(Gateway::local(repo.clone()));
    services
        .auth
        .sign_up(&registration(name, email))
        .await
        .unwrap();
    services
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    false
}

/// Couple team owned by `owner` with `partner` invited as a member.
async fn couple(owner: &Services, partner_email: &str) -> uuid::Uuid {
    let team_id = owner
        .teams
        .create(&NewTeam::new("Us", TeamKind::Couple))
        .await
        .unwrap();
    owner
        .teams
        .invite(&TeamInvite {
            team_id,
            email: partner_email.to_string(),
            role: TeamRole::Member,
        })
        .await
        .unwrap();
    team_id
}

// ==================== HTTP SURFACE ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_missing_api_key_is_rejected() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/rest/v1/tasks"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_API_KEY");

    let resp = Client::new()
        .get(fixture.url("/rest/v1/tasks"))
        .header("apikey", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_open_mode_without_configured_key() {
    let fixture = TestFixture::with_key(None).await;

    let resp = Client::new()
        .get(fixture.url("/rest/v1/tasks"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_sign_up_sign_in_and_user() {
    let fixture = TestFixture::new().await;
    let token = fixture.sign_up_raw("ana@example.com").await;

    let resp = fixture
        .client
        .get(fixture.url("/auth/v1/user"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let user: Value = resp.json().await.unwrap();
    assert_eq!(user["email"], "ana@example.com");

    let resp = fixture
        .client
        .post(fixture.url("/auth/v1/token?grant_type=password"))
        .json(&json!({ "email": "ana@example.com", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .client
        .post(fixture.url("/auth/v1/token?grant_type=password"))
        .json(&json!({ "email": "ana@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Revoked sessions no longer resolve
    let resp = fixture
        .client
        .post(fixture.url("/auth/v1/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = fixture
        .client
        .get(fixture.url("/auth/v1/user"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_anonymous_select_is_empty() {
    let fixture = TestFixture::new().await;
    let token = fixture.sign_up_raw("ana@example.com").await;

    let resp = fixture
        .client
        .post(fixture.url("/rest/v1/tasks"))
        .bearer_auth(&token)
        .json(&json!({ "title": "Private", "created_by": null }))
        .send()
        .await
        .unwrap();
    assert!(!resp.status().is_success());

    let rows: Vec<Value> = fixture
        .client
        .get(fixture.url("/rest/v1/profiles"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_unknown_procedure_reports_schema_cache_miss() {
    let fixture = TestFixture::new().await;
    let token = fixture.sign_up_raw("ana@example.com").await;

    let resp = fixture
        .client
        .post(fixture.url("/rest/v1/rpc/does_not_exist"))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "PGRST202");
}

#[tokio::test]
async fn test_router_without_server() {
    let (repo, _dir) = local_store(&[]).await;
    let config = Config {
        api_key: None,
        db_path: "unused.sqlite".into(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        disabled_procedures: HashSet::new(),
        bcrypt_cost: 4,
    };
    let app = create_router(AppState {
        repo: Arc::new(repo),
        config: Arc::new(config),
    });

    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/rest/v1/secrets").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ==================== SERVICES ====================

#[tokio::test]
async fn test_task_toggle_over_http() {
    let fixture = TestFixture::new().await;
    let services = fixture.http_services();
    services
        .auth
        .sign_up(&registration("Ana", "ana@example.com"))
        .await
        .unwrap();

    let task = services
        .tasks
        .create(&NewTask::titled("Buy milk"))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Todo);

    let done = services.tasks.toggle(&task).await.unwrap();
    assert_eq!(done.status, TaskStatus::Done);
    let again = services.tasks.toggle(&done).await.unwrap();
    assert_eq!(again.status, TaskStatus::Todo);

    let listed = services.tasks.list_for_user().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Buy milk");
}

#[tokio::test]
async fn test_short_password_never_reaches_the_network() {
    // Nothing listens here; any request would fail with a network error.
    let gateway = Gateway::http(&ClientConfig {
        url: "http://127.0.0.1:1".to_string(),
        api_key: None,
    })
    .unwrap();
    let services = Services::new(gateway);

    let mut form = registration("Ana", "ana@example.com");
    form.password = "abc".to_string();
    form.confirm_password = "abc".to_string();

    let err = services.auth.sign_up(&form).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);
    assert!(services.auth.current_user().await.is_none());

    // A valid form goes out and hits the dead address
    form.password = "abcdef".to_string();
    form.confirm_password = "abcdef".to_string();
    let err = services.auth.sign_up(&form).await.unwrap_err();
    assert!(matches!(err, AppError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_signed_out_lists_are_empty() {
    let (repo, _dir) = local_store(&[]).await;
    let owner = signed_up(&repo, "Ana", "ana@example.com").await;
    owner
        .tasks
        .create(&NewTask::titled("Hidden"))
        .await
        .unwrap();

    let anonymous = Services::new(Gateway::local(repo.clone()));
    assert!(anonymous.tasks.list_for_user().await.unwrap().is_empty());
    assert!(anonymous.events.list_for_user().await.unwrap().is_empty());
    assert!(anonymous
        .documents
        .list_for_team(uuid::Uuid::new_v4())
        .await
        .unwrap()
        .is_empty());

    let err = anonymous
        .tasks
        .create(&NewTask::titled("Nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated(_)));
}

#[tokio::test]
async fn test_team_has_exactly_one_owner() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let ben = signed_up(&repo, "Ben", "ben@example.com").await;
    let team_id = couple(&ana, "ben@example.com").await;

    let teams = ana.teams.list_for_user().await.unwrap();
    assert_eq!(teams.len(), 1);
    let team = &teams[0];
    assert_eq!(team.team.id, team_id);
    assert_eq!(team.user_role, TeamRole::Owner);
    assert_eq!(team.team_members.len(), 2);
    assert_eq!(team.owners().count(), 1);

    let ben_member = team
        .team_members
        .iter()
        .find(|m| m.role == TeamRole::Member)
        .unwrap();
    let err = ana
        .teams
        .update_member_role(ben_member.id, TeamRole::Owner)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Members see the team but cannot manage roles
    let ben_teams = ben.teams.list_for_user().await.unwrap();
    assert_eq!(ben_teams.len(), 1);
    assert!(!ben_teams[0].can_manage_roles());
}

#[tokio::test]
async fn test_direct_table_fallback_matches_procedures() {
    let (repo, _dir) = local_store(&Procedure::ALL).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    signed_up(&repo, "Ben", "ben@example.com").await;
    let team_id = couple(&ana, "ben@example.com").await;

    let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let mut event = NewEvent::for_slot(start, end);
    event.title = "Dinner".to_string();
    event.team_id = Some(team_id);
    ana.events.create(&event).await.unwrap();

    let events = ana.events.list_for_user().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].team_name.as_deref(), Some("Us"));

    ana.tasks.create(&NewTask::titled("Buy milk")).await.unwrap();
    assert_eq!(ana.tasks.list_for_user().await.unwrap().len(), 1);

    let teams = ana.teams.list_for_user().await.unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].owners().count(), 1);
    assert_eq!(teams[0].team_members.len(), 2);

    let doc = NewDocument {
        title: "Budget".to_string(),
        url: "https://docs.example.com/budget".to_string(),
        ..NewDocument::blank(team_id)
    };
    ana.documents.create(&doc).await.unwrap();
    let docs = ana.documents.list_for_team(team_id).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].creator_name.as_deref(), Some("Ana"));
}

/// Rows written by one store for a fixed set of padded drafts.
async fn stored_titles(disabled: &[Procedure]) -> (String, String, String) {
    let (repo, _dir) = local_store(disabled).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;

    let team_id = ana
        .teams
        .create(&NewTeam::new("  Family  ", TeamKind::Team))
        .await
        .unwrap();
    let task = ana.tasks.create(&NewTask::titled("  Buy milk ")).await.unwrap();

    let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let mut event = NewEvent::for_slot(start, end);
    event.title = " Dinner  ".to_string();
    let event = ana.events.create(&event).await.unwrap();

    let teams = ana.teams.list_for_user().await.unwrap();
    assert_eq!(teams[0].team.id, team_id);
    (teams[0].team.name.clone(), task.title, event.title)
}

#[tokio::test]
async fn test_fallback_and_procedures_store_the_same_rows() {
    let via_procedures = stored_titles(&[]).await;
    let via_tables = stored_titles(&Procedure::ALL).await;

    assert_eq!(
        via_procedures,
        ("Family".to_string(), "Buy milk".to_string(), "Dinner".to_string())
    );
    assert_eq!(via_tables, via_procedures);
}

#[tokio::test]
async fn test_document_fields_are_trimmed() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let team_id = ana
        .teams
        .create(&NewTeam::new("Family", TeamKind::Team))
        .await
        .unwrap();

    let doc = NewDocument {
        title: "  Budget ".to_string(),
        url: "  https://docs.example.com/budget  ".to_string(),
        ..NewDocument::blank(team_id)
    };
    let created = ana.documents.create(&doc).await.unwrap();
    assert_eq!(created.title, "Budget");
    assert_eq!(created.url, "https://docs.example.com/budget");

    let patch = DocumentPatch {
        title: Some(" Budget 2024 ".to_string()),
        url: Some(" https://docs.example.com/2024 ".to_string()),
        description: None,
    };
    let updated = ana.documents.update(created.id, &patch).await.unwrap();
    assert_eq!(updated.title, "Budget 2024");
    assert_eq!(updated.url, "https://docs.example.com/2024");
}

#[tokio::test]
async fn test_invite_ignores_email_case() {
    let (repo, _dir) = local_store(&[Procedure::InviteTeamMember]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let ben = signed_up(&repo, "Ben", "Ben@Example.com").await;

    // Stored lowercased, so either spelling signs in
    let identity = ben.auth.current_user().await.unwrap();
    assert_eq!(identity.email, "ben@example.com");
    ben.auth.sign_out().await.unwrap();
    ben.auth.sign_in("BEN@example.COM", PASSWORD).await.unwrap();

    let team_id = couple(&ana, "Ben@Example.com").await;
    let teams = ana.teams.list_for_user().await.unwrap();
    assert_eq!(teams[0].team.id, team_id);
    assert_eq!(teams[0].team_members.len(), 2);

    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    signed_up(&repo, "Ben", "ben@example.com").await;
    couple(&ana, "BEN@EXAMPLE.COM").await;
    assert_eq!(ana.teams.list_for_user().await.unwrap()[0].team_members.len(), 2);
}

#[tokio::test]
async fn test_creator_can_remove_team_without_members() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let ben = signed_up(&repo, "Ben", "ben@example.com").await;
    let user = ana.auth.current_user().await.unwrap();

    // A team row whose owner membership was never written
    let team: Team = ana
        .gateway()
        .insert(
            Table::Teams,
            &Owned::new(&NewTeam::new("Orphan", TeamKind::Team), user.id),
        )
        .await
        .unwrap();
    ana.gateway().delete(Table::Teams, team.id).await.unwrap();
    assert!(ana.teams.list_for_user().await.unwrap().is_empty());

    // Once it has members only the owner may delete it
    let team_id = couple(&ana, "ben@example.com").await;
    let err = ben.gateway().delete(Table::Teams, team_id).await.unwrap_err();
    assert!(matches!(err, AppError::Rejected(_)));
    ana.teams.delete(team_id).await.unwrap();
}

#[tokio::test]
async fn test_invalid_document_url_is_rejected() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let team_id = ana
        .teams
        .create(&NewTeam::new("Family", TeamKind::Team))
        .await
        .unwrap();

    let doc = NewDocument {
        title: "Budget".to_string(),
        url: "not a url".to_string(),
        ..NewDocument::blank(team_id)
    };
    let err = ana.documents.create(&doc).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(ana.documents.list_for_team(team_id).await.unwrap().is_empty());
}

// ==================== SYNC VIEWS ====================

#[tokio::test]
async fn test_partner_board_follows_realtime() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let ben = signed_up(&repo, "Ben", "ben@example.com").await;
    let team_id = couple(&ana, "ben@example.com").await;

    let board = TaskBoard::new(&ben, TaskScope::Team(team_id));
    board.mount().await;
    assert!(board.tasks().await.is_empty());

    let mut shared = NewTask::titled("Book flights");
    shared.team_id = Some(team_id);
    ana.tasks.create(&shared).await.unwrap();

    assert!(eventually(|| async { board.tasks().await.len() == 1 }).await);

    // No updates after unmount
    board.unmount().await;
    let mut later = NewTask::titled("Pack bags");
    later.team_id = Some(team_id);
    ana.tasks.create(&later).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(board.tasks().await.len(), 1);
}

#[tokio::test]
async fn test_board_reloads_after_missed_changes() {
    let (repo, _dir) = local_store(&[]).await;
    let repo = repo.with_realtime_capacity(4);
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let user = ana.auth.current_user().await.unwrap();

    let board = TaskBoard::new(&ana, TaskScope::Personal);
    board.mount().await;
    assert!(board.tasks().await.is_empty());

    let _task: Task = ana
        .gateway()
        .insert(
            Table::Tasks,
            &Owned::new(&NewTask::titled("Water plants"), user.id),
        )
        .await
        .unwrap();
    // Flood the hub before the feed runs so the insert falls out of its buffer
    for _ in 0..16 {
        repo.hub()
            .publish(ChangeEvent::insert(Table::Events, json!({})));
    }

    assert!(eventually(|| async { board.tasks().await.len() == 1 }).await);
    board.unmount().await;
}

#[tokio::test]
async fn test_partner_calendar_sees_team_event() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let ben = signed_up(&repo, "Ben", "ben@example.com").await;
    let team_id = couple(&ana, "ben@example.com").await;

    let calendar = CalendarView::new(&ben);
    calendar.mount().await;
    assert!(calendar.all_events().await.is_empty());

    let start = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
    let mut dinner = NewEvent::for_slot(start, end);
    dinner.title = "Dinner".to_string();
    dinner.team_id = Some(team_id);
    ana.events.create(&dinner).await.unwrap();

    assert!(eventually(|| async { calendar.all_events().await.len() == 1 }).await);
    let events = calendar.all_events().await;
    assert_eq!(events[0].event.title, "Dinner");
    assert_eq!(events[0].team_name.as_deref(), Some("Us"));

    calendar.unmount().await;
}

#[tokio::test]
async fn test_partner_board_follows_realtime_over_http() {
    let fixture = TestFixture::new().await;
    let ana = fixture.local_services();
    ana.auth
        .sign_up(&registration("Ana", "ana@example.com"))
        .await
        .unwrap();
    let ben = fixture.http_services();
    ben.auth
        .sign_up(&registration("Ben", "ben@example.com"))
        .await
        .unwrap();
    let team_id = couple(&ana, "ben@example.com").await;

    let board = TaskBoard::new(&ben, TaskScope::Team(team_id));
    board.mount().await;

    let mut shared = NewTask::titled("Book flights");
    shared.team_id = Some(team_id);
    ana.tasks.create(&shared).await.unwrap();

    assert!(eventually(|| async { board.tasks().await.len() == 1 }).await);
    board.unmount().await;
}

#[tokio::test]
async fn test_team_delete_reaches_members() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let ben = signed_up(&repo, "Ben", "ben@example.com").await;
    let team_id = couple(&ana, "ben@example.com").await;

    let view = TeamsView::new(&ben).await;
    view.mount().await;
    assert_eq!(view.teams().await.len(), 1);

    ana.teams.delete(team_id).await.unwrap();

    assert!(eventually(|| async { view.teams().await.is_empty() }).await);
    view.unmount().await;
}

#[tokio::test]
async fn test_task_board_dialog_and_toggle() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;

    let board = TaskBoard::new(&ana, TaskScope::Personal);
    board.mount().await;

    // Empty title never reaches the store and keeps the dialog open
    board.open_create().await.unwrap();
    assert!(board.submit().await.is_err());
    assert!(board.is_editing().await);

    board.edit_draft(|draft| draft.title = "Buy milk".to_string()).await;
    board.submit().await.unwrap();
    assert!(!board.is_editing().await);

    let tasks = board.tasks().await;
    assert_eq!(tasks.len(), 1);
    board.toggle(tasks[0].id).await.unwrap();
    assert_eq!(board.column(TaskStatus::Done).await.len(), 1);

    let notices = board.notices().drain().await;
    assert!(notices.iter().any(|n| n.level == NoticeLevel::Error));
    assert!(notices
        .iter()
        .any(|n| n.level == NoticeLevel::Success && n.message == "Task saved"));

    board.unmount().await;
}

#[tokio::test]
async fn test_calendar_filters_by_team() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let team_id = ana
        .teams
        .create(&NewTeam::new("Family", TeamKind::Team))
        .await
        .unwrap();

    let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    let calendar = CalendarView::new(&ana);
    calendar.mount().await;
    assert_eq!(calendar.team_options().await.len(), 1);

    calendar.open_create(start, end).await.unwrap();
    calendar
        .edit_draft(|draft| {
            draft.title = "Picnic".to_string();
            draft.team_id = Some(team_id);
        })
        .await;
    calendar.submit().await.unwrap();

    calendar.open_create(start, end).await.unwrap();
    calendar
        .edit_draft(|draft| draft.title = "Dentist".to_string())
        .await;
    calendar.submit().await.unwrap();

    assert_eq!(calendar.all_events().await.len(), 2);

    // Personal events stay visible under any team filter
    calendar.set_team_filter(HashSet::from([uuid::Uuid::new_v4()])).await;
    let visible = calendar.visible_events().await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].event.title, "Dentist");

    calendar.toggle_team(team_id).await;
    assert_eq!(calendar.visible_events().await.len(), 2);

    calendar.unmount().await;
}

#[tokio::test]
async fn test_documents_view_create_and_edit() {
    let (repo, _dir) = local_store(&[]).await;
    let ana = signed_up(&repo, "Ana", "ana@example.com").await;
    let team_id = ana
        .teams
        .create(&NewTeam::new("Family", TeamKind::Team))
        .await
        .unwrap();

    let view = DocumentsView::new(&ana, team_id);
    view.mount().await;

    view.open_create().await.unwrap();
    view.edit_draft(|draft| {
        draft.title = "Budget".to_string();
        draft.url = "https://docs.example.com/budget".to_string();
    })
    .await;
    view.submit().await.unwrap();

    let docs = view.documents().await;
    assert_eq!(docs.len(), 1);

    view.open_edit(&docs[0]).await.unwrap();
    view.edit_draft(|draft| draft.title = "Budget 2024".to_string())
        .await;
    view.submit().await.unwrap();
    assert_eq!(view.documents().await[0].title, "Budget 2024");

    view.delete(docs[0].id).await.unwrap();
    assert!(view.documents().await.is_empty());

    view.unmount().await;
}
