//! Local backend repository.
//!
//! Every table operation runs as a specific viewer: reads are narrowed by the
//! table's read policy, writes are checked against its write rules, and every
//! committed change is published on the realtime hub.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqlitePool};
use sqlx::{Row, Sqlite};
use uuid::Uuid;

use super::schema::{self, json_str, SqlValue};
use crate::errors::AppError;
use crate::gateway::{Filter, Procedure, Query, RowFilter, Table};
use crate::models::{validate_password_length, Identity, Session, TeamRole};
use crate::realtime::{ChangeEvent, ChangeFeed, RealtimeHub};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Database repository for all backend operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    hub: RealtimeHub,
    disabled_procedures: Arc<HashSet<Procedure>>,
    bcrypt_cost: u32,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            hub: RealtimeHub::default(),
            disabled_procedures: Arc::new(HashSet::new()),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Pretend the given procedures were never installed.
    pub fn with_disabled_procedures(mut self, procedures: HashSet<Procedure>) -> Self {
        self.disabled_procedures = Arc::new(procedures);
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Buffer size of each realtime receiver before it lags.
    pub fn with_realtime_capacity(mut self, capacity: usize) -> Self {
        self.hub = RealtimeHub::new(capacity);
        self
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    pub(super) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn is_installed(&self, procedure: Procedure) -> bool {
        !self.disabled_procedures.contains(&procedure)
    }

    // ==================== AUTH ====================

    /// Register a user and its profile, returning a fresh session.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Session, AppError> {
        let email = email.trim().to_lowercase();
        let email = email.as_str();
        if email.is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }
        validate_password_length(password)?;

        let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(AppError::Rejected("User already registered".to_string()));
        }

        let password_hash = self.hash_password(password).await?;
        let id = Uuid::new_v4();
        let now = schema::now();
        let full_name = full_name.map(str::trim).filter(|name| !name.is_empty());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(email)
        .bind(&password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO profiles (id, email, full_name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(email)
        .bind(full_name)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let profile = fetch_row(&mut tx, Table::Profiles, &id.to_string())
            .await?
            .ok_or_else(|| AppError::Internal("Profile vanished after insert".to_string()))?;

        tx.commit().await?;

        tracing::info!("Registered user {}", id);
        self.hub.publish(ChangeEvent::insert(Table::Profiles, profile));

        self.issue_session(Identity {
            id,
            email: email.to_string(),
        })
        .await
    }

    /// Exchange email and password for a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let invalid = || AppError::Unauthenticated("Invalid login credentials".to_string());

        let row = sqlx::query("SELECT id, email, password_hash FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(invalid());
        };

        let hash: String = row.get("password_hash");
        let candidate = password.to_string();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password check failed: {}", e)))??;
        if !verified {
            return Err(invalid());
        }

        let id: String = row.get("id");
        let user = Identity {
            id: parse_uuid(&id)?,
            email: row.get("email"),
        };
        tracing::info!("User {} signed in", user.id);
        self.issue_session(user).await
    }

    /// Resolve a bearer token to its user.
    pub async fn user_for_token(&self, token: &str) -> Result<Option<Identity>, AppError> {
        let row = sqlx::query(
            "SELECT u.id, u.email FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let id: String = row.get("id");
            Ok(Identity {
                id: parse_uuid(&id)?,
                email: row.get("email"),
            })
        })
        .transpose()
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_password(&self, user: &Identity, password: &str) -> Result<(), AppError> {
        validate_password_length(password)?;
        let password_hash = self.hash_password(password).await?;

        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(schema::now())
            .bind(user.id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        }
        tracing::info!("Password updated for user {}", user.id);
        Ok(())
    }

    async fn issue_session(&self, user: Identity) -> Result<Session, AppError> {
        let access_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&access_token)
            .bind(user.id.to_string())
            .bind(schema::now())
            .execute(&self.pool)
            .await?;

        Ok(Session { access_token, user })
    }

    async fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))??;
        Ok(hash)
    }

    // ==================== TABLES ====================

    /// Rows of `table` the viewer may read. Anonymous viewers get nothing.
    pub async fn select(
        &self,
        viewer: Option<&Identity>,
        table: Table,
        query: &Query,
    ) -> Result<Vec<Value>, AppError> {
        let Some(viewer) = viewer else {
            tracing::debug!("Anonymous select on {} returns no rows", table);
            return Ok(Vec::new());
        };

        let mut conn = self.pool.acquire().await?;
        select_visible(&mut conn, viewer, table, query).await
    }

    pub async fn insert(
        &self,
        viewer: Option<&Identity>,
        table: Table,
        row: Value,
    ) -> Result<Value, AppError> {
        let viewer = require_viewer(viewer)?;
        let row = into_object(row)?;

        let mut conn = self.pool.acquire().await?;
        check_insert(&mut conn, viewer, table, &row).await?;
        let created = insert_raw(&mut conn, table, &row).await?;
        drop(conn);

        tracing::info!("Inserted into {}: {}", table, json_str(&created, "id").unwrap_or("?"));
        self.hub.publish(ChangeEvent::insert(table, created.clone()));
        Ok(created)
    }

    pub async fn update(
        &self,
        viewer: Option<&Identity>,
        table: Table,
        id: &str,
        patch: Value,
    ) -> Result<Value, AppError> {
        let viewer = require_viewer(viewer)?;
        let patch = into_object(patch)?;

        let mut conn = self.pool.acquire().await?;
        let existing = fetch_visible(&mut conn, viewer, table, id)
            .await?
            .ok_or_else(|| not_found(table, id))?;
        check_update(&mut conn, viewer, table, &existing, &patch).await?;
        let updated = update_raw(&mut conn, table, id, &patch).await?;
        drop(conn);

        tracing::info!("Updated {} {}", table, id);
        self.hub
            .publish(ChangeEvent::update(table, existing, updated.clone()));
        Ok(updated)
    }

    pub async fn delete(
        &self,
        viewer: Option<&Identity>,
        table: Table,
        id: &str,
    ) -> Result<(), AppError> {
        let viewer = require_viewer(viewer)?;

        let mut conn = self.pool.acquire().await?;
        let existing = fetch_visible(&mut conn, viewer, table, id)
            .await?
            .ok_or_else(|| not_found(table, id))?;
        check_delete(&mut conn, viewer, table, &existing).await?;

        if table == Table::Teams {
            // Members lose visibility once the cascade runs, so capture who may see it first.
            let audience = Arc::new(team_audience(&mut conn, &existing).await?);
            let cascaded = team_dependents(&mut conn, id).await?;
            delete_raw(&mut conn, table, id).await?;
            drop(conn);

            for (dependent_table, row) in cascaded {
                self.hub
                    .publish(ChangeEvent::delete(dependent_table, row).with_audience(audience.clone()));
            }
            self.hub
                .publish(ChangeEvent::delete(table, existing).with_audience(audience));
        } else {
            delete_raw(&mut conn, table, id).await?;
            drop(conn);
            self.hub.publish(ChangeEvent::delete(table, existing));
        }

        tracing::info!("Deleted {} {}", table, id);
        Ok(())
    }

    // ==================== REALTIME ====================

    /// Open a change feed of `table` for `viewer`.
    pub fn changes(
        &self,
        viewer: Option<Identity>,
        table: Table,
        filter: Option<RowFilter>,
    ) -> ChangeFeed {
        ChangeFeed::new(self.clone(), viewer, table, filter)
    }

    /// Whether `viewer` may see the row a change is about.
    pub async fn row_visible(
        &self,
        viewer: Option<&Identity>,
        change: &ChangeEvent,
    ) -> Result<bool, AppError> {
        let Some(viewer) = viewer else {
            return Ok(false);
        };
        if let Some(audience) = &change.audience {
            return Ok(audience.contains(&viewer.id));
        }

        let row = change.row();
        let uid = viewer.id.to_string();
        let is_me = |column: &str| json_str(row, column) == Some(uid.as_str());

        let mut conn = self.pool.acquire().await?;
        let visible = match change.table {
            Table::Profiles => true,
            Table::Teams => {
                is_me("created_by") || role_at(&mut conn, row, "id", &uid).await?.is_some()
            }
            Table::TeamMembers => {
                is_me("user_id") || role_at(&mut conn, row, "team_id", &uid).await?.is_some()
            }
            Table::Tasks => {
                is_me("created_by")
                    || is_me("assigned_to")
                    || role_at(&mut conn, row, "team_id", &uid).await?.is_some()
            }
            Table::Events => {
                is_me("created_by") || role_at(&mut conn, row, "team_id", &uid).await?.is_some()
            }
            Table::TeamDocuments => role_at(&mut conn, row, "team_id", &uid).await?.is_some(),
            Table::EventAttendees => is_me("user_id"),
        };

        Ok(visible)
    }
}

// ==================== QUERY HELPERS ====================

pub(super) fn bind_values(mut query: SqliteQuery<'_>, values: Vec<SqlValue>) -> SqliteQuery<'_> {
    for value in values {
        query = match value {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Text(text) => query.bind(text),
            SqlValue::Int(int) => query.bind(int),
        };
    }
    query
}

pub(super) async fn select_visible(
    conn: &mut SqliteConnection,
    viewer: &Identity,
    table: Table,
    query: &Query,
) -> Result<Vec<Value>, AppError> {
    let (policy, policy_binds) = schema::expand_uid(&schema::read_policy(table));
    let mut clauses = vec![policy];
    let mut binds: Vec<SqlValue> = std::iter::repeat(SqlValue::Text(viewer.id.to_string()))
        .take(policy_binds)
        .collect();

    for filter in &query.filters {
        match filter {
            Filter::Eq(name, value) => {
                let column = schema::column(table, name)?;
                clauses.push(format!("{} = ?", column.name));
                binds.push(schema::filter_value(column, value));
            }
            Filter::In(name, values) => {
                let column = schema::column(table, name)?;
                if values.is_empty() {
                    clauses.push("0 = 1".to_string());
                } else {
                    clauses.push(format!(
                        "{} IN ({})",
                        column.name,
                        vec!["?"; values.len()].join(", ")
                    ));
                    binds.extend(values.iter().map(|v| schema::filter_value(column, v)));
                }
            }
            Filter::IsNull(name) => {
                let column = schema::column(table, name)?;
                clauses.push(format!("{} IS NULL", column.name));
            }
            Filter::AnyOf(pairs) => {
                if pairs.is_empty() {
                    clauses.push("0 = 1".to_string());
                    continue;
                }
                let mut parts = Vec::with_capacity(pairs.len());
                for (name, value) in pairs {
                    let column = schema::column(table, name)?;
                    parts.push(format!("{} = ?", column.name));
                    binds.push(schema::filter_value(column, value));
                }
                clauses.push(format!("({})", parts.join(" OR ")));
            }
        }
    }

    let mut sql = format!(
        "SELECT {} FROM {} WHERE {}",
        schema::column_list(table),
        table,
        clauses.join(" AND ")
    );
    if let Some(order) = &query.order {
        let column = schema::column(table, &order.column)?;
        let direction = if order.ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(" ORDER BY {} {}", column.name, direction));
    }

    let rows = bind_values(sqlx::query(&sql), binds)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| schema::row_to_json(table, row, &[]))
        .collect()
}

pub(super) async fn fetch_row(
    conn: &mut SqliteConnection,
    table: Table,
    id: &str,
) -> Result<Option<Value>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        schema::column_list(table),
        table
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|row| schema::row_to_json(table, &row, &[]))
        .transpose()
}

async fn fetch_visible(
    conn: &mut SqliteConnection,
    viewer: &Identity,
    table: Table,
    id: &str,
) -> Result<Option<Value>, AppError> {
    let rows = select_visible(conn, viewer, table, &Query::new().eq("id", id)).await?;
    Ok(rows.into_iter().next())
}

pub(super) async fn insert_raw(
    conn: &mut SqliteConnection,
    table: Table,
    row: &Map<String, Value>,
) -> Result<Value, AppError> {
    let id = match row.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Null) | None => Uuid::new_v4().to_string(),
        Some(other) => return Err(AppError::BadRequest(format!("Invalid id: {}", other))),
    };

    let mut names = vec!["id"];
    let mut binds = vec![SqlValue::Text(id.clone())];

    for (key, value) in row {
        if key == "id" {
            continue;
        }
        let column = schema::column(table, key)?;
        if !column.insertable {
            return Err(AppError::BadRequest(format!(
                "Column {}.{} cannot be set on insert",
                table, key
            )));
        }
        names.push(column.name);
        binds.push(schema::to_sql(table, column, value)?);
    }

    let now = schema::now();
    for stamp in schema::insert_timestamps(table) {
        names.push(stamp);
        binds.push(SqlValue::Text(now.clone()));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        names.join(", "),
        vec!["?"; names.len()].join(", ")
    );
    bind_values(sqlx::query(&sql), binds)
        .execute(&mut *conn)
        .await?;

    fetch_row(conn, table, &id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("{} row vanished after insert", table)))
}

async fn update_raw(
    conn: &mut SqliteConnection,
    table: Table,
    id: &str,
    patch: &Map<String, Value>,
) -> Result<Value, AppError> {
    let mut sets = Vec::new();
    let mut binds = Vec::new();

    for (key, value) in patch {
        let column = schema::column(table, key)?;
        if !column.updatable {
            return Err(AppError::BadRequest(format!(
                "Column {}.{} cannot be updated",
                table, key
            )));
        }
        sets.push(format!("{} = ?", column.name));
        binds.push(schema::to_sql(table, column, value)?);
    }

    if !sets.is_empty() {
        if schema::has_updated_at(table) {
            sets.push("updated_at = ?".to_string());
            binds.push(SqlValue::Text(schema::now()));
        }
        binds.push(SqlValue::Text(id.to_string()));

        let sql = format!("UPDATE {} SET {} WHERE id = ?", table, sets.join(", "));
        let result = bind_values(sqlx::query(&sql), binds)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(table, id));
        }
    }

    fetch_row(conn, table, id)
        .await?
        .ok_or_else(|| not_found(table, id))
}

async fn delete_raw(conn: &mut SqliteConnection, table: Table, id: &str) -> Result<(), AppError> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table);
    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;

    if result.rows_affected() == 0 {
        return Err(not_found(table, id));
    }
    Ok(())
}

pub(super) async fn membership_role(
    conn: &mut SqliteConnection,
    team_id: &str,
    user_id: &str,
) -> Result<Option<TeamRole>, AppError> {
    let row = sqlx::query("SELECT role FROM team_members WHERE team_id = ? AND user_id = ?")
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.and_then(|row| {
        let role: String = row.get("role");
        TeamRole::parse(&role)
    }))
}

/// Caller's role in the team whose id sits in `row[column]`.
async fn role_at(
    conn: &mut SqliteConnection,
    row: &Value,
    column: &str,
    uid: &str,
) -> Result<Option<TeamRole>, AppError> {
    match json_str(row, column) {
        Some(team_id) => membership_role(conn, team_id, uid).await,
        None => Ok(None),
    }
}

async fn scalar_text(
    conn: &mut SqliteConnection,
    sql: &str,
    bind: &str,
) -> Result<Option<String>, AppError> {
    let row = sqlx::query(sql)
        .bind(bind)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|row| row.get::<String, _>(0)))
}

async fn member_count(conn: &mut SqliteConnection, team_id: &str) -> Result<i64, AppError> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM team_members WHERE team_id = ?")
        .bind(team_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get::<i64, _>("n"))
}

async fn team_audience(
    conn: &mut SqliteConnection,
    team: &Value,
) -> Result<HashSet<Uuid>, AppError> {
    let team_id = json_str(team, "id").unwrap_or_default();
    let rows = sqlx::query("SELECT user_id FROM team_members WHERE team_id = ?")
        .bind(team_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut audience: HashSet<Uuid> = rows
        .iter()
        .filter_map(|row| Uuid::parse_str(&row.get::<String, _>("user_id")).ok())
        .collect();
    if let Some(creator) = json_str(team, "created_by").and_then(|c| Uuid::parse_str(c).ok()) {
        audience.insert(creator);
    }
    Ok(audience)
}

async fn team_dependents(
    conn: &mut SqliteConnection,
    team_id: &str,
) -> Result<Vec<(Table, Value)>, AppError> {
    let mut dependents = Vec::new();

    for table in [
        Table::TeamMembers,
        Table::Tasks,
        Table::Events,
        Table::TeamDocuments,
    ] {
        let sql = format!(
            "SELECT {} FROM {} WHERE team_id = ?",
            schema::column_list(table),
            table
        );
        let rows = sqlx::query(&sql)
            .bind(team_id)
            .fetch_all(&mut *conn)
            .await?;
        for row in &rows {
            dependents.push((table, schema::row_to_json(table, row, &[])?));
        }
    }

    Ok(dependents)
}

// ==================== WRITE POLICIES ====================

fn denied(message: &str) -> AppError {
    AppError::Rejected(message.to_string())
}

async fn check_insert(
    conn: &mut SqliteConnection,
    viewer: &Identity,
    table: Table,
    row: &Map<String, Value>,
) -> Result<(), AppError> {
    let uid = viewer.id.to_string();
    let field = |name: &str| row.get(name).and_then(Value::as_str);
    let created_by_me = field("created_by") == Some(uid.as_str());

    match table {
        Table::Profiles => Err(denied("Profiles are created at sign-up")),
        Table::Teams => {
            if created_by_me {
                Ok(())
            } else {
                Err(denied("Teams must be created by the caller"))
            }
        }
        Table::TeamMembers => {
            let team_id = field("team_id")
                .ok_or_else(|| AppError::BadRequest("team_id is required".to_string()))?;
            let role = field("role").unwrap_or("member");

            match membership_role(conn, team_id, &uid).await? {
                Some(_) if role == "owner" => Err(denied("A team has exactly one owner")),
                Some(caller) if caller.can_manage_members() => Ok(()),
                Some(_) => Err(denied("Only owners and admins can add members")),
                None => {
                    // The creator may add itself as owner of its own empty team.
                    let creator = scalar_text(conn, "SELECT created_by FROM teams WHERE id = ?", team_id)
                        .await?;
                    let members = member_count(conn, team_id).await?;
                    let bootstrap = field("user_id") == Some(uid.as_str())
                        && role == "owner"
                        && creator.as_deref() == Some(uid.as_str())
                        && members == 0;

                    if bootstrap {
                        Ok(())
                    } else {
                        Err(denied("Only owners and admins can add members"))
                    }
                }
            }
        }
        Table::Tasks | Table::Events | Table::TeamDocuments => {
            if !created_by_me {
                return Err(denied("Rows must be created by the caller"));
            }
            match field("team_id") {
                Some(team_id) => {
                    if membership_role(conn, team_id, &uid).await?.is_some() {
                        Ok(())
                    } else {
                        Err(denied("Not a member of that team"))
                    }
                }
                None if table == Table::TeamDocuments => {
                    Err(AppError::BadRequest("team_id is required".to_string()))
                }
                None => Ok(()),
            }
        }
        Table::EventAttendees => {
            let event_id = field("event_id")
                .ok_or_else(|| AppError::BadRequest("event_id is required".to_string()))?;
            let creator = scalar_text(conn, "SELECT created_by FROM events WHERE id = ?", event_id).await?;
            if creator.as_deref() == Some(uid.as_str()) {
                Ok(())
            } else {
                Err(denied("Only the event creator can add attendees"))
            }
        }
    }
}

async fn check_update(
    conn: &mut SqliteConnection,
    viewer: &Identity,
    table: Table,
    existing: &Value,
    patch: &Map<String, Value>,
) -> Result<(), AppError> {
    let uid = viewer.id.to_string();
    let is_me = |column: &str| json_str(existing, column) == Some(uid.as_str());

    match table {
        Table::Profiles => {
            if is_me("id") {
                Ok(())
            } else {
                Err(denied("Profiles can only be edited by their owner"))
            }
        }
        Table::Teams => match role_at(conn, existing, "id", &uid).await? {
            Some(TeamRole::Owner) => Ok(()),
            _ => Err(denied("Only the team owner can edit the team")),
        },
        Table::TeamMembers => {
            if role_at(conn, existing, "team_id", &uid).await? != Some(TeamRole::Owner) {
                return Err(denied("Only the team owner can change roles"));
            }
            if json_str(existing, "role") == Some("owner") {
                return Err(denied("The owner's role cannot be changed"));
            }
            if patch.get("role").and_then(Value::as_str) == Some("owner") {
                return Err(denied("A team has exactly one owner"));
            }
            Ok(())
        }
        Table::Tasks | Table::Events => match patch.get("team_id").and_then(Value::as_str) {
            Some(team_id) => {
                if membership_role(conn, team_id, &uid).await?.is_some() {
                    Ok(())
                } else {
                    Err(denied("Not a member of that team"))
                }
            }
            None => Ok(()),
        },
        Table::TeamDocuments => {
            let manager = role_at(conn, existing, "team_id", &uid)
                .await?
                .is_some_and(|r| r.can_manage_members());
            if is_me("created_by") || manager {
                Ok(())
            } else {
                Err(denied("Only the creator or a team admin can edit this document"))
            }
        }
        Table::EventAttendees => {
            if is_me("user_id") {
                Ok(())
            } else {
                Err(denied("Attendance can only be changed by the attendee"))
            }
        }
    }
}

async fn check_delete(
    conn: &mut SqliteConnection,
    viewer: &Identity,
    table: Table,
    existing: &Value,
) -> Result<(), AppError> {
    let uid = viewer.id.to_string();
    let is_me = |column: &str| json_str(existing, column) == Some(uid.as_str());

    match table {
        Table::Profiles => Err(denied("Profiles cannot be deleted")),
        Table::Teams => match role_at(conn, existing, "id", &uid).await? {
            Some(TeamRole::Owner) => Ok(()),
            Some(_) => Err(denied("Only the team owner can delete the team")),
            None => {
                // The creator may withdraw a team whose owner membership was never written.
                let team_id = json_str(existing, "id").unwrap_or_default();
                if is_me("created_by") && member_count(conn, team_id).await? == 0 {
                    Ok(())
                } else {
                    Err(denied("Only the team owner can delete the team"))
                }
            }
        },
        Table::TeamMembers => {
            if json_str(existing, "role") == Some("owner") {
                return Err(denied("The team owner cannot be removed"));
            }
            let manager = role_at(conn, existing, "team_id", &uid)
                .await?
                .is_some_and(|r| r.can_manage_members());
            if manager || is_me("user_id") {
                Ok(())
            } else {
                Err(denied("Only owners and admins can remove members"))
            }
        }
        Table::Tasks | Table::Events | Table::TeamDocuments => {
            let manager = role_at(conn, existing, "team_id", &uid)
                .await?
                .is_some_and(|r| r.can_manage_members());
            if is_me("created_by") || manager {
                Ok(())
            } else {
                Err(denied("Only the creator or a team admin can delete this row"))
            }
        }
        Table::EventAttendees => {
            let event_id = json_str(existing, "event_id").unwrap_or_default();
            let creator = scalar_text(conn, "SELECT created_by FROM events WHERE id = ?", event_id).await?;
            if is_me("user_id") || creator.as_deref() == Some(uid.as_str()) {
                Ok(())
            } else {
                Err(denied("Only the attendee or the event creator can remove attendance"))
            }
        }
    }
}

// ==================== SMALL HELPERS ====================

pub(super) fn require_viewer(viewer: Option<&Identity>) -> Result<&Identity, AppError> {
    viewer.ok_or_else(|| AppError::Unauthenticated("Not authenticated".to_string()))
}

fn into_object(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(AppError::BadRequest(format!(
            "Expected a JSON object, got {}",
            other
        ))),
    }
}

fn not_found(table: Table, id: &str) -> AppError {
    AppError::NotFound(format!("{} {} not found", table, id))
}

fn parse_uuid(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|e| AppError::Internal(format!("Corrupt id {}: {}", raw, e)))
}
