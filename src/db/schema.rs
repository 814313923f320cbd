//! Column metadata, read policies and JSON <-> SQLite value conversion.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::errors::AppError;
use crate::gateway::Table;

/// Storage class of a column as seen through JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Bool,
    Timestamp,
    Date,
}

/// A column and what clients may do with it.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub insertable: bool,
    pub updatable: bool,
}

const fn col(name: &'static str, kind: ColumnKind, insertable: bool, updatable: bool) -> Column {
    Column {
        name,
        kind,
        insertable,
        updatable,
    }
}

use ColumnKind::{Bool, Date, Text, Timestamp};

const PROFILES: &[Column] = &[
    col("id", Text, false, false),
    col("email", Text, false, false),
    col("full_name", Text, false, true),
    col("avatar_url", Text, false, true),
    col("bio", Text, false, true),
    col("created_at", Timestamp, false, false),
    col("updated_at", Timestamp, false, false),
];

const TEAMS: &[Column] = &[
    col("id", Text, true, false),
    col("name", Text, true, true),
    col("type", Text, true, true),
    col("created_by", Text, true, false),
    col("created_at", Timestamp, false, false),
];

const TEAM_MEMBERS: &[Column] = &[
    col("id", Text, true, false),
    col("team_id", Text, true, false),
    col("user_id", Text, true, false),
    col("role", Text, true, true),
    col("joined_at", Timestamp, false, false),
];

const TASKS: &[Column] = &[
    col("id", Text, true, false),
    col("title", Text, true, true),
    col("description", Text, true, true),
    col("status", Text, true, true),
    col("priority", Text, true, true),
    col("due_date", Date, true, true),
    col("assigned_to", Text, true, true),
    col("created_by", Text, true, false),
    col("team_id", Text, true, true),
    col("created_at", Timestamp, false, false),
    col("updated_at", Timestamp, false, false),
];

const EVENTS: &[Column] = &[
    col("id", Text, true, false),
    col("title", Text, true, true),
    col("description", Text, true, true),
    col("start_time", Timestamp, true, true),
    col("end_time", Timestamp, true, true),
    col("all_day", Bool, true, true),
    col("created_by", Text, true, false),
    col("team_id", Text, true, true),
    col("created_at", Timestamp, false, false),
    col("updated_at", Timestamp, false, false),
];

const TEAM_DOCUMENTS: &[Column] = &[
    col("id", Text, true, false),
    col("team_id", Text, true, false),
    col("title", Text, true, true),
    col("url", Text, true, true),
    col("description", Text, true, true),
    col("created_by", Text, true, false),
    col("created_at", Timestamp, false, false),
    col("updated_at", Timestamp, false, false),
];

const EVENT_ATTENDEES: &[Column] = &[
    col("id", Text, true, false),
    col("event_id", Text, true, false),
    col("user_id", Text, true, false),
    col("status", Text, true, true),
];

pub fn columns(table: Table) -> &'static [Column] {
    match table {
        Table::Profiles => PROFILES,
        Table::Teams => TEAMS,
        Table::TeamMembers => TEAM_MEMBERS,
        Table::Tasks => TASKS,
        Table::Events => EVENTS,
        Table::TeamDocuments => TEAM_DOCUMENTS,
        Table::EventAttendees => EVENT_ATTENDEES,
    }
}

pub fn column(table: Table, name: &str) -> Result<&'static Column, AppError> {
    columns(table)
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown column {}.{}", table, name)))
}

pub fn column_list(table: Table) -> String {
    columns(table)
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columns stamped with the current time on insert.
pub fn insert_timestamps(table: Table) -> &'static [&'static str] {
    match table {
        Table::Profiles | Table::Tasks | Table::Events | Table::TeamDocuments => {
            &["created_at", "updated_at"]
        }
        Table::Teams => &["created_at"],
        Table::TeamMembers => &["joined_at"],
        Table::EventAttendees => &[],
    }
}

pub fn has_updated_at(table: Table) -> bool {
    columns(table).iter().any(|c| c.name == "updated_at")
}

/// Membership check shared by the policies. It reads `team_members` directly
/// instead of going through that table's own policy, so policies never recurse.
const MY_TEAMS: &str = "(SELECT team_id FROM team_members WHERE user_id = :uid)";

/// Row-level read policy; `:uid` stands for the caller's id.
pub fn read_policy(table: Table) -> String {
    match table {
        Table::Profiles => "1 = 1".to_string(),
        Table::Teams => format!("(created_by = :uid OR id IN {})", MY_TEAMS),
        Table::TeamMembers => format!("(user_id = :uid OR team_id IN {})", MY_TEAMS),
        Table::Tasks => format!(
            "(created_by = :uid OR assigned_to = :uid OR team_id IN {})",
            MY_TEAMS
        ),
        Table::Events => format!("(created_by = :uid OR team_id IN {})", MY_TEAMS),
        Table::TeamDocuments => format!("team_id IN {}", MY_TEAMS),
        Table::EventAttendees => {
            "(user_id = :uid OR event_id IN (SELECT id FROM events WHERE created_by = :uid))"
                .to_string()
        }
    }
}

/// Replace every `:uid` with a positional parameter; returns the SQL and the bind count.
pub fn expand_uid(sql: &str) -> (String, usize) {
    (sql.replace(":uid", "?"), sql.matches(":uid").count())
}

/// A value ready to bind into a SQLite statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Int(i64),
}

/// Convert a JSON value for `column`, normalising timestamps and dates.
pub fn to_sql(table: Table, column: &Column, value: &Value) -> Result<SqlValue, AppError> {
    let invalid = || {
        AppError::BadRequest(format!(
            "Invalid value for {}.{}: {}",
            table, column.name, value
        ))
    };

    match (column.kind, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Int(*b as i64)),
        (ColumnKind::Timestamp, Value::String(s)) => Ok(SqlValue::Text(normalize_timestamp(s).ok_or_else(invalid)?)),
        (ColumnKind::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| invalid()),
        (ColumnKind::Text, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        _ => Err(invalid()),
    }
}

/// Convert a textual filter operand for `column`.
pub fn filter_value(column: &Column, raw: &str) -> SqlValue {
    match (column.kind, raw) {
        (ColumnKind::Bool, "true") => SqlValue::Int(1),
        (ColumnKind::Bool, "false") => SqlValue::Int(0),
        (ColumnKind::Timestamp, s) => SqlValue::Text(normalize_timestamp(s).unwrap_or_else(|| s.to_string())),
        (_, s) => SqlValue::Text(s.to_string()),
    }
}

pub fn normalize_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| format_timestamp(t.with_timezone(&Utc)))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    format_timestamp(Utc::now())
}

/// Convert a row of `table` to JSON, adding any extra text columns a join selected.
pub fn row_to_json(table: Table, row: &SqliteRow, extras: &[&str]) -> Result<Value, AppError> {
    let mut object = Map::new();

    for column in columns(table) {
        let value = match column.kind {
            ColumnKind::Bool => {
                let flag: Option<i64> = row.try_get(column.name)?;
                flag.map(|v| Value::Bool(v != 0)).unwrap_or(Value::Null)
            }
            _ => {
                let text: Option<String> = row.try_get(column.name)?;
                text.map(Value::String).unwrap_or(Value::Null)
            }
        };
        object.insert(column.name.to_string(), value);
    }

    for extra in extras {
        let text: Option<String> = row.try_get(*extra)?;
        object.insert(
            extra.to_string(),
            text.map(Value::String).unwrap_or(Value::Null),
        );
    }

    Ok(Value::Object(object))
}

/// Read a string column of a JSON row.
pub fn json_str<'a>(row: &'a Value, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_uid_counts_placeholders() {
        let (sql, binds) = expand_uid(&read_policy(Table::Tasks));
        assert_eq!(binds, 3);
        assert!(!sql.contains(":uid"));
        assert_eq!(sql.matches('?').count(), 3);
    }

    #[test]
    fn test_timestamps_are_normalised() {
        let column = column(Table::Events, "start_time").unwrap();
        let a = to_sql(Table::Events, column, &json!("2024-05-01T10:00:00Z")).unwrap();
        let b = to_sql(Table::Events, column, &json!("2024-05-01T12:00:00+02:00")).unwrap();
        assert_eq!(a, b);
        assert!(to_sql(Table::Events, column, &json!("tomorrow")).is_err());
    }

    #[test]
    fn test_bool_and_date_conversion() {
        let all_day = column(Table::Events, "all_day").unwrap();
        assert_eq!(
            to_sql(Table::Events, all_day, &json!(true)).unwrap(),
            SqlValue::Int(1)
        );
        assert!(to_sql(Table::Events, all_day, &json!("yes")).is_err());
        assert_eq!(filter_value(all_day, "false"), SqlValue::Int(0));

        let due = column(Table::Tasks, "due_date").unwrap();
        assert_eq!(
            to_sql(Table::Tasks, due, &json!("2024-02-29")).unwrap(),
            SqlValue::Text("2024-02-29".to_string())
        );
        assert!(to_sql(Table::Tasks, due, &json!("2023-02-29")).is_err());
    }

    #[test]
    fn test_unknown_column_rejected() {
        assert!(matches!(
            column(Table::Tasks, "password_hash"),
            Err(AppError::BadRequest(_))
        ));
    }
}
