//! Table names, filter predicates and procedure names.
//!
//! A `Query` renders to PostgREST query pairs (`col=eq.value`, `col=in.(a,b)`,
//! `or=(a.eq.x,b.eq.y)`, `order=col.desc`) and parses back from them, so the
//! HTTP transport and the dev server share one grammar. Values must not contain
//! `,`, `(` or `)`; identifiers and enum values never do.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;

/// The backend's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Teams,
    TeamMembers,
    Tasks,
    Events,
    TeamDocuments,
    EventAttendees,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Profiles,
        Table::Teams,
        Table::TeamMembers,
        Table::Tasks,
        Table::Events,
        Table::TeamDocuments,
        Table::EventAttendees,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Teams => "teams",
            Table::TeamMembers => "team_members",
            Table::Tasks => "tasks",
            Table::Events => "events",
            Table::TeamDocuments => "team_documents",
            Table::EventAttendees => "event_attendees",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Table::ALL.into_iter().find(|table| table.as_str() == name)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored procedures the backend may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Procedure {
    GetUserEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    GetUserTeams,
    CreateTeamWithOwner,
    InviteTeamMember,
    GetUserTasks,
    CreateTask,
    GetTeamDocuments,
}

impl Procedure {
    pub const ALL: [Procedure; 10] = [
        Procedure::GetUserEvents,
        Procedure::CreateEvent,
        Procedure::UpdateEvent,
        Procedure::DeleteEvent,
        Procedure::GetUserTeams,
        Procedure::CreateTeamWithOwner,
        Procedure::InviteTeamMember,
        Procedure::GetUserTasks,
        Procedure::CreateTask,
        Procedure::GetTeamDocuments,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Procedure::GetUserEvents => "get_user_events",
            Procedure::CreateEvent => "create_event",
            Procedure::UpdateEvent => "update_event",
            Procedure::DeleteEvent => "delete_event",
            Procedure::GetUserTeams => "get_user_teams",
            Procedure::CreateTeamWithOwner => "create_team_with_owner",
            Procedure::InviteTeamMember => "invite_team_member",
            Procedure::GetUserTasks => "get_user_tasks",
            Procedure::CreateTask => "create_task",
            Procedure::GetTeamDocuments => "get_team_documents",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Procedure::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A row predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `column = value`
    Eq(String, String),
    /// `column IN (values)`
    In(String, Vec<String>),
    /// `column IS NULL`
    IsNull(String),
    /// Disjunction of equalities
    AnyOf(Vec<(String, String)>),
}

impl Filter {
    /// Evaluate against a JSON row; used to route realtime changes.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(column, value) => column_text(row, column).as_deref() == Some(value.as_str()),
            Filter::In(column, values) => column_text(row, column)
                .map(|text| values.iter().any(|v| *v == text))
                .unwrap_or(false),
            Filter::IsNull(column) => row.get(column).map_or(true, Value::is_null),
            Filter::AnyOf(pairs) => pairs
                .iter()
                .any(|(column, value)| column_text(row, column).as_deref() == Some(value.as_str())),
        }
    }

    /// Every column the predicate touches.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Filter::Eq(column, _) | Filter::In(column, _) | Filter::IsNull(column) => {
                vec![column.as_str()]
            }
            Filter::AnyOf(pairs) => pairs.iter().map(|(column, _)| column.as_str()).collect(),
        }
    }
}

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Sort order of a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Filters plus ordering for a table select.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push(Filter::Eq(column.to_string(), value.to_string()));
        self
    }

    pub fn in_list<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.filters.push(Filter::In(
            column.to_string(),
            values.into_iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    pub fn any_of<V: ToString>(mut self, pairs: &[(&str, V)]) -> Self {
        self.filters.push(Filter::AnyOf(
            pairs
                .iter()
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect(),
        ));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Render as PostgREST query pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|filter| match filter {
                Filter::Eq(column, value) => (column.clone(), format!("eq.{}", value)),
                Filter::In(column, values) => (column.clone(), format!("in.({})", values.join(","))),
                Filter::IsNull(column) => (column.clone(), "is.null".to_string()),
                Filter::AnyOf(items) => {
                    let inner: Vec<String> = items
                        .iter()
                        .map(|(column, value)| format!("{}.eq.{}", column, value))
                        .collect();
                    ("or".to_string(), format!("({})", inner.join(",")))
                }
            })
            .collect();

        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }

        pairs
    }

    /// Parse PostgREST query pairs back into a query.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, AppError> {
        let mut query = Query::new();

        for (key, value) in pairs {
            match key.as_str() {
                "order" => {
                    let (column, direction) = value.rsplit_once('.').unwrap_or((value, "asc"));
                    let ascending = match direction {
                        "asc" => true,
                        "desc" => false,
                        other => {
                            return Err(AppError::BadRequest(format!(
                                "Unknown order direction: {}",
                                other
                            )))
                        }
                    };
                    query = query.order_by(column, ascending);
                }
                "or" => {
                    let inner = strip_parens(value)?;
                    let items = inner
                        .split(',')
                        .map(|item| {
                            let mut parts = item.splitn(3, '.');
                            match (parts.next(), parts.next(), parts.next()) {
                                (Some(column), Some("eq"), Some(v)) => {
                                    Ok((column.to_string(), v.to_string()))
                                }
                                _ => Err(AppError::BadRequest(format!(
                                    "Unsupported or-filter: {}",
                                    item
                                ))),
                            }
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    query.filters.push(Filter::AnyOf(items));
                }
                column => query.filters.push(parse_filter(column, value)?),
            }
        }

        Ok(query)
    }
}

fn parse_filter(column: &str, value: &str) -> Result<Filter, AppError> {
    let (operator, operand) = value
        .split_once('.')
        .ok_or_else(|| AppError::BadRequest(format!("Malformed filter: {}={}", column, value)))?;

    match operator {
        "eq" => Ok(Filter::Eq(column.to_string(), operand.to_string())),
        "in" => {
            let inner = strip_parens(operand)?;
            let values = if inner.is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(str::to_string).collect()
            };
            Ok(Filter::In(column.to_string(), values))
        }
        "is" if operand == "null" => Ok(Filter::IsNull(column.to_string())),
        other => Err(AppError::BadRequest(format!(
            "Unsupported filter operator: {}",
            other
        ))),
    }
}

fn strip_parens(value: &str) -> Result<&str, AppError> {
    value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(|| AppError::BadRequest(format!("Expected parenthesised list: {}", value)))
}

/// Single-column equality used to scope a realtime channel, rendered `col=eq.value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn eq(column: &str, value: impl ToString) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        column_text(row, &self.column).as_deref() == Some(self.value.as_str())
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let (column, rest) = raw
            .split_once('=')
            .ok_or_else(|| AppError::BadRequest(format!("Malformed channel filter: {}", raw)))?;
        let value = rest
            .strip_prefix("eq.")
            .ok_or_else(|| AppError::BadRequest(format!("Channel filters only support eq: {}", raw)))?;
        Ok(Self::eq(column, value))
    }
}

impl std::fmt::Display for RowFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}
