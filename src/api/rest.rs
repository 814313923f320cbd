//! Table and procedure endpoints.

use axum::{
    extract::{Path, Query as QueryParams, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use super::{parse_table, AppState};
use crate::auth::Viewer;
use crate::errors::AppError;
use crate::gateway::{Procedure, Query};

type Pairs = Vec<(String, String)>;

/// GET /rest/v1/:table - Rows the caller may read.
pub async fn select_rows(
    State(state): State<AppState>,
    Path(table): Path<String>,
    QueryParams(pairs): QueryParams<Pairs>,
    viewer: Viewer,
) -> Result<Json<Vec<Value>>, AppError> {
    let table = parse_table(&table)?;
    let query = Query::from_pairs(&pairs)?;

    let rows = state.repo.select(viewer.identity(), table, &query).await?;
    Ok(Json(rows))
}

/// POST /rest/v1/:table - Insert one row and return it.
pub async fn insert_row(
    State(state): State<AppState>,
    Path(table): Path<String>,
    viewer: Viewer,
    Json(row): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let table = parse_table(&table)?;

    let created = state.repo.insert(viewer.identity(), table, row).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PATCH /rest/v1/:table?id=eq.X - Update one row and return it.
pub async fn update_row(
    State(state): State<AppState>,
    Path(table): Path<String>,
    QueryParams(pairs): QueryParams<Pairs>,
    viewer: Viewer,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let table = parse_table(&table)?;
    let id = id_param(&pairs)?;

    let updated = state
        .repo
        .update(viewer.identity(), table, id, patch)
        .await?;
    Ok(Json(updated))
}

/// DELETE /rest/v1/:table?id=eq.X - Delete one row.
pub async fn delete_row(
    State(state): State<AppState>,
    Path(table): Path<String>,
    QueryParams(pairs): QueryParams<Pairs>,
    viewer: Viewer,
) -> Result<StatusCode, AppError> {
    let table = parse_table(&table)?;
    let id = id_param(&pairs)?;

    state.repo.delete(viewer.identity(), table, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /rest/v1/rpc/:name - Call a stored procedure.
pub async fn call_procedure(
    State(state): State<AppState>,
    Path(name): Path<String>,
    viewer: Viewer,
    Json(args): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let procedure = Procedure::from_name(&name).ok_or_else(|| {
        AppError::ProcedureUnavailable(format!(
            "Could not find the function public.{} in the schema cache",
            name
        ))
    })?;

    let result = state.repo.call(viewer.identity(), procedure, args).await?;
    Ok(Json(result))
}

/// Writes address exactly one row by `id=eq.<id>`.
fn id_param(pairs: &[(String, String)]) -> Result<&str, AppError> {
    pairs
        .iter()
        .find(|(key, _)| key == "id")
        .and_then(|(_, value)| value.strip_prefix("eq."))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Writes require an id=eq.<id> filter".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_param() {
        let pairs = vec![("id".to_string(), "eq.abc".to_string())];
        assert_eq!(id_param(&pairs).unwrap(), "abc");

        let missing = vec![("team_id".to_string(), "eq.abc".to_string())];
        assert!(id_param(&missing).is_err());

        let wrong_operator = vec![("id".to_string(), "in.(abc)".to_string())];
        assert!(id_param(&wrong_operator).is_err());
    }
}
