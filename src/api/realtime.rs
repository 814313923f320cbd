//! Change streams over server-sent events.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde::Deserialize;

use super::{parse_table, AppState};
use crate::auth::Viewer;
use crate::errors::AppError;
use crate::gateway::RowFilter;

#[derive(Debug, Deserialize)]
pub struct ChangesParams {
    /// Optional `column=eq.value` row filter
    #[serde(default)]
    pub filter: Option<String>,
}

/// GET /realtime/v1/:table - Stream visible changes of a table.
pub async fn changes(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<ChangesParams>,
    viewer: Viewer,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let table = parse_table(&table)?;
    let filter = params.filter.as_deref().map(RowFilter::parse).transpose()?;

    tracing::debug!(
        "Realtime stream on {} for {:?}",
        table,
        viewer.identity().map(|u| u.id)
    );
    let feed = state.repo.changes(viewer.identity, table, filter);

    let events = stream::unfold(feed, |mut feed| async move {
        let change = feed.next().await?;
        let event = Event::default()
            .event("change")
            .json_data(&change)
            .unwrap_or_else(|e| {
                tracing::warn!("Could not encode change on {}: {}", change.table, e);
                Event::default().comment("dropped")
            });
        Some((Ok(event), feed))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
