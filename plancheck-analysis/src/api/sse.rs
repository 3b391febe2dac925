//! Server-Sent Events for analysis state changes

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventStreamParams {
    /// Only forward events of this project
    pub project_id: Option<i64>,
}

/// GET /analyses/events
///
/// Streams `AnalysisSubmitted`, `AnalysisStarted`, `AnalysisCompleted` and
/// `AnalysisFailed` with the event type as the SSE event name.
pub async fn analysis_event_stream(
    State(state): State<AppState>,
    Query(params): Query<EventStreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(project_id = ?params.project_id, "SSE client connected to analysis events");

    let mut rx = state.dispatcher.events().subscribe();
    let project_filter = params.project_id;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if project_filter.is_some_and(|p| p != event.project_id()) {
                        continue;
                    }

                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!(event_type, analysis_id = %event.analysis_id(), "SSE: forwarding event");
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => warn!("SSE: failed to serialize {}: {}", event_type, e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE client lagging, events dropped");
                    yield Ok(Event::default().event("Lagged").data(skipped.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
