//! Event log endpoints: snapshot listing and the live SSE stream

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use convo_core::event::Event;
use futures::stream::Stream;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::state::AppState;

const KEEPALIVE_INTERVAL_SECS: u64 = 15;

#[derive(Debug, Default, Deserialize)]
pub struct SinceQuery {
    #[serde(default)]
    pub since: Option<u64>,
}

/// GET /sdk/session/{id}/events - Events with seq greater than `since`
async fn list_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SinceQuery>,
) -> Json<Vec<Event>> {
    Json(state.store().list_events(&session_id, query.since).await)
}

/// GET /sdk/session/{id}/stream - Poll the event log and push new events as SSE frames
async fn stream_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SinceQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let poll = state.config().stream_poll;
    debug!("SSE stream opened for session {}", session_id);

    let stream = async_stream::stream! {
        let mut last = query.since.unwrap_or(0);
        loop {
            for event in state.store().list_events(&session_id, Some(last)).await {
                last = last.max(event.seq);
                match SseEvent::default().json_data(&event) {
                    Ok(frame) => yield Ok(frame),
                    Err(err) => warn!("Failed to encode event {} for SSE: {}", event.seq, err),
                }
            }
            tokio::time::sleep(poll).await;
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(KEEPALIVE_INTERVAL_SECS))
            .text("keepalive"),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sdk/session/{id}/events", get(list_events))
        .route("/sdk/session/{id}/stream", get(stream_events))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use convo_core::event::EventDraft;
    use futures::StreamExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::state::test_state;

    #[tokio::test]
    async fn events_since_filters_by_seq() {
        let state = test_state();
        for text in ["one", "two", "three"] {
            state.store().append("s-ev", EventDraft::log(text)).await;
        }
        let app = super::router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sdk/session/s-ev/events?since=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let events: Vec<Value> = serde_json::from_slice(&body).unwrap();
        let seqs: Vec<u64> = events.iter().map(|e| e["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(events[0]["text"], "two");
    }

    #[tokio::test]
    async fn events_for_unknown_session_is_empty() {
        let app = super::router().with_state(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sdk/session/missing/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"[]");
    }

    #[tokio::test]
    async fn stream_emits_data_frames() {
        let state = test_state();
        state.store().append("s-sse", EventDraft::log("first")).await;
        state.store().append("s-sse", EventDraft::log("second")).await;
        let app = super::router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sdk/session/s-sse/stream?since=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(frame.starts_with("data: "));
        assert!(frame.contains("\"seq\":2"));
        assert!(frame.contains("second"));
    }
}
