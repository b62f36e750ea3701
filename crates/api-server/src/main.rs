//! API Server for the multi-agent conversation demo
//!
//! Serves the `/sdk/...` session, tool and agent endpoints over HTTP.

mod config;
mod routes;
mod state;
mod viz;

use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convo_core::mock::MockData;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "api_server=debug,agent_runner=debug,convo_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    let data = match &config.mock_data_dir {
        Some(dir) => {
            tracing::info!("Loading mock data from {:?}", dir);
            MockData::load_dir(dir)
                .await
                .with_context(|| format!("Failed to load mock data from {}", dir.display()))?
        }
        None => MockData::seeded(),
    };

    match &config.runtime_url {
        Some(url) => tracing::info!("Using agent runtime at {}", url),
        None => tracing::info!("No AGENT_RUNTIME_URL set, using the offline keyword runtime"),
    }

    let addr = config.listen_addr();
    let app = build_router(AppState::new(config, data));

    tracing::info!("REST API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::session::router())
        .merge(routes::events::router())
        .merge(routes::tools::router())
        .merge(routes::agents::router())
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::state::test_state;

    #[tokio::test]
    async fn message_then_events_through_full_router() {
        let app = super::build_router(test_state());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sdk/session/message")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "session_id": "s-full", "user_input": "my widget is broken" })
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sdk/session/s-full/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let events: Vec<Value> = serde_json::from_slice(&body).unwrap();

        let seqs: Vec<u64> = events.iter().map(|e| e["seq"].as_u64().unwrap()).collect();
        let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
        assert_eq!(seqs, expected);
        assert_eq!(events[0]["type"], "message");
        assert_eq!(events[0]["role"], "user");
        let reply = events
            .iter()
            .rev()
            .find(|e| e["type"] == "message")
            .unwrap();
        assert_eq!(reply["role"], "assistant");
        assert_eq!(reply["final"], true);
        assert_eq!(events.last().unwrap()["text"], "turn_end");
    }
}
