//! HTTP and WebSocket surface.
//!
//! - `GET /ws` - upgrade to a room protocol connection (see [`crate::protocol`])
//! - `GET /rooms/:room_id` - room snapshot as JSON, 404 if the room does not exist
//!
//! Browser origins are checked against the configured allow-list, both by the
//! CORS layer and on the WebSocket upgrade itself.

pub mod ws;

use crate::actors::ActorMetrics;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::room::Room;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::types::RoomId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Shared state for every connection.
#[derive(Debug)]
pub struct TransportState {
    pub dispatcher: Dispatcher,
    pub metrics: Arc<ActorMetrics>,
    pub allowed_origins: Vec<String>,
    any_origin: bool,
    /// Capacity of each connection's outbound frame queue.
    pub outbound_buffer: usize,
    /// Cancelled at shutdown; open connections close.
    pub shutdown: CancellationToken,
}

impl TransportState {
    #[must_use]
    pub fn new(
        config: &Config,
        dispatcher: Dispatcher,
        metrics: Arc<ActorMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            metrics,
            allowed_origins: config.allowed_origins.clone(),
            any_origin: config.allows_any_origin(),
            outbound_buffer: config.outbound_buffer,
            shutdown,
        }
    }

    /// Requests without an `Origin` header (non-browser clients) are allowed.
    fn origin_allowed(&self, headers: &HeaderMap) -> bool {
        let Some(origin) = headers.get(header::ORIGIN) else {
            return true;
        };
        if self.any_origin {
            return true;
        }
        origin
            .to_str()
            .is_ok_and(|origin| self.allowed_origins.iter().any(|allowed| allowed == origin))
    }

    fn cors_layer(&self) -> CorsLayer {
        let allow_origin = if self.any_origin {
            AllowOrigin::any()
        } else {
            let origins: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(target: "room.transport", origin = %origin, "Ignoring invalid allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET])
    }
}

/// Build the public router.
pub fn router(state: Arc<TransportState>) -> Router {
    let cors = state.cors_layer();

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms/:room_id", get(room_info_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    State(state): State<Arc<TransportState>>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    if !state.origin_allowed(&headers) {
        debug!(
            target: "room.transport",
            origin = ?headers.get(header::ORIGIN),
            "WebSocket upgrade refused for origin"
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    upgrade.on_upgrade(move |socket| ws::serve_socket(socket, state))
}

async fn room_info_handler(
    State(state): State<Arc<TransportState>>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Room>, StatusCode> {
    state
        .dispatcher
        .room_info(room_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
