//! One WebSocket connection.
//!
//! The socket is split: a writer task drains the connection's outbound queue
//! (room broadcasts and this connection's replies, in queue order), while the
//! read loop parses requests and hands them to the dispatcher one at a time.

use super::TransportState;
use crate::actors::MemberSink;
use crate::errors::RoomError;
use crate::observability::metrics as prom;
use crate::protocol::{peek_request_id, ClientFrame, Reply, ServerFrame};

use axum::extract::ws::{Message, WebSocket};
use common::types::ConnectionId;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// How long the writer may keep flushing after the read side closes.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Serve one upgraded connection until the client goes away or the service shuts down.
#[instrument(skip_all, name = "room.transport.connection", fields(connection_id = tracing::field::Empty))]
pub async fn serve_socket(socket: WebSocket, state: Arc<TransportState>) {
    let connection_id = ConnectionId::new();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));

    let (frame_tx, frame_rx) = mpsc::channel(state.outbound_buffer);
    let sink = MemberSink::new(connection_id, frame_tx);

    state.metrics.connection_opened();
    prom::set_connections_active(state.metrics.connection_count());
    info!(target: "room.transport", connection_id = %connection_id, "Connection opened");

    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_frames(ws_tx, frame_rx, connection_id));

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                debug!(target: "room.transport", connection_id = %connection_id, "Closing connection for shutdown");
                break;
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&state, &sink, &text).await,
                    Some(Ok(Message::Binary(_))) => {
                        let error = RoomError::InvalidRequest("binary frames are not supported".to_string());
                        sink.reply(Reply::failure(None, &error)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by the socket itself
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(target: "room.transport", connection_id = %connection_id, error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        }
    }

    // Transport-level disconnect; a no-op if the client already left
    state.dispatcher.disconnected(connection_id).await;

    state.metrics.connection_closed();
    prom::set_connections_active(state.metrics.connection_count());

    // Rooms may still hold clones of the sink until they process the leave
    drop(sink);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    info!(target: "room.transport", connection_id = %connection_id, "Connection closed");
}

/// Parse and dispatch one text frame, then queue its reply.
async fn handle_text(state: &TransportState, sink: &MemberSink, text: &str) {
    let reply = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => match state.dispatcher.handle(sink, frame.request).await {
            Ok(response) => Reply::success(frame.id, response.room, response.user_id),
            Err(e) => Reply::failure(frame.id, &e),
        },
        Err(e) => {
            debug!(
                target: "room.transport",
                connection_id = %sink.connection_id(),
                error = %e,
                "Malformed request frame"
            );
            let error = RoomError::InvalidRequest(format!("malformed request: {e}"));
            Reply::failure(peek_request_id(text), &error)
        }
    };

    sink.reply(reply).await;
}

async fn write_frames<S>(
    mut ws_tx: S,
    mut frame_rx: mpsc::Receiver<ServerFrame>,
    connection_id: ConnectionId,
) where
    S: futures_util::Sink<Message> + Unpin,
{
    while let Some(frame) = frame_rx.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(target: "room.transport", connection_id = %connection_id, error = %e, "Failed to encode frame");
                continue;
            }
        };

        if ws_tx.send(Message::Text(text)).await.is_err() {
            debug!(target: "room.transport", connection_id = %connection_id, "WebSocket write failed, stopping writer");
            return;
        }
    }

    let _ = ws_tx.close().await;
}
