//! Live purchase feed over websocket.
//!
//! A connecting viewer is registered in the `ConnectionRegistry` for the
//! lifetime of its socket and immediately receives a `connection_open` event
//! carrying its id. Pushed purchases then arrive as `new_purchase` events.
//! Inbound frames are drained and ignored.
//!
//! ## Endpoints
//!
//! - GET /websocket - Upgrade to the event feed

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use shared::api::WsEvent;
use tokio::sync::mpsc;

use crate::{connections::ConnectionRegistry, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/websocket", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.connections))
}

/// Drives one viewer connection; unregisters on every exit path.
async fn handle_socket(socket: WebSocket, connections: ConnectionRegistry) {
    let (mut sink, mut stream) = socket.split();
    let (sender, mut outbox) = mpsc::unbounded_channel();

    let id = connections.register(sender);
    tracing::info!(%id, "websocket connected");

    connections.send_to(&id, &WsEvent::ConnectionOpen { id: id.clone() });

    loop {
        tokio::select! {
            queued = outbox.recv() => {
                let Some(message) = queued else { break };
                if let Err(error) = sink.send(message).await {
                    tracing::warn!(%id, %error, "websocket send failed");
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::warn!(%id, %error, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    connections.unregister(&id);
    tracing::info!(%id, "websocket disconnected");
}
