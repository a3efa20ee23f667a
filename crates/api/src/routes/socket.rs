//! WebSocket RPC endpoint
//!
//! `GET /socket` upgrades to a WebSocket. Text frames carry RPC requests and
//! responses; each delivered line is one binary frame holding its JSON.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{Connection, Outbound};
use crate::rpc;
use crate::state::AppState;

/// GET /socket
pub async fn socket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.channel_capacity);
    let connection = Connection::new(state.provider.clone(), state.max_lines, tx.clone());
    info!(connection = %connection.id(), "WebSocket connected");

    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let Some(message) = encode(&outbound) else {
                continue;
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let response = match frame {
            Ok(Message::Text(text)) => connection.handle_text(text.as_str()),
            Ok(Message::Binary(_)) => {
                rpc::Response::error(serde_json::Value::Null, "binary requests not supported")
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(connection = %connection.id(), error = %e, "WebSocket transport error");
                break;
            }
        };

        if tx.send(Outbound::Response(response)).await.is_err() {
            break;
        }
    }

    let removed = connection.close();
    writer.abort();
    info!(
        connection = %connection.id(),
        subscriptions = removed,
        "WebSocket disconnected"
    );
}

fn encode(outbound: &Outbound) -> Option<Message> {
    let encoded = match outbound {
        Outbound::Line(line) => serde_json::to_vec(line).map(|bytes| Message::Binary(bytes.into())),
        Outbound::Response(response) => {
            serde_json::to_string(response).map(|text| Message::Text(text.into()))
        }
    };

    match encoded {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, "Failed to encode outbound frame");
            None
        }
    }
}
