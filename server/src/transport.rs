//! Client transports
//!
//! Two concurrent framings carry the same `{"event", "data"}` protocol: a
//! WebSocket endpoint (sharing its port with the HTTP health surface) and a
//! newline-delimited JSON fallback over plain TCP. Each accepted socket gets
//! a reader that parses frames into typed events for the server loop and a
//! writer that drains the connection's outbound queue.

use crate::network::ServerMessage;
use crate::world::HealthStatus;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use shared::{ClientEvent, ServerEvent};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Parses one wire frame into a typed event.
///
/// Frames without a `data` key are normalized to a null payload so bare
/// events like `{"event":"requestMonsters"}` parse cleanly.
pub fn parse_frame(text: &str) -> Result<ClientEvent, serde_json::Error> {
    let mut value: serde_json::Value = serde_json::from_str(text)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.entry("data").or_insert(serde_json::Value::Null);
    }
    serde_json::from_value(value)
}

fn handle_frame(
    conn_id: u64,
    text: &str,
    server_tx: &UnboundedSender<ServerMessage>,
    out_tx: &UnboundedSender<ServerEvent>,
) {
    match parse_frame(text) {
        Ok(event) => {
            let _ = server_tx.send(ServerMessage::Event { conn_id, event });
        }
        Err(err) => {
            // Malformed ingress never reaches the world; the offender alone hears.
            debug!("Rejected malformed frame from connection {}: {}", conn_id, err);
            let _ = out_tx.send(ServerEvent::Error {
                message: format!("invalid event frame: {}", err),
            });
        }
    }
}

#[derive(Clone)]
struct AppState {
    server_tx: UnboundedSender<ServerMessage>,
}

/// Serves `GET /` (health) and `GET /ws` (WebSocket upgrade) on one port,
/// with permissive CORS.
pub async fn run_http(
    listener: TcpListener,
    server_tx: UnboundedSender<ServerMessage>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState { server_tx };
    let app = Router::new()
        .route("/", get(health))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!(
        "HTTP and WebSocket listening on {}",
        listener.local_addr()?
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, StatusCode> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .server_tx
        .send(ServerMessage::HealthQuery { reply: reply_tx })
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let status = reply_rx
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(status))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_socket(socket, addr, state.server_tx))
}

async fn handle_ws_socket(
    socket: WebSocket,
    addr: SocketAddr,
    server_tx: UnboundedSender<ServerMessage>,
) {
    let conn_id = next_connection_id();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    if server_tx
        .send(ServerMessage::Connected {
            conn_id,
            addr,
            sender: out_tx.clone(),
        })
        .is_err()
    {
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer drains the outbound queue until every sender is gone, which
    // happens once the world processes the disconnect.
    tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(err) => error!("Failed to serialize outbound event: {}", err),
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(conn_id, &text, &server_tx, &out_tx),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { conn_id });
}

/// Accept loop for the newline-delimited JSON fallback framing.
pub async fn run_tcp(
    listener: TcpListener,
    server_tx: UnboundedSender<ServerMessage>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        "Fallback TCP framing listening on {}",
        listener.local_addr()?
    );

    loop {
        let (stream, addr) = listener.accept().await?;
        let server_tx = server_tx.clone();
        tokio::spawn(handle_tcp_socket(stream, addr, server_tx));
    }
}

async fn handle_tcp_socket(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: UnboundedSender<ServerMessage>,
) {
    let conn_id = next_connection_id();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    if server_tx
        .send(ServerMessage::Connected {
            conn_id,
            addr,
            sender: out_tx.clone(),
        })
        .is_err()
    {
        return;
    }

    let (read_half, mut write_half) = stream.into_split();

    tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(mut line) => {
                    line.push('\n');
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(err) => error!("Failed to serialize outbound event: {}", err),
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        handle_frame(conn_id, &line, &server_tx, &out_tx);
    }

    let _ = server_tx.send(ServerMessage::Disconnected { conn_id });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_full_payload() {
        let event = parse_frame(
            r#"{"event":"join","data":{"odId":"od_1","name":"Mira","mapId":"henesys"}}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::Join(_)));
    }

    #[test]
    fn test_parse_frame_normalizes_missing_data() {
        let event = parse_frame(r#"{"event":"requestMonsters"}"#).unwrap();
        assert!(matches!(event, ClientEvent::RequestMonsters));

        let event = parse_frame(r#"{"event":"latencyPing"}"#).unwrap();
        assert!(matches!(event, ClientEvent::LatencyPing(None)));
    }

    #[test]
    fn test_parse_frame_rejects_garbage() {
        assert!(parse_frame("not json").is_err());
        assert!(parse_frame(r#"{"event":"noSuchEvent","data":{}}"#).is_err());
        assert!(parse_frame(r#"{"payload":"no event tag"}"#).is_err());
    }

    #[test]
    fn test_malformed_frame_replies_error_without_forwarding() {
        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        handle_frame(7, "definitely not json", &server_tx, &out_tx);

        assert!(server_rx.try_recv().is_err());
        match out_rx.try_recv() {
            Ok(ServerEvent::Error { message }) => {
                assert!(message.starts_with("invalid event frame"))
            }
            other => panic!("Unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_valid_frame_forwards_typed_event() {
        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        handle_frame(7, r#"{"event":"chatMessage","data":{"message":"hi"}}"#, &server_tx, &out_tx);

        assert!(out_rx.try_recv().is_err());
        match server_rx.try_recv() {
            Ok(ServerMessage::Event { conn_id: 7, event }) => {
                assert!(matches!(event, ClientEvent::ChatMessage(_)));
            }
            _ => panic!("Expected a forwarded event"),
        }
    }
}
