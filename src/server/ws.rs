use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use super::api::SharedState;
use crate::board::Notification;
use crate::board::notify::to_json;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong before the connection is considered dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let rx = state.controller.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx))
}

async fn handle_socket(socket: WebSocket, rx: broadcast::Receiver<Notification>) {
    tracing::debug!("notification client connected");
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, rx).await;
    tracing::debug!("notification client disconnected");
}

/// Ping/Pong bookkeeping for one client.
struct Heartbeat {
    last_pong: Instant,
    awaiting_pong: bool,
}

impl Heartbeat {
    fn new() -> Self {
        Self {
            last_pong: Instant::now(),
            awaiting_pong: false,
        }
    }

    fn expired_at(&self, now: Instant) -> bool {
        self.awaiting_pong && now.duration_since(self.last_pong) > PONG_TIMEOUT
    }

    fn pinged(&mut self) {
        self.awaiting_pong = true;
    }

    fn ponged(&mut self) {
        self.last_pong = Instant::now();
        self.awaiting_pong = false;
    }
}

/// What a broadcast result means for the socket.
#[derive(Debug)]
enum Outbound {
    Send(Message),
    Skip,
    Stop,
}

fn outbound(received: Result<Notification, RecvError>) -> Outbound {
    match received {
        Ok(notification) => match to_json(&notification) {
            Some(json) => Outbound::Send(Message::Text(json.into())),
            None => Outbound::Skip,
        },
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "notification client lagging");
            Outbound::Skip
        }
        Err(RecvError::Closed) => Outbound::Stop,
    }
}

/// Forward board notifications to one client until it goes away.
///
/// Each turn picks one frame to send: a Ping every [`PING_INTERVAL`] or the
/// next notification. No Pong within [`PONG_TIMEOUT`] ends the loop, and
/// anything the client sends besides Pong and Close is ignored.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<Notification>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;
    let mut heartbeat = Heartbeat::new();

    loop {
        let frame = tokio::select! {
            _ = ping_interval.tick() => {
                if heartbeat.expired_at(Instant::now()) {
                    tracing::debug!("pong timeout, dropping client");
                    break;
                }
                heartbeat.pinged();
                Message::Ping(Vec::new().into())
            }
            received = rx.recv() => match outbound(received) {
                Outbound::Send(message) => message,
                Outbound::Skip => continue,
                Outbound::Stop => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Pong(_))) => {
                    heartbeat.ponged();
                    continue;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };
        if sender.send(frame).await.is_err() {
            break;
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_serializes_notifications() {
        let received = Ok(Notification::LoginRequired {
            message: "token expired".into(),
        });
        match outbound(received) {
            Outbound::Send(Message::Text(text)) => {
                let text = text.as_str();
                assert!(text.contains("\"type\":\"LoginRequired\""));
                assert!(text.contains("token expired"));
            }
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_outbound_skips_lag_and_stops_on_close() {
        assert!(matches!(outbound(Err(RecvError::Lagged(3))), Outbound::Skip));
        assert!(matches!(outbound(Err(RecvError::Closed)), Outbound::Stop));
    }

    #[test]
    fn test_heartbeat_expires_only_while_awaiting_pong() {
        let mut heartbeat = Heartbeat::new();
        let late = heartbeat.last_pong + PONG_TIMEOUT + Duration::from_secs(1);
        assert!(!heartbeat.expired_at(late));
        heartbeat.pinged();
        assert!(heartbeat.expired_at(late));
        assert!(!heartbeat.expired_at(heartbeat.last_pong + PING_INTERVAL));
        heartbeat.ponged();
        assert!(!heartbeat.expired_at(heartbeat.last_pong + PING_INTERVAL));
    }
}
