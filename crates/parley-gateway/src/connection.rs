use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::hub::Hub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The JWT was already
/// validated at the HTTP upgrade layer and `peer` came from the upgrade
/// request's query string, so we can join the conversation immediately.
pub async fn handle_connection(socket: WebSocket, hub: Hub, username: String, peer: String) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4();

    info!(
        "{} connected (connection {}, peer {})",
        username, connection_id, peer
    );

    // Confirm before joining so the client sees Ready ahead of the
    // group/thread events the join queues up.
    let ready = GatewayEvent::Ready {
        connection_id,
        username: username.clone(),
    };
    if sender
        .send(WsMessage::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    let mut user_rx = match hub.connect(&username, &peer, connection_id).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!("{} failed to join conversation with {}: {}", username, peer, e);
            let event = GatewayEvent::Error {
                message: e.to_string(),
            };
            let _ = sender
                .send(WsMessage::Text(serde_json::to_string(&event).unwrap().into()))
                .await;
            return;
        }
    };

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward hub events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let hub_recv = hub.clone();
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&hub_recv, &username_recv, connection_id, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            username_recv,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.disconnect(connection_id).await;
    info!("{} disconnected (connection {})", username, connection_id);
}

async fn handle_command(hub: &Hub, username: &str, connection_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::SendMessage {
            recipient_username,
            content,
        } => {
            if let Err(e) = hub.send_message(username, &recipient_username, &content).await {
                warn!("{} send to {} failed: {}", username, recipient_username, e);
                hub.registry()
                    .send_to(
                        connection_id,
                        GatewayEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
        }
    }
}
