//! WebSocket connection actor
//!
//! Handles individual client connections: the upgrade on the WebSocket
//! path, then two tasks for the life of the connection.
//!
//! - inbound: socket → `ClientMessage` → `HubCommand`, with an idle-read timeout
//! - outbound: bounded queue → socket, with per-write timeouts and liveness pings
//!
//! When either task ends the other is stopped and the Hub is asked once to
//! unregister the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::hub::HubCommand;
use crate::message::{ClientMessage, Presence, ServerMessage};
use crate::server::AppState;
use crate::types::{ClientId, Peer};

type WsSink = SplitSink<WebSocket, Message>;
type WsSource = SplitStream<WebSocket>;

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Requested identifier; ignored unless valid
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
}

/// Upgrade handler for the WebSocket path
///
/// Frames and messages above `max_frame_size` are refused by the protocol
/// layer, which ends the connection.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let limit = state.config.max_frame_size;

    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            let result =
                handle_connection(socket, params.client_id, addr, state.cmd_tx, state.config)
                    .await;
            if let Err(e) = result {
                if e.is_graceful() {
                    debug!("Connection from {} closed: {}", addr, e);
                } else {
                    error!("Connection handler error: {}", e);
                }
            }
        })
}

/// Run an upgraded connection
///
/// Registers with the Hub, runs the inbound and outbound tasks and tears
/// everything down when one ends.
pub async fn handle_connection(
    socket: WebSocket,
    supplied_id: Option<String>,
    peer_addr: SocketAddr,
    cmd_tx: mpsc::Sender<HubCommand>,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let (ws_sender, ws_receiver) = socket.split();

    let peer = Peer::new(ClientId::supplied_or_new(supplied_id.as_deref()));
    info!("Client {} connected from {}", peer.id, peer_addr);

    // Hub -> client queue; the Hub holds the only sender
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_capacity);

    if cmd_tx
        .send(HubCommand::Register {
            peer: peer.clone(),
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - hub closed", peer.id);
        return Err(AppError::HubClosed);
    }

    let mut read_task = tokio::spawn(inbound_loop(
        ws_receiver,
        cmd_tx.clone(),
        peer.clone(),
        config.idle_timeout,
    ));
    let mut write_task = tokio::spawn(outbound_loop(ws_sender, msg_rx, config.clone()));

    let write_done = tokio::select! {
        res = &mut read_task => {
            log_task_end(&peer.id, "read", res);
            false
        }
        res = &mut write_task => {
            log_task_end(&peer.id, "write", res);
            true
        }
    };

    read_task.abort();
    let _ = cmd_tx.send(HubCommand::Unregister { peer: peer.clone() }).await;

    // The Hub closing the queue lets the write task send a close frame
    if !write_done {
        match time::timeout(config.write_timeout, &mut write_task).await {
            Ok(res) => log_task_end(&peer.id, "write", res),
            Err(_) => write_task.abort(),
        }
    }

    info!("Client {} disconnected", peer.id);

    Ok(())
}

/// Socket → Hub
///
/// Ends on transport errors, close frames, idle timeout or a closed Hub.
/// Malformed payloads are logged and skipped.
async fn inbound_loop(
    mut ws_receiver: WsSource,
    cmd_tx: mpsc::Sender<HubCommand>,
    peer: Peer,
    idle_timeout: Duration,
) -> Result<(), AppError> {
    loop {
        let next = time::timeout(idle_timeout, ws_receiver.next())
            .await
            .map_err(|_| AppError::IdleTimeout)?;

        let Some(msg) = next else {
            debug!("Client {} stream ended", peer.id);
            return Ok(());
        };
        let msg = msg?;

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(client_msg) => {
                    let cmd = client_message_to_command(peer.clone(), client_msg);
                    if cmd_tx.send(cmd).await.is_err() {
                        return Err(AppError::HubClosed);
                    }
                }
                Err(e) => {
                    warn!("Dropping malformed message from {}: {}", peer.id, e);
                }
            },
            Message::Close(_) => {
                debug!("Client {} sent close frame", peer.id);
                return Ok(());
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Pong replies are queued by the protocol layer itself
            }
            _ => {
                debug!("Ignoring non-text frame from {}", peer.id);
            }
        }
    }
}

/// Queue → socket
///
/// Each queued message goes out as its own text frame. A ping goes out on
/// every tick, so the peer's pong arrives inside every idle-read window.
/// Ends when the Hub closes the queue (after sending a close frame) or on
/// any write failure.
async fn outbound_loop(
    mut ws_sender: WsSink,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let mut ticker = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = msg_rx.recv() => {
                let Some(msg) = next else {
                    debug!("Outbound queue closed, sending close frame");
                    let _ = time::timeout(config.write_timeout, ws_sender.close()).await;
                    return Ok(());
                };
                write_message(&mut ws_sender, &msg, config.write_timeout).await?;

                // Drain what is already queued, bounded so pings still get a turn
                for _ in 0..config.outbound_capacity {
                    let Ok(msg) = msg_rx.try_recv() else {
                        break;
                    };
                    write_message(&mut ws_sender, &msg, config.write_timeout).await?;
                }
            }
            _ = ticker.tick() => {
                write_frame(&mut ws_sender, Message::Ping(Default::default()), config.write_timeout).await?;
            }
        }
    }
}

async fn write_message(
    ws_sender: &mut WsSink,
    msg: &ServerMessage,
    limit: Duration,
) -> Result<(), AppError> {
    match serde_json::to_string(msg) {
        Ok(json) => write_frame(ws_sender, Message::Text(json.into()), limit).await,
        Err(e) => {
            // Skip the message, keep the connection
            error!("Failed to serialize message: {}", e);
            Ok(())
        }
    }
}

async fn write_frame(ws_sender: &mut WsSink, frame: Message, limit: Duration) -> Result<(), AppError> {
    time::timeout(limit, ws_sender.send(frame))
        .await
        .map_err(|_| AppError::WriteTimeout)??;
    Ok(())
}

fn log_task_end(client_id: &ClientId, task: &str, res: Result<Result<(), AppError>, JoinError>) {
    match res {
        Ok(Ok(())) => debug!("{} task ended for {}", task, client_id),
        Ok(Err(e)) if e.is_graceful() => debug!("{} task for {} closed: {}", task, client_id, e),
        Ok(Err(e)) => warn!("{} task for {} failed: {}", task, client_id, e),
        Err(e) if e.is_cancelled() => debug!("{} task for {} cancelled", task, client_id),
        Err(e) => error!("{} task for {} panicked: {}", task, client_id, e),
    }
}

/// Convert a ClientMessage to a HubCommand, stamping the true sender
fn client_message_to_command(peer: Peer, msg: ClientMessage) -> HubCommand {
    match msg {
        ClientMessage::Join { username } => HubCommand::Join { peer, username },
        ClientMessage::Operation { version, operation } => HubCommand::Apply {
            peer,
            client_version: version,
            edit: operation,
        },
        ClientMessage::Selection { from, to, cursor } => HubCommand::Presence {
            peer,
            presence: Presence::Selection { from, to, cursor },
        },
        ClientMessage::Cursor { cursor } => HubCommand::Presence {
            peer,
            presence: Presence::Cursor { cursor },
        },
    }
}
