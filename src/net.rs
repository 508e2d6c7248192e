use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::VehicleConfig;
use crate::physics::PhysicsWorld;
use crate::state::{Axes, DriveAxes, ServerMessage, SharedGameState, ShiftCommand};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Input(Axes),
    Drive(DriveAxes),
    Shift { direction: ShiftCommand },
    Ping,
}

impl ClientMessage {
    fn from_json(txt: &str) -> Option<Self> {
        serde_json::from_str(txt).ok()
    }
}

pub async fn start_websocket_server(
    listener: TcpListener,
    state: Arc<Mutex<SharedGameState>>,
    physics: Arc<Mutex<PhysicsWorld>>,
    config: Arc<VehicleConfig>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "websocket listening");
    }

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        let state_clone = Arc::clone(&state);
        let physics_clone = Arc::clone(&physics);
        let config_clone = Arc::clone(&config);

        tokio::spawn(async move {
            let ws = match accept_async(raw).await {
                Ok(ws) => ws,
                Err(err) => {
                    warn!(%peer, %err, "websocket handshake failed");
                    return;
                }
            };
            let (mut write, mut read) = ws.split();

            // -------------------------------
            // 1) Create outgoing message channel + send-loop task
            // -------------------------------
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();

            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if write.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
            });

            // -------------------------------
            // 2) Create player + vehicle (physics lock first, like the tick loop)
            // -------------------------------
            let player_id = {
                let mut phys = physics_clone.lock().await;
                let mut game = state_clone.lock().await;
                let id = game.add_player(tx.clone());
                let position = phys.free_spawn_point();

                if let Err(err) = phys.spawn_vehicle(&id, position, &config_clone) {
                    error!(player = %id, %err, "failed to spawn vehicle");
                    game.remove_player(&id);
                    return;
                }
                id
            };

            info!(player = %player_id, %peer, "player connected");

            if let Some(welcome) = (ServerMessage::Welcome { player_id: player_id.clone() }).to_json() {
                let _ = tx.send(welcome);
            }

            // -------------------------------
            // 3) Main receive loop
            // -------------------------------
            while let Some(msg) = read.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(err) => {
                        debug!(player = %player_id, %err, "read error");
                        break;
                    }
                };

                if msg.is_close() {
                    break;
                }
                if !msg.is_text() {
                    continue;
                }
                let Ok(text) = msg.to_text() else {
                    continue;
                };

                let Some(parsed) = ClientMessage::from_json(text) else {
                    debug!(player = %player_id, "ignoring malformed message");
                    continue;
                };

                match parsed {
                    ClientMessage::Ping => {
                        if let Some(pong) = ServerMessage::Pong.to_json() {
                            let _ = tx.send(pong);
                        }
                    }
                    ClientMessage::Input(axes) => {
                        state_clone.lock().await.update_input(&player_id, axes);
                    }
                    ClientMessage::Drive(axes) => {
                        state_clone.lock().await.update_input(&player_id, axes);
                    }
                    ClientMessage::Shift { direction } => {
                        state_clone.lock().await.latch_shift(&player_id, direction);
                    }
                }
            }

            info!(player = %player_id, "player disconnected");
            let mut phys = physics_clone.lock().await;
            let mut game = state_clone.lock().await;
            phys.remove_vehicle(&player_id);
            game.remove_player(&player_id);
        });
    }
}
