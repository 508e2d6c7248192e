use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::error;
use uuid::Uuid;

use crate::drive_model::types::DriverInput;
use crate::physics::PhysicsWorld;
use crate::telemetry::VehicleTelemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftCommand {
    Up,
    Down,
}

/// Axes as sent by the client; anything missing is neutral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Axes {
    pub steer: f32,
    pub throttle: f32,
    pub brake: f32,
    pub handbrake: bool,
}

impl From<Axes> for DriverInput {
    fn from(axes: Axes) -> Self {
        Self {
            steer: axes.steer,
            throttle: axes.throttle,
            brake: axes.brake,
            handbrake: axes.handbrake,
            ..Self::default()
        }
    }
}

/// Single vertical stick (forward > 0, reverse < 0) plus digital brake, for
/// pad and keyboard clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveAxes {
    pub steer: f32,
    pub vertical: f32,
    pub brake: bool,
    pub handbrake: bool,
}

impl From<DriveAxes> for DriverInput {
    fn from(axes: DriveAxes) -> Self {
        DriverInput::from_combined_axis(axes.steer, axes.vertical, axes.brake, axes.handbrake)
    }
}

pub struct Player {
    pub id: String,
    pub input: DriverInput,     // axes + shift presses latched until the next tick
}

#[derive(Serialize)]
pub struct VehicleSnapshot {
    pub id: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4], // quaternion (x, y, z, w)
    pub telemetry: VehicleTelemetry,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Welcome { player_id: String },
    Pong,
    Snapshot { tick: u64, vehicles: Vec<VehicleSnapshot> },
}

impl ServerMessage {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(err) => {
                error!(%err, "failed to serialize server message");
                None
            }
        }
    }
}

pub struct SharedGameState {
    pub tick: u64,
    pub clients: HashMap<String, UnboundedSender<String>>, // playerId → outgoing channel
    pub players: HashMap<String, Player>,
}

impl Default for SharedGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedGameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            clients: HashMap::new(),
            players: HashMap::new(),
        }
    }

    /// New player with a fresh v4 id; the caller spawns its vehicle.
    pub fn add_player(&mut self, tx: UnboundedSender<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.clients.insert(id.clone(), tx);
        self.players.insert(
            id.clone(),
            Player {
                id: id.clone(),
                input: DriverInput::default(),
            },
        );
        id
    }

    pub fn remove_player(&mut self, id: &str) {
        self.clients.remove(id);
        self.players.remove(id);
    }

    /// Replace the axes; a shift press not yet consumed survives.
    pub fn update_input(&mut self, id: &str, axes: impl Into<DriverInput>) {
        if let Some(p) = self.players.get_mut(id) {
            let axes: DriverInput = axes.into();
            p.input = DriverInput {
                steer: axes.steer,
                throttle: axes.throttle,
                brake: axes.brake,
                handbrake: axes.handbrake,
                ..p.input
            };
        }
    }

    pub fn latch_shift(&mut self, id: &str, command: ShiftCommand) {
        if let Some(p) = self.players.get_mut(id) {
            match command {
                ShiftCommand::Up => p.input.shift_up = true,
                ShiftCommand::Down => p.input.shift_down = true,
            }
        }
    }

    /// Inputs for this tick. Shift presses are handed out exactly once.
    pub fn take_inputs(&mut self) -> Vec<(String, DriverInput)> {
        self.players
            .values_mut()
            .map(|p| {
                let input = p.input;
                p.input.shift_up = false;
                p.input.shift_down = false;
                (p.id.clone(), input)
            })
            .collect()
    }

    pub fn snapshot(&self, physics: &PhysicsWorld) -> ServerMessage {
        let mut vehicles = Vec::with_capacity(physics.vehicles.len());

        for (id, vehicle) in &physics.vehicles {
            if let Some(body) = physics.bodies.get(vehicle.body) {
                let pos = body.translation();
                let rot = body.rotation();
                vehicles.push(VehicleSnapshot {
                    id: id.clone(),
                    position: [pos.x, pos.y, pos.z],
                    rotation: [rot.i, rot.j, rot.k, rot.w],
                    telemetry: vehicle.controller.telemetry(),
                });
            }
        }

        ServerMessage::Snapshot {
            tick: self.tick,
            vehicles,
        }
    }

    /// Build and send a snapshot of all vehicles to all clients. Clients whose
    /// channel is closed are dropped.
    pub fn broadcast_snapshot(&mut self, physics: &PhysicsWorld) {
        let Some(json) = self.snapshot(physics).to_json() else {
            return;
        };

        self.clients.retain(|_, tx| tx.send(json.clone()).is_ok());
    }
}
