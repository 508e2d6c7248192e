// ==============================================================================
// telemetry.rs — READ-ONLY VEHICLE SNAPSHOTS (SERVER -> CLIENT)
// ------------------------------------------------------------------------------
// Defines serializable per-tick state for external consumers:
// - WheelTelemetry: per-wheel slip, load, spin, steer and ground contact
// - VehicleTelemetry: drivetrain + assist state (incl. brake cut), speed, sim time
//
// Wheel meshes, skid marks, audio and HUD all poll these by wheel index.
// This file is pure data; no physics side effects.
// ==============================================================================

use serde::Serialize;

use crate::drive_model::types::{p3, v3};
use crate::drive_model::Wheel;

#[derive(Debug, Clone, Serialize)]
pub struct ContactTelemetry {
    pub point: [f32; 3],
    pub normal: [f32; 3],
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelTelemetry {
    pub index: usize,
    pub label: String,              // "FL", "FR", "RL", "RR"
    pub slip_ratio: f32,
    pub sliding: bool,
    pub normal_force: f32,
    pub angular_velocity: f32,      // rad/s
    pub steer_angle: f32,           // radians
    pub friction_force: [f32; 3],   // world space
    pub grounded: bool,
    pub contact: Option<ContactTelemetry>,
}

impl WheelTelemetry {
    pub fn from_wheel(index: usize, wheel: &Wheel) -> Self {
        let s = &wheel.state;
        Self {
            index,
            label: wheel.config.label.clone(),
            slip_ratio: s.slip_ratio,
            sliding: s.sliding,
            normal_force: s.normal_force,
            angular_velocity: s.angular_velocity,
            steer_angle: s.steer_angle,
            friction_force: v3(s.friction_world),
            grounded: s.contact.is_grounded(),
            contact: s.contact.hit().map(|hit| ContactTelemetry {
                point: p3(hit.point),
                normal: v3(hit.normal),
                distance: hit.distance,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleTelemetry {
    pub time: f64,                  // sim seconds
    pub speed: f32,                 // m/s, |linear velocity|
    pub rpm: f32,
    pub gear: usize,                // 1-based
    pub shifting: bool,
    pub tcs_reduction: f32,
    pub steer_reduction: f32,
    pub brake_cut: bool,            // brake assist released the brakes this tick
    pub wheels: Vec<WheelTelemetry>,
}
