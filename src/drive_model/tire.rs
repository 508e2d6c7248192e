// ==============================================================================
// tire.rs — CLAMPED FRICTION CONE + WHEEL SPIN (FORCE DOMAIN)
// ==============================================================================
// Inputs:
// - local velocity at the anchor, in the steered wheel frame
// - lateral velocity at the contact point (same frame)
// - wheel angular velocity, normal force, dt
//
// Model steps:
// 1) lateral      = -grip_x * v.x - contact_damping * v_contact.x
// 2) longitudinal = -grip_z * (v.z - ω * r)
// 3) raw          = (lateral, 0, longitudinal) * Fn * μs * dt
// 4) slip_ratio   = |raw| / (Fn * μs); sliding = |raw| > Fn * μs
// 5) clamp |raw| to Fn * μs, then scale by μk/μs when sliding
//
// Step 5 is always clamp-then-scale. The force drops at breakaway
// (slip_ratio crossing 1) from Fn*μs to Fn*μk: static → kinetic friction.
//
// Spin:
//     ω += (T_drive - longitudinal * r) / I * dt,   I = 0.5 * m * r²
//     ω *= max(0, 1 - brake * brake_strength * dt)
// ==============================================================================

use nalgebra::Vector3;

use crate::config::TireConfig;
use crate::drive_model::types::{finite_or, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrictionOutput {
    pub force_local: Vec3,   // clamped + scaled, steered wheel frame
    pub longitudinal: f32,   // pre-scale grip term, feeds spin integration
    pub slip_ratio: f32,
    pub sliding: bool,
}

pub fn friction(
    cfg: &TireConfig,
    local_velocity: &Vec3,
    contact_lateral_velocity: f32,
    angular_velocity: f32,
    radius: f32,
    normal_force: f32,
    dt: f32,
) -> FrictionOutput {
    let lateral = -cfg.grip_x * local_velocity.x - cfg.contact_damping * contact_lateral_velocity;
    let longitudinal = -cfg.grip_z * (local_velocity.z - angular_velocity * radius);

    let raw = Vector3::new(lateral, 0.0, longitudinal) * (normal_force * cfg.static_friction * dt);
    let max_friction = normal_force * cfg.static_friction;

    let magnitude = raw.norm();
    let slip_ratio = finite_or(magnitude / max_friction, 0.0);
    let sliding = magnitude > max_friction;

    let mut force_local = if magnitude > max_friction && magnitude > 0.0 {
        raw * (max_friction / magnitude)
    } else {
        raw
    };
    if sliding {
        force_local *= cfg.kinetic_friction / cfg.static_friction;
    }
    if !force_local.iter().all(|c| c.is_finite()) {
        force_local = Vector3::zeros();
    }

    FrictionOutput {
        force_local,
        longitudinal: finite_or(longitudinal, 0.0),
        slip_ratio,
        sliding,
    }
}

/// Solid-disk moment of inertia.
#[inline]
pub fn wheel_inertia(mass: f32, radius: f32) -> f32 {
    0.5 * mass * radius * radius
}

pub fn integrate_spin(
    angular_velocity: f32,
    drive_torque: f32,
    longitudinal: f32,
    radius: f32,
    inertia: f32,
    braking: f32,
    brake_strength: f32,
    dt: f32,
) -> f32 {
    let mut w = finite_or(angular_velocity, 0.0);
    w += (drive_torque - longitudinal * radius) / inertia * dt;
    w *= (1.0 - braking * brake_strength * dt).max(0.0);
    finite_or(w, 0.0)
}
