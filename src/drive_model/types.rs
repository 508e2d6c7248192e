//! Core shared types for `drive_model` (engine-agnostic).
// drive_model/types.rs
use nalgebra::{Isometry3, Point3, Vector3};

use crate::drive_model::kinematics;

pub type Vec3 = Vector3<f32>;
pub type Pos3 = Point3<f32>;
pub type Pose = Isometry3<f32>;

// ----- array conversions for serde payloads -----
#[inline] pub fn v3(v: Vec3) -> [f32; 3] { [v.x, v.y, v.z] }
#[inline] pub fn p3(p: Pos3) -> [f32; 3] { [p.x, p.y, p.z] }

/// Replace NaN/Infinity with `fallback`.
#[inline]
pub fn finite_or(x: f32, fallback: f32) -> f32 {
    if x.is_finite() { x } else { fallback }
}

// ============================================
// ----- external collaborators ---------------
// ============================================

/// Read side of the rigid body the wheels are attached to.
///
/// The model never owns the body. It reads the pose and velocities once per
/// wheel and hands forces back through [`ForceReceiver`] after the tick.
pub trait ChassisBody {
    fn pose(&self) -> Pose;
    fn linear_velocity(&self) -> Vec3;
    fn angular_velocity(&self) -> Vec3;

    /// World-space centre of mass. Defaults to the body origin.
    fn center_of_mass(&self) -> Pos3 {
        Point3::from(self.pose().translation.vector)
    }

    /// World-space velocity of a point rigidly attached to the body.
    fn point_velocity(&self, world_point: &Pos3) -> Vec3 {
        kinematics::point_velocity(
            self.linear_velocity(),
            self.angular_velocity(),
            self.center_of_mass(),
            *world_point,
        )
    }
}

/// Write side of the rigid body.
pub trait ForceReceiver {
    fn add_force_at_position(&mut self, force: Vec3, world_point: Pos3);
}

/// Ray query against the static scene. `direction` is unit length, so
/// `distance` is in meters.
pub trait GroundProbe {
    fn raycast(&self, origin: &Pos3, direction: &Vec3, max_distance: f32) -> Option<GroundHit>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundHit {
    pub point: Pos3,
    pub normal: Vec3,
    pub distance: f32,
}

// ============================================
// ----- per-tick IO --------------------------
// ============================================

/// One force the host must apply to the chassis after the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedForce {
    pub force: Vec3,
    pub point: Pos3,
}

impl AppliedForce {
    pub fn apply_to<R: ForceReceiver + ?Sized>(&self, body: &mut R) {
        body.add_force_at_position(self.force, self.point);
    }
}

/// Driver axes polled once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriverInput {
    pub steer: f32,     // -1..1 (+ = right)
    pub throttle: f32,  // -1..1 (negative = reverse torque)
    pub brake: f32,     // 0..1
    pub handbrake: bool,
    pub shift_up: bool,
    pub shift_down: bool,
}

impl DriverInput {
    /// Single vertical axis: positive drives forward, negative drives in reverse.
    pub fn from_combined_axis(steer: f32, vertical: f32, brake: bool, handbrake: bool) -> Self {
        Self {
            steer,
            throttle: vertical,
            brake: if brake { 1.0 } else { 0.0 },
            handbrake,
            ..Self::default()
        }
    }

    pub fn sanitized(&self) -> Self {
        Self {
            steer: finite_or(self.steer, 0.0).clamp(-1.0, 1.0),
            throttle: finite_or(self.throttle, 0.0).clamp(-1.0, 1.0),
            brake: finite_or(self.brake, 0.0).clamp(0.0, 1.0),
            ..*self
        }
    }
}

/// Per-wheel output of the assist layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelCommand {
    pub steer: f32,    // -1..1
    pub throttle: f32, // -1..1
    pub brake: f32,    // 0..1
}
