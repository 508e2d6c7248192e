// ==============================================================================
// kinematics.rs — STEERED WHEEL FRAME + LOCAL VELOCITY
// ------------------------------------------------------------------------------
// Chassis local frame: +Y up, +Z forward, +X left (right-handed).
//
// steer_yaw(input, max_angle):
// - Positive input steers right, i.e. yaws the wheel toward -X, which is a
//   negative rotation about +Y.
//
// wheel_rotation(chassis_rot, yaw):
// - Chassis rotation composed with the wheel's steering yaw. The steering is
//   applied in chassis space first, then the whole thing goes to world.
//
// to_wheel_local(wheel_rot, v):
// - World vector expressed in the steered wheel frame:
//     x = lateral (+ left), z = rolling direction.
// ==============================================================================

use nalgebra::{UnitQuaternion, Vector3};

use crate::drive_model::types::{Pos3, Vec3};

/// World-space velocity of an arbitrary point rigidly attached to the body:
/// v(p) = v_com + ω × (p - com)
#[inline]
pub fn point_velocity(linvel: Vec3, angvel: Vec3, com: Pos3, p: Pos3) -> Vec3 {
    let r = p.coords - com.coords;
    linvel + angvel.cross(&r)
}

#[inline]
pub fn steer_yaw(steer_input: f32, max_steer_angle: f32) -> f32 {
    -steer_input * max_steer_angle
}

#[inline]
pub fn wheel_rotation(chassis_rot: &UnitQuaternion<f32>, yaw: f32) -> UnitQuaternion<f32> {
    chassis_rot * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
}

#[inline]
pub fn to_wheel_local(wheel_rot: &UnitQuaternion<f32>, v: &Vec3) -> Vec3 {
    wheel_rot.inverse_transform_vector(v)
}

/// Angle between the wheel heading and its velocity, expressed as a steer
/// direction: positive means the wheel is sliding toward its right.
#[inline]
pub fn slip_angle(local_velocity: &Vec3) -> f32 {
    (-local_velocity.x).atan2(local_velocity.z)
}
