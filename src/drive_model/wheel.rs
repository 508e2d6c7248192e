// ==============================================================================
// wheel.rs — ONE RAYCAST WHEEL: CONTACT → SUSPENSION → TIRE → SPIN
// ------------------------------------------------------------------------------
// Per tick, in this order:
// 1) anchor world position + steered wheel frame from the chassis pose
// 2) anchor velocity into the steered frame (local_velocity)
// 3) ground probe along the chassis' down axis
// 4) suspension normal force (frozen distance sample while airborne)
// 5) friction from this tick's normal force; contact-point lateral velocity
//    sampled separately from the anchor velocity
// 6) spin integration (or handbrake lock)
// 7) one AppliedForce at the contact point: normal * Fn + friction (world)
//
// Airborne: Fn = 0, slip = 0, no force; the wheel free-spins on drive torque
// and brake damping only.
// ==============================================================================

use nalgebra::{Point3, Vector3};

use crate::config::{ConfigError, SuspensionConfig, TireConfig, WheelConfig};
use crate::drive_model::kinematics::{steer_yaw, to_wheel_local, wheel_rotation};
use crate::drive_model::suspension::{probe_ground, GroundContact, SuspensionState};
use crate::drive_model::tire::{friction, integrate_spin, wheel_inertia};
use crate::drive_model::types::{
    finite_or, AppliedForce, ChassisBody, GroundProbe, Vec3, WheelCommand,
};

#[derive(Debug, Clone, PartialEq)]
pub struct WheelState {
    pub angular_velocity: f32, // rad/s
    pub normal_force: f32,     // N
    pub slip_ratio: f32,       // >= 0, > 1 means grip exceeded
    pub sliding: bool,

    // commanded (post-assist)
    pub steer: f32,            // -1..1
    pub throttle: f32,         // -1..1
    pub braking: f32,          // 0..1

    pub steer_angle: f32,      // radians, yaw about chassis up
    pub local_velocity: Vec3,  // steered frame, at the anchor
    pub suspension: SuspensionState,
    pub contact: GroundContact,
    pub friction_world: Vec3,
}

#[derive(Debug, Clone)]
pub struct Wheel {
    pub config: WheelConfig,
    pub state: WheelState,
    cast_len: f32,
    inertia: f32,
}

impl Wheel {
    pub fn new(config: WheelConfig, index: usize) -> Result<Self, ConfigError> {
        config.validate(index)?;

        let cast_len = config.cast_length();
        let inertia = wheel_inertia(config.mass, config.radius);

        Ok(Self {
            state: WheelState {
                angular_velocity: 0.0,
                normal_force: 0.0,
                slip_ratio: 0.0,
                sliding: false,
                steer: 0.0,
                throttle: 0.0,
                braking: 0.0,
                steer_angle: 0.0,
                local_velocity: Vector3::zeros(),
                suspension: SuspensionState::new(cast_len),
                contact: GroundContact::Airborne,
                friction_world: Vector3::zeros(),
            },
            config,
            cast_len,
            inertia,
        })
    }

    pub fn is_steerable(&self) -> bool {
        self.config.max_steer_angle > 0.0
    }

    pub fn apply_command(&mut self, cmd: &WheelCommand) {
        self.state.steer = finite_or(cmd.steer, 0.0).clamp(-1.0, 1.0);
        self.state.throttle = finite_or(cmd.throttle, 0.0).clamp(-1.0, 1.0);
        self.state.braking = finite_or(cmd.brake, 0.0).clamp(0.0, 1.0);
    }

    /// Advance one tick. Returns the force to apply at the contact point, or
    /// `None` while airborne.
    #[allow(clippy::too_many_arguments)]
    pub fn update<B, G>(
        &mut self,
        tire: &TireConfig,
        suspension: &SuspensionConfig,
        body: &B,
        ground: &G,
        torque_multiplier: f32,
        handbrake: bool,
        dt: f32,
    ) -> Option<AppliedForce>
    where
        B: ChassisBody + ?Sized,
        G: GroundProbe + ?Sized,
    {
        let pose = body.pose();
        let anchor = pose * Point3::from(Vector3::from(self.config.position));
        let down = pose.rotation * -Vector3::y();

        let yaw = steer_yaw(self.state.steer, self.config.max_steer_angle);
        let wheel_rot = wheel_rotation(&pose.rotation, yaw);
        self.state.steer_angle = yaw;
        self.state.local_velocity = to_wheel_local(&wheel_rot, &body.point_velocity(&anchor));

        let contact = probe_ground(ground, &anchor, &down, self.cast_len);
        self.state.normal_force = self.state.suspension.update(suspension, self.cast_len, &contact);
        self.state.contact = contact;

        let locked = handbrake && self.config.handbrake;
        if locked {
            self.state.angular_velocity = 0.0;
        }

        let (force_local, longitudinal) = match contact.hit() {
            Some(hit) => {
                let contact_local = to_wheel_local(&wheel_rot, &body.point_velocity(&hit.point));
                let out = friction(
                    tire,
                    &self.state.local_velocity,
                    contact_local.x,
                    self.state.angular_velocity,
                    self.config.radius,
                    self.state.normal_force,
                    dt,
                );
                self.state.slip_ratio = out.slip_ratio;
                self.state.sliding = out.sliding;
                (out.force_local, out.longitudinal)
            }
            None => {
                self.state.slip_ratio = 0.0;
                self.state.sliding = false;
                (Vector3::zeros(), 0.0)
            }
        };

        if !locked {
            let drive_torque = self.config.engine_torque * self.state.throttle * torque_multiplier;
            self.state.angular_velocity = integrate_spin(
                self.state.angular_velocity,
                drive_torque,
                longitudinal,
                self.config.radius,
                self.inertia,
                self.state.braking,
                self.config.brake_strength,
                dt,
            );
        }

        self.state.angular_velocity = finite_or(self.state.angular_velocity, 0.0);
        self.state.slip_ratio = finite_or(self.state.slip_ratio, 0.0);

        self.state.friction_world = wheel_rot * force_local;

        contact.hit().map(|hit| AppliedForce {
            force: hit.normal * self.state.normal_force + self.state.friction_world,
            point: hit.point,
        })
    }
}
