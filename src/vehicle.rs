// ==============================================================================
// vehicle.rs — VEHICLE CONTROLLER (ONE CHASSIS, N WHEELS)
// ------------------------------------------------------------------------------
// Owns every piece of per-vehicle model state and runs one fixed tick:
//
// 1) AssistLayer: raw driver axes + previous-tick slip → per-wheel commands
// 2) Wheels, in configuration order: contact, suspension, friction, spin
// 3) Aero: downforce at the chassis origin, drag at the centre of mass
// 4) Drivetrain: mean wheel spin → RPM, gear logic, next torque multiplier
//
// The chassis is only READ during the tick. Every force is returned as an
// AppliedForce; the host applies them to the rigid body afterwards.
// ==============================================================================

use nalgebra::{Point3, Vector3};
use tracing::info;

use crate::config::{ConfigError, VehicleConfig};
use crate::drive_model::types::{
    finite_or, AppliedForce, ChassisBody, DriverInput, GroundProbe,
};
use crate::drive_model::{AssistLayer, Drivetrain, ShiftDirection, Wheel};
use crate::telemetry::{VehicleTelemetry, WheelTelemetry};

#[derive(Debug, Clone)]
pub struct VehicleController {
    config: VehicleConfig,
    wheels: Vec<Wheel>,
    drivetrain: Drivetrain,
    assist: AssistLayer,
    time: f64,      // sim clock, seconds accumulated from dt
    speed: f32,     // |linvel| at the last tick
}

impl VehicleController {
    pub fn new(config: VehicleConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let wheels = config
            .wheels
            .iter()
            .enumerate()
            .map(|(i, w)| Wheel::new(w.clone(), i))
            .collect::<Result<Vec<_>, _>>()?;
        let drivetrain = Drivetrain::new(&config.drivetrain)?;
        let assist = AssistLayer::new(&config.assist)?;

        info!(
            wheels = wheels.len(),
            gears = drivetrain.gear_count(),
            automatic = config.drivetrain.automatic,
            "vehicle controller created"
        );

        Ok(Self {
            config,
            wheels,
            drivetrain,
            assist,
            time: 0.0,
            speed: 0.0,
        })
    }

    /// Advance one fixed step. Returns the forces the host must apply to the
    /// chassis before integrating. A non-positive or non-finite `dt` is a
    /// no-op.
    pub fn tick<B, G>(&mut self, dt: f32, input: &DriverInput, body: &B, ground: &G) -> Vec<AppliedForce>
    where
        B: ChassisBody + ?Sized,
        G: GroundProbe + ?Sized,
    {
        if !(dt.is_finite() && dt > 0.0) {
            return Vec::new();
        }

        let input = input.sanitized();
        let commands = self.assist.filter(&input, &self.wheels, dt);
        for (wheel, cmd) in self.wheels.iter_mut().zip(&commands) {
            wheel.apply_command(cmd);
        }

        // multiplier from the previous drivetrain update
        let torque_multiplier = self.drivetrain.torque_multiplier();

        let mut forces = Vec::with_capacity(self.wheels.len() + 2);
        let mut spin_sum = 0.0;
        for wheel in &mut self.wheels {
            if let Some(f) = wheel.update(
                &self.config.tire,
                &self.config.suspension,
                body,
                ground,
                torque_multiplier,
                input.handbrake,
                dt,
            ) {
                forces.push(f);
            }
            spin_sum += wheel.state.angular_velocity;
        }

        self.push_aero(body, &mut forces);

        self.time += f64::from(dt);
        let mean_spin = finite_or(spin_sum / self.wheels.len() as f32, 0.0);
        let request = ShiftDirection::from_buttons(input.shift_up, input.shift_down);
        self.drivetrain.update(self.time, mean_spin, request);

        forces
    }

    fn push_aero<B: ChassisBody + ?Sized>(&mut self, body: &B, forces: &mut Vec<AppliedForce>) {
        let pose = body.pose();
        let velocity = body.linear_velocity();
        let speed = finite_or(velocity.norm(), 0.0);
        self.speed = speed;

        if speed <= f32::EPSILON {
            return;
        }

        let aero = &self.config.aero;
        if aero.downforce != 0.0 {
            let up = pose.rotation * Vector3::y();
            forces.push(AppliedForce {
                force: -up * speed * aero.downforce,
                point: Point3::from(pose.translation.vector),
            });
        }
        if aero.drag != 0.0 {
            forces.push(AppliedForce {
                force: -velocity * speed * aero.drag,
                point: body.center_of_mass(),
            });
        }
    }

    pub fn telemetry(&self) -> VehicleTelemetry {
        VehicleTelemetry {
            time: self.time,
            speed: self.speed,
            rpm: self.drivetrain.rpm(),
            gear: self.drivetrain.gear_number(),
            shifting: self.drivetrain.is_shifting(),
            tcs_reduction: self.assist.tcs_reduction(),
            steer_reduction: self.assist.steer_reduction(),
            brake_cut: self.assist.brake_cut(),
            wheels: self
                .wheels
                .iter()
                .enumerate()
                .map(|(i, w)| WheelTelemetry::from_wheel(i, w))
                .collect(),
        }
    }
}
