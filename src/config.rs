// ==============================================================================
// config.rs — VEHICLE DESCRIPTION (TOML) + VALIDATION
// ------------------------------------------------------------------------------
// One immutable VehicleConfig per run. Every tunable of the wheel, drivetrain
// and assist models is a named field here; the TOML file may omit any of them
// (serde defaults mirror the bundled config/vehicle.toml).
//
// Validation is the only fatal error path of the simulation: a config that
// would divide by zero later (no gears, zero final drive, zero radius/mass)
// is refused before any vehicle is built.
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/vehicle.toml";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    NoWheels,
    EmptyGearTable,
    ZeroFinalDrive,
    InvalidWheel {
        index: usize,
        field: &'static str,
        value: f32,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::NoWheels => write!(f, "vehicle has no wheels"),
            Self::EmptyGearTable => write!(f, "drivetrain gear table is empty"),
            Self::ZeroFinalDrive => write!(f, "drivetrain final drive ratio must be non-zero"),
            Self::InvalidWheel { index, field, value } => {
                write!(f, "wheel {index}: invalid `{field}` = {value}")
            }
            Self::Invalid(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ============================================
// ----- file layout --------------------------
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub tick_hz: f32,                  // fixed physics rate
    pub chassis: ChassisConfig,
    pub tire: TireConfig,
    pub suspension: SuspensionConfig,
    pub aero: AeroConfig,
    pub drivetrain: DrivetrainConfig,
    pub assist: AssistConfig,
    pub wheels: Vec<WheelConfig>,      // update order == file order
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub mass: f32,                     // kg
    pub half_extents: [f32; 3],        // [hx, hy, hz] meters
    pub com_offset: [f32; 3],          // local offset added to the box COM
    pub inertia_scale: f32,            // multiplies the box inertia tensor
    pub linear_damping: f32,
    pub angular_damping: f32,
}

/// Friction cone + grip gains shared by all wheels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TireConfig {
    pub grip_x: f32,                   // lateral gain
    pub grip_z: f32,                   // longitudinal gain
    pub contact_damping: f32,          // lateral damping on contact-point velocity
    pub static_friction: f32,
    pub kinetic_friction: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspensionConfig {
    pub spring: f32,                   // N/m
    pub damper: f32,                   // applied to per-tick distance change
    pub force_clamp: f32,              // N, upper bound on normal force
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AeroConfig {
    pub downforce: f32,                // N per m/s, along -up at chassis origin
    pub drag: f32,                     // N per (m/s)^2, opposing velocity at COM
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PowerCurve {
    /// Straight ramp from `idle_power` at idle to 1.0 at max RPM.
    Linear,
    /// Quadratic rise to 1.0 at `peak_rpm`, then linear falloff to
    /// `redline_power` at max RPM.
    TwoSegment { peak_rpm: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub idle_rpm: f32,
    pub max_rpm: f32,
    pub gear_ratios: Vec<f32>,         // index 0 = first gear
    pub final_drive: f32,
    pub automatic: bool,
    pub up_shift_fraction: f32,        // of max_rpm
    pub down_shift_rpm: f32,
    pub shift_duration: f32,           // seconds of lockout
    pub power_curve: PowerCurve,
    pub idle_power: f32,               // 0..1 multiplier at idle
    pub redline_power: f32,            // 0..1 multiplier at max rpm (two-segment)
    pub shift_power: f32,              // 0..1 multiplier while shifting
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    pub enabled: bool,
    pub traction_control: bool,
    pub steering_assist: bool,
    pub stability_control: bool,
    pub brake_assist: bool,

    // traction control
    pub target_slip: f32,
    pub slip_tolerance: f32,
    pub tcs_attack_rate: f32,          // 1/s toward full cut
    pub tcs_release_rate: f32,         // 1/s back toward no cut

    // steering authority
    pub steer_target_slip: f32,
    pub steer_attack_rate: f32,
    pub steer_release_rate: f32,
    pub steer_max_cut: f32,            // 0..1 of steering removed at full reduction

    // stability / counter-steer
    pub counter_steer_slip: f32,
    pub counter_steer_gain: f32,       // 0..1 blend per tick

    // brake assist
    pub brake_cut_slip: f32,

    // input shaping (always on)
    pub steer_response: f32,           // 1/s
    pub brake_response: f32,           // 1/s
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub label: String,                 // "FL", "FR", "RL", "RR", ...
    pub position: [f32; 3],            // anchor in chassis local space
    pub max_steer_angle: f32,          // radians, 0 = fixed wheel
    pub suspension_rest_length: f32,   // meters
    pub mass: f32,                     // kg
    pub radius: f32,                   // meters
    pub engine_torque: f32,            // N*m at full throttle
    pub brake_strength: f32,           // spin damping per second at full brake
    pub handbrake: bool,
}

// ============================================
// ----- defaults (mirror config/vehicle.toml)
// ============================================

impl Default for VehicleConfig {
    fn default() -> Self {
        let steer = 30f32.to_radians();
        Self {
            tick_hz: 50.0,
            chassis: ChassisConfig::default(),
            tire: TireConfig::default(),
            suspension: SuspensionConfig::default(),
            aero: AeroConfig::default(),
            drivetrain: DrivetrainConfig::default(),
            assist: AssistConfig::default(),
            wheels: vec![
                WheelConfig::at("FL", [ 0.8, 0.4,  1.5], steer, false),
                WheelConfig::at("FR", [-0.8, 0.4,  1.5], steer, false),
                WheelConfig::at("RL", [ 0.8, 0.4, -1.5], 0.0,   true),
                WheelConfig::at("RR", [-0.8, 0.4, -1.5], 0.0,   true),
            ],
        }
    }
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            mass: 40.0,
            half_extents: [1.0, 0.35, 2.1],
            com_offset: [0.0, -0.75, 0.0],
            inertia_scale: 1.4,
            linear_damping: 0.08,
            angular_damping: 0.6,
        }
    }
}

impl Default for TireConfig {
    fn default() -> Self {
        Self {
            grip_x: 8.0,
            grip_z: 42.0,
            contact_damping: 2.0,
            static_friction: 2.95,
            kinetic_friction: 0.85,
        }
    }
}

impl Default for SuspensionConfig {
    fn default() -> Self {
        Self { spring: 490.0, damper: 5.5, force_clamp: 250.0 }
    }
}

impl Default for AeroConfig {
    fn default() -> Self {
        Self { downforce: 1.0, drag: 0.3 }
    }
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            idle_rpm: 800.0,
            max_rpm: 8500.0,
            gear_ratios: vec![3.5, 2.1, 1.5, 1.15, 0.95, 0.8],
            final_drive: 4.0,
            automatic: true,
            up_shift_fraction: 0.9,
            down_shift_rpm: 2500.0,
            shift_duration: 0.3,
            power_curve: PowerCurve::TwoSegment { peak_rpm: 6000.0 },
            idle_power: 0.35,
            redline_power: 0.7,
            shift_power: 0.25,
        }
    }
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            traction_control: true,
            steering_assist: true,
            stability_control: true,
            brake_assist: true,
            target_slip: 0.85,
            slip_tolerance: 0.05,
            tcs_attack_rate: 25.0,
            tcs_release_rate: 4.0,
            steer_target_slip: 0.94,
            steer_attack_rate: 12.0,
            steer_release_rate: 3.0,
            steer_max_cut: 0.5,
            counter_steer_slip: 1.0,
            counter_steer_gain: 0.1,
            brake_cut_slip: 0.96,
            steer_response: 6.0,
            brake_response: 13.0,
        }
    }
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self::at("W", [0.0, 0.0, 0.0], 0.0, false)
    }
}

impl WheelConfig {
    fn at(label: &str, position: [f32; 3], max_steer_angle: f32, handbrake: bool) -> Self {
        Self {
            label: label.to_string(),
            position,
            max_steer_angle,
            suspension_rest_length: 0.5,
            mass: 16.0,
            radius: 0.5,
            engine_torque: 120.0,
            brake_strength: 0.5,
            handbrake,
        }
    }

    /// Ray length: wheel diameter plus suspension travel.
    pub fn cast_length(&self) -> f32 {
        2.0 * self.radius + self.suspension_rest_length
    }

    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let bad = |field: &'static str, value: f32| ConfigError::InvalidWheel { index, field, value };

        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(bad("radius", self.radius));
        }
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(bad("mass", self.mass));
        }
        if !(self.suspension_rest_length.is_finite() && self.suspension_rest_length >= 0.0) {
            return Err(bad("suspension_rest_length", self.suspension_rest_length));
        }
        if !(self.max_steer_angle.is_finite()
            && (0.0..std::f32::consts::FRAC_PI_2).contains(&self.max_steer_angle))
        {
            return Err(bad("max_steer_angle", self.max_steer_angle));
        }
        if !(self.brake_strength.is_finite() && self.brake_strength >= 0.0) {
            return Err(bad("brake_strength", self.brake_strength));
        }
        if !self.engine_torque.is_finite() {
            return Err(bad("engine_torque", self.engine_torque));
        }
        if let Some(&v) = self.position.iter().find(|v| !v.is_finite()) {
            return Err(bad("position", v));
        }
        Ok(())
    }
}

impl DrivetrainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gear_ratios.is_empty() {
            return Err(ConfigError::EmptyGearTable);
        }
        if !self.final_drive.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "drivetrain final_drive must be finite, got {}",
                self.final_drive
            )));
        }
        if self.final_drive == 0.0 {
            return Err(ConfigError::ZeroFinalDrive);
        }
        if let Some((i, r)) = self.gear_ratios.iter().enumerate().find(|(_, r)| !r.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "drivetrain gear_ratios[{i}] must be finite, got {r}"
            )));
        }
        if !(self.idle_rpm.is_finite() && self.max_rpm.is_finite() && self.idle_rpm >= 0.0) {
            return Err(ConfigError::Invalid("drivetrain rpm limits must be finite".to_string()));
        }
        if self.idle_rpm >= self.max_rpm {
            return Err(ConfigError::Invalid(format!(
                "drivetrain idle_rpm ({}) must be below max_rpm ({})",
                self.idle_rpm, self.max_rpm
            )));
        }
        if !(self.up_shift_fraction > 0.0 && self.up_shift_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "drivetrain up_shift_fraction must be in (0, 1], got {}",
                self.up_shift_fraction
            )));
        }
        if !(self.shift_duration.is_finite() && self.shift_duration >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "drivetrain shift_duration must be >= 0, got {}",
                self.shift_duration
            )));
        }
        for (name, v) in [
            ("idle_power", self.idle_power),
            ("redline_power", self.redline_power),
            ("shift_power", self.shift_power),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid(format!(
                    "drivetrain {name} must be in [0, 1], got {v}"
                )));
            }
        }
        if let PowerCurve::TwoSegment { peak_rpm } = self.power_curve {
            if !(peak_rpm > self.idle_rpm && peak_rpm < self.max_rpm) {
                return Err(ConfigError::Invalid(format!(
                    "drivetrain peak_rpm ({peak_rpm}) must lie between idle_rpm and max_rpm"
                )));
            }
        }
        Ok(())
    }
}

impl AssistConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("tcs_attack_rate", self.tcs_attack_rate),
            ("tcs_release_rate", self.tcs_release_rate),
            ("steer_attack_rate", self.steer_attack_rate),
            ("steer_release_rate", self.steer_release_rate),
            ("steer_response", self.steer_response),
            ("brake_response", self.brake_response),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(ConfigError::Invalid(format!("assist {name} must be > 0, got {v}")));
            }
        }
        for (name, v) in [
            ("steer_max_cut", self.steer_max_cut),
            ("counter_steer_gain", self.counter_steer_gain),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid(format!("assist {name} must be in [0, 1], got {v}")));
            }
        }
        if !(self.slip_tolerance.is_finite() && self.slip_tolerance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "assist slip_tolerance must be >= 0, got {}",
                self.slip_tolerance
            )));
        }
        if self.tcs_attack_rate <= self.tcs_release_rate {
            return Err(ConfigError::Invalid(format!(
                "assist tcs_attack_rate ({}) must exceed tcs_release_rate ({})",
                self.tcs_attack_rate, self.tcs_release_rate
            )));
        }
        Ok(())
    }
}

impl VehicleConfig {
    /// Read, parse and validate a vehicle file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(ConfigError::Invalid(format!("tick_hz must be > 0, got {}", self.tick_hz)));
        }
        if self.wheels.is_empty() {
            return Err(ConfigError::NoWheels);
        }
        for (i, w) in self.wheels.iter().enumerate() {
            w.validate(i)?;
        }

        let t = &self.tire;
        if !(t.static_friction.is_finite() && t.static_friction > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tire static_friction must be > 0, got {}",
                t.static_friction
            )));
        }
        if !(t.kinetic_friction.is_finite() && t.kinetic_friction >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tire kinetic_friction must be >= 0, got {}",
                t.kinetic_friction
            )));
        }

        let s = &self.suspension;
        if !(s.force_clamp.is_finite() && s.force_clamp > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "suspension force_clamp must be > 0, got {}",
                s.force_clamp
            )));
        }

        let c = &self.chassis;
        if !(c.mass.is_finite() && c.mass > 0.0) {
            return Err(ConfigError::Invalid(format!("chassis mass must be > 0, got {}", c.mass)));
        }
        if !(c.inertia_scale.is_finite() && c.inertia_scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "chassis inertia_scale must be > 0, got {}",
                c.inertia_scale
            )));
        }

        self.drivetrain.validate()?;
        self.assist.validate()
    }

    pub fn fixed_dt(&self) -> f32 {
        1.0 / self.tick_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_vehicle_file_parses_and_validates() {
        let raw = include_str!("../config/vehicle.toml");
        let config = VehicleConfig::parse(raw, Path::new("config/vehicle.toml"))
            .expect("bundled config should be valid");

        assert_eq!(config.wheels.len(), 4);
        assert_eq!(config.wheels[0].label, "FL");
        assert!(config.wheels[2].handbrake);
        assert_eq!(config.drivetrain.gear_ratios[0], 3.5);
        assert_eq!(
            config.drivetrain.power_curve,
            PowerCurve::TwoSegment { peak_rpm: 6000.0 }
        );
    }

    #[test]
    fn defaults_are_valid() {
        VehicleConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let raw = r#"
            tick_hz = 60.0

            [drivetrain]
            final_drive = 3.9
            power_curve = { kind = "linear" }
        "#;
        let config = VehicleConfig::parse(raw, Path::new("partial.toml")).expect("valid");

        assert_eq!(config.tick_hz, 60.0);
        assert_eq!(config.drivetrain.final_drive, 3.9);
        assert_eq!(config.drivetrain.power_curve, PowerCurve::Linear);
        assert_eq!(config.wheels.len(), 4);
    }

    #[test]
    fn rejects_missing_wheels() {
        let mut config = VehicleConfig::default();
        config.wheels.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoWheels)));
    }

    #[test]
    fn rejects_empty_gear_table_and_zero_final_drive() {
        let mut config = VehicleConfig::default();
        config.drivetrain.gear_ratios.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyGearTable)));

        let mut config = VehicleConfig::default();
        config.drivetrain.final_drive = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroFinalDrive)));
    }

    #[test]
    fn rejects_zero_radius_and_zero_mass() {
        let mut config = VehicleConfig::default();
        config.wheels[1].radius = 0.0;
        let err = config.validate().expect_err("zero radius must fail");
        assert!(matches!(err, ConfigError::InvalidWheel { index: 1, field: "radius", .. }));

        let mut config = VehicleConfig::default();
        config.wheels[3].mass = 0.0;
        let err = config.validate().expect_err("zero mass must fail");
        assert!(err.to_string().contains("wheel 3"));
        assert!(err.to_string().contains("mass"));
    }

    #[test]
    fn rejects_peak_rpm_outside_band() {
        let mut config = VehicleConfig::default();
        config.drivetrain.power_curve = PowerCurve::TwoSegment { peak_rpm: 9000.0 };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_tcs_release_faster_than_attack() {
        let mut config = VehicleConfig::default();
        config.assist.tcs_attack_rate = 4.0;
        config.assist.tcs_release_rate = 4.0;
        let err = config.validate().expect_err("equal rates must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("tcs_attack_rate"));

        config.assist.tcs_release_rate = 30.0;
        assert!(config.validate().is_err());

        config.assist.tcs_release_rate = 3.9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_tune_stays_inside_stability_margins() {
        let c = VehicleConfig::default();
        let dt = c.fixed_dt();
        let share = c.chassis.mass / c.wheels.len() as f32;

        // Explicit friction: one tick's grip impulse at the clamped load must
        // not overshoot the slip it corrects.
        let gain = c.tire.grip_z * c.tire.static_friction * dt * dt * c.suspension.force_clamp / share;
        assert!(gain < 2.0, "friction gain {gain}");

        // COM height over the contact plane at static ride height.
        let static_load = share * 9.81;
        let w = &c.wheels[0];
        let ride = w.cast_length() - static_load / c.suspension.spring;
        let com_height = c.chassis.com_offset[1] - (w.position[1] - ride);
        assert!(com_height > 0.0 && com_height < 0.5, "com height {com_height}");

        // Full static grip can neither lift an axle nor roll the car.
        let half_base = w.position[2].abs();
        let half_track = w.position[0].abs();
        assert!(c.tire.static_friction * com_height < half_base.min(half_track));
    }

    #[test]
    fn parse_error_carries_path() {
        let err = VehicleConfig::parse("tick_hz = \"fast\"", Path::new("broken.toml"))
            .expect_err("type mismatch must fail");
        assert!(err.to_string().contains("broken.toml"));
        assert!(err.source().is_some());
    }
}
