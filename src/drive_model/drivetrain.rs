// ==============================================================================
// drivetrain.rs — ENGINE RPM + GEAR STATE MACHINE
// ------------------------------------------------------------------------------
// States: steady (gear fixed) | shifting (lockout until `shift_deadline`).
// The ratio changes the instant a shift starts; only torque is cut while the
// lockout runs (power = shift_power).
//
// Per tick, in this order:
// 1) expire the lockout if now >= deadline
// 2) at most one manual request (up wins when both are pressed)
// 3) RPM from mean wheel spin with the (possibly new) gear
// 4) automatic up/down checks: automatic mode, nothing shifted this tick,
//    not shifting
//
// RPM:
//     wheel_rpm = mean(ω) * 60 / 2π
//     rpm       = clamp(max(idle, wheel_rpm * |ratio * final_drive|), idle, max)
// Non-finite spin gives idle; a huge finite spin saturates at max.
// ==============================================================================

use std::f64::consts::TAU;

use tracing::debug;

use crate::config::{ConfigError, DrivetrainConfig, PowerCurve};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    Up,
    Down,
}

impl ShiftDirection {
    /// Collapse both shift buttons into one request; up wins.
    pub fn from_buttons(up: bool, down: bool) -> Option<Self> {
        match (up, down) {
            (true, _) => Some(Self::Up),
            (false, true) => Some(Self::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Drivetrain {
    config: DrivetrainConfig,
    gear: usize,                 // 0-based index into gear_ratios
    rpm: f32,
    shifting: bool,
    shift_deadline: f64,         // sim seconds
    torque_multiplier: f32,      // power(rpm) from the last update
}

impl Drivetrain {
    pub fn new(config: &DrivetrainConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut drivetrain = Self {
            config: config.clone(),
            gear: 0,
            rpm: config.idle_rpm,
            shifting: false,
            shift_deadline: 0.0,
            torque_multiplier: 0.0,
        };
        drivetrain.torque_multiplier = drivetrain.power(drivetrain.rpm);
        Ok(drivetrain)
    }

    // ----- accessors ---------------------------------------------------------

    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    /// 1-based, for display.
    pub fn gear_number(&self) -> usize {
        self.gear + 1
    }

    pub fn gear_count(&self) -> usize {
        self.config.gear_ratios.len()
    }

    pub fn is_shifting(&self) -> bool {
        self.shifting
    }

    pub fn total_ratio(&self) -> f32 {
        (self.config.gear_ratios[self.gear] * self.config.final_drive).abs()
    }

    /// Multiplier fed to every wheel's drive torque on the next tick.
    pub fn torque_multiplier(&self) -> f32 {
        self.torque_multiplier
    }

    // ----- shifting ----------------------------------------------------------

    /// Manual shift. Refused during the lockout and at either end of the
    /// gear table.
    pub fn request_shift(&mut self, direction: ShiftDirection, now: f64) -> bool {
        self.expire_lockout(now);
        self.try_shift(direction, now, "manual")
    }

    fn expire_lockout(&mut self, now: f64) {
        if self.shifting && now >= self.shift_deadline {
            self.shifting = false;
        }
    }

    fn try_shift(&mut self, direction: ShiftDirection, now: f64, reason: &'static str) -> bool {
        if self.shifting {
            return false;
        }
        let target = match direction {
            ShiftDirection::Up if self.gear + 1 < self.gear_count() => self.gear + 1,
            ShiftDirection::Down if self.gear > 0 => self.gear - 1,
            _ => return false,
        };

        let from = self.gear_number();
        self.gear = target;
        self.shifting = true;
        self.shift_deadline = now + f64::from(self.config.shift_duration);

        debug!(from, to = self.gear_number(), rpm = self.rpm, reason, "gear change");
        true
    }

    // ----- tick --------------------------------------------------------------

    pub fn update(&mut self, now: f64, mean_angular_velocity: f32, request: Option<ShiftDirection>) {
        self.expire_lockout(now);

        let shifted = request.is_some_and(|direction| self.request_shift(direction, now));

        self.rpm = self.compute_rpm(mean_angular_velocity);

        if self.config.automatic && !shifted && !self.shifting {
            if self.rpm > self.config.max_rpm * self.config.up_shift_fraction {
                self.try_shift(ShiftDirection::Up, now, "auto");
            } else if self.rpm < self.config.down_shift_rpm {
                self.try_shift(ShiftDirection::Down, now, "auto");
            }
        }

        self.torque_multiplier = self.power(self.rpm);
    }

    fn compute_rpm(&self, mean_angular_velocity: f32) -> f32 {
        let idle = self.config.idle_rpm;
        if !mean_angular_velocity.is_finite() {
            return idle;
        }

        // f64 so a huge finite spin saturates instead of overflowing to inf
        let wheel_rpm = f64::from(mean_angular_velocity) * 60.0 / TAU;
        let rpm = wheel_rpm * f64::from(self.total_ratio());
        rpm.clamp(f64::from(idle), f64::from(self.config.max_rpm)) as f32
    }

    // ----- power -------------------------------------------------------------

    /// Power multiplier in [0, 1]. Fixed at `shift_power` while shifting.
    pub fn power(&self, rpm: f32) -> f32 {
        if self.shifting {
            return self.config.shift_power;
        }

        let c = &self.config;
        let rpm = rpm.clamp(c.idle_rpm, c.max_rpm);
        let p = match c.power_curve {
            PowerCurve::Linear => {
                let t = (rpm - c.idle_rpm) / (c.max_rpm - c.idle_rpm);
                c.idle_power + (1.0 - c.idle_power) * t
            }
            PowerCurve::TwoSegment { peak_rpm } if rpm <= peak_rpm => {
                let t = (rpm - c.idle_rpm) / (peak_rpm - c.idle_rpm);
                c.idle_power + (1.0 - c.idle_power) * t * t
            }
            PowerCurve::TwoSegment { peak_rpm } => {
                let t = (rpm - peak_rpm) / (c.max_rpm - peak_rpm);
                1.0 + (c.redline_power - 1.0) * t
            }
        };

        if p.is_finite() { p.clamp(0.0, 1.0) } else { c.idle_power }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const EPS: f32 = 1e-5;

    fn manual() -> Drivetrain {
        let cfg = DrivetrainConfig { automatic: false, ..DrivetrainConfig::default() };
        Drivetrain::new(&cfg).expect("valid drivetrain")
    }

    #[test]
    fn construction_rejects_bad_tables() {
        let empty = DrivetrainConfig { gear_ratios: vec![], ..DrivetrainConfig::default() };
        assert!(matches!(Drivetrain::new(&empty), Err(ConfigError::EmptyGearTable)));

        let zero = DrivetrainConfig { final_drive: 0.0, ..DrivetrainConfig::default() };
        assert!(matches!(Drivetrain::new(&zero), Err(ConfigError::ZeroFinalDrive)));
    }

    #[test]
    fn stationary_wheels_give_exact_idle_rpm() {
        let mut d = manual();
        d.update(0.02, 0.0, None);
        assert_eq!(d.gear_number(), 1);
        assert_eq!(d.rpm(), 800.0);
    }

    #[test]
    fn rpm_stays_in_band_for_any_spin() {
        let mut d = manual();
        for &w in &[0.0, 1e-6, 3.0, -50.0, 1_000.0, 1e12, -1e12, f32::MAX, f32::NAN, f32::INFINITY] {
            d.update(0.0, w, None);
            assert!(d.rpm() >= 800.0 && d.rpm() <= 8500.0, "w = {w} gave rpm {}", d.rpm());
        }
    }

    #[test]
    fn rpm_follows_ratio() {
        let mut d = manual();
        // 20 rad/s * 60/2π ≈ 190.99 wheel rpm; * 14 ≈ 2673.8
        d.update(0.0, 20.0, None);
        let expected = 20.0 * 60.0 / TAU * 14.0;
        assert!((f64::from(d.rpm()) - expected).abs() < 1e-2);
    }

    #[test]
    fn huge_finite_spin_saturates_at_max_rpm() {
        let mut d = manual();
        for &w in &[1e6, 1e37, f32::MAX] {
            d.update(0.0, w, None);
            assert_eq!(d.rpm(), 8500.0, "w = {w}");
        }
        for &w in &[-1e37, f32::MIN, f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            d.update(0.0, w, None);
            assert_eq!(d.rpm(), 800.0, "w = {w}");
        }
    }

    #[test]
    fn second_shift_during_lockout_is_ignored() {
        let mut d = manual();
        assert!(d.request_shift(ShiftDirection::Up, 0.0));
        assert_eq!(d.gear_number(), 2);
        assert!(d.is_shifting());

        assert!(!d.request_shift(ShiftDirection::Up, 0.1));
        assert!(!d.request_shift(ShiftDirection::Down, 0.2));
        assert_eq!(d.gear_number(), 2);

        assert!(d.request_shift(ShiftDirection::Up, 0.31));
        assert_eq!(d.gear_number(), 3);
    }

    #[test]
    fn shifts_out_of_range_are_noops() {
        let mut d = manual();
        assert!(!d.request_shift(ShiftDirection::Down, 0.0));
        assert_eq!(d.gear_number(), 1);
        assert!(!d.is_shifting());

        let mut t = 0.0;
        while d.request_shift(ShiftDirection::Up, t) {
            t += 1.0;
        }
        assert_eq!(d.gear_number(), d.gear_count());
        assert!(!d.request_shift(ShiftDirection::Up, t + 10.0));
    }

    #[test]
    fn gear_index_bounded_under_random_shift_sequences() {
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let cfg = DrivetrainConfig { automatic: seed % 2 == 0, ..DrivetrainConfig::default() };
            let mut d = Drivetrain::new(&cfg).expect("valid");
            let mut now = 0.0f64;

            for _ in 0..2_000 {
                now += rng.gen_range(0.0..0.2);
                let request = match rng.gen_range(0..4) {
                    0 => Some(ShiftDirection::Up),
                    1 => Some(ShiftDirection::Down),
                    _ => None,
                };
                let w = rng.gen_range(-100.0f32..400.0);

                match rng.gen_range(0..3) {
                    0 => { d.request_shift(ShiftDirection::Up, now); }
                    1 => { d.request_shift(ShiftDirection::Down, now); }
                    _ => d.update(now, w, request),
                }

                assert!(d.gear_number() <= d.gear_count());
                assert!(d.rpm() >= cfg.idle_rpm && d.rpm() <= cfg.max_rpm);
            }
        }
    }

    #[test]
    fn up_wins_when_both_buttons_pressed() {
        assert_eq!(ShiftDirection::from_buttons(true, true), Some(ShiftDirection::Up));
        assert_eq!(ShiftDirection::from_buttons(false, true), Some(ShiftDirection::Down));
        assert_eq!(ShiftDirection::from_buttons(false, false), None);
    }

    #[test]
    fn automatic_shifts_at_most_once_per_tick() {
        let mut d = Drivetrain::new(&DrivetrainConfig::default()).expect("valid");
        d.update(0.0, 500.0, None);
        assert_eq!(d.gear_number(), 2);
        assert!(d.is_shifting());

        // Still locked out: no further auto shift even at redline.
        d.update(0.1, 500.0, None);
        assert_eq!(d.gear_number(), 2);

        d.update(0.4, 500.0, None);
        assert_eq!(d.gear_number(), 3);
    }

    #[test]
    fn automatic_downshift_at_low_rpm() {
        let mut d = Drivetrain::new(&DrivetrainConfig::default()).expect("valid");
        d.update(0.0, 500.0, None);
        assert_eq!(d.gear_number(), 2);

        d.update(1.0, 0.0, None);
        assert_eq!(d.gear_number(), 1);
    }

    #[test]
    fn manual_request_blocks_auto_check_that_tick() {
        let mut d = Drivetrain::new(&DrivetrainConfig::default()).expect("valid");
        d.update(0.0, 0.0, Some(ShiftDirection::Up));
        // Manual up happened; rpm now idle (< down threshold) but no auto down.
        assert_eq!(d.gear_number(), 2);
    }

    #[test]
    fn power_while_shifting_is_fixed() {
        let mut d = manual();
        d.request_shift(ShiftDirection::Up, 0.0);
        for &rpm in &[800.0, 4000.0, 6000.0, 8500.0] {
            assert_eq!(d.power(rpm), 0.25);
        }
        d.update(0.0, 0.0, None);
        assert_eq!(d.torque_multiplier(), 0.25);
    }

    #[test]
    fn two_segment_curve_shape() {
        let d = manual();
        assert!((d.power(6000.0) - 1.0).abs() < EPS);
        assert!((d.power(800.0) - 0.35).abs() < EPS);
        assert!((d.power(8500.0) - 0.7).abs() < EPS);
        assert!(d.power(3000.0) < d.power(5000.0));
        assert!(d.power(7000.0) < 1.0);
    }

    #[test]
    fn linear_curve_ramps_to_full() {
        let cfg = DrivetrainConfig {
            automatic: false,
            power_curve: PowerCurve::Linear,
            ..DrivetrainConfig::default()
        };
        let d = Drivetrain::new(&cfg).expect("valid");
        assert!((d.power(800.0) - 0.35).abs() < EPS);
        assert!((d.power(8500.0) - 1.0).abs() < EPS);
        assert!(d.power(4000.0) > 0.35 && d.power(4000.0) < 1.0);
    }
}
