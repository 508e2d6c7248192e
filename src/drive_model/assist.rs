// ==============================================================================
// assist.rs — DRIVER-AID FILTER (RAW AXES → PER-WHEEL COMMANDS)
// ------------------------------------------------------------------------------
// Signal: worst (max) slip ratio across all wheels from the PREVIOUS tick.
//
// Every controlled quantity moves by an exponential blend toward its target:
//     x += (target - x) * (1 - exp(-rate * dt))
//
// Traction control:  slip > target + tol → reduction → 1 at the attack rate
//                    slip < target - tol → reduction → 0 at the release rate
//                    otherwise held. throttle *= 1 - reduction
// Steering assist:   same scheme on its own thresholds; at most
//                    `steer_max_cut` of the steer axis is ever removed
// Stability:         above `counter_steer_slip`, steerable wheels blend their
//                    steer toward the measured slip angle
// Brake assist:      braking dropped for the tick above `brake_cut_slip`
//
// Input shaping (steer/brake smoothing) always runs, even with aids off.
// ==============================================================================

use crate::config::{AssistConfig, ConfigError};
use crate::drive_model::kinematics::slip_angle;
use crate::drive_model::types::{finite_or, DriverInput, WheelCommand};
use crate::drive_model::wheel::Wheel;

const MIN_COUNTER_STEER_SPEED: f32 = 0.1; // m/s

/// `1 - exp(-rate * dt)`
#[inline]
fn blend_factor(rate: f32, dt: f32) -> f32 {
    1.0 - (-rate * dt).exp()
}

/// One proportional step of a reduction in [0, 1] with a dead band.
fn blend_reduction(
    current: f32,
    slip: f32,
    target: f32,
    tolerance: f32,
    attack_rate: f32,
    release_rate: f32,
    dt: f32,
) -> f32 {
    let next = if slip > target + tolerance {
        current + (1.0 - current) * blend_factor(attack_rate, dt)
    } else if slip < target - tolerance {
        current - current * blend_factor(release_rate, dt)
    } else {
        current
    };
    finite_or(next, 0.0).clamp(0.0, 1.0)
}

/// Worst wheel slip; 0 when there are no wheels.
pub fn max_slip(wheels: &[Wheel]) -> f32 {
    wheels
        .iter()
        .map(|w| finite_or(w.state.slip_ratio, 0.0))
        .fold(0.0, f32::max)
}

#[derive(Debug, Clone)]
pub struct AssistLayer {
    config: AssistConfig,
    tcs_reduction: f32,
    steer_reduction: f32,
    smoothed_steer: f32,
    smoothed_brake: f32,
    brake_cut: bool,
}

impl AssistLayer {
    pub fn new(config: &AssistConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: *config,
            tcs_reduction: 0.0,
            steer_reduction: 0.0,
            smoothed_steer: 0.0,
            smoothed_brake: 0.0,
            brake_cut: false,
        })
    }

    pub fn tcs_reduction(&self) -> f32 {
        self.tcs_reduction
    }

    pub fn steer_reduction(&self) -> f32 {
        self.steer_reduction
    }

    pub fn brake_cut(&self) -> bool {
        self.brake_cut
    }

    /// Turn one tick of driver input into one command per wheel, in wheel
    /// order. Reads slip and local velocity left by the previous tick.
    pub fn filter(&mut self, input: &DriverInput, wheels: &[Wheel], dt: f32) -> Vec<WheelCommand> {
        let c = self.config;
        let input = input.sanitized();

        self.smoothed_steer += (input.steer - self.smoothed_steer) * blend_factor(c.steer_response, dt);
        self.smoothed_brake += (input.brake - self.smoothed_brake) * blend_factor(c.brake_response, dt);
        self.smoothed_steer = finite_or(self.smoothed_steer, 0.0);
        self.smoothed_brake = finite_or(self.smoothed_brake, 0.0);

        let slip = max_slip(wheels);

        let mut throttle = input.throttle;
        let mut steer = self.smoothed_steer;
        let mut brake = self.smoothed_brake;

        self.brake_cut = false;

        if c.enabled && c.traction_control {
            self.tcs_reduction = blend_reduction(
                self.tcs_reduction,
                slip,
                c.target_slip,
                c.slip_tolerance,
                c.tcs_attack_rate,
                c.tcs_release_rate,
                dt,
            );
            throttle *= 1.0 - self.tcs_reduction;
        } else {
            self.tcs_reduction = 0.0;
        }

        if c.enabled && c.steering_assist {
            self.steer_reduction = blend_reduction(
                self.steer_reduction,
                slip,
                c.steer_target_slip,
                c.slip_tolerance,
                c.steer_attack_rate,
                c.steer_release_rate,
                dt,
            );
            steer *= 1.0 - self.steer_reduction * c.steer_max_cut;
        } else {
            self.steer_reduction = 0.0;
        }

        if c.enabled && c.brake_assist && slip > c.brake_cut_slip {
            brake = 0.0;
            self.brake_cut = true;
        }

        let counter_steer = c.enabled && c.stability_control && slip > c.counter_steer_slip;

        wheels
            .iter()
            .map(|wheel| {
                let mut wheel_steer = steer;
                let local = wheel.state.local_velocity;

                if counter_steer && wheel.is_steerable() && local.norm() > MIN_COUNTER_STEER_SPEED {
                    let target = (slip_angle(&local) / wheel.config.max_steer_angle).clamp(-1.0, 1.0);
                    wheel_steer += (target - wheel_steer) * c.counter_steer_gain;
                }

                WheelCommand {
                    steer: finite_or(wheel_steer, 0.0).clamp(-1.0, 1.0),
                    throttle: finite_or(throttle, 0.0).clamp(-1.0, 1.0),
                    brake: finite_or(brake, 0.0).clamp(0.0, 1.0),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WheelConfig;
    use nalgebra::Vector3;

    const DT: f32 = 0.02;

    fn wheels(slip: f32) -> Vec<Wheel> {
        let front = WheelConfig { max_steer_angle: 0.5, ..WheelConfig::default() };
        let rear = WheelConfig::default();
        [front.clone(), front, rear.clone(), rear]
            .into_iter()
            .enumerate()
            .map(|(i, cfg)| {
                let mut w = Wheel::new(cfg, i).expect("valid wheel");
                w.state.slip_ratio = slip;
                w
            })
            .collect()
    }

    fn throttle(t: f32) -> DriverInput {
        DriverInput { throttle: t, ..DriverInput::default() }
    }

    #[test]
    fn tcs_attacks_faster_than_it_releases() {
        let mut layer = AssistLayer::new(&AssistConfig::default()).expect("valid");
        let high = wheels(1.5);
        let low = wheels(0.1);

        for _ in 0..10 {
            layer.filter(&throttle(1.0), &high, DT);
        }
        let reached = layer.tcs_reduction();
        assert!(reached > 0.9);

        layer.tcs_reduction = 1.0;
        for _ in 0..10 {
            layer.filter(&throttle(1.0), &low, DT);
        }
        let released = layer.tcs_reduction();

        // distance covered toward 1 vs toward 0 over the same number of ticks
        assert!(reached > 1.0 - released);
        assert!(released > 0.0);
    }

    #[test]
    fn tcs_reduction_cuts_throttle() {
        let mut layer = AssistLayer::new(&AssistConfig::default()).expect("valid");
        let high = wheels(1.5);
        let mut last = 1.0;
        for _ in 0..20 {
            let cmds = layer.filter(&throttle(1.0), &high, DT);
            assert!(cmds[0].throttle <= last);
            last = cmds[0].throttle;
        }
        assert!(last < 0.1);
    }

    #[test]
    fn dead_band_holds_reduction() {
        let mut layer = AssistLayer::new(&AssistConfig::default()).expect("valid");
        layer.tcs_reduction = 0.4;
        layer.filter(&throttle(1.0), &wheels(0.85), DT);
        assert_eq!(layer.tcs_reduction(), 0.4);
    }

    #[test]
    fn brake_assist_drops_braking_at_extreme_slip() {
        let mut layer = AssistLayer::new(&AssistConfig::default()).expect("valid");
        let input = DriverInput { brake: 1.0, ..DriverInput::default() };

        let cmds = layer.filter(&input, &wheels(2.0), DT);
        assert!(layer.brake_cut());
        assert!(cmds.iter().all(|c| c.brake == 0.0));

        let cmds = layer.filter(&input, &wheels(0.2), DT);
        assert!(!layer.brake_cut());
        assert!(cmds.iter().all(|c| c.brake > 0.0));
    }

    #[test]
    fn disabled_assists_pass_throttle_through() {
        let cfg = AssistConfig { enabled: false, ..AssistConfig::default() };
        let mut layer = AssistLayer::new(&cfg).expect("valid");

        for _ in 0..50 {
            let cmds = layer.filter(&throttle(0.73), &wheels(5.0), DT);
            assert!(cmds.iter().all(|c| c.throttle == 0.73));
        }
        assert_eq!(layer.tcs_reduction(), 0.0);
    }

    #[test]
    fn steer_is_smoothed_even_with_aids_off() {
        let cfg = AssistConfig { enabled: false, ..AssistConfig::default() };
        let mut layer = AssistLayer::new(&cfg).expect("valid");
        let input = DriverInput { steer: 1.0, ..DriverInput::default() };

        let first = layer.filter(&input, &wheels(0.0), DT)[0].steer;
        assert!(first > 0.0 && first < 1.0);

        let mut last = first;
        for _ in 0..200 {
            last = layer.filter(&input, &wheels(0.0), DT)[0].steer;
        }
        assert!((last - 1.0).abs() < 1e-3);
    }

    #[test]
    fn steering_assist_never_removes_more_than_max_cut() {
        let mut layer = AssistLayer::new(&AssistConfig::default()).expect("valid");
        let input = DriverInput { steer: 1.0, ..DriverInput::default() };
        let mut cmds = Vec::new();
        for _ in 0..500 {
            // Above the steering band, still below the counter-steer threshold.
            cmds = layer.filter(&input, &wheels(0.995), DT);
        }
        assert!(layer.steer_reduction() > 0.99);
        assert!(cmds[2].steer >= 0.5 - 1e-3);
    }

    #[test]
    fn counter_steer_pulls_front_wheels_toward_slide() {
        let mut layer = AssistLayer::new(&AssistConfig::default()).expect("valid");
        let mut ws = wheels(1.5);
        // Sliding toward the wheels' right (-x) while rolling forward.
        for w in &mut ws {
            w.state.local_velocity = Vector3::new(-3.0, 0.0, 5.0);
        }

        let cmds = layer.filter(&DriverInput::default(), &ws, DT);
        assert!(cmds[0].steer > 0.0);
        assert!(cmds[1].steer > 0.0);
        // Rear wheels cannot steer.
        assert_eq!(cmds[2].steer, 0.0);
    }

    #[test]
    fn outputs_stay_in_range() {
        let mut layer = AssistLayer::new(&AssistConfig::default()).expect("valid");
        let input = DriverInput { steer: 9.0, throttle: -9.0, brake: 9.0, ..DriverInput::default() };
        for slip in [0.0, 0.9, 1.2, f32::NAN, 50.0] {
            for c in layer.filter(&input, &wheels(slip), DT) {
                assert!((-1.0..=1.0).contains(&c.steer));
                assert!((-1.0..=1.0).contains(&c.throttle));
                assert!((0.0..=1.0).contains(&c.brake));
            }
        }
    }
}
