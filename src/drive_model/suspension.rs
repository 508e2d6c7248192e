// ==============================================================================
// suspension.rs — RAYCAST GROUND PROBE + SPRING/DAMPER
// ------------------------------------------------------------------------------
// probe_ground(...):
//     Casts from the wheel anchor along the chassis' local down axis for
//     cast_len = 2 * radius + rest_length. Returns Grounded or Airborne.
//
// suspension_force(distance, prev_distance, ...):
//     compression = cast_len - distance
//     damping     = (prev_distance - distance) * damper
//     force       = clamp((compression + damping) * spring, 0, force_clamp)
//
// The damper works on the per-tick change in ray distance, not on a velocity,
// so the caller must only advance prev_distance on real contact samples.
// While airborne the previous sample is frozen; the first landing damps
// against the last distance seen before take-off.
//
// Notes:
// - This file does NOT apply forces. It only measures contact data.
// ==============================================================================

use crate::config::SuspensionConfig;
use crate::drive_model::types::{GroundHit, GroundProbe, Pos3, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroundContact {
    Grounded(GroundHit),
    Airborne,
}

impl GroundContact {
    pub fn hit(&self) -> Option<&GroundHit> {
        match self {
            GroundContact::Grounded(hit) => Some(hit),
            GroundContact::Airborne => None,
        }
    }

    pub fn is_grounded(&self) -> bool {
        matches!(self, GroundContact::Grounded(_))
    }
}

pub fn probe_ground<G: GroundProbe + ?Sized>(
    ground: &G,
    anchor_world: &Pos3,
    down: &Vec3,
    cast_len: f32,
) -> GroundContact {
    match ground.raycast(anchor_world, down, cast_len) {
        Some(hit) if hit.distance.is_finite() && hit.distance <= cast_len => GroundContact::Grounded(hit),
        _ => GroundContact::Airborne,
    }
}

pub fn suspension_force(
    cfg: &SuspensionConfig,
    cast_len: f32,
    distance: f32,
    prev_distance: f32,
) -> f32 {
    let compression = cast_len - distance;
    let damping = (prev_distance - distance) * cfg.damper;
    let force = (compression + damping) * cfg.spring;

    if force.is_finite() {
        force.clamp(0.0, cfg.force_clamp)
    } else {
        0.0
    }
}

/// Tracks the last real contact distance between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspensionState {
    pub last_distance: f32,
    pub normal_force: f32,
}

impl SuspensionState {
    /// Starts fully extended: the first contact damps as if the wheel
    /// compressed from full droop in one tick.
    pub fn new(cast_len: f32) -> Self {
        Self { last_distance: cast_len, normal_force: 0.0 }
    }

    /// Advance one tick. Airborne contact leaves `last_distance` untouched.
    pub fn update(&mut self, cfg: &SuspensionConfig, cast_len: f32, contact: &GroundContact) -> f32 {
        match contact {
            GroundContact::Grounded(hit) => {
                self.normal_force = suspension_force(cfg, cast_len, hit.distance, self.last_distance);
                self.last_distance = hit.distance;
            }
            GroundContact::Airborne => {
                self.normal_force = 0.0;
            }
        }
        self.normal_force
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    const CAST: f32 = 1.5;

    fn cfg() -> SuspensionConfig {
        SuspensionConfig { spring: 90.0, damper: 2.5, force_clamp: 200.0 }
    }

    fn grounded(distance: f32) -> GroundContact {
        GroundContact::Grounded(GroundHit {
            point: Point3::new(0.0, 0.0, 0.0),
            normal: Vector3::y(),
            distance,
        })
    }

    struct Plane;

    impl GroundProbe for Plane {
        fn raycast(&self, origin: &Pos3, direction: &Vec3, max_distance: f32) -> Option<GroundHit> {
            if direction.y >= 0.0 {
                return None;
            }
            let t = origin.y / -direction.y;
            (t >= 0.0 && t <= max_distance).then(|| GroundHit {
                point: origin + direction * t,
                normal: Vector3::y(),
                distance: t,
            })
        }
    }

    #[test]
    fn probe_reports_airborne_beyond_cast_length() {
        let down = -Vector3::y();
        assert!(probe_ground(&Plane, &Point3::new(0.0, 1.0, 0.0), &down, CAST).is_grounded());
        assert_eq!(
            probe_ground(&Plane, &Point3::new(0.0, 2.0, 0.0), &down, CAST),
            GroundContact::Airborne
        );
    }

    #[test]
    fn static_compression_without_damping() {
        let f = suspension_force(&cfg(), CAST, 1.0, 1.0);
        assert!((f - 0.5 * 90.0).abs() < 1e-4);
    }

    #[test]
    fn force_is_clamped_to_range() {
        assert_eq!(suspension_force(&cfg(), CAST, 0.0, 1.5), 200.0);
        // Rebounding fast enough pulls the spring negative; clamped to zero.
        assert_eq!(suspension_force(&cfg(), CAST, 1.4, 0.5), 0.0);
    }

    #[test]
    fn first_contact_damps_from_full_extension() {
        let c = cfg();
        let mut s = SuspensionState::new(CAST);
        assert_eq!(s.last_distance, CAST);

        let first = s.update(&c, CAST, &grounded(1.3));
        // spring 0.2 * 90 = 18, damping (1.5 - 1.3) * 2.5 * 90 = 45
        assert!((first - 63.0).abs() < 1e-3);
        assert!(first > suspension_force(&c, CAST, 1.3, 1.3));

        // Holding the same distance leaves only the spring term.
        let held = s.update(&c, CAST, &grounded(1.3));
        assert!((held - 18.0).abs() < 1e-3);
    }

    #[test]
    fn airborne_wheel_has_no_force_and_keeps_last_distance() {
        let c = cfg();
        let mut s = SuspensionState::new(CAST);

        s.update(&c, CAST, &grounded(1.2));
        assert!(s.normal_force > 0.0);
        assert_eq!(s.last_distance, 1.2);

        for _ in 0..10 {
            assert_eq!(s.update(&c, CAST, &GroundContact::Airborne), 0.0);
            assert_eq!(s.last_distance, 1.2);
        }

        // First landing damps against the pre-airborne sample.
        let landed = s.update(&c, CAST, &grounded(1.0));
        let expected = ((CAST - 1.0) + (1.2 - 1.0) * c.damper) * c.spring;
        assert!((landed - expected.clamp(0.0, c.force_clamp)).abs() < 1e-4);
        assert_eq!(s.last_distance, 1.0);
    }
}
