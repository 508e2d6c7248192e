// ==============================================================================
// physics.rs — RAPIER WORLD HOSTING THE VEHICLE CONTROLLERS
// ------------------------------------------------------------------------------
// The rapier world plays the model's external collaborators:
// - RigidBody implements ChassisBody (read) and ForceReceiver (write)
// - RapierGround implements GroundProbe (ray vs. static ground only)
//
// Per step:
// 1) clear user forces on every chassis
// 2) tick each controller against its body (read-only), collect AppliedForce
// 3) apply collected forces to the body
// 4) integrate (pipeline.step also refreshes the query pipeline)
// 5) safety: reset chassis with non-finite or runaway positions
// ==============================================================================

use std::collections::HashMap;

use rapier3d::prelude::*;
use tracing::{info, warn};

use crate::config::{ConfigError, VehicleConfig};
use crate::drive_model::types::{
    AppliedForce, ChassisBody, DriverInput, ForceReceiver, GroundHit, GroundProbe, Pos3, Pose, Vec3,
};
use crate::vehicle::VehicleController;

const GROUP_GROUND: Group  = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

const WORLD_LIMIT: f32 = 1_000.0;   // |x|, |y|, |z| beyond this → reset
const SPAWN_SPACING: f32 = 4.0;     // meters between spawn slots along X
const SPAWN_HEIGHT: f32 = 2.0;

// ============================================
// ----- collaborator adapters ----------------
// ============================================

impl ChassisBody for RigidBody {
    fn pose(&self) -> Pose {
        *self.position()
    }

    fn linear_velocity(&self) -> Vec3 {
        *self.linvel()
    }

    fn angular_velocity(&self) -> Vec3 {
        *self.angvel()
    }

    fn center_of_mass(&self) -> Pos3 {
        *RigidBody::center_of_mass(self)
    }
}

impl ForceReceiver for RigidBody {
    fn add_force_at_position(&mut self, force: Vec3, world_point: Pos3) {
        self.add_force_at_point(force, world_point, true);
    }
}

/// Wheel rays only see the ground, never the chassis they start in.
pub struct RapierGround<'a> {
    pub query_pipeline: &'a QueryPipeline,
    pub bodies: &'a RigidBodySet,
    pub colliders: &'a ColliderSet,
    pub exclude: RigidBodyHandle,
}

impl GroundProbe for RapierGround<'_> {
    fn raycast(&self, origin: &Pos3, direction: &Vec3, max_distance: f32) -> Option<GroundHit> {
        let ray = Ray::new(*origin, *direction);
        let filter = QueryFilter::default()
            .exclude_rigid_body(self.exclude)
            .groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND));

        self.query_pipeline
            .cast_ray_and_get_normal(self.bodies, self.colliders, &ray, max_distance, true, filter)
            .map(|(_, hit)| GroundHit {
                point: ray.point_at(hit.time_of_impact),
                normal: hit.normal,
                distance: hit.time_of_impact,
            })
    }
}

// ============================================
// ----- world --------------------------------
// ============================================

pub struct SimVehicle {
    pub body: RigidBodyHandle,
    pub controller: VehicleController,
    pub input: DriverInput,     // latest, replaced by the host every tick
    pub spawn: [f32; 3],        // safety reset target
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>, // gravity vector
    pub pipeline: PhysicsPipeline, // physics pipeline
    pub island_manager: IslandManager, // manages islands of bodies
    pub broad_phase: DefaultBroadPhase, // broad-phase collision detection
    pub narrow_phase: NarrowPhase, // collision detection
    pub bodies: RigidBodySet, // for rigid bodies
    pub colliders: ColliderSet, // for collision shapes
    pub joints: ImpulseJointSet, // for constraints
    pub multibody_joints: MultibodyJointSet,// for articulated bodies
    pub ccd: CCDSolver, // continuous collision detection
    pub query_pipeline: QueryPipeline, // for wheel raycasts
    pub vehicles: HashMap<String, SimVehicle>, // playerId → vehicle
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let gravity = vector![0.0, -9.81, 0.0];

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Large static slab; top surface at y = 0.
        let ground_rb = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -1.0, 0.0])
            .build();
        let ground_handle = bodies.insert(ground_rb);

        let ground_collider = ColliderBuilder::cuboid(500.0, 1.0, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        let mut query_pipeline = QueryPipeline::new();
        query_pipeline.update(&colliders);

        info!(bodies = bodies.len(), colliders = colliders.len(), "ground inserted");

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline,
            vehicles: HashMap::new(),
        }
    }

    /// Build a chassis body from the vehicle file and attach a fresh
    /// controller to it. Replaces any vehicle already owned by `id`.
    pub fn spawn_vehicle(
        &mut self,
        id: &str,
        position: [f32; 3],
        config: &VehicleConfig,
    ) -> Result<RigidBodyHandle, ConfigError> {
        let controller = VehicleController::new(config.clone())?;
        self.remove_vehicle(id);

        let chassis = &config.chassis;
        let [hx, hy, hz] = chassis.half_extents;
        let [cx, cy, cz] = chassis.com_offset;

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![position[0], position[1], position[2]])
            .linear_damping(chassis.linear_damping)
            .angular_damping(chassis.angular_damping)
            .ccd_enabled(true)
            .build();

        // Box mass properties, then COM lowered and inertia scaled.
        let volume = 8.0 * hx * hy * hz;
        let base = MassProperties::from_cuboid(chassis.mass / volume, vector![hx, hy, hz]);
        let mass_props = MassProperties::new(
            base.local_com + vector![cx, cy, cz],
            chassis.mass,
            base.principal_inertia() * chassis.inertia_scale,
        );

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .active_events(ActiveEvents::empty())
            .mass_properties(mass_props)
            .friction(0.0) // wheels carry all grip
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.query_pipeline.update(&self.colliders);

        self.vehicles.insert(
            id.to_string(),
            SimVehicle {
                body: handle,
                controller,
                input: DriverInput::default(),
                spawn: position,
            },
        );

        info!(player = id, ?position, ?handle, "spawned vehicle");
        Ok(handle)
    }

    pub fn remove_vehicle(&mut self, id: &str) -> bool {
        let Some(vehicle) = self.vehicles.remove(id) else {
            return false;
        };
        self.bodies.remove(
            vehicle.body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        info!(player = id, "removed vehicle");
        true
    }

    /// Store the input the next step will use for this player.
    pub fn set_input(&mut self, id: &str, input: DriverInput) {
        if let Some(v) = self.vehicles.get_mut(id) {
            v.input = input;
        }
    }

    /// Lowest spawn slot along X that no current vehicle was spawned at.
    /// Slots freed by a disconnect are handed out again.
    pub fn free_spawn_point(&self) -> [f32; 3] {
        let slot = |i: usize| [i as f32 * SPAWN_SPACING, SPAWN_HEIGHT, 0.0];
        (0..=self.vehicles.len())
            .map(slot)
            .find(|p| self.vehicles.values().all(|v| v.spawn != *p))
            .unwrap_or_else(|| slot(self.vehicles.len()))
    }

    // --------------------------------------------------------------
    // vehicle forces (collect while reading, apply after)
    // --------------------------------------------------------------

    fn drive_vehicles(&mut self, dt: Real) {
        for vehicle in self.vehicles.values_mut() {
            if let Some(body) = self.bodies.get_mut(vehicle.body) {
                body.reset_forces(true);
            }

            let forces: Vec<AppliedForce> = match self.bodies.get(vehicle.body) {
                Some(body) => {
                    let ground = RapierGround {
                        query_pipeline: &self.query_pipeline,
                        bodies: &self.bodies,
                        colliders: &self.colliders,
                        exclude: vehicle.body,
                    };
                    vehicle.controller.tick(dt, &vehicle.input, body, &ground)
                }
                None => continue,
            };

            // shift presses are edges: one tick only
            vehicle.input.shift_up = false;
            vehicle.input.shift_down = false;

            if let Some(body) = self.bodies.get_mut(vehicle.body) {
                for f in &forces {
                    f.apply_to(body);
                }
            }
        }
    }

    pub fn step(&mut self, dt: Real) {
        // 1) Model tick → forces on each chassis
        self.drive_vehicles(dt);

        // 2) Integrate
        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        // 3) Safety: prevent chassis from exploding to insane coordinates
        self.reset_runaway_bodies();
    }

    fn reset_runaway_bodies(&mut self) {
        for (id, vehicle) in &self.vehicles {
            let Some(body) = self.bodies.get_mut(vehicle.body) else {
                continue;
            };

            let pos = *body.translation();
            let rot_ok = body.rotation().coords.iter().all(|c| c.is_finite());
            let bad = !rot_ok || pos.iter().any(|c| !c.is_finite() || c.abs() > WORLD_LIMIT);

            if bad {
                let [x, y, z] = vehicle.spawn;
                body.set_position(Isometry::translation(x, y, z), true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
                body.reset_forces(true);

                warn!(player = %id, from = ?pos, to = ?vehicle.spawn, "reset runaway chassis");
            }
        }
    }
}
