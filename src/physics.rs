//! Thin wrapper over `rapier2d` exposing only what the game needs: static
//! platforms, flag sensors, two dynamic players, velocity/position setters,
//! force application, per-sub-step contacts and sensor begin events.
//!
//! World space is stage pixels with y pointing down. Velocities cross this
//! boundary in pixels per tick so controller constants keep their meaning.

use std::collections::HashMap;

use bevy::math::Vec2;
use crossbeam_channel::Receiver;
use rapier2d::prelude::*;

use crate::components::{PlatformKind, PlayerSlot};
use crate::physics_core::ContactSample;
use crate::pose::PlatformBody;

pub const TICK_HZ: f32 = 60.0;
pub const TICK_MS: f32 = 1000.0 / TICK_HZ;
const PIXELS_PER_METER: f32 = 50.0;
/// Mass per square pixel.
const BODY_DENSITY: f32 = 0.001;
/// Gravity of 1.0 accelerates bodies by 0.001 px/ms².
const GRAVITY_PX_PER_S2: f32 = 1000.0;

/// Side-table entry describing what a collider stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyTag {
    Player(PlayerSlot),
    Platform { index: usize, kind: PlatformKind },
    Flag { index: usize },
}

/// A sensor began overlapping another collider this step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorBegin {
    pub sensor: BodyTag,
    pub other: BodyTag,
}

pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    events: ChannelEventCollector,
    collision_events: Receiver<CollisionEvent>,
    _contact_force_events: Receiver<ContactForceEvent>,
    tags: HashMap<ColliderHandle, BodyTag>,
}

fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

fn to_vec2(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

impl PhysicsWorld {
    pub fn new(gravity: f32) -> Self {
        let (collision_send, collision_events) = crossbeam_channel::unbounded();
        let (force_send, force_events) = crossbeam_channel::unbounded();
        let params = IntegrationParameters {
            dt: 1.0 / TICK_HZ,
            length_unit: PIXELS_PER_METER,
            ..Default::default()
        };
        Self {
            gravity: vector![0.0, gravity * GRAVITY_PX_PER_S2],
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            events: ChannelEventCollector::new(collision_send, force_send),
            collision_events,
            _contact_force_events: force_events,
            tags: HashMap::new(),
        }
    }

    pub fn tag(&self, collider: ColliderHandle) -> Option<BodyTag> {
        self.tags.get(&collider).copied()
    }

    pub fn add_platform(&mut self, body: &PlatformBody, friction: f32, index: usize, kind: PlatformKind) -> ColliderHandle {
        let rb = RigidBodyBuilder::fixed()
            .translation(to_vector(body.center))
            .rotation(body.angle)
            .build();
        let handle = self.bodies.insert(rb);
        let half = body.half_extents();
        let collider = ColliderBuilder::cuboid(half.x, half.y)
            .friction(friction)
            .restitution(0.0)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.tags.insert(collider, BodyTag::Platform { index, kind });
        collider
    }

    pub fn add_flag_sensor(&mut self, index: usize, center: Vec2, size: f32) -> ColliderHandle {
        let rb = RigidBodyBuilder::fixed().translation(to_vector(center)).build();
        let handle = self.bodies.insert(rb);
        let collider = ColliderBuilder::cuboid(size * 0.5, size * 0.5)
            .sensor(true)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.tags.insert(collider, BodyTag::Flag { index });
        collider
    }

    /// Upright box with infinite inertia.
    pub fn add_player(&mut self, slot: PlayerSlot, position: Vec2, size: Vec2, friction: f32) -> (RigidBodyHandle, ColliderHandle) {
        let rb = RigidBodyBuilder::dynamic()
            .translation(to_vector(position))
            .lock_rotations()
            .build();
        let handle = self.bodies.insert(rb);
        let collider = ColliderBuilder::cuboid(size.x * 0.5, size.y * 0.5)
            .density(BODY_DENSITY)
            .friction(friction)
            .restitution(0.0)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.tags.insert(collider, BodyTag::Player(slot));
        (handle, collider)
    }

    pub fn position(&self, body: RigidBodyHandle) -> Option<Vec2> {
        self.bodies.get(body).map(|rb| to_vec2(rb.translation()))
    }

    /// Linear velocity in pixels per tick.
    pub fn velocity(&self, body: RigidBodyHandle) -> Option<Vec2> {
        self.bodies
            .get(body)
            .map(|rb| to_vec2(rb.linvel()) / TICK_HZ)
    }

    pub fn set_velocity(&mut self, body: RigidBodyHandle, velocity: Vec2) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_linvel(to_vector(velocity * TICK_HZ), true);
        }
    }

    pub fn set_position(&mut self, body: RigidBodyHandle, position: Vec2) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_translation(to_vector(position), true);
        }
    }

    pub fn set_angular_velocity(&mut self, body: RigidBodyHandle, angvel: f32) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_angvel(angvel, true);
        }
    }

    /// One-tick force at the body's centre: Δv (px/tick) = F / m · TICK_MS².
    pub fn apply_force(&mut self, body: RigidBodyHandle, force: Vec2) {
        if let Some(rb) = self.bodies.get_mut(body) {
            let impulse = force * TICK_MS * TICK_MS * TICK_HZ;
            rb.apply_impulse(to_vector(impulse), true);
        }
    }

    /// Advance one fixed tick and return the sensor overlaps that began.
    pub fn step(&mut self) -> Vec<SensorBegin> {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &(),
            &self.events,
        );

        let mut begins = Vec::new();
        while let Ok(event) = self.collision_events.try_recv() {
            let CollisionEvent::Started(h1, h2, flags) = event else {
                continue;
            };
            if !flags.contains(CollisionEventFlags::SENSOR) {
                continue;
            }
            let (Some(t1), Some(t2)) = (self.tag(h1), self.tag(h2)) else {
                continue;
            };
            let h1_is_sensor = self.colliders.get(h1).is_some_and(|c| c.is_sensor());
            begins.push(if h1_is_sensor {
                SensorBegin { sensor: t1, other: t2 }
            } else {
                SensorBegin { sensor: t2, other: t1 }
            });
        }
        begins
    }

    /// Touching contacts of `collider` with normals pointing from the other
    /// body toward it.
    pub fn contacts_for(&self, collider: ColliderHandle) -> Vec<ContactSample> {
        let mut out = Vec::new();
        for pair in self.narrow_phase.contact_pairs_with(collider) {
            if !pair.has_any_active_contact {
                continue;
            }
            let (other, outward_from_self) = if pair.collider1 == collider {
                (pair.collider2, true)
            } else {
                (pair.collider1, false)
            };
            let other_is_sensor = self.colliders.get(other).is_some_and(|c| c.is_sensor());
            for manifold in &pair.manifolds {
                if manifold.points.is_empty() {
                    continue;
                }
                let n = to_vec2(&manifold.data.normal);
                out.push(ContactSample {
                    normal: if outward_from_self { -n } else { n },
                    other_is_sensor,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::LineSegment;

    fn world_with_floor() -> PhysicsWorld {
        let mut world = PhysicsWorld::new(1.0);
        let floor = LineSegment::new(Vec2::new(0.0, 500.0), Vec2::new(800.0, 500.0));
        world.add_platform(&PlatformBody::from_segment(&floor, 20.0), 0.8, 0, PlatformKind::Ground);
        world
    }

    #[test]
    fn a_dropped_player_lands_with_an_upward_normal() {
        let mut world = world_with_floor();
        let (body, collider) =
            world.add_player(PlayerSlot::One, Vec2::new(400.0, 400.0), Vec2::new(30.0, 50.0), 0.1);
        for _ in 0..120 {
            world.step();
        }
        let contacts = world.contacts_for(collider);
        assert!(!contacts.is_empty());
        assert!(contacts.iter().any(|c| c.normal.y < -0.9));
        let pos = world.position(body).unwrap();
        assert!((pos.y - 465.0).abs() < 2.0, "resting at {pos:?}");
    }

    #[test]
    fn velocity_round_trips_in_pixels_per_tick() {
        let mut world = world_with_floor();
        let (body, _) =
            world.add_player(PlayerSlot::Two, Vec2::new(100.0, 100.0), Vec2::new(30.0, 50.0), 0.1);
        world.set_velocity(body, Vec2::new(5.0, -3.0));
        let v = world.velocity(body).unwrap();
        assert!((v - Vec2::new(5.0, -3.0)).length() < 1e-4);
    }

    #[test]
    fn sensor_begin_reports_flag_and_player() {
        let mut world = world_with_floor();
        world.add_flag_sensor(0, Vec2::new(400.0, 470.0), 30.0);
        world.add_player(PlayerSlot::One, Vec2::new(400.0, 420.0), Vec2::new(30.0, 50.0), 0.1);
        let mut begins = Vec::new();
        for _ in 0..60 {
            begins.extend(world.step());
        }
        assert_eq!(
            begins,
            vec![SensorBegin {
                sensor: BodyTag::Flag { index: 0 },
                other: BodyTag::Player(PlayerSlot::One),
            }]
        );
    }

    #[test]
    fn upward_force_lifts_the_player() {
        let mut world = world_with_floor();
        let (body, _) =
            world.add_player(PlayerSlot::One, Vec2::new(400.0, 300.0), Vec2::new(30.0, 50.0), 0.1);
        world.step();
        world.apply_force(body, Vec2::new(0.0, -0.04));
        let v = world.velocity(body).unwrap();
        // 0.04 / 1.5 * TICK_MS² ≈ 7.4 px/tick upward, minus one tick of gravity.
        assert!(v.y < -7.0 && v.y > -8.0, "got {v:?}");
    }
}
