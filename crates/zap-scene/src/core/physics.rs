use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Vec2;
use rapier2d::parry::query as parry_query;
use rapier2d::prelude::*;

use crate::api::error::{strictly_positive, Result, SceneError};
use crate::api::types::{ActorId, BodyId, JointId, ListenerId, WorldId};
use crate::core::collision::{
    CollisionDispatch, CollisionRegistry, ContactPhase, PurgedListener,
};

// ---------------------------------------------------------------------------
// glam <-> nalgebra conversions
// ---------------------------------------------------------------------------

pub(crate) fn to_na(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

pub(crate) fn to_point(v: Vec2) -> Point<Real> {
    point![v.x, v.y]
}

fn from_na(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

fn from_point(p: &Point<Real>) -> Vec2 {
    Vec2::new(p.x, p.y)
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// Never moves; infinite mass.
    #[default]
    Static,
    /// Fully simulated: gravity, forces, collision response.
    Dynamic,
    /// Moves only by its velocity; pushes dynamic bodies.
    Kinematic,
    /// Kinematic body whose fixtures only detect contacts.
    Sensor,
}

impl BodyType {
    fn to_rapier(self) -> RigidBodyType {
        match self {
            BodyType::Static => RigidBodyType::Fixed,
            BodyType::Dynamic => RigidBodyType::Dynamic,
            BodyType::Kinematic | BodyType::Sensor => RigidBodyType::KinematicVelocityBased,
        }
    }

    fn is_sensor(self) -> bool {
        self == BodyType::Sensor
    }
}

/// Collider geometry in body-local meters.
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureShape {
    Circle { center: Vec2, radius: f32 },
    Rectangle { center: Vec2, half_extents: Vec2 },
    /// Convex hull of the points is used.
    Polygon { points: Vec<Vec2> },
}

impl FixtureShape {
    fn collider_builder(&self) -> Option<ColliderBuilder> {
        match self {
            FixtureShape::Circle { center, radius } => {
                Some(ColliderBuilder::ball(*radius).translation(to_na(*center)))
            }
            FixtureShape::Rectangle {
                center,
                half_extents,
            } => Some(
                ColliderBuilder::cuboid(half_extents.x, half_extents.y)
                    .translation(to_na(*center)),
            ),
            FixtureShape::Polygon { points } => {
                let points: Vec<Point<Real>> = points.iter().copied().map(to_point).collect();
                ColliderBuilder::convex_hull(&points)
            }
        }
    }

    /// Recover the shape of a live collider, relative to its body.
    pub(crate) fn from_collider(collider: &Collider) -> Option<Self> {
        let local = collider
            .position_wrt_parent()
            .copied()
            .unwrap_or_else(Isometry::identity);
        let shape = collider.shape();
        if let Some(ball) = shape.as_ball() {
            Some(FixtureShape::Circle {
                center: from_na(&local.translation.vector),
                radius: ball.radius,
            })
        } else if let Some(cuboid) = shape.as_cuboid() {
            Some(FixtureShape::Rectangle {
                center: from_na(&local.translation.vector),
                half_extents: from_na(&cuboid.half_extents),
            })
        } else {
            shape.as_convex_polygon().map(|polygon| FixtureShape::Polygon {
                points: polygon
                    .points()
                    .iter()
                    .map(|p| from_point(&(local * p)))
                    .collect(),
            })
        }
    }
}

/// Physical material properties shared by all fixtures of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderMaterial {
    pub restitution: f32,
    pub friction: f32,
    pub density: f32,
}

impl Default for ColliderMaterial {
    fn default() -> Self {
        Self {
            restitution: 0.3,
            friction: 0.5,
            density: 1.0,
        }
    }
}

/// Scalar state of a body. A detached actor keeps one of these in memory;
/// an attached actor's body is created from it and captured back into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsState {
    pub body_type: BodyType,
    pub position: Vec2,
    /// Radians, counter-clockwise.
    pub rotation: f32,
    pub velocity: Vec2,
    pub angular_velocity: f32,
    pub gravity_scale: f32,
    pub rotation_locked: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub material: ColliderMaterial,
}

impl Default for PhysicsState {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            gravity_scale: 1.0,
            rotation_locked: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            material: ColliderMaterial::default(),
        }
    }
}

impl PhysicsState {
    pub fn with_body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    pub fn with_position(mut self, pos: Vec2) -> Self {
        self.position = pos;
        self
    }

    pub fn with_velocity(mut self, vel: Vec2) -> Self {
        self.velocity = vel;
        self
    }

    pub fn with_material(mut self, material: ColliderMaterial) -> Self {
        self.material = material;
        self
    }
}

/// Description of a joint to create between two bodies. Anchors are
/// body-local, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointDesc {
    /// Rigidly locks two bodies together at the given local anchors.
    Fixed { anchor_a: Vec2, anchor_b: Vec2 },
    /// Free rotation around a shared anchor (hinge).
    Revolute { anchor_a: Vec2, anchor_b: Vec2 },
    /// Spring that pulls the anchors toward `rest_length`.
    Spring {
        anchor_a: Vec2,
        anchor_b: Vec2,
        rest_length: f32,
        stiffness: f32,
        damping: f32,
    },
    /// Translation along `axis` only, optionally limited.
    Prismatic {
        anchor_a: Vec2,
        anchor_b: Vec2,
        axis: Vec2,
        limits: Option<[f32; 2]>,
    },
    /// Anchors may not drift further apart than `max_length`.
    Rope {
        anchor_a: Vec2,
        anchor_b: Vec2,
        max_length: f32,
    },
}

/// Closed set of joint kinds, for code that specializes per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    Fixed,
    Revolute,
    Spring,
    Prismatic,
    Rope,
}

impl JointDesc {
    pub fn kind(&self) -> JointKind {
        match self {
            JointDesc::Fixed { .. } => JointKind::Fixed,
            JointDesc::Revolute { .. } => JointKind::Revolute,
            JointDesc::Spring { .. } => JointKind::Spring,
            JointDesc::Prismatic { .. } => JointKind::Prismatic,
            JointDesc::Rope { .. } => JointKind::Rope,
        }
    }

    pub fn anchors(&self) -> (Vec2, Vec2) {
        match *self {
            JointDesc::Fixed { anchor_a, anchor_b }
            | JointDesc::Revolute { anchor_a, anchor_b }
            | JointDesc::Spring { anchor_a, anchor_b, .. }
            | JointDesc::Prismatic { anchor_a, anchor_b, .. }
            | JointDesc::Rope { anchor_a, anchor_b, .. } => (anchor_a, anchor_b),
        }
    }

    fn build(&self) -> Result<GenericJoint> {
        let (a, b) = self.anchors();
        let (a, b) = (to_point(a), to_point(b));
        let joint = match *self {
            JointDesc::Fixed { .. } => FixedJointBuilder::new()
                .local_anchor1(a)
                .local_anchor2(b)
                .build()
                .into(),
            JointDesc::Revolute { .. } => RevoluteJointBuilder::new()
                .local_anchor1(a)
                .local_anchor2(b)
                .build()
                .into(),
            JointDesc::Spring {
                rest_length,
                stiffness,
                damping,
                ..
            } => SpringJointBuilder::new(rest_length, stiffness, damping)
                .local_anchor1(a)
                .local_anchor2(b)
                .build()
                .into(),
            JointDesc::Prismatic { axis, limits, .. } => {
                let axis = UnitVector::try_new(to_na(axis), 1.0e-6).ok_or(
                    SceneError::InvalidValue {
                        what: "prismatic axis length",
                        value: axis.length(),
                    },
                )?;
                let mut builder = PrismaticJointBuilder::new(axis)
                    .local_anchor1(a)
                    .local_anchor2(b);
                if let Some(limits) = limits {
                    builder = builder.limits(limits);
                }
                builder.build().into()
            }
            JointDesc::Rope { max_length, .. } => {
                strictly_positive("rope length", max_length)?;
                RopeJointBuilder::new(max_length)
                    .local_anchor1(a)
                    .local_anchor2(b)
                    .build()
                    .into()
            }
        };
        Ok(joint)
    }
}

/// A joint as seen from outside the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointInfo {
    pub id: JointId,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub desc: JointDesc,
}

// ---------------------------------------------------------------------------
// Contact collection
// ---------------------------------------------------------------------------

/// Receives contact callbacks from inside the pipeline step. Callbacks only
/// record; everything else happens after the step returns.
struct ContactCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl ContactCollector {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn drain(&self) -> Vec<CollisionEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

// ---------------------------------------------------------------------------
// WorldHandler
// ---------------------------------------------------------------------------

struct BodyRecord {
    handle: RigidBodyHandle,
    colliders: Vec<ColliderHandle>,
    actor: ActorId,
    body_type: BodyType,
    material: ColliderMaterial,
}

struct JointRecord {
    handle: ImpulseJointHandle,
    body_a: BodyId,
    body_b: BodyId,
    desc: JointDesc,
}

/// One Rapier world plus the bookkeeping that ties its bodies to actors and
/// collision listeners.
pub struct WorldHandler {
    id: WorldId,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    pub(crate) bodies: RigidBodySet,
    pub(crate) colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    collector: ContactCollector,
    pixel_per_meter: f32,
    fixtures_created: bool,
    body_records: HashMap<BodyId, BodyRecord>,
    joints: HashMap<JointId, JointRecord>,
    registry: CollisionRegistry,
    dispatch: Sender<CollisionDispatch>,
}

impl WorldHandler {
    /// Create a world and the receiving end of its dispatch queue.
    /// Gravity is in m/s² with Y pointing up.
    pub fn new(gravity: Vec2, pixel_per_meter: f32) -> (Self, Receiver<CollisionDispatch>) {
        let (tx, rx) = mpsc::channel();
        let world = Self {
            id: WorldId::next(),
            gravity: to_na(gravity),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            collector: ContactCollector::new(),
            pixel_per_meter,
            fixtures_created: false,
            body_records: HashMap::new(),
            joints: HashMap::new(),
            registry: CollisionRegistry::new(),
            dispatch: tx,
        };
        (world, rx)
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn gravity(&self) -> Vec2 {
        from_na(&self.gravity)
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = to_na(gravity);
        // Sleeping bodies would otherwise ignore the change.
        for (_, rb) in self.bodies.iter_mut() {
            rb.wake_up(true);
        }
    }

    pub fn pixel_per_meter(&self) -> f32 {
        self.pixel_per_meter
    }

    /// Change the pixel-per-meter constant. Only allowed before the first
    /// fixture of this world is created.
    pub fn set_pixel_per_meter(&mut self, value: f32) -> Result<()> {
        if self.fixtures_created {
            return Err(SceneError::PixelPerMeterFrozen);
        }
        self.pixel_per_meter = strictly_positive("pixel per meter", value)?;
        Ok(())
    }

    pub fn meters_to_pixels(&self, meters: f32) -> f32 {
        meters * self.pixel_per_meter
    }

    pub fn pixels_to_meters(&self, pixels: f32) -> f32 {
        pixels / self.pixel_per_meter
    }

    /// Number of live bodies.
    pub fn body_count(&self) -> usize {
        self.body_records.len()
    }

    pub fn contains_body(&self, body: BodyId) -> bool {
        self.body_records.contains_key(&body)
    }

    /// Actor that owns `body`.
    pub fn actor_of(&self, body: BodyId) -> Option<ActorId> {
        self.body_records.get(&body).map(|r| r.actor)
    }

    /// Number of registered collision listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    // -- body lifecycle --

    /// Create a body for `actor` from its scalar state and fixtures.
    pub fn create_body(
        &mut self,
        actor: ActorId,
        state: &PhysicsState,
        fixtures: &[FixtureShape],
    ) -> BodyId {
        let id = BodyId::next();
        let rb = RigidBodyBuilder::new(state.body_type.to_rapier())
            .translation(to_na(state.position))
            .rotation(state.rotation)
            .linvel(to_na(state.velocity))
            .angvel(state.angular_velocity)
            .gravity_scale(state.gravity_scale)
            .locked_axes(if state.rotation_locked {
                LockedAxes::ROTATION_LOCKED
            } else {
                LockedAxes::empty()
            })
            .linear_damping(state.linear_damping)
            .angular_damping(state.angular_damping)
            .user_data(id.0 as u128)
            .build();
        let handle = self.bodies.insert(rb);
        let colliders = self.attach_fixtures(handle, state.body_type, state.material, fixtures);

        self.body_records.insert(
            id,
            BodyRecord {
                handle,
                colliders,
                actor,
                body_type: state.body_type,
                material: state.material,
            },
        );
        log::debug!("world {:?}: created body {id:?} for actor {actor:?}", self.id);
        id
    }

    /// Capture the scalar state of a live body.
    pub fn body_state(&self, body: BodyId) -> Option<PhysicsState> {
        let record = self.body_records.get(&body)?;
        let rb = self.bodies.get(record.handle)?;
        Some(PhysicsState {
            body_type: record.body_type,
            position: from_na(rb.translation()),
            rotation: rb.rotation().angle(),
            velocity: from_na(rb.linvel()),
            angular_velocity: rb.angvel(),
            gravity_scale: rb.gravity_scale(),
            rotation_locked: rb.locked_axes().contains(LockedAxes::ROTATION_LOCKED),
            linear_damping: rb.linear_damping(),
            angular_damping: rb.angular_damping(),
            material: record.material,
        })
    }

    /// Destroy a body, its fixtures and joints, and purge every collision
    /// registration involving it.
    pub fn remove_body(&mut self, body: BodyId) -> Option<Vec<PurgedListener>> {
        let record = self.body_records.remove(&body)?;
        let purged = self.registry.purge_body(body);
        self.joints
            .retain(|_, j| j.body_a != body && j.body_b != body);
        self.bodies.remove(
            record.handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        log::debug!(
            "world {:?}: removed body {body:?}, purged {} listener(s)",
            self.id,
            purged.len()
        );
        Some(purged)
    }

    /// Swap the fixtures of a live body, e.g. after the actor was resized.
    pub fn replace_fixtures(&mut self, body: BodyId, fixtures: &[FixtureShape]) -> bool {
        let Some(old) = self.body_records.get(&body).map(|r| r.colliders.clone()) else {
            return false;
        };
        // Rapier reports the matching stops against handles that no longer
        // resolve, so close the old contacts here.
        for partner in self.touching_partners(body, &old) {
            self.handle_contact(body, partner, ContactPhase::End);
        }
        let Some(record) = self.body_records.get_mut(&body) else {
            return false;
        };
        for handle in record.colliders.drain(..) {
            self.colliders
                .remove(handle, &mut self.island_manager, &mut self.bodies, true);
        }
        let (handle, body_type, material) = (record.handle, record.body_type, record.material);
        let colliders = self.attach_fixtures(handle, body_type, material, fixtures);
        if let Some(record) = self.body_records.get_mut(&body) {
            record.colliders = colliders;
        }
        true
    }

    /// One entry per active fixture contact between `colliders` and
    /// another body, so the registry's per-pair counts can be unwound.
    fn touching_partners(&self, body: BodyId, colliders: &[ColliderHandle]) -> Vec<BodyId> {
        let mut partners = Vec::new();
        for &handle in colliders {
            for pair in self.narrow_phase.contact_pairs_with(handle) {
                if !pair.has_any_active_contact {
                    continue;
                }
                let other = if pair.collider1 == handle { pair.collider2 } else { pair.collider1 };
                partners.extend(self.collider_body(other));
            }
            for (h1, h2, intersecting) in self.narrow_phase.intersection_pairs_with(handle) {
                if !intersecting {
                    continue;
                }
                let other = if h1 == handle { h2 } else { h1 };
                partners.extend(self.collider_body(other));
            }
        }
        partners.retain(|&p| p != body);
        partners
    }

    fn attach_fixtures(
        &mut self,
        handle: RigidBodyHandle,
        body_type: BodyType,
        material: ColliderMaterial,
        fixtures: &[FixtureShape],
    ) -> Vec<ColliderHandle> {
        let mut handles = Vec::with_capacity(fixtures.len());
        for shape in fixtures {
            let Some(builder) = shape.collider_builder() else {
                log::warn!("skipping degenerate fixture {shape:?}");
                continue;
            };
            let collider = builder
                .restitution(material.restitution)
                .friction(material.friction)
                .density(material.density)
                .sensor(body_type.is_sensor())
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .active_collision_types(collision_types(body_type))
                .build();
            handles.push(
                self.colliders
                    .insert_with_parent(collider, handle, &mut self.bodies),
            );
        }
        self.fixtures_created |= !handles.is_empty();
        // Mass must be known before the first step so that impulses land.
        if let Some(rb) = self.bodies.get_mut(handle) {
            rb.recompute_mass_properties_from_colliders(&self.colliders);
        }
        handles
    }

    // -- body access --

    pub(crate) fn body(&self, body: BodyId) -> Option<&RigidBody> {
        self.bodies.get(self.body_records.get(&body)?.handle)
    }

    pub(crate) fn body_mut(&mut self, body: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(self.body_records.get(&body)?.handle)
    }

    pub fn body_type(&self, body: BodyId) -> Option<BodyType> {
        self.body_records.get(&body).map(|r| r.body_type)
    }

    pub fn set_body_type(&mut self, body: BodyId, body_type: BodyType) {
        let Some(record) = self.body_records.get_mut(&body) else {
            return;
        };
        record.body_type = body_type;
        if let Some(rb) = self.bodies.get_mut(record.handle) {
            rb.set_body_type(body_type.to_rapier(), true);
        }
        for handle in &record.colliders {
            if let Some(collider) = self.colliders.get_mut(*handle) {
                collider.set_sensor(body_type.is_sensor());
                collider.set_active_collision_types(collision_types(body_type));
            }
        }
    }

    pub fn material(&self, body: BodyId) -> Option<ColliderMaterial> {
        self.body_records.get(&body).map(|r| r.material)
    }

    pub fn set_material(&mut self, body: BodyId, material: ColliderMaterial) {
        let Some(record) = self.body_records.get_mut(&body) else {
            return;
        };
        record.material = material;
        for handle in &record.colliders {
            if let Some(collider) = self.colliders.get_mut(*handle) {
                collider.set_density(material.density);
                collider.set_friction(material.friction);
                collider.set_restitution(material.restitution);
            }
        }
    }

    /// World-space center of the body's fixture bounds, or its origin when
    /// it has no fixtures.
    pub fn body_center(&self, body: BodyId) -> Option<Vec2> {
        let record = self.body_records.get(&body)?;
        let mut aabbs = record
            .colliders
            .iter()
            .filter_map(|h| self.colliders.get(*h))
            .map(|c| c.compute_aabb());
        match aabbs.next() {
            Some(first) => {
                let merged = aabbs.fold(first, |acc, aabb| acc.merged(&aabb));
                Some(from_point(&merged.center()))
            }
            None => self.body(body).map(|rb| from_na(rb.translation())),
        }
    }

    /// Whether a world-space point lies inside any fixture of the body.
    pub fn contains_point(&self, body: BodyId, point: Vec2) -> bool {
        let Some(record) = self.body_records.get(&body) else {
            return false;
        };
        let point = to_point(point);
        record
            .colliders
            .iter()
            .filter_map(|h| self.colliders.get(*h))
            .any(|c| c.shape().contains_point(c.position(), &point))
    }

    /// Whether any fixture of `a` intersects any fixture of `b`.
    pub fn overlaps(&self, a: BodyId, b: BodyId) -> bool {
        let (Some(ra), Some(rb)) = (self.body_records.get(&a), self.body_records.get(&b)) else {
            return false;
        };
        let fixtures_b: Vec<&Collider> = rb
            .colliders
            .iter()
            .filter_map(|h| self.colliders.get(*h))
            .collect();
        ra.colliders
            .iter()
            .filter_map(|h| self.colliders.get(*h))
            .any(|ca| {
                fixtures_b.iter().any(|cb| {
                    parry_query::intersection_test(
                        ca.position(),
                        ca.shape(),
                        cb.position(),
                        cb.shape(),
                    )
                    .unwrap_or(false)
                })
            })
    }

    /// Fixture shapes of a body in body-local coordinates.
    pub fn fixtures(&self, body: BodyId) -> Vec<FixtureShape> {
        self.body_records
            .get(&body)
            .map(|record| {
                record
                    .colliders
                    .iter()
                    .filter_map(|h| self.colliders.get(*h))
                    .filter_map(FixtureShape::from_collider)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// World position and rotation (radians) of a body.
    pub fn body_pose(&self, body: BodyId) -> Option<(Vec2, f32)> {
        self.body(body)
            .map(|rb| (from_na(rb.translation()), rb.rotation().angle()))
    }

    /// Every live body, in no particular order.
    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.body_records.keys().copied()
    }

    /// Number of distinct bodies currently in solid contact with `body`.
    pub fn touching_count(&self, body: BodyId) -> usize {
        let Some(record) = self.body_records.get(&body) else {
            return 0;
        };
        let mut others: Vec<BodyId> = Vec::new();
        for handle in &record.colliders {
            for pair in self.narrow_phase.contact_pairs_with(*handle) {
                if !pair.has_any_active_contact {
                    continue;
                }
                let other = if pair.collider1 == *handle {
                    pair.collider2
                } else {
                    pair.collider1
                };
                if let Some(other) = self.collider_body(other) {
                    if other != body && !others.contains(&other) {
                        others.push(other);
                    }
                }
            }
        }
        others.len()
    }

    /// Body-local point to world space.
    pub fn local_to_world(&self, body: BodyId, local: Vec2) -> Option<Vec2> {
        self.body(body)
            .map(|rb| from_point(&(rb.position() * to_point(local))))
    }

    // -- collision registration --

    /// Listen for contacts between `owner`'s body and `collider`'s body.
    pub fn register_pairwise(
        &mut self,
        listener: ListenerId,
        owner: BodyId,
        collider: BodyId,
    ) -> Result<()> {
        let owner_actor = self.require_actor(owner)?;
        let collider_actor = self.require_actor(collider)?;
        if !self.registry.register_pairwise(
            listener,
            (owner, owner_actor),
            (collider, collider_actor),
        ) {
            return Err(SceneError::SelfPair);
        }
        Ok(())
    }

    /// Listen for every contact of `body`.
    pub fn register_general(&mut self, listener: ListenerId, body: BodyId) -> Result<()> {
        let owner = self.require_actor(body)?;
        self.registry.register_general(listener, body, owner);
        Ok(())
    }

    pub fn unregister(&mut self, listener: ListenerId) -> bool {
        self.registry.unregister(listener)
    }

    fn require_actor(&self, body: BodyId) -> Result<ActorId> {
        self.actor_of(body).ok_or(SceneError::CrossWorld)
    }

    // -- joints --

    pub fn create_joint(&mut self, a: BodyId, b: BodyId, desc: &JointDesc) -> Result<JointId> {
        let handle_a = self.body_records.get(&a).ok_or(SceneError::CrossWorld)?.handle;
        let handle_b = self.body_records.get(&b).ok_or(SceneError::CrossWorld)?.handle;
        let joint = desc.build()?;
        let handle = self.impulse_joints.insert(handle_a, handle_b, joint, true);
        let id = JointId::next();
        self.joints.insert(
            id,
            JointRecord {
                handle,
                body_a: a,
                body_b: b,
                desc: *desc,
            },
        );
        Ok(id)
    }

    pub fn remove_joint(&mut self, id: JointId) -> Result<()> {
        let record = self.joints.remove(&id).ok_or(SceneError::UnknownJoint)?;
        self.impulse_joints.remove(record.handle, true);
        Ok(())
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> impl Iterator<Item = JointInfo> + '_ {
        self.joints.iter().map(|(id, j)| JointInfo {
            id: *id,
            body_a: j.body_a,
            body_b: j.body_b,
            desc: j.desc,
        })
    }

    // -- stepping --

    /// Advance the simulation by `dt` seconds, then translate the contact
    /// callbacks of this step into listener dispatches.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &self.collector,
        );

        for event in self.collector.drain() {
            let (h1, h2, phase) = match event {
                CollisionEvent::Started(h1, h2, _) => (h1, h2, ContactPhase::Begin),
                CollisionEvent::Stopped(h1, h2, _) => (h1, h2, ContactPhase::End),
            };
            // Colliders removed during the step resolve to nothing.
            let (Some(x), Some(y)) = (self.collider_body(h1), self.collider_body(h2)) else {
                continue;
            };
            self.handle_contact(x, y, phase);
        }

        // Forces and torques act for exactly one step.
        for (_, rb) in self.bodies.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
    }

    /// Canonicalize one contact callback and enqueue its dispatches.
    pub(crate) fn handle_contact(&mut self, x: BodyId, y: BodyId, phase: ContactPhase) {
        let (Some(x_actor), Some(y_actor)) = (self.actor_of(x), self.actor_of(y)) else {
            return;
        };
        for dispatch in self.registry.on_contact((x, x_actor), (y, y_actor), phase) {
            // The receiver lives in the owning layer; if it is gone there is
            // nobody left to notify.
            let _ = self.dispatch.send(dispatch);
        }
    }

    fn collider_body(&self, handle: ColliderHandle) -> Option<BodyId> {
        let collider = self.colliders.get(handle)?;
        let rb = self.bodies.get(collider.parent()?)?;
        let id = BodyId(rb.user_data as u64);
        self.body_records.contains_key(&id).then_some(id)
    }
}

fn collision_types(body_type: BodyType) -> ActiveCollisionTypes {
    if body_type.is_sensor() {
        ActiveCollisionTypes::all()
    } else {
        ActiveCollisionTypes::default()
    }
}

// ---------------------------------------------------------------------------
// SharedWorld
// ---------------------------------------------------------------------------

/// A world shared between the frame thread and the step worker of its layer.
/// The mutex is the layer-scoped exclusive section: stepping and every body
/// access go through it.
#[derive(Clone)]
pub struct SharedWorld {
    id: WorldId,
    inner: Arc<Mutex<WorldHandler>>,
}

impl SharedWorld {
    pub fn new(world: WorldHandler) -> Self {
        Self {
            id: world.id(),
            inner: Arc::new(Mutex::new(world)),
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Lock the world. A poisoned lock is recovered: the panic that poisoned
    /// it has already been reported as a failed step.
    pub fn lock(&self) -> MutexGuard<'_, WorldHandler> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
