use glam::Vec2;
use rapier2d::prelude::{LockedAxes, RigidBody, Rotation};

use crate::api::error::{non_negative, Result};
use crate::api::types::{ActorId, BodyId, WorldId};
use crate::core::collision::PurgedListener;
use crate::core::physics::{
    to_na, to_point, BodyType, ColliderMaterial, FixtureShape, PhysicsState, SharedWorld,
};

/// In-memory physics state of an actor that is not part of any world.
///
/// Every setter is buffered here and seeds the body created at the next
/// mount. Impulses accumulate and are applied right after that mount;
/// forces and torques have nothing to act on and are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetachedHandler {
    state: PhysicsState,
    pending_impulse: Vec2,
    pending_angular_impulse: f32,
}

impl DetachedHandler {
    pub fn new(state: PhysicsState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    pub fn state(&self) -> &PhysicsState {
        &self.state
    }

    pub fn pending_impulse(&self) -> Vec2 {
        self.pending_impulse
    }
}

/// Handle to a live body inside one world.
#[derive(Clone)]
pub struct AttachedHandler {
    world: SharedWorld,
    body: BodyId,
}

impl AttachedHandler {
    /// Create the body for `actor` from a detached state.
    pub fn attach(
        world: &SharedWorld,
        actor: ActorId,
        detached: &DetachedHandler,
        fixtures: &[FixtureShape],
    ) -> Self {
        let mut guard = world.lock();
        let body = guard.create_body(actor, &detached.state, fixtures);
        if let Some(rb) = guard.body_mut(body) {
            let impulse = detached.pending_impulse;
            if impulse != Vec2::ZERO {
                rb.apply_impulse(to_na(impulse), true);
            }
            if detached.pending_angular_impulse != 0.0 {
                rb.apply_torque_impulse(detached.pending_angular_impulse, true);
            }
        }
        Self {
            world: world.clone(),
            body,
        }
    }

    /// Capture the last simulated state and destroy the body. The returned
    /// listeners were registered on (or against) the body and are gone now.
    pub fn detach(self) -> (DetachedHandler, Vec<PurgedListener>) {
        let mut guard = self.world.lock();
        let state = guard.body_state(self.body).unwrap_or_default();
        let purged = guard.remove_body(self.body).unwrap_or_default();
        (DetachedHandler::new(state), purged)
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    fn read<R>(&self, f: impl FnOnce(&RigidBody) -> R) -> Option<R> {
        self.world.lock().body(self.body).map(f)
    }

    fn write(&self, f: impl FnOnce(&mut RigidBody)) {
        if let Some(rb) = self.world.lock().body_mut(self.body) {
            f(rb);
        }
    }
}

/// Physics representation of an actor: simulation-backed or symbolic.
///
/// Both variants expose the same API. Queries on a detached handler answer
/// from its buffered state; point containment is conservatively false.
#[derive(Clone)]
pub enum PhysicsHandler {
    Detached(DetachedHandler),
    Attached(AttachedHandler),
}

impl Default for PhysicsHandler {
    fn default() -> Self {
        PhysicsHandler::Detached(DetachedHandler::default())
    }
}

impl PhysicsHandler {
    pub fn is_attached(&self) -> bool {
        matches!(self, PhysicsHandler::Attached(_))
    }

    pub fn body_id(&self) -> Option<BodyId> {
        match self {
            PhysicsHandler::Attached(h) => Some(h.body),
            PhysicsHandler::Detached(_) => None,
        }
    }

    pub fn world_id(&self) -> Option<WorldId> {
        match self {
            PhysicsHandler::Attached(h) => Some(h.world.id()),
            PhysicsHandler::Detached(_) => None,
        }
    }

    /// Snapshot of every scalar the two variants share.
    pub fn state(&self) -> PhysicsState {
        match self {
            PhysicsHandler::Detached(h) => h.state,
            PhysicsHandler::Attached(h) => h.world.lock().body_state(h.body).unwrap_or_default(),
        }
    }

    // -- kinematics --

    pub fn position(&self) -> Vec2 {
        match self {
            PhysicsHandler::Detached(h) => h.state.position,
            PhysicsHandler::Attached(h) => h
                .read(|rb| Vec2::new(rb.translation().x, rb.translation().y))
                .unwrap_or_default(),
        }
    }

    pub fn set_position(&mut self, pos: Vec2) {
        match self {
            PhysicsHandler::Detached(h) => h.state.position = pos,
            PhysicsHandler::Attached(h) => h.write(|rb| rb.set_translation(to_na(pos), true)),
        }
    }

    pub fn rotation(&self) -> f32 {
        match self {
            PhysicsHandler::Detached(h) => h.state.rotation,
            PhysicsHandler::Attached(h) => h.read(|rb| rb.rotation().angle()).unwrap_or_default(),
        }
    }

    pub fn set_rotation(&mut self, radians: f32) {
        match self {
            PhysicsHandler::Detached(h) => h.state.rotation = radians,
            PhysicsHandler::Attached(h) => h.write(|rb| rb.set_rotation(Rotation::new(radians), true)),
        }
    }

    pub fn velocity(&self) -> Vec2 {
        match self {
            PhysicsHandler::Detached(h) => h.state.velocity,
            PhysicsHandler::Attached(h) => h
                .read(|rb| Vec2::new(rb.linvel().x, rb.linvel().y))
                .unwrap_or_default(),
        }
    }

    pub fn set_velocity(&mut self, vel: Vec2) {
        match self {
            PhysicsHandler::Detached(h) => h.state.velocity = vel,
            PhysicsHandler::Attached(h) => h.write(|rb| rb.set_linvel(to_na(vel), true)),
        }
    }

    pub fn angular_velocity(&self) -> f32 {
        match self {
            PhysicsHandler::Detached(h) => h.state.angular_velocity,
            PhysicsHandler::Attached(h) => h.read(|rb| rb.angvel()).unwrap_or_default(),
        }
    }

    pub fn set_angular_velocity(&mut self, omega: f32) {
        match self {
            PhysicsHandler::Detached(h) => h.state.angular_velocity = omega,
            PhysicsHandler::Attached(h) => h.write(|rb| rb.set_angvel(omega, true)),
        }
    }

    // -- forces --

    /// Force in newtons, acting during the next step only.
    pub fn apply_force(&mut self, force: Vec2) {
        if let PhysicsHandler::Attached(h) = self {
            h.write(|rb| rb.add_force(to_na(force), true));
        }
    }

    /// Force applied at a world-space point; also produces torque.
    pub fn apply_force_at_point(&mut self, force: Vec2, point: Vec2) {
        if let PhysicsHandler::Attached(h) = self {
            h.write(|rb| {
                rb.add_force_at_point(to_na(force), to_point(point), true)
            });
        }
    }

    pub fn apply_impulse(&mut self, impulse: Vec2) {
        match self {
            PhysicsHandler::Detached(h) => h.pending_impulse += impulse,
            PhysicsHandler::Attached(h) => {
                h.write(|rb| rb.apply_impulse(to_na(impulse), true))
            }
        }
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if let PhysicsHandler::Attached(h) = self {
            h.write(|rb| rb.add_torque(torque, true));
        }
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        match self {
            PhysicsHandler::Detached(h) => h.pending_angular_impulse += impulse,
            PhysicsHandler::Attached(h) => h.write(|rb| rb.apply_torque_impulse(impulse, true)),
        }
    }

    // -- body configuration --

    pub fn body_type(&self) -> BodyType {
        match self {
            PhysicsHandler::Detached(h) => h.state.body_type,
            PhysicsHandler::Attached(h) => h.world.lock().body_type(h.body).unwrap_or_default(),
        }
    }

    pub fn set_body_type(&mut self, body_type: BodyType) {
        match self {
            PhysicsHandler::Detached(h) => h.state.body_type = body_type,
            PhysicsHandler::Attached(h) => h.world.lock().set_body_type(h.body, body_type),
        }
    }

    pub fn material(&self) -> ColliderMaterial {
        match self {
            PhysicsHandler::Detached(h) => h.state.material,
            PhysicsHandler::Attached(h) => h.world.lock().material(h.body).unwrap_or_default(),
        }
    }

    /// Replace density, friction and restitution at once. Negative values
    /// are rejected.
    pub fn set_material(&mut self, material: ColliderMaterial) -> Result<()> {
        non_negative("density", material.density)?;
        non_negative("friction", material.friction)?;
        non_negative("restitution", material.restitution)?;
        match self {
            PhysicsHandler::Detached(h) => h.state.material = material,
            PhysicsHandler::Attached(h) => h.world.lock().set_material(h.body, material),
        }
        Ok(())
    }

    pub fn rotation_locked(&self) -> bool {
        match self {
            PhysicsHandler::Detached(h) => h.state.rotation_locked,
            PhysicsHandler::Attached(h) => h
                .read(|rb| rb.locked_axes().contains(LockedAxes::ROTATION_LOCKED))
                .unwrap_or_default(),
        }
    }

    pub fn set_rotation_locked(&mut self, locked: bool) {
        match self {
            PhysicsHandler::Detached(h) => h.state.rotation_locked = locked,
            PhysicsHandler::Attached(h) => h.write(|rb| rb.lock_rotations(locked, true)),
        }
    }

    pub fn gravity_scale(&self) -> f32 {
        match self {
            PhysicsHandler::Detached(h) => h.state.gravity_scale,
            PhysicsHandler::Attached(h) => h.read(|rb| rb.gravity_scale()).unwrap_or(1.0),
        }
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        match self {
            PhysicsHandler::Detached(h) => h.state.gravity_scale = scale,
            PhysicsHandler::Attached(h) => h.write(|rb| rb.set_gravity_scale(scale, true)),
        }
    }

    /// Linear and angular damping.
    pub fn damping(&self) -> (f32, f32) {
        match self {
            PhysicsHandler::Detached(h) => (h.state.linear_damping, h.state.angular_damping),
            PhysicsHandler::Attached(h) => h
                .read(|rb| (rb.linear_damping(), rb.angular_damping()))
                .unwrap_or_default(),
        }
    }

    pub fn set_damping(&mut self, linear: f32, angular: f32) -> Result<()> {
        non_negative("linear damping", linear)?;
        non_negative("angular damping", angular)?;
        match self {
            PhysicsHandler::Detached(h) => {
                h.state.linear_damping = linear;
                h.state.angular_damping = angular;
            }
            PhysicsHandler::Attached(h) => h.write(|rb| {
                rb.set_linear_damping(linear);
                rb.set_angular_damping(angular);
            }),
        }
        Ok(())
    }

    /// Mass in kilograms. Unknown (zero) until the fixtures exist.
    pub fn mass(&self) -> f32 {
        match self {
            PhysicsHandler::Detached(_) => 0.0,
            PhysicsHandler::Attached(h) => h.read(|rb| rb.mass()).unwrap_or_default(),
        }
    }

    // -- queries --

    /// World-space center of the fixtures.
    pub fn center(&self) -> Vec2 {
        match self {
            PhysicsHandler::Detached(h) => h.state.position,
            PhysicsHandler::Attached(h) => h
                .world
                .lock()
                .body_center(h.body)
                .unwrap_or_default(),
        }
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        match self {
            PhysicsHandler::Detached(_) => false,
            PhysicsHandler::Attached(h) => h.world.lock().contains_point(h.body, point),
        }
    }

    /// Whether the fixtures of both handlers intersect. False unless both
    /// live in the same world.
    pub fn overlaps(&self, other: &PhysicsHandler) -> bool {
        match (self, other) {
            (PhysicsHandler::Attached(a), PhysicsHandler::Attached(b))
                if a.world.id() == b.world.id() =>
            {
                a.world.lock().overlaps(a.body, b.body)
            }
            _ => false,
        }
    }

    /// Number of bodies this one currently rests on or touches.
    pub fn touching_count(&self) -> usize {
        match self {
            PhysicsHandler::Detached(_) => 0,
            PhysicsHandler::Attached(h) => h.world.lock().touching_count(h.body),
        }
    }

    /// Regenerate the fixtures of a live body. Detached handlers have none.
    pub fn replace_fixtures(&mut self, fixtures: &[FixtureShape]) {
        if let PhysicsHandler::Attached(h) = self {
            h.world.lock().replace_fixtures(h.body, fixtures);
        }
    }
}
