use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use glam::Vec2;

use crate::api::error::{non_negative, Result, SceneError};
use crate::api::types::{ActorId, BodyId, JointId, LayerId, ListenerId};
use crate::core::handler::PhysicsHandler;
use crate::core::physics::{BodyType, ColliderMaterial, FixtureShape, JointDesc, SharedWorld};
use crate::input::queue::InputEvent;

/// Visual kind of an actor. Rendering is up to the sink; the kind also
/// picks the default fixture shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorKind {
    Rectangle,
    /// Diameter is the declared width.
    Circle,
    /// Points normalized to a unit box centered on the origin; scaled by
    /// the declared size.
    Polygon { points: Vec<Vec2> },
    Text { content: String },
    Image { source: String },
    /// Looping frame sequence.
    Animation { frames: Vec<String>, frame_duration: f32 },
}

impl ActorKind {
    /// Fixtures for an actor of this kind at `size` meters.
    pub fn default_fixtures(&self, size: Vec2) -> Vec<FixtureShape> {
        match self {
            ActorKind::Circle => vec![FixtureShape::Circle {
                center: Vec2::ZERO,
                radius: size.x / 2.0,
            }],
            ActorKind::Polygon { points } => vec![FixtureShape::Polygon {
                points: points.iter().map(|p| *p * size).collect(),
            }],
            ActorKind::Rectangle
            | ActorKind::Text { .. }
            | ActorKind::Image { .. }
            | ActorKind::Animation { .. } => vec![FixtureShape::Rectangle {
                center: Vec2::ZERO,
                half_extents: size / 2.0,
            }],
        }
    }
}

/// Pure function from declared size to fixture shapes.
pub type FixtureGenerator = Rc<dyn Fn(Vec2) -> Vec<FixtureShape>>;

/// Receives contact begin/end for one registration. Always invoked on the
/// frame thread, after the step that produced the contact.
pub trait CollisionListener {
    fn on_collision_begin(&mut self, actor: &Actor, other: &Actor);

    fn on_collision_end(&mut self, _actor: &Actor, _other: &Actor) {}
}

impl<F: FnMut(&Actor, &Actor)> CollisionListener for F {
    fn on_collision_begin(&mut self, actor: &Actor, other: &Actor) {
        self(actor, other)
    }
}

type ActorCallback = Rc<RefCell<dyn FnMut(&Actor)>>;
type FrameCallback = Rc<RefCell<dyn FnMut(&Actor, f32)>>;
type InputCallback = Rc<RefCell<dyn FnMut(&Actor, &InputEvent)>>;
pub(crate) type SharedCollisionListener = Rc<RefCell<dyn CollisionListener>>;

struct ActorState {
    kind: ActorKind,
    size: Vec2,
    generator: Option<FixtureGenerator>,
    collidable: bool,
    z_index: i32,
    visible: bool,
    opacity: f32,
    /// Seconds of frame time seen while mounted; drives animations.
    age: f32,
    handler: PhysicsHandler,
    layer: Option<LayerId>,
    mount_listeners: Vec<(ListenerId, ActorCallback)>,
    unmount_listeners: Vec<(ListenerId, ActorCallback)>,
    frame_listeners: Vec<(ListenerId, FrameCallback)>,
    input_listeners: Vec<(ListenerId, InputCallback)>,
    collision_listeners: HashMap<ListenerId, SharedCollisionListener>,
}

/// Shared handle to a scene entity. Cloning the handle does not clone the
/// actor; equality is identity.
#[derive(Clone)]
pub struct Actor {
    id: ActorId,
    inner: Rc<RefCell<ActorState>>,
}

impl PartialEq for Actor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Actor {}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("kind", &state.kind)
            .field("layer", &state.layer)
            .finish()
    }
}

/// Releases a joint created with [`Actor::create_joint`].
pub struct JointHandle {
    world: SharedWorld,
    id: JointId,
}

impl JointHandle {
    pub fn id(&self) -> JointId {
        self.id
    }

    /// Destroy the joint. Fails if it already went away with one of its
    /// bodies.
    pub fn release(self) -> Result<()> {
        self.world.lock().remove_joint(self.id)
    }
}

impl Actor {
    /// Negative size components are clamped to zero; use
    /// [`Actor::set_size`] for a checked resize.
    pub fn new(kind: ActorKind, size: Vec2) -> Self {
        Self {
            id: ActorId::next(),
            inner: Rc::new(RefCell::new(ActorState {
                kind,
                size: size.max(Vec2::ZERO),
                generator: None,
                collidable: true,
                z_index: 0,
                visible: true,
                opacity: 1.0,
                age: 0.0,
                handler: PhysicsHandler::default(),
                layer: None,
                mount_listeners: Vec::new(),
                unmount_listeners: Vec::new(),
                frame_listeners: Vec::new(),
                input_listeners: Vec::new(),
                collision_listeners: HashMap::new(),
            })),
        }
    }

    pub fn rectangle(width: f32, height: f32) -> Self {
        Self::new(ActorKind::Rectangle, Vec2::new(width, height))
    }

    pub fn circle(radius: f32) -> Self {
        Self::new(ActorKind::Circle, Vec2::splat(radius * 2.0))
    }

    /// Polygon from points in meters around the actor origin.
    pub fn polygon(points: &[Vec2]) -> Self {
        let min = points.iter().copied().fold(Vec2::splat(f32::MAX), Vec2::min);
        let max = points.iter().copied().fold(Vec2::splat(f32::MIN), Vec2::max);
        let size = if points.is_empty() { Vec2::ZERO } else { max - min };
        let center = (min + max) / 2.0;
        let unit = Vec2::select(size.cmpgt(Vec2::ZERO), size, Vec2::ONE);
        let normalized = points.iter().map(|p| (*p - center) / unit).collect();
        Self::new(ActorKind::Polygon { points: normalized }, size)
    }

    pub fn text(content: impl Into<String>, size: Vec2) -> Self {
        Self::new(
            ActorKind::Text {
                content: content.into(),
            },
            size,
        )
    }

    pub fn image(source: impl Into<String>, size: Vec2) -> Self {
        Self::new(
            ActorKind::Image {
                source: source.into(),
            },
            size,
        )
    }

    pub fn animation(frames: Vec<String>, frame_duration: f32, size: Vec2) -> Self {
        Self::new(
            ActorKind::Animation {
                frames,
                frame_duration,
            },
            size,
        )
    }

    /// Replace the default fixture shape of the kind.
    pub fn with_fixtures(self, generator: impl Fn(Vec2) -> Vec<FixtureShape> + 'static) -> Self {
        self.inner.borrow_mut().generator = Some(Rc::new(generator));
        self
    }

    pub fn with_body_type(self, body_type: BodyType) -> Self {
        self.set_body_type(body_type);
        self
    }

    pub fn with_position(self, position: Vec2) -> Self {
        self.set_position(position);
        self
    }

    pub fn with_z_index(self, z_index: i32) -> Self {
        self.set_z_index(z_index);
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    // -- appearance --

    pub fn kind(&self) -> Ref<'_, ActorKind> {
        Ref::map(self.inner.borrow(), |s| &s.kind)
    }

    pub fn set_text(&self, content: impl Into<String>) {
        if let ActorKind::Text { content: current } = &mut self.inner.borrow_mut().kind {
            *current = content.into();
        }
    }

    pub fn size(&self) -> Vec2 {
        self.inner.borrow().size
    }

    /// Change the declared size. A mounted actor gets new fixtures at once.
    pub fn set_size(&self, size: Vec2) -> Result<()> {
        non_negative("actor width", size.x)?;
        non_negative("actor height", size.y)?;
        self.inner.borrow_mut().size = size;
        self.refresh_fixtures();
        Ok(())
    }

    pub fn z_index(&self) -> i32 {
        self.inner.borrow().z_index
    }

    /// Takes effect in the layer's order at the next frame.
    pub fn set_z_index(&self, z_index: i32) {
        self.inner.borrow_mut().z_index = z_index;
    }

    pub fn is_visible(&self) -> bool {
        self.inner.borrow().visible
    }

    pub fn set_visible(&self, visible: bool) {
        self.inner.borrow_mut().visible = visible;
    }

    pub fn opacity(&self) -> f32 {
        self.inner.borrow().opacity
    }

    pub fn set_opacity(&self, opacity: f32) {
        self.inner.borrow_mut().opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn is_collidable(&self) -> bool {
        self.inner.borrow().collidable
    }

    /// A non-collidable actor keeps its body but has no fixtures.
    pub fn set_collidable(&self, collidable: bool) {
        self.inner.borrow_mut().collidable = collidable;
        self.refresh_fixtures();
    }

    /// Index of the current animation frame, if this is an animation.
    pub fn animation_frame(&self) -> Option<usize> {
        let state = self.inner.borrow();
        match &state.kind {
            ActorKind::Animation {
                frames,
                frame_duration,
            } if !frames.is_empty() => {
                if *frame_duration <= 0.0 {
                    return Some(0);
                }
                Some((state.age / frame_duration) as usize % frames.len())
            }
            _ => None,
        }
    }

    /// Fixture shapes for the current size.
    pub fn fixtures(&self) -> Vec<FixtureShape> {
        let state = self.inner.borrow();
        if !state.collidable {
            return Vec::new();
        }
        match &state.generator {
            Some(generator) => generator(state.size),
            None => state.kind.default_fixtures(state.size),
        }
    }

    fn refresh_fixtures(&self) {
        let fixtures = self.fixtures();
        self.inner.borrow_mut().handler.replace_fixtures(&fixtures);
    }

    // -- lifecycle --

    pub fn is_mounted(&self) -> bool {
        self.inner.borrow().layer.is_some()
    }

    /// Layer the actor is mounted to.
    pub fn layer(&self) -> Option<LayerId> {
        self.inner.borrow().layer
    }

    pub fn body_id(&self) -> Option<BodyId> {
        self.inner.borrow().handler.body_id()
    }

    pub(crate) fn handler(&self) -> PhysicsHandler {
        self.inner.borrow().handler.clone()
    }

    pub(crate) fn set_handler(&self, handler: PhysicsHandler, layer: Option<LayerId>) {
        let mut state = self.inner.borrow_mut();
        state.handler = handler;
        state.layer = layer;
    }

    pub fn on_mount(&self, listener: impl FnMut(&Actor) + 'static) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .borrow_mut()
            .mount_listeners
            .push((id, Rc::new(RefCell::new(listener))));
        id
    }

    pub fn on_unmount(&self, listener: impl FnMut(&Actor) + 'static) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .borrow_mut()
            .unmount_listeners
            .push((id, Rc::new(RefCell::new(listener))));
        id
    }

    /// Called every frame while mounted, with the layer's distorted dt.
    pub fn on_frame(&self, listener: impl FnMut(&Actor, f32) + 'static) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .borrow_mut()
            .frame_listeners
            .push((id, Rc::new(RefCell::new(listener))));
        id
    }

    /// Called for every input event while mounted. Pointer positions are in
    /// world meters.
    pub fn on_input(&self, listener: impl FnMut(&Actor, &InputEvent) + 'static) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .borrow_mut()
            .input_listeners
            .push((id, Rc::new(RefCell::new(listener))));
        id
    }

    /// Remove a mount, unmount, frame or input listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.inner.borrow_mut();
        let before = state.mount_listeners.len()
            + state.unmount_listeners.len()
            + state.frame_listeners.len()
            + state.input_listeners.len();
        state.mount_listeners.retain(|(l, _)| *l != id);
        state.unmount_listeners.retain(|(l, _)| *l != id);
        state.frame_listeners.retain(|(l, _)| *l != id);
        state.input_listeners.retain(|(l, _)| *l != id);
        let after = state.mount_listeners.len()
            + state.unmount_listeners.len()
            + state.frame_listeners.len()
            + state.input_listeners.len();
        before != after
    }

    // Listeners are cloned out of the state before running, so they may
    // freely call back into this actor.

    pub(crate) fn fire_mount(&self) {
        let listeners: Vec<ActorCallback> = self
            .inner
            .borrow()
            .mount_listeners
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            (listener.borrow_mut())(self);
        }
    }

    pub(crate) fn fire_unmount(&self) {
        let listeners: Vec<ActorCallback> = self
            .inner
            .borrow()
            .unmount_listeners
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            (listener.borrow_mut())(self);
        }
    }

    pub(crate) fn fire_frame(&self, dt: f32) {
        let listeners: Vec<FrameCallback> = {
            let mut state = self.inner.borrow_mut();
            state.age += dt;
            state.frame_listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
        };
        for listener in listeners {
            (listener.borrow_mut())(self, dt);
        }
    }

    pub(crate) fn fire_input(&self, event: &InputEvent) {
        let listeners: Vec<InputCallback> = self
            .inner
            .borrow()
            .input_listeners
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            (listener.borrow_mut())(self, event);
        }
    }

    // -- collisions --

    fn attachment(&self) -> Result<(SharedWorld, BodyId)> {
        match &self.inner.borrow().handler {
            PhysicsHandler::Attached(h) => Ok((h.world().clone(), h.body())),
            PhysicsHandler::Detached(_) => Err(SceneError::NotMounted(self.id)),
        }
    }

    /// Listen for every contact of this actor.
    pub fn on_collision(&self, listener: impl CollisionListener + 'static) -> Result<ListenerId> {
        let (world, body) = self.attachment()?;
        let id = ListenerId::next();
        world.lock().register_general(id, body)?;
        self.inner
            .borrow_mut()
            .collision_listeners
            .insert(id, Rc::new(RefCell::new(listener)));
        Ok(id)
    }

    /// Listen for contacts between this actor and `other` only. Both must be
    /// mounted in the same world.
    pub fn on_collision_with(
        &self,
        other: &Actor,
        listener: impl CollisionListener + 'static,
    ) -> Result<ListenerId> {
        if other.id == self.id {
            return Err(SceneError::SelfPair);
        }
        let (world, body) = self.attachment()?;
        let (other_world, other_body) = other.attachment()?;
        if world.id() != other_world.id() {
            return Err(SceneError::CrossWorld);
        }
        let id = ListenerId::next();
        world.lock().register_pairwise(id, body, other_body)?;
        self.inner
            .borrow_mut()
            .collision_listeners
            .insert(id, Rc::new(RefCell::new(listener)));
        Ok(id)
    }

    pub fn remove_collision_listener(&self, id: ListenerId) -> bool {
        let removed = self
            .inner
            .borrow_mut()
            .collision_listeners
            .remove(&id)
            .is_some();
        if let Ok((world, _)) = self.attachment() {
            world.lock().unregister(id);
        }
        removed
    }

    pub fn collision_listener_count(&self) -> usize {
        self.inner.borrow().collision_listeners.len()
    }

    pub(crate) fn collision_listener(&self, id: ListenerId) -> Option<SharedCollisionListener> {
        self.inner.borrow().collision_listeners.get(&id).cloned()
    }

    /// Drop a listener whose registration died with a body.
    pub(crate) fn forget_collision_listener(&self, id: ListenerId) {
        self.inner.borrow_mut().collision_listeners.remove(&id);
    }

    // -- joints --

    /// Join this actor to `other`. Anchors are local to each body.
    pub fn create_joint(&self, other: &Actor, desc: JointDesc) -> Result<JointHandle> {
        let (world, body) = self.attachment()?;
        let (other_world, other_body) = other.attachment()?;
        if world.id() != other_world.id() {
            return Err(SceneError::CrossWorld);
        }
        let id = world.lock().create_joint(body, other_body, &desc)?;
        Ok(JointHandle { world, id })
    }

    // -- physics --

    pub fn position(&self) -> Vec2 {
        self.inner.borrow().handler.position()
    }

    pub fn set_position(&self, position: Vec2) {
        self.inner.borrow_mut().handler.set_position(position);
    }

    pub fn move_by(&self, delta: Vec2) {
        let position = self.position();
        self.set_position(position + delta);
    }

    /// World-space center of the fixtures; the position while detached.
    pub fn center(&self) -> Vec2 {
        self.inner.borrow().handler.center()
    }

    /// Radians, counter-clockwise.
    pub fn rotation(&self) -> f32 {
        self.inner.borrow().handler.rotation()
    }

    pub fn set_rotation(&self, radians: f32) {
        self.inner.borrow_mut().handler.set_rotation(radians);
    }

    pub fn rotate_by(&self, radians: f32) {
        let rotation = self.rotation();
        self.set_rotation(rotation + radians);
    }

    pub fn velocity(&self) -> Vec2 {
        self.inner.borrow().handler.velocity()
    }

    pub fn set_velocity(&self, velocity: Vec2) {
        self.inner.borrow_mut().handler.set_velocity(velocity);
    }

    pub fn angular_velocity(&self) -> f32 {
        self.inner.borrow().handler.angular_velocity()
    }

    pub fn set_angular_velocity(&self, omega: f32) {
        self.inner.borrow_mut().handler.set_angular_velocity(omega);
    }

    pub fn apply_force(&self, force: Vec2) {
        self.inner.borrow_mut().handler.apply_force(force);
    }

    pub fn apply_force_at_point(&self, force: Vec2, point: Vec2) {
        self.inner
            .borrow_mut()
            .handler
            .apply_force_at_point(force, point);
    }

    pub fn apply_impulse(&self, impulse: Vec2) {
        self.inner.borrow_mut().handler.apply_impulse(impulse);
    }

    pub fn apply_torque(&self, torque: f32) {
        self.inner.borrow_mut().handler.apply_torque(torque);
    }

    pub fn apply_angular_impulse(&self, impulse: f32) {
        self.inner.borrow_mut().handler.apply_angular_impulse(impulse);
    }

    pub fn body_type(&self) -> BodyType {
        self.inner.borrow().handler.body_type()
    }

    pub fn set_body_type(&self, body_type: BodyType) {
        self.inner.borrow_mut().handler.set_body_type(body_type);
    }

    pub fn material(&self) -> ColliderMaterial {
        self.inner.borrow().handler.material()
    }

    pub fn set_material(&self, material: ColliderMaterial) -> Result<()> {
        self.inner.borrow_mut().handler.set_material(material)
    }

    pub fn density(&self) -> f32 {
        self.material().density
    }

    pub fn set_density(&self, density: f32) -> Result<()> {
        self.set_material(ColliderMaterial {
            density,
            ..self.material()
        })
    }

    pub fn friction(&self) -> f32 {
        self.material().friction
    }

    pub fn set_friction(&self, friction: f32) -> Result<()> {
        self.set_material(ColliderMaterial {
            friction,
            ..self.material()
        })
    }

    pub fn restitution(&self) -> f32 {
        self.material().restitution
    }

    pub fn set_restitution(&self, restitution: f32) -> Result<()> {
        self.set_material(ColliderMaterial {
            restitution,
            ..self.material()
        })
    }

    pub fn rotation_locked(&self) -> bool {
        self.inner.borrow().handler.rotation_locked()
    }

    pub fn set_rotation_locked(&self, locked: bool) {
        self.inner.borrow_mut().handler.set_rotation_locked(locked);
    }

    pub fn gravity_scale(&self) -> f32 {
        self.inner.borrow().handler.gravity_scale()
    }

    pub fn set_gravity_scale(&self, scale: f32) {
        self.inner.borrow_mut().handler.set_gravity_scale(scale);
    }

    pub fn damping(&self) -> (f32, f32) {
        self.inner.borrow().handler.damping()
    }

    pub fn set_damping(&self, linear: f32, angular: f32) -> Result<()> {
        self.inner.borrow_mut().handler.set_damping(linear, angular)
    }

    pub fn mass(&self) -> f32 {
        self.inner.borrow().handler.mass()
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        self.inner.borrow().handler.contains_point(point)
    }

    pub fn overlaps(&self, other: &Actor) -> bool {
        if other.id == self.id {
            return false;
        }
        let other = other.handler();
        self.inner.borrow().handler.overlaps(&other)
    }

    /// Number of bodies in solid contact with this one.
    pub fn touching_count(&self) -> usize {
        self.inner.borrow().handler.touching_count()
    }

    /// Resting on, or touching, anything at all.
    pub fn is_grounded(&self) -> bool {
        self.touching_count() > 0
    }
}
