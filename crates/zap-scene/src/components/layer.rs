use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc::Receiver;

use glam::Vec2;

use crate::api::context::RuntimeContext;
use crate::api::error::{non_negative, Result, SceneError};
use crate::api::types::{ActorId, Bounds, LayerId, ListenerId};
use crate::components::actor::Actor;
use crate::core::collision::{CollisionDispatch, ContactPhase, PurgedListener};
use crate::core::handler::{AttachedHandler, DetachedHandler, PhysicsHandler};
use crate::core::physics::{SharedWorld, WorldHandler};
use crate::core::pool::StepTask;
use crate::input::queue::InputEvent;
use crate::renderer::camera::Camera;
use crate::renderer::transform::LayerTransform;
use crate::systems::debug::{world_outlines, DebugOutline};

/// Smallest scale a layer is drawn at.
pub const MIN_PIXEL_PER_METER: f32 = 1e-3;

/// Per-layer multipliers applied to the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parallax {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub zoom: f32,
}

impl Default for Parallax {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            rotation: 1.0,
            zoom: 1.0,
        }
    }
}

enum Mutation {
    Add(Actor),
    Remove(Actor),
}

/// Deferred add/remove requests of one layer.
///
/// Cloneable so listeners can hold on to it; requests are checked when
/// pushed and applied once per frame by the layer.
#[derive(Clone)]
pub struct MutationQueue {
    layer: LayerId,
    pending: Rc<RefCell<VecDeque<Mutation>>>,
}

impl MutationQueue {
    fn new(layer: LayerId) -> Self {
        Self {
            layer,
            pending: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn add(&self, actor: &Actor) -> Result<()> {
        match actor.layer() {
            Some(layer) if layer != self.layer => Err(SceneError::AlreadyMounted(actor.id())),
            _ => {
                self.pending.borrow_mut().push_back(Mutation::Add(actor.clone()));
                Ok(())
            }
        }
    }

    pub fn remove(&self, actor: &Actor) -> Result<()> {
        let queued = self
            .pending
            .borrow()
            .iter()
            .any(|m| matches!(m, Mutation::Add(a) if a == actor));
        if actor.layer() != Some(self.layer) && !queued {
            return Err(SceneError::NotInLayer(actor.id()));
        }
        self.pending
            .borrow_mut()
            .push_back(Mutation::Remove(actor.clone()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self) -> VecDeque<Mutation> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }
}

/// One physics world, the actors that live in it, and how the camera sees
/// them.
pub struct Layer {
    id: LayerId,
    world: SharedWorld,
    dispatch: Receiver<CollisionDispatch>,
    /// Sorted by z-index, stable for equal indices.
    actors: Vec<Actor>,
    parallax: Parallax,
    time_distortion: f32,
    paused: bool,
    visible: bool,
    position: i32,
    pending: MutationQueue,
    frame_listeners: Vec<(ListenerId, Box<dyn FnMut(f32)>)>,
    input_listeners: Vec<(ListenerId, Box<dyn FnMut(&InputEvent)>)>,
}

impl Layer {
    pub fn new(ctx: &RuntimeContext) -> Self {
        let config = ctx.config();
        let (world, dispatch) = WorldHandler::new(config.gravity, config.pixel_per_meter);
        let id = LayerId::next();
        Self {
            id,
            world: SharedWorld::new(world),
            dispatch,
            actors: Vec::new(),
            parallax: Parallax::default(),
            time_distortion: 1.0,
            paused: false,
            visible: true,
            position: 0,
            pending: MutationQueue::new(id),
            frame_listeners: Vec::new(),
            input_listeners: Vec::new(),
        }
    }

    /// Draw order among the scene's layers; lower is drawn first.
    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    pub fn with_parallax(mut self, parallax: Parallax) -> Self {
        self.parallax = parallax;
        self
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: i32) {
        self.position = position;
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id() == id)
    }

    pub fn contains(&self, actor: &Actor) -> bool {
        actor.layer() == Some(self.id)
    }

    // -- configuration --

    pub fn parallax(&self) -> Parallax {
        self.parallax
    }

    pub fn set_parallax(&mut self, parallax: Parallax) {
        self.parallax = parallax;
    }

    pub fn time_distortion(&self) -> f32 {
        self.time_distortion
    }

    pub fn set_time_distortion(&mut self, factor: f32) -> Result<()> {
        self.time_distortion = non_negative("time distortion", factor)?;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// A paused layer skips its world step but still gets frame updates.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn gravity(&self) -> Vec2 {
        self.world.lock().gravity()
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.world.lock().set_gravity(gravity);
    }

    /// Pixel-per-meter constant of the layer's world.
    pub fn physics_pixel_per_meter(&self) -> f32 {
        self.world.lock().pixel_per_meter()
    }

    /// Fails once the world has created its first fixture.
    pub fn set_physics_pixel_per_meter(&mut self, value: f32) -> Result<()> {
        self.world.lock().set_pixel_per_meter(value)
    }

    // -- deferred mutation --

    /// Queue `actor` for mounting at the next frame's drain point.
    pub fn add(&self, actor: &Actor) -> Result<()> {
        self.pending.add(actor)
    }

    /// Queue `actor` for unmounting at the next frame's drain point.
    pub fn remove(&self, actor: &Actor) -> Result<()> {
        self.pending.remove(actor)
    }

    /// Queue handle for listeners that add or remove actors.
    pub fn mutations(&self) -> MutationQueue {
        self.pending.clone()
    }

    /// Apply every request queued before this call, in order. Requests
    /// queued by listeners running here wait for the next frame.
    pub fn apply_pending(&mut self) -> usize {
        let batch = self.pending.take();
        let applied = batch.len();
        for mutation in batch {
            let outcome = match &mutation {
                Mutation::Add(actor) => self.mount(actor),
                Mutation::Remove(actor) => self.unmount(actor),
            };
            if let Err(err) = outcome {
                log::warn!("layer {:?}: deferred mutation rejected: {err}", self.id);
            }
        }
        // z-indices may have changed since the last frame
        self.actors.sort_by_key(Actor::z_index);
        applied
    }

    // -- mount protocol --

    /// Attach `actor` to this layer now. Mounting an actor that is already
    /// here does nothing.
    pub fn mount(&mut self, actor: &Actor) -> Result<()> {
        match actor.layer() {
            Some(layer) if layer == self.id => return Ok(()),
            Some(_) => return Err(SceneError::AlreadyMounted(actor.id())),
            None => {}
        }
        let detached = match actor.handler() {
            PhysicsHandler::Detached(h) => h,
            // Attached without a layer only happens if a layer was torn
            // down mid-mount; start over from the live state.
            attached @ PhysicsHandler::Attached(_) => DetachedHandler::new(attached.state()),
        };
        let attached = AttachedHandler::attach(&self.world, actor.id(), &detached, &actor.fixtures());
        actor.set_handler(PhysicsHandler::Attached(attached), Some(self.id));

        actor.fire_mount();

        let z = actor.z_index();
        let at = self.actors.partition_point(|a| a.z_index() <= z);
        self.actors.insert(at, actor.clone());
        log::debug!("layer {:?}: mounted actor {:?}", self.id, actor.id());
        Ok(())
    }

    /// Detach `actor` from this layer now.
    ///
    /// The body and every collision registration involving it are gone
    /// before any listener runs; unmount listeners already see the actor
    /// detached, with its last simulated state.
    pub fn unmount(&mut self, actor: &Actor) -> Result<()> {
        if actor.layer() != Some(self.id) {
            return Err(SceneError::NotInLayer(actor.id()));
        }
        let detached = match actor.handler() {
            PhysicsHandler::Attached(h) => {
                let (detached, purged) = h.detach();
                self.forget_listeners(&purged);
                detached
            }
            PhysicsHandler::Detached(h) => h,
        };
        self.actors.retain(|a| a != actor);
        actor.set_handler(PhysicsHandler::Detached(detached), None);

        actor.fire_unmount();
        log::debug!("layer {:?}: unmounted actor {:?}", self.id, actor.id());
        Ok(())
    }

    fn forget_listeners(&self, purged: &[PurgedListener]) {
        for entry in purged {
            if let Some(owner) = self.actor(entry.owner) {
                owner.forget_collision_listener(entry.listener);
            }
        }
    }

    // -- stepping --

    /// Work item advancing this layer's world by `dt` scaled by the time
    /// distortion. `None` while paused.
    pub fn step_task(&self, dt: f32) -> Option<StepTask> {
        if self.paused {
            return None;
        }
        let world = self.world.clone();
        let dt = dt * self.time_distortion;
        Some(Box::new(move || {
            world.lock().step(dt);
            Ok(())
        }))
    }

    /// Step on the calling thread.
    pub fn step(&mut self, dt: f32) {
        if !self.paused {
            self.world.lock().step(dt * self.time_distortion);
        }
    }

    /// Run the collision listeners for every contact enqueued by the steps
    /// so far. Dispatches whose listener or actors went away are dropped.
    pub fn dispatch_collisions(&mut self) -> usize {
        let dispatches: Vec<CollisionDispatch> = self.dispatch.try_iter().collect();
        let mut delivered = 0;
        for d in dispatches {
            let (Some(owner), Some(collider)) =
                (self.actor(d.owner).cloned(), self.actor(d.collider).cloned())
            else {
                log::debug!("layer {:?}: dropping stale dispatch {d:?}", self.id);
                continue;
            };
            let Some(listener) = owner.collision_listener(d.listener) else {
                log::debug!("layer {:?}: listener {:?} is gone", self.id, d.listener);
                continue;
            };
            let mut listener = listener.borrow_mut();
            match d.phase {
                ContactPhase::Begin => listener.on_collision_begin(&owner, &collider),
                ContactPhase::End => listener.on_collision_end(&owner, &collider),
            }
            delivered += 1;
        }
        delivered
    }

    // -- listeners --

    pub fn on_frame(&mut self, listener: impl FnMut(f32) + 'static) -> ListenerId {
        let id = ListenerId::next();
        self.frame_listeners.push((id, Box::new(listener)));
        id
    }

    pub fn on_input(&mut self, listener: impl FnMut(&InputEvent) + 'static) -> ListenerId {
        let id = ListenerId::next();
        self.input_listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.frame_listeners.len() + self.input_listeners.len();
        self.frame_listeners.retain(|(l, _)| *l != id);
        self.input_listeners.retain(|(l, _)| *l != id);
        before != self.frame_listeners.len() + self.input_listeners.len()
    }

    /// Frame update with the scene's `dt`; listeners here see it scaled by
    /// the time distortion.
    pub fn dispatch_frame(&mut self, dt: f32) {
        let dt = dt * self.time_distortion;
        for (_, listener) in &mut self.frame_listeners {
            listener(dt);
        }
        for actor in self.actors.clone() {
            actor.fire_frame(dt);
        }
    }

    /// `event` pointer positions are already in world meters.
    pub fn dispatch_input(&mut self, event: &InputEvent) {
        for (_, listener) in &mut self.input_listeners {
            listener(event);
        }
        for actor in self.actors.clone() {
            actor.fire_input(event);
        }
    }

    // -- camera transform --

    /// `1 + (zoom - 1) · parallax zoom`, floored at [`MIN_PIXEL_PER_METER`].
    /// A parallax zoom above 1 can push the raw value to zero or below
    /// when the camera zooms out.
    pub fn pixel_per_meter(&self, camera: &Camera) -> f32 {
        let ppm = 1.0 + (camera.zoom() - 1.0) * self.parallax.zoom;
        if ppm.is_finite() {
            ppm.max(MIN_PIXEL_PER_METER)
        } else {
            MIN_PIXEL_PER_METER
        }
    }

    fn scaled_camera(&self, camera: &Camera) -> Vec2 {
        camera.position() * Vec2::new(self.parallax.x, self.parallax.y)
    }

    /// World meters to frame pixels, ignoring camera rotation.
    pub fn world_to_pixel(&self, camera: &Camera, frame_size: Vec2, world: Vec2) -> Vec2 {
        let ppm = self.pixel_per_meter(camera);
        let delta = world - self.scaled_camera(camera);
        frame_size / 2.0 + Vec2::new(delta.x * ppm, -delta.y * ppm)
    }

    /// Full world → pixel transform including rotation parallax.
    pub fn transform(&self, camera: &Camera, frame_size: Vec2) -> LayerTransform {
        LayerTransform::new(
            frame_size / 2.0,
            camera.rotation().to_radians() * self.parallax.rotation,
            self.pixel_per_meter(camera),
            self.scaled_camera(camera),
        )
    }

    /// World-space bounds of what this layer shows in the frame.
    pub fn visible_area(&self, camera: &Camera, frame_size: Vec2) -> Bounds {
        let transform = self.transform(camera, frame_size);
        let corners = [
            Vec2::ZERO,
            Vec2::new(frame_size.x, 0.0),
            frame_size,
            Vec2::new(0.0, frame_size.y),
        ]
        .map(|p| transform.pixel_to_world(p));
        let min = corners.iter().copied().fold(Vec2::splat(f32::MAX), Vec2::min);
        let max = corners.iter().copied().fold(Vec2::splat(f32::MIN), Vec2::max);
        Bounds::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    /// World-space outlines of every fixture and joint.
    pub fn debug_outlines(&self) -> Vec<DebugOutline> {
        world_outlines(&self.world.lock())
    }
}

impl Drop for Layer {
    fn drop(&mut self) {
        // Leave actors detached but with their last state, so they can be
        // mounted elsewhere. No listeners run during teardown.
        for actor in self.actors.clone() {
            if let PhysicsHandler::Attached(h) = actor.handler() {
                let (detached, purged) = h.detach();
                self.forget_listeners(&purged);
                actor.set_handler(PhysicsHandler::Detached(detached), None);
            }
        }
        self.actors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::api::config::EngineConfig;
    use crate::components::actor::CollisionListener;
    use crate::core::physics::{BodyType, ColliderMaterial};

    fn ctx() -> RuntimeContext {
        RuntimeContext::new(EngineConfig {
            worker_threads: 1,
            gravity: Vec2::ZERO,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn mount_unmount_remount_preserves_state() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let actor = Actor::rectangle(1.0, 1.0).with_body_type(BodyType::Dynamic);
        actor.set_position(Vec2::new(2.0, 3.0));
        actor.set_rotation(0.4);
        actor.set_velocity(Vec2::new(1.0, -1.0));
        actor.set_rotation_locked(true);
        actor
            .set_material(ColliderMaterial {
                restitution: 0.7,
                friction: 0.25,
                density: 3.0,
            })
            .unwrap();

        for _ in 0..2 {
            layer.mount(&actor).unwrap();
            assert!(actor.is_mounted());
            layer.unmount(&actor).unwrap();
            assert!(!actor.is_mounted());
        }
        layer.mount(&actor).unwrap();

        assert!((actor.position() - Vec2::new(2.0, 3.0)).length() < 1e-5);
        assert!((actor.rotation() - 0.4).abs() < 1e-5);
        assert!((actor.velocity() - Vec2::new(1.0, -1.0)).length() < 1e-5);
        assert!(actor.rotation_locked());
        assert_eq!(actor.body_type(), BodyType::Dynamic);
        assert_eq!(actor.density(), 3.0);
        assert_eq!(actor.friction(), 0.25);
        assert_eq!(actor.restitution(), 0.7);
    }

    #[test]
    fn mounting_twice_on_same_layer_is_a_no_op() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let actor = Actor::circle(0.5);
        let mounts = Rc::new(Cell::new(0));
        let counter = Rc::clone(&mounts);
        actor.on_mount(move |_| counter.set(counter.get() + 1));

        layer.mount(&actor).unwrap();
        layer.mount(&actor).unwrap();
        assert_eq!(layer.actors().len(), 1);
        assert_eq!(mounts.get(), 1);
        assert_eq!(layer.world().lock().body_count(), 1);
    }

    #[test]
    fn mounting_on_another_layer_fails() {
        let ctx = ctx();
        let mut a = Layer::new(&ctx);
        let mut b = Layer::new(&ctx);
        let actor = Actor::circle(0.5);
        a.mount(&actor).unwrap();
        assert!(matches!(b.mount(&actor), Err(SceneError::AlreadyMounted(_))));
        assert!(matches!(b.add(&actor), Err(SceneError::AlreadyMounted(_))));
        assert!(matches!(b.unmount(&actor), Err(SceneError::NotInLayer(_))));
    }

    #[test]
    fn mount_listener_sees_attached_actor() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let actor = Actor::circle(1.0).with_position(Vec2::new(5.0, 5.0));
        let inside = Rc::new(Cell::new(false));
        let seen = Rc::clone(&inside);
        actor.on_mount(move |me| seen.set(me.contains_point(Vec2::new(5.0, 5.0))));
        layer.mount(&actor).unwrap();
        assert!(inside.get());
    }

    #[test]
    fn unmount_listener_sees_detached_state() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let actor = Actor::circle(1.0).with_position(Vec2::new(1.0, 2.0));
        let observed = Rc::new(Cell::new(None));
        let sink = Rc::clone(&observed);
        actor.on_unmount(move |me| sink.set(Some((me.is_mounted(), me.position()))));
        layer.mount(&actor).unwrap();
        layer.unmount(&actor).unwrap();
        assert_eq!(observed.get(), Some((false, Vec2::new(1.0, 2.0))));
        assert_eq!(layer.world().lock().body_count(), 0);
    }

    #[test]
    fn deferred_mutations_apply_once_in_order() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let a = Actor::circle(0.5);
        let b = Actor::circle(0.5);
        layer.add(&a).unwrap();
        layer.add(&b).unwrap();
        layer.remove(&a).unwrap();
        assert!(layer.actors().is_empty());

        assert_eq!(layer.apply_pending(), 3);
        assert_eq!(layer.actors(), &[b.clone()]);
        assert!(!a.is_mounted());
        assert_eq!(layer.apply_pending(), 0);
    }

    #[test]
    fn removing_unknown_actor_fails_at_call_site() {
        let ctx = ctx();
        let layer = Layer::new(&ctx);
        let stranger = Actor::circle(0.5);
        assert!(matches!(
            layer.remove(&stranger),
            Err(SceneError::NotInLayer(_))
        ));
    }

    #[test]
    fn actors_are_sorted_by_z_index() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let front = Actor::circle(0.5).with_z_index(5);
        let back = Actor::circle(0.5).with_z_index(-1);
        let middle = Actor::circle(0.5);
        layer.mount(&front).unwrap();
        layer.mount(&back).unwrap();
        layer.mount(&middle).unwrap();
        let order: Vec<i32> = layer.actors().iter().map(Actor::z_index).collect();
        assert_eq!(order, vec![-1, 0, 5]);

        back.set_z_index(10);
        layer.apply_pending();
        assert_eq!(layer.actors().last(), Some(&back));
    }

    #[test]
    fn pairwise_listener_fires_once_from_live_contact() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let a = Actor::circle(0.5).with_body_type(BodyType::Dynamic);
        a.set_velocity(Vec2::new(4.0, 0.0));
        let b = Actor::circle(0.5)
            .with_body_type(BodyType::Dynamic)
            .with_position(Vec2::new(3.0, 0.0));
        b.set_velocity(Vec2::new(-4.0, 0.0));
        layer.mount(&a).unwrap();
        layer.mount(&b).unwrap();

        let hits = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&hits);
        a.on_collision_with(&b, move |me: &Actor, other: &Actor| {
            log.borrow_mut().push((me.id(), other.id()));
        })
        .unwrap();

        for _ in 0..60 {
            layer.step(1.0 / 60.0);
            layer.dispatch_collisions();
        }
        assert_eq!(hits.borrow().as_slice(), &[(a.id(), b.id())]);
    }

    #[test]
    fn general_listener_reports_each_partner() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let hub = Actor::circle(1.0);
        let left = Actor::circle(0.5).with_position(Vec2::new(-1.2, 0.0));
        let right = Actor::circle(0.5).with_position(Vec2::new(1.2, 0.0));
        for actor in [&right, &hub, &left] {
            layer.mount(actor).unwrap();
        }
        let partners = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&partners);
        hub.on_collision(move |_: &Actor, other: &Actor| log.borrow_mut().push(other.id()))
            .unwrap();

        // Sensors see static overlaps; make the hub one.
        hub.set_body_type(BodyType::Sensor);
        layer.step(1.0 / 60.0);
        layer.dispatch_collisions();

        let mut seen = partners.borrow().clone();
        seen.sort();
        let mut expected = vec![left.id(), right.id()];
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn resizing_a_touching_actor_keeps_contacts_paired() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let a = Actor::circle(0.5).with_body_type(BodyType::Sensor);
        let b = Actor::circle(0.5).with_position(Vec2::new(0.6, 0.0));
        layer.mount(&a).unwrap();
        layer.mount(&b).unwrap();

        struct Tally(Rc<Cell<(u32, u32)>>);
        impl CollisionListener for Tally {
            fn on_collision_begin(&mut self, _: &Actor, _: &Actor) {
                let (begins, ends) = self.0.get();
                self.0.set((begins + 1, ends));
            }
            fn on_collision_end(&mut self, _: &Actor, _: &Actor) {
                let (begins, ends) = self.0.get();
                self.0.set((begins, ends + 1));
            }
        }
        let counts = Rc::new(Cell::new((0, 0)));
        a.on_collision_with(&b, Tally(Rc::clone(&counts))).unwrap();

        let frame = |layer: &mut Layer| {
            layer.step(1.0 / 60.0);
            layer.dispatch_collisions();
        };
        frame(&mut layer);
        assert_eq!(counts.get(), (1, 0));

        // The old fixture's contact closes, the new one opens.
        a.set_size(Vec2::splat(2.2)).unwrap();
        frame(&mut layer);
        assert_eq!(counts.get(), (2, 1));

        b.set_position(Vec2::new(10.0, 0.0));
        frame(&mut layer);
        assert_eq!(counts.get(), (2, 2));

        b.set_position(Vec2::new(0.6, 0.0));
        frame(&mut layer);
        assert_eq!(counts.get(), (3, 2));
    }

    #[test]
    fn unmount_purges_listeners_on_both_sides() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        let a = Actor::circle(0.5);
        let b = Actor::circle(0.5).with_position(Vec2::new(5.0, 0.0));
        layer.mount(&a).unwrap();
        layer.mount(&b).unwrap();
        a.on_collision_with(&b, |_: &Actor, _: &Actor| {}).unwrap();
        b.on_collision(|_: &Actor, _: &Actor| {}).unwrap();

        layer.unmount(&b).unwrap();
        assert_eq!(a.collision_listener_count(), 0);
        assert_eq!(b.collision_listener_count(), 0);
        assert_eq!(layer.world().lock().listener_count(), 0);
    }

    #[test]
    fn frame_listeners_get_distorted_dt() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        layer.set_time_distortion(0.5).unwrap();
        assert!(layer.set_time_distortion(-1.0).is_err());

        let seen = Rc::new(Cell::new(0.0));
        let sink = Rc::clone(&seen);
        layer.on_frame(move |dt| sink.set(dt));
        let actor_dt = Rc::new(Cell::new(0.0));
        let actor_sink = Rc::clone(&actor_dt);
        let actor = Actor::circle(0.5);
        actor.on_frame(move |_, dt| actor_sink.set(dt));
        layer.mount(&actor).unwrap();

        layer.dispatch_frame(0.1);
        assert!((seen.get() - 0.05).abs() < 1e-6);
        assert!((actor_dt.get() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn paused_layer_does_not_step() {
        let ctx = RuntimeContext::new(EngineConfig {
            worker_threads: 1,
            ..Default::default()
        })
        .unwrap();
        let mut layer = Layer::new(&ctx);
        let actor = Actor::circle(0.5).with_body_type(BodyType::Dynamic);
        layer.mount(&actor).unwrap();
        layer.set_paused(true);
        assert!(layer.step_task(1.0 / 60.0).is_none());
        layer.step(1.0 / 60.0);
        assert_eq!(actor.position(), Vec2::ZERO);
        layer.set_paused(false);
        layer.step(1.0 / 60.0);
        assert!(actor.position().y < 0.0);
    }

    #[test]
    fn identity_parallax_matches_camera() {
        let ctx = ctx();
        let layer = Layer::new(&ctx);
        let camera = Camera::new(30.0).unwrap();
        let frame = Vec2::new(800.0, 600.0);
        assert_eq!(layer.pixel_per_meter(&camera), 30.0);
        assert_eq!(layer.world_to_pixel(&camera, frame, Vec2::ZERO), Vec2::new(400.0, 300.0));
        let p = layer.transform(&camera, frame).world_to_pixel(Vec2::ZERO);
        assert!((p - Vec2::new(400.0, 300.0)).length() < 1e-4);
    }

    #[test]
    fn parallax_scales_camera_and_zoom() {
        let ctx = ctx();
        let layer = Layer::new(&ctx).with_parallax(Parallax {
            x: 0.5,
            y: 0.0,
            rotation: 1.0,
            zoom: 0.0,
        });
        let mut camera = Camera::new(30.0).unwrap();
        camera.set_position(Vec2::new(10.0, 10.0));
        let frame = Vec2::new(800.0, 600.0);
        // Zoom parallax 0 pins the layer at one pixel per meter.
        assert_eq!(layer.pixel_per_meter(&camera), 1.0);
        let p = layer.world_to_pixel(&camera, frame, Vec2::new(5.0, 0.0));
        assert_eq!(p, Vec2::new(400.0, 300.0));
    }

    #[test]
    fn transform_agrees_with_camera_inverse() {
        let ctx = ctx();
        let layer = Layer::new(&ctx);
        let mut camera = Camera::new(20.0).unwrap();
        camera.set_position(Vec2::new(-3.0, 7.0));
        camera.set_rotation(30.0);
        let frame = Vec2::new(640.0, 480.0);
        let world = Vec2::new(1.5, 6.0);
        let pixel = layer.transform(&camera, frame).world_to_pixel(world);
        assert!((camera.screen_to_world(frame, pixel) - world).length() < 1e-3);
    }

    #[test]
    fn visible_area_is_centered_on_camera() {
        let ctx = ctx();
        let layer = Layer::new(&ctx);
        let mut camera = Camera::new(10.0).unwrap();
        camera.set_position(Vec2::new(5.0, 5.0));
        let area = layer.visible_area(&camera, Vec2::new(200.0, 100.0));
        assert!((area.center() - Vec2::new(5.0, 5.0)).length() < 1e-4);
        assert!((area.width - 20.0).abs() < 1e-4);
        assert!((area.height - 10.0).abs() < 1e-4);
    }

    #[test]
    fn dropping_layer_detaches_actors() {
        let ctx = ctx();
        let actor = Actor::circle(0.5).with_position(Vec2::new(1.0, 1.0));
        {
            let mut layer = Layer::new(&ctx);
            layer.mount(&actor).unwrap();
        }
        assert!(!actor.is_mounted());
        assert_eq!(actor.position(), Vec2::new(1.0, 1.0));
        let mut other = Layer::new(&ctx);
        other.mount(&actor).unwrap();
    }

    #[test]
    fn dropping_layer_forgets_collision_listeners() {
        let ctx = ctx();
        let a = Actor::circle(0.5);
        let b = Actor::circle(0.5).with_position(Vec2::new(5.0, 0.0));
        {
            let mut layer = Layer::new(&ctx);
            layer.mount(&a).unwrap();
            layer.mount(&b).unwrap();
            a.on_collision_with(&b, |_: &Actor, _: &Actor| {}).unwrap();
            a.on_collision(|_: &Actor, _: &Actor| {}).unwrap();
            b.on_collision(|_: &Actor, _: &Actor| {}).unwrap();
            assert_eq!(a.collision_listener_count(), 2);
        }
        assert!(!a.is_mounted());
        assert_eq!(a.collision_listener_count(), 0);
        assert_eq!(b.collision_listener_count(), 0);
    }

    #[test]
    fn zoomed_out_foreground_keeps_finite_visible_area() {
        let ctx = ctx();
        let layer = Layer::new(&ctx).with_parallax(Parallax {
            zoom: 2.0,
            ..Parallax::default()
        });
        let camera = Camera::new(0.5).unwrap();
        assert_eq!(layer.pixel_per_meter(&camera), MIN_PIXEL_PER_METER);
        let area = layer.visible_area(&camera, Vec2::new(200.0, 100.0));
        assert!(area.width.is_finite() && area.width > 0.0);
        assert!(area.height.is_finite() && area.height > 0.0);
        assert!(area.center().is_finite());
    }

    #[test]
    fn pixel_per_meter_freezes_after_mount() {
        let ctx = ctx();
        let mut layer = Layer::new(&ctx);
        layer.set_physics_pixel_per_meter(64.0).unwrap();
        layer.mount(&Actor::circle(0.5)).unwrap();
        assert!(matches!(
            layer.set_physics_pixel_per_meter(32.0),
            Err(SceneError::PixelPerMeterFrozen)
        ));
        assert_eq!(layer.physics_pixel_per_meter(), 64.0);
    }
}
