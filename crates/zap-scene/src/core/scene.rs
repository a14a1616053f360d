use glam::Vec2;

use crate::api::context::RuntimeContext;
use crate::api::error::{strictly_positive, Result, SceneError};
use crate::api::types::{LayerId, ListenerId};
use crate::components::layer::Layer;
use crate::core::pool::{StepBatch, StepTask};
use crate::input::queue::{InputEvent, InputQueue};
use crate::renderer::camera::Camera;
use crate::renderer::traits::RenderSink;
use crate::systems::debug::DebugOutline;

/// Ordered layers, the camera, and scene-wide listeners.
///
/// A frame is split in two halves so the frame loop can wait on the step
/// barrier with cancellation: [`Scene::begin_step`] submits one step task
/// per layer, [`Scene::finish_step`] does everything that must happen on the
/// frame thread afterwards.
pub struct Scene {
    ctx: RuntimeContext,
    /// Sorted by `Layer::position`, stable for equal positions.
    layers: Vec<Layer>,
    main: LayerId,
    camera: Camera,
    frame_size: Vec2,
    input: InputQueue,
    frame_listeners: Vec<(ListenerId, Box<dyn FnMut(f32)>)>,
    input_listeners: Vec<(ListenerId, Box<dyn FnMut(&InputEvent)>)>,
}

impl Scene {
    pub fn new(ctx: &RuntimeContext) -> Result<Self> {
        let config = ctx.config();
        let camera = Camera::new(config.camera_zoom)?;
        let main = Layer::new(ctx);
        Ok(Self {
            ctx: ctx.clone(),
            main: main.id(),
            layers: vec![main],
            camera,
            frame_size: config.frame_size(),
            input: InputQueue::new(),
            frame_listeners: Vec::new(),
            input_listeners: Vec::new(),
        })
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    // -- layers --

    pub fn main_layer_id(&self) -> LayerId {
        self.main
    }

    pub fn main_layer(&self) -> &Layer {
        // The main layer is never removed.
        &self.layers[self.index_of(self.main).unwrap_or_default()]
    }

    pub fn main_layer_mut(&mut self) -> &mut Layer {
        let index = self.index_of(self.main).unwrap_or_default();
        &mut self.layers[index]
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    /// Layers in draw order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    /// Take ownership of `layer`. A layer belongs to one scene at a time by
    /// construction: it is moved in here.
    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        let id = layer.id();
        let at = self
            .layers
            .partition_point(|l| l.position() <= layer.position());
        self.layers.insert(at, layer);
        id
    }

    /// Hand a layer back. Its actors stay mounted to it.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer> {
        if id == self.main {
            return Err(SceneError::MainLayerRemoval);
        }
        let index = self.index_of(id).ok_or(SceneError::UnknownLayer(id))?;
        Ok(self.layers.remove(index))
    }

    pub fn set_layer_position(&mut self, id: LayerId, position: i32) -> Result<()> {
        let layer = self.layer_mut(id).ok_or(SceneError::UnknownLayer(id))?;
        layer.set_position(position);
        self.layers.sort_by_key(Layer::position);
        Ok(())
    }

    // -- camera & frame --

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn frame_size(&self) -> Vec2 {
        self.frame_size
    }

    pub fn set_frame_size(&mut self, size: Vec2) -> Result<()> {
        strictly_positive("frame width", size.x)?;
        strictly_positive("frame height", size.y)?;
        self.frame_size = size;
        Ok(())
    }

    /// Frame pixel position to world meters, against the main layer.
    pub fn mouse_to_world(&self, pixel: Vec2) -> Vec2 {
        self.camera.screen_to_world(self.frame_size, pixel)
    }

    // -- listeners & input --

    /// Called every frame with the undistorted dt, before any layer.
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

    /// Queue an input event with pointer positions in frame pixels.
    pub fn push_input(&mut self, event: InputEvent) {
        self.input.push(event);
    }

    // -- frame --

    /// Advance every layer by `dt` on the worker pool and run the rest of
    /// the frame. Blocks until all layers are stepped.
    pub fn step(&mut self, dt: f32) -> Result<()> {
        self.begin_step(dt)?.join()?;
        self.finish_step(dt);
        Ok(())
    }

    /// Submit one step task per unpaused layer.
    pub fn begin_step(&mut self, dt: f32) -> Result<StepBatch> {
        let tasks: Vec<(LayerId, StepTask)> = self
            .layers
            .iter()
            .filter_map(|layer| layer.step_task(dt).map(|task| (layer.id(), task)))
            .collect();
        self.ctx.pool().submit(tasks)
    }

    /// Frame-thread half of a frame. Call only after the batch from
    /// [`Scene::begin_step`] completed.
    pub fn finish_step(&mut self, dt: f32) {
        for layer in &mut self.layers {
            layer.dispatch_collisions();
        }
        for layer in &mut self.layers {
            layer.apply_pending();
        }

        self.camera.update();

        for event in self.input.drain() {
            let event = event.map_pointer(|p| self.camera.screen_to_world(self.frame_size, p));
            for (_, listener) in &mut self.input_listeners {
                listener(&event);
            }
            for layer in &mut self.layers {
                layer.dispatch_input(&event);
            }
        }

        for (_, listener) in &mut self.frame_listeners {
            listener(dt);
        }
        for layer in &mut self.layers {
            layer.dispatch_frame(dt);
        }
    }

    pub fn render(&self, sink: &mut dyn RenderSink) {
        sink.render(self);
    }

    /// Collider and joint outlines of every visible layer, when collider
    /// drawing is enabled in the config.
    pub fn debug_overlay(&self) -> Vec<(LayerId, Vec<DebugOutline>)> {
        if !self.ctx.config().debug.draw_colliders {
            return Vec::new();
        }
        self.layers
            .iter()
            .filter(|l| l.is_visible())
            .map(|l| (l.id(), l.debug_outlines()))
            .collect()
    }
}
