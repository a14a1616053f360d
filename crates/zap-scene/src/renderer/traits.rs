//! Contract between the scene and whatever draws it.
//!
//! The scene does not rasterize anything. Once per frame it hands itself to
//! a sink, which walks the visible layers and actors and maps them through
//! `Layer::transform`.

use crate::core::scene::Scene;

/// Receives the scene once per frame, after every listener has run.
pub trait RenderSink {
    fn render(&mut self, scene: &Scene);
}

/// Sink that draws nothing. Useful for headless runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn render(&mut self, _scene: &Scene) {}
}

impl<F: FnMut(&Scene)> RenderSink for F {
    fn render(&mut self, scene: &Scene) {
        self(scene)
    }
}
