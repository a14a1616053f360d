pub mod camera;
pub mod traits;
pub mod transform;

// Re-export key types for convenient access
pub use camera::Camera;
pub use traits::{NullSink, RenderSink};
pub use transform::{LayerTransform, TransformUniform};
