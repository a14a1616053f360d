pub mod api;
pub mod core;
pub mod components;
pub mod systems;
pub mod renderer;
pub mod input;

// Re-export key types at crate root for convenience
pub use api::config::{DebugFlags, EngineConfig};
pub use api::context::RuntimeContext;
pub use api::error::{Result, SceneError};
pub use api::types::{ActorId, BodyId, Bounds, JointId, LayerId, ListenerId, WorldId};
pub use components::actor::{Actor, ActorKind, CollisionListener, FixtureGenerator, JointHandle};
pub use components::layer::{Layer, MutationQueue, Parallax};
pub use core::collision::ContactPhase;
pub use core::frame_loop::{FrameLoop, FrameStats, LoopState};
pub use core::physics::{
    BodyType, ColliderMaterial, FixtureShape, JointDesc, JointKind, PhysicsState,
};
pub use core::pool::{CancelToken, StepPool};
pub use core::scene::Scene;
pub use input::queue::{InputEvent, InputQueue};
pub use renderer::{Camera, LayerTransform, NullSink, RenderSink, TransformUniform};
pub use systems::debug::{DebugOutline, OutlineKind};
