use thiserror::Error;

use crate::api::types::{ActorId, LayerId};

/// Every failure the scene runtime reports at a call site.
#[derive(Debug, Error)]
pub enum SceneError {
    // -- configuration --
    #[error("camera zoom must be strictly positive, got {0}")]
    InvalidZoom(f32),
    #[error("{what} must not be negative, got {value}")]
    NegativeDimension { what: &'static str, value: f32 },
    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: f32 },
    #[error("actors live in different physics worlds")]
    CrossWorld,
    #[error("an actor cannot listen for collisions with itself")]
    SelfPair,
    #[error("actor {0:?} is already mounted to another layer")]
    AlreadyMounted(ActorId),
    #[error("pixel-per-meter is frozen once the first fixture exists")]
    PixelPerMeterFrozen,
    #[error("failed to parse engine config: {0}")]
    Config(#[from] serde_json::Error),

    // -- lifecycle --
    #[error("actor {0:?} is not part of this layer")]
    NotInLayer(ActorId),
    #[error("actor {0:?} is not mounted")]
    NotMounted(ActorId),
    #[error("no layer {0:?} in this scene")]
    UnknownLayer(LayerId),
    #[error("the main layer cannot be removed")]
    MainLayerRemoval,
    #[error("joint no longer exists")]
    UnknownJoint,

    // -- runtime --
    #[error("step of layer {layer:?} failed: {message}")]
    StepFailed { layer: LayerId, message: String },
    #[error("worker pool could not be built: {0}")]
    WorkerPool(String),
    #[error("worker pool has been shut down")]
    PoolShutDown,
}

pub type Result<T, E = SceneError> = std::result::Result<T, E>;

/// Reject negative lengths.
pub(crate) fn non_negative(what: &'static str, value: f32) -> Result<f32> {
    if value < 0.0 || value.is_nan() {
        Err(SceneError::NegativeDimension { what, value })
    } else {
        Ok(value)
    }
}

/// Reject zero, negative and non-finite values.
pub(crate) fn strictly_positive(what: &'static str, value: f32) -> Result<f32> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(SceneError::InvalidValue { what, value })
    }
}
