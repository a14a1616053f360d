use std::sync::Arc;

use crate::api::config::EngineConfig;
use crate::api::error::Result;
use crate::core::pool::StepPool;

/// Everything that used to be process-wide engine state: the validated
/// configuration and the worker pool shared by all layers of a scene.
///
/// Created once at startup and handed to scenes, layers and the frame loop.
#[derive(Clone)]
pub struct RuntimeContext {
    config: Arc<EngineConfig>,
    pool: Arc<StepPool>,
}

impl RuntimeContext {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = StepPool::new(config.worker_threads)?;
        log::info!(
            "runtime context ready: {}x{} @ {} fps",
            config.frame_width,
            config.frame_height,
            config.target_fps
        );
        Ok(Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<StepPool> {
        &self.pool
    }
}
