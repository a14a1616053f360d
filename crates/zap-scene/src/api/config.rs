use std::time::Duration;

use glam::Vec2;
use serde::Deserialize;

use crate::api::error::{strictly_positive, Result};

/// Debug switches. These used to be process-wide flags; they now travel
/// with the runtime context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebugFlags {
    /// Produce collider/joint outlines in `Scene::debug_overlay`.
    pub draw_colliders: bool,
    /// Log frame statistics once per second at debug level.
    pub verbose: bool,
}

/// Engine configuration. Every field has a default, so a host can
/// deserialize a partial JSON document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frame width in pixels (default: 800).
    pub frame_width: f32,
    /// Frame height in pixels (default: 600).
    pub frame_height: f32,
    /// Target frames per second of the frame loop (default: 60).
    pub target_fps: u32,
    /// Gravity of newly created layer worlds, in m/s². Y points up.
    pub gravity: Vec2,
    /// Pixel-per-meter constant of newly created worlds (default: 30).
    pub pixel_per_meter: f32,
    /// Initial camera zoom in pixels per meter (default: 30).
    pub camera_zoom: f32,
    /// Step worker threads. 0 lets rayon pick.
    pub worker_threads: usize,
    /// How long teardown waits for in-flight step tasks (default: 500 ms).
    pub shutdown_grace_ms: u64,
    pub debug: DebugFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_width: 800.0,
            frame_height: 600.0,
            target_fps: 60,
            gravity: Vec2::new(0.0, -9.81),
            pixel_per_meter: 30.0,
            camera_zoom: 30.0,
            worker_threads: 0,
            shutdown_grace_ms: 500,
            debug: DebugFlags::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        strictly_positive("frame width", self.frame_width)?;
        strictly_positive("frame height", self.frame_height)?;
        strictly_positive("target fps", self.target_fps as f32)?;
        strictly_positive("pixel per meter", self.pixel_per_meter)?;
        strictly_positive("camera zoom", self.camera_zoom)?;
        Ok(())
    }

    pub fn frame_size(&self) -> Vec2 {
        Vec2::new(self.frame_width, self.frame_height)
    }

    pub fn target_frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::SceneError;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "frame_width": 1280, "debug": { "verbose": true } }"#,
        )
        .unwrap();
        assert_eq!(config.frame_width, 1280.0);
        assert_eq!(config.frame_height, 600.0);
        assert!(config.debug.verbose);
        assert!(!config.debug.draw_colliders);
        assert_eq!(config.gravity, Vec2::new(0.0, -9.81));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let err = EngineConfig::from_json(r#"{ "target_fps": 0 }"#).unwrap_err();
        assert!(matches!(err, SceneError::InvalidValue { .. }));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json("{ frame_width: ").unwrap_err();
        assert!(matches!(err, SceneError::Config(_)));
    }

    #[test]
    fn target_frame_duration_matches_fps() {
        let config = EngineConfig { target_fps: 50, ..Default::default() };
        assert_eq!(config.target_frame_duration(), Duration::from_millis(20));
    }
}
