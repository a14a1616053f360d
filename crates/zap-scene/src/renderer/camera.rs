use glam::Vec2;

use crate::api::error::{non_negative, Result, SceneError};
use crate::api::types::Bounds;
use crate::components::actor::Actor;

/// Scene camera. Positions are in world meters, zoom in pixels per meter,
/// rotation in degrees.
pub struct Camera {
    position: Vec2,
    zoom: f32,
    rotation: f32,
    offset: Vec2,
    /// Optional area the camera may not leave.
    bounds: Option<Bounds>,
    /// When set, the camera jumps to this actor's center every frame.
    focus: Option<Actor>,
}

impl Camera {
    pub fn new(zoom: f32) -> Result<Self> {
        let mut camera = Self {
            position: Vec2::ZERO,
            zoom: 1.0,
            rotation: 0.0,
            offset: Vec2::ZERO,
            bounds: None,
            focus: None,
        };
        camera.set_zoom(zoom)?;
        Ok(camera)
    }

    /// Recompute the viewpoint. Called once per frame before rendering.
    pub fn update(&mut self) {
        if let Some(focus) = &self.focus {
            self.position = focus.center();
        }
        self.position = self.clamp(self.position);
    }

    /// Effective position: the clamped position plus the offset, clamped
    /// again so the offset cannot leave the bounds either.
    pub fn position(&self) -> Vec2 {
        self.clamp(self.clamp(self.position) + self.offset)
    }

    /// Position as last set or followed, before offset and clamping.
    pub fn raw_position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) -> Result<()> {
        if !(zoom > 0.0 && zoom.is_finite()) {
            return Err(SceneError::InvalidZoom(zoom));
        }
        self.zoom = zoom;
        Ok(())
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = degrees;
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        self.offset = offset;
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Bounds) -> Result<()> {
        non_negative("bounds width", bounds.width)?;
        non_negative("bounds height", bounds.height)?;
        self.bounds = Some(bounds);
        Ok(())
    }

    pub fn clear_bounds(&mut self) {
        self.bounds = None;
    }

    pub fn focus(&self) -> Option<&Actor> {
        self.focus.as_ref()
    }

    pub fn set_focus(&mut self, actor: Option<&Actor>) {
        self.focus = actor.cloned();
    }

    /// Convert a pixel position in a frame of `frame_size` to world meters,
    /// against the main layer (no parallax).
    pub fn screen_to_world(&self, frame_size: Vec2, screen: Vec2) -> Vec2 {
        let from_center = screen - frame_size / 2.0;
        let rotated = Vec2::from_angle(self.rotation.to_radians()).rotate(from_center);
        Vec2::new(rotated.x, -rotated.y) / self.zoom + self.position()
    }

    /// Inverse of [`Camera::screen_to_world`].
    pub fn world_to_screen(&self, frame_size: Vec2, world: Vec2) -> Vec2 {
        let delta = (world - self.position()) * self.zoom;
        let unrotated = Vec2::from_angle(-self.rotation.to_radians())
            .rotate(Vec2::new(delta.x, -delta.y));
        frame_size / 2.0 + unrotated
    }

    fn clamp(&self, point: Vec2) -> Vec2 {
        match &self.bounds {
            Some(bounds) => bounds.clamp(point),
            None => point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::actor::ActorKind;

    #[test]
    fn zoom_must_be_positive() {
        assert!(matches!(Camera::new(0.0), Err(SceneError::InvalidZoom(_))));
        let mut cam = Camera::new(30.0).unwrap();
        assert!(cam.set_zoom(-2.0).is_err());
        assert_eq!(cam.zoom(), 30.0);
    }

    #[test]
    fn negative_bounds_are_rejected() {
        let mut cam = Camera::new(1.0).unwrap();
        let err = cam.set_bounds(Bounds::new(0.0, 0.0, -1.0, 10.0)).unwrap_err();
        assert!(matches!(err, SceneError::NegativeDimension { .. }));
        assert!(cam.bounds().is_none());
    }

    #[test]
    fn focus_is_clamped_to_far_corner() {
        let actor = Actor::new(ActorKind::Rectangle, Vec2::ONE);
        actor.set_position(Vec2::new(500.0, 500.0));
        let mut cam = Camera::new(30.0).unwrap();
        cam.set_bounds(Bounds::new(0.0, 0.0, 100.0, 100.0)).unwrap();
        cam.set_focus(Some(&actor));
        cam.update();
        assert_eq!(cam.position(), Vec2::new(100.0, 100.0));
    }

    #[test]
    fn focus_follows_every_update() {
        let actor = Actor::new(ActorKind::Rectangle, Vec2::ONE);
        let mut cam = Camera::new(30.0).unwrap();
        cam.set_focus(Some(&actor));
        actor.set_position(Vec2::new(3.0, 4.0));
        cam.update();
        assert_eq!(cam.position(), Vec2::new(3.0, 4.0));
        actor.set_position(Vec2::new(-1.0, 0.0));
        cam.update();
        assert_eq!(cam.position(), Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn offset_is_clamped_too() {
        let mut cam = Camera::new(30.0).unwrap();
        cam.set_bounds(Bounds::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        cam.set_position(Vec2::new(8.0, 5.0));
        cam.set_offset(Vec2::new(5.0, 1.0));
        cam.update();
        assert_eq!(cam.position(), Vec2::new(10.0, 6.0));
    }

    #[test]
    fn frame_center_is_camera_position() {
        let mut cam = Camera::new(30.0).unwrap();
        cam.set_position(Vec2::new(2.0, -1.0));
        let frame = Vec2::new(800.0, 600.0);
        assert_eq!(cam.screen_to_world(frame, frame / 2.0), Vec2::new(2.0, -1.0));
    }

    #[test]
    fn screen_to_world_flips_y_and_scales() {
        let cam = Camera::new(30.0).unwrap();
        let frame = Vec2::new(800.0, 600.0);
        let world = cam.screen_to_world(frame, Vec2::new(430.0, 270.0));
        assert!((world - Vec2::new(1.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn screen_world_round_trip_with_rotation() {
        let mut cam = Camera::new(25.0).unwrap();
        cam.set_position(Vec2::new(4.0, 2.0));
        cam.set_rotation(37.0);
        let frame = Vec2::new(640.0, 480.0);
        let screen = Vec2::new(100.0, 410.0);
        let back = cam.world_to_screen(frame, cam.screen_to_world(frame, screen));
        assert!((back - screen).length() < 1e-3);
    }
}
