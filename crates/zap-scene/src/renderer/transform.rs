use bytemuck::{Pod, Zeroable};
use glam::{Affine2, Mat3, Vec2};

/// World → pixel mapping of one layer for the current camera.
///
/// Composed as `T(frame center) · R(-camera rotation · rotation parallax)
/// · S(ppm, -ppm) · T(-camera position · position parallax)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerTransform {
    pub affine: Affine2,
    /// Effective pixels per meter of the layer.
    pub pixel_per_meter: f32,
}

/// GPU-side uniform: a 3x3 matrix with std140 column padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TransformUniform {
    pub world_to_pixel: [[f32; 4]; 3],
}

impl LayerTransform {
    pub fn new(
        frame_center: Vec2,
        rotation_radians: f32,
        pixel_per_meter: f32,
        camera: Vec2,
    ) -> Self {
        let affine = Affine2::from_translation(frame_center)
            * Affine2::from_angle(-rotation_radians)
            * Affine2::from_scale(Vec2::new(pixel_per_meter, -pixel_per_meter))
            * Affine2::from_translation(-camera);
        Self {
            affine,
            pixel_per_meter,
        }
    }

    pub fn world_to_pixel(&self, world: Vec2) -> Vec2 {
        self.affine.transform_point2(world)
    }

    pub fn pixel_to_world(&self, pixel: Vec2) -> Vec2 {
        self.affine.inverse().transform_point2(pixel)
    }

    pub fn uniform(&self) -> TransformUniform {
        let cols = Mat3::from(self.affine).to_cols_array_2d();
        TransformUniform {
            world_to_pixel: cols.map(|[x, y, z]| [x, y, z, 0.0]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_frame_center() {
        let t = LayerTransform::new(Vec2::new(400.0, 300.0), 0.0, 30.0, Vec2::ZERO);
        let p = t.world_to_pixel(Vec2::ZERO);
        assert!((p - Vec2::new(400.0, 300.0)).length() < 1e-4);
    }

    #[test]
    fn y_axis_is_flipped() {
        let t = LayerTransform::new(Vec2::new(400.0, 300.0), 0.0, 30.0, Vec2::ZERO);
        let p = t.world_to_pixel(Vec2::new(1.0, 1.0));
        assert!((p - Vec2::new(430.0, 270.0)).length() < 1e-4);
    }

    #[test]
    fn inverse_round_trips_with_rotation() {
        let t = LayerTransform::new(
            Vec2::new(320.0, 240.0),
            0.6,
            12.0,
            Vec2::new(5.0, -2.0),
        );
        let world = Vec2::new(-3.5, 7.25);
        let back = t.pixel_to_world(t.world_to_pixel(world));
        assert!((back - world).length() < 1e-3);
    }

    #[test]
    fn uniform_is_padded_columns() {
        let t = LayerTransform::new(Vec2::new(10.0, 20.0), 0.0, 2.0, Vec2::ZERO);
        let u = t.uniform();
        assert_eq!(u.world_to_pixel[0], [2.0, 0.0, 0.0, 0.0]);
        assert_eq!(u.world_to_pixel[1], [0.0, -2.0, 0.0, 0.0]);
        assert_eq!(u.world_to_pixel[2], [10.0, 20.0, 1.0, 0.0]);
        assert_eq!(bytemuck::bytes_of(&u).len(), 48);
    }
}
