//! Debug outlines for colliders and joints.
//!
//! Outlines are world-space polylines; the render sink maps them through the
//! layer transform like everything else.

use glam::Vec2;

use crate::api::types::BodyId;
use crate::core::physics::{FixtureShape, JointInfo, JointKind, WorldHandler};

const CIRCLE_SEGMENTS: usize = 24;
const SPRING_COILS: usize = 8;

/// What an outline was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineKind {
    Fixture,
    Joint(JointKind),
}

/// One open or closed polyline in world meters.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugOutline {
    pub kind: OutlineKind,
    pub points: Vec<Vec2>,
}

/// Outlines of every fixture and joint in `world`.
pub fn world_outlines(world: &WorldHandler) -> Vec<DebugOutline> {
    let mut outlines = Vec::new();
    let mut bodies: Vec<BodyId> = world.body_ids().collect();
    bodies.sort();
    for body in bodies {
        let Some((pos, rot)) = world.body_pose(body) else {
            continue;
        };
        for shape in world.fixtures(body) {
            outlines.push(DebugOutline {
                kind: OutlineKind::Fixture,
                points: fixture_outline(pos, rot, &shape),
            });
        }
    }
    for joint in world.joints() {
        if let Some(points) = joint_outline(world, &joint) {
            outlines.push(DebugOutline {
                kind: OutlineKind::Joint(joint.desc.kind()),
                points,
            });
        }
    }
    outlines
}

/// Closed outline of one fixture placed at `pos`, rotated by `rot` radians.
pub fn fixture_outline(pos: Vec2, rot: f32, shape: &FixtureShape) -> Vec<Vec2> {
    let rotation = Vec2::from_angle(rot);
    let place = |local: Vec2| pos + rotation.rotate(local);
    let mut points: Vec<Vec2> = match shape {
        FixtureShape::Circle { center, radius } => (0..CIRCLE_SEGMENTS)
            .map(|i| {
                let angle = i as f32 / CIRCLE_SEGMENTS as f32 * std::f32::consts::TAU;
                place(*center + Vec2::from_angle(angle) * *radius)
            })
            .collect(),
        FixtureShape::Rectangle {
            center,
            half_extents: h,
        } => [
            Vec2::new(-h.x, -h.y),
            Vec2::new(h.x, -h.y),
            Vec2::new(h.x, h.y),
            Vec2::new(-h.x, h.y),
        ]
        .into_iter()
        .map(|corner| place(*center + corner))
        .collect(),
        FixtureShape::Polygon { points } => points.iter().map(|p| place(*p)).collect(),
    };
    // Close the loop
    if let Some(&first) = points.first() {
        points.push(first);
    }
    points
}

fn joint_outline(world: &WorldHandler, joint: &JointInfo) -> Option<Vec<Vec2>> {
    let (local_a, local_b) = joint.desc.anchors();
    let a = world.local_to_world(joint.body_a, local_a)?;
    let b = world.local_to_world(joint.body_b, local_b)?;
    let points = match joint.desc.kind() {
        JointKind::Fixed | JointKind::Rope => vec![a, b],
        // Hinge: a small diamond around the anchor, then the link.
        JointKind::Revolute => {
            let r = 0.1;
            vec![
                a + Vec2::new(r, 0.0),
                a + Vec2::new(0.0, r),
                a - Vec2::new(r, 0.0),
                a - Vec2::new(0.0, r),
                a + Vec2::new(r, 0.0),
                b,
            ]
        }
        JointKind::Spring => zigzag(a, b),
        // Slider: the link plus a tick across the axis at each end.
        JointKind::Prismatic => {
            let dir = (b - a).normalize_or_zero().perp() * 0.1;
            vec![a + dir, a - dir, a, b, b + dir, b - dir]
        }
    };
    Some(points)
}

fn zigzag(a: Vec2, b: Vec2) -> Vec<Vec2> {
    let along = b - a;
    let side = along.normalize_or_zero().perp() * 0.1;
    let steps = SPRING_COILS * 2;
    let mut points = Vec::with_capacity(steps + 1);
    points.push(a);
    for i in 1..steps {
        let t = i as f32 / steps as f32;
        let sign = if i % 2 == 0 { -1.0 } else { 1.0 };
        points.push(a + along * t + side * sign);
    }
    points.push(b);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ActorId;
    use crate::core::physics::{JointDesc, PhysicsState};

    #[test]
    fn rectangle_outline_is_closed_and_rotated() {
        let shape = FixtureShape::Rectangle {
            center: Vec2::ZERO,
            half_extents: Vec2::new(2.0, 1.0),
        };
        let points = fixture_outline(
            Vec2::new(10.0, 0.0),
            std::f32::consts::FRAC_PI_2,
            &shape,
        );
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], points[4]);
        // (-2, -1) rotated a quarter turn is (1, -2)
        assert!((points[0] - Vec2::new(11.0, -2.0)).length() < 1e-5);
    }

    #[test]
    fn circle_outline_has_all_segments() {
        let shape = FixtureShape::Circle {
            center: Vec2::ZERO,
            radius: 1.0,
        };
        let points = fixture_outline(Vec2::ZERO, 0.0, &shape);
        assert_eq!(points.len(), CIRCLE_SEGMENTS + 1);
        assert!(points.iter().all(|p| (p.length() - 1.0).abs() < 1e-5));
    }

    #[test]
    fn world_outlines_cover_fixtures_and_joints() {
        let (mut world, _rx) = WorldHandler::new(Vec2::ZERO, 30.0);
        let ball = [FixtureShape::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        }];
        let a = world.create_body(ActorId::next(), &PhysicsState::default(), &ball);
        let b = world.create_body(
            ActorId::next(),
            &PhysicsState::default().with_position(Vec2::new(3.0, 0.0)),
            &ball,
        );
        world
            .create_joint(
                a,
                b,
                &JointDesc::Spring {
                    anchor_a: Vec2::ZERO,
                    anchor_b: Vec2::ZERO,
                    rest_length: 3.0,
                    stiffness: 10.0,
                    damping: 1.0,
                },
            )
            .unwrap();

        let outlines = world_outlines(&world);
        assert_eq!(outlines.len(), 3);
        let spring = outlines
            .iter()
            .find(|o| o.kind == OutlineKind::Joint(JointKind::Spring))
            .unwrap();
        assert_eq!(spring.points.first(), Some(&Vec2::ZERO));
        assert!((spring.points.last().unwrap().x - 3.0).abs() < 1e-5);
    }
}
