use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;

macro_rules! identity_token {
    ($(#[$meta:meta])* $name:ident, $counter:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        static $counter: AtomicU64 = AtomicU64::new(1);

        impl $name {
            /// Mint a fresh token. Tokens are never reused within a process.
            pub fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }
        }
    };
}

identity_token!(
    /// Unique identifier for an actor.
    ActorId,
    NEXT_ACTOR_ID
);

identity_token!(
    /// Unique identifier for a layer.
    LayerId,
    NEXT_LAYER_ID
);

identity_token!(
    /// Identifies one physics world. Every layer owns exactly one.
    WorldId,
    NEXT_WORLD_ID
);

identity_token!(
    /// Stable identity of a simulation body, minted when the body is created.
    ///
    /// Ordering follows allocation order, so `(a, b)` and `(b, a)` always
    /// canonicalize to the same pair regardless of registration order.
    BodyId,
    NEXT_BODY_ID
);

identity_token!(
    /// Handle returned by every listener registration.
    ListenerId,
    NEXT_LISTENER_ID
);

identity_token!(
    /// Identifies a joint inside a world.
    JointId,
    NEXT_JOINT_ID
);

/// Axis-aligned rectangle in world units. `(x, y)` is the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    /// Component-wise clamp of `point` into the rectangle.
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        point.clamp(self.min(), self.max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_monotonic() {
        let a = BodyId::next();
        let b = BodyId::next();
        assert!(a < b);
        assert_ne!(ActorId::next(), ActorId::next());
    }

    #[test]
    fn bounds_clamp_to_far_corner() {
        let bounds = Bounds::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(bounds.clamp(Vec2::new(500.0, 500.0)), Vec2::new(100.0, 100.0));
        assert_eq!(bounds.clamp(Vec2::new(-5.0, 40.0)), Vec2::new(0.0, 40.0));
        assert!(bounds.contains(Vec2::new(50.0, 50.0)));
        assert!(!bounds.contains(Vec2::new(101.0, 50.0)));
    }
}
