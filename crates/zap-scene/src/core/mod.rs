pub mod collision;
pub mod frame_loop;
pub mod handler;
pub mod physics;
pub mod pool;
pub mod scene;
