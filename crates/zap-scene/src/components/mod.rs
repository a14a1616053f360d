pub mod actor;
pub mod layer;
