//! Application services layer.

pub mod error;
pub mod intake;
pub mod render;
