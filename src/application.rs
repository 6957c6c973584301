//! Application layer module
//!
//! Operations that combine a document with its session: pagination and
//! rendering.

pub mod pagination;
pub mod render;

pub use pagination::Pages;
pub use render::RenderOptions;
