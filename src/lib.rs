//! Tile-based forward rasterizer for oriented 2D Gaussian surfels.
//!
//! A frame runs in three passes: [`render::pipeline::preprocess_splats`] projects every
//! primitive into a per-primitive arena, [`sort::bin_splats`] duplicates visible primitives
//! per touched tile and orders them front to back, and [`render::rasterizer::rasterize_tiles`]
//! composites each 16x16 tile. [`render::render_frame`] drives all three.

pub mod camera;
pub mod config;
pub mod demo;
pub mod error;
pub mod math;
pub mod parser;
pub mod project;
pub mod render;
pub mod sh;
pub mod sort;
pub mod splat;

pub use camera::{Camera, Intrinsics};
pub use config::RasterConfig;
pub use error::{RenderError, SceneLoadError};
pub use render::{render_frame, FrameBuffers, RenderOutput};
pub use splat::{ProjectedSplat, SplatScene, Transmat};
