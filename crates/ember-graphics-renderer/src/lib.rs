//! GPU-driven renderer core.
//!
//! Three subsystems make up the heart of the crate: the render graph
//! (transient resources, derived barriers, pass scheduling), the meshlet
//! rasterizer (two-phase GPU occlusion culling into a visibility buffer)
//! and the clustered/tiled lighting pipeline with cascaded shadow maps.
//! The application shell supplies a [`core::render_view::RenderView`]
//! snapshot per frame; everything else is scheduled here.

// crate-specific lint exceptions:
#![allow(clippy::needless_pass_by_value)]

pub mod core;
pub mod gpu_data;
pub mod gpu_renderer;
pub mod lighting;
pub mod renderer;
pub mod resources;

pub use renderer::{device_desc_from_command_line, register_console_variables, Renderer};
