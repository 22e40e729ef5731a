//! # render-labs
//!
//! Two real-time rendering labs on wgpu sharing one support library:
//!
//! - **Lab 3**: a free-fly camera over a small city, a car driven with the
//!   arrow keys and a second car circling a roundabout. Projection
//!   parameters are tunable from the overlay.
//! - **Lab 5**: rendering through off-screen framebuffers. A security camera
//!   renders into a texture shown on an in-scene monitor, and the main view
//!   is ray-marched through a noise-filled sphere and post-processed onto
//!   the backbuffer.
//!
//! The reusable core is [`render_graph`]: framebuffers that validate their
//! attachments at construction, a pool that follows the window size, and a
//! sequencer that runs an ordered list of [`RenderPass`] descriptors and
//! checks their cross-pass texture dependencies. All GPU work goes through
//! the [`Device`] trait, implemented by [`WgpuDevice`] for the programs and
//! by a recording device in tests.
//!
//! ## Running
//!
//! ```text
//! cargo run --bin lab3-camera
//! cargo run --bin lab5-render-to-texture -- --fighter ship.stl
//! RENDER_LABS_NOISE_BAKE=every-frame cargo run --bin lab5-render-to-texture
//! ```
//!
//! G toggles the overlay, Print Screen saves a screenshot and Escape exits.

pub mod app;
pub mod assets;
pub mod camera;
pub mod device;
pub mod error;
pub mod free_fly;
pub mod fullscreen;
pub mod gpu;
pub mod input;
pub mod lab3;
pub mod lab5;
pub mod mesh;
pub mod model;
pub mod overlay;
pub mod render_graph;
pub mod screenshot;
pub mod shaders;
pub mod texture;
pub mod uniforms;
pub mod wgpu_device;

#[cfg(test)]
mod recording_device;

pub use app::{AppConfig, Frame, SetupContext, init_logging, run_with_config};
pub use camera::Camera;
pub use device::{Clear, Device, ProgramError};
pub use error::{Error, Result};
pub use free_fly::{DragScale, FreeFlyControls, MoveKeys};
pub use gpu::{GpuContext, GpuError};
pub use input::Input;
pub use model::{Material, Model, ModelError};
pub use overlay::Overlay;
pub use render_graph::{
    DrawItem, Framebuffer, FramebufferError, FramebufferPool, FramebufferSlot, PassTarget,
    RenderPass, SequenceError, Sequencer, TextureSource,
};
pub use screenshot::ScreenshotError;
pub use wgpu_device::WgpuDevice;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
