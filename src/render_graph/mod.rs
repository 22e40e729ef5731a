//! Off-screen framebuffers and the pass sequencer that renders through them.
//!
//! A frame is described as an ordered list of [`RenderPass`] descriptors.
//! Each pass names a target (a pooled [`Framebuffer`], the slices of a pooled
//! volume, or the backbuffer), a clear value, a depth-test flag and the draws
//! to issue. Later passes sample earlier passes' attachments through
//! [`TextureSource`]s, which makes every cross-pass dependency an explicit
//! edge the [`Sequencer`] can check.
//!
//! ```text
//!  security cam ──▶ [0] ──▶ monitor material ──▶ main cam
//!  main cam ──────▶ [1] color + depth ──┐
//!  noise bake ────▶ [3] volume ─────────┴──▶ volumetric ──▶ [2] ──▶ composite ──▶ backbuffer
//! ```
//!
//! # Example
//!
//! ```ignore
//! let passes = vec![
//!     RenderPass::new("security camera", PassTarget::Framebuffer(SECURITY))
//!         .clear(Clear::color_and_depth([0.2, 0.2, 0.8, 1.0]))
//!         .draws(scene.draw_items(&security_view, &security_proj)),
//!     RenderPass::new("composite", PassTarget::Backbuffer { depth: false })
//!         .draw(DrawItem::full_screen(post_fx).texture("frame", TextureSource::Color(SECURITY))),
//! ];
//! sequencer.execute(&mut device, &mut pool, &passes, (width, height))?;
//! ```

mod framebuffer;
mod pass;
mod pool;
mod sequencer;

pub use framebuffer::{check_completeness, Framebuffer, FramebufferError, Incompleteness};
pub use pass::{DrawGeometry, DrawItem, PassTarget, RenderPass, TextureSource};
pub use pool::{FramebufferPool, FramebufferSlot};
pub use sequencer::{SequenceError, Sequencer, SLICE_UNIFORM};
