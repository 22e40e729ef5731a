//! The render device seam.
//!
//! Every GPU operation the labs perform goes through the [`Device`] trait:
//! resource creation, the depth-test switch, render pass scoping and draw
//! submission. [`WgpuDevice`](crate::WgpuDevice) implements it on top of
//! wgpu; a recording implementation backs the unit tests so sequencing can be
//! checked without a GPU.
//!
//! Resources are addressed by [`slotmap`] keys. A key stays valid across a
//! storage reallocation, which is what lets a framebuffer resize its
//! attachments in place.

use slotmap::new_key_type;

use crate::mesh::Vertex3d;
use crate::texture::TextureDesc;
use crate::uniforms::{UniformField, Uniforms};

new_key_type! {
    /// Handle to a 2D or 3D texture owned by the device.
    pub struct TextureId;
    /// Handle to a compiled shader program.
    pub struct ProgramId;
    /// Handle to a position-only vertex buffer.
    pub struct VertexArrayId;
    /// Handle to an indexed [`Vertex3d`] mesh.
    pub struct MeshId;
}

/// Where a render pass writes color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorTarget {
    /// The window surface.
    Backbuffer,
    /// A 2D texture.
    Texture(TextureId),
    /// One depth slice of a 3D texture.
    Slice { texture: TextureId, slice: u32 },
}

/// Where a render pass writes depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DepthTarget {
    None,
    /// The depth buffer paired with the window surface.
    Backbuffer,
    Texture(TextureId),
}

/// Clear values applied when a pass begins. `None` keeps existing contents.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Clear {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
}

impl Clear {
    /// Load both attachments.
    pub const fn load() -> Self {
        Self {
            color: None,
            depth: None,
        }
    }

    /// Clear color only.
    pub const fn color(rgba: [f32; 4]) -> Self {
        Self {
            color: Some(rgba),
            depth: None,
        }
    }

    /// Clear color and reset depth to the far plane.
    pub const fn color_and_depth(rgba: [f32; 4]) -> Self {
        Self {
            color: Some(rgba),
            depth: Some(1.0),
        }
    }
}

/// Parameters for [`Device::begin_pass`].
#[derive(Clone, Copy, Debug)]
pub struct PassBegin<'a> {
    pub label: &'a str,
    pub color: ColorTarget,
    pub depth: DepthTarget,
    pub clear: Clear,
    /// Viewport extent in pixels, anchored at the origin.
    pub viewport: (u32, u32),
}

/// Geometry consumed by a single draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Geometry {
    /// Non-indexed draw of `count` vertices from a position-only buffer.
    Arrays {
        vertex_array: VertexArrayId,
        count: u32,
    },
    /// Indexed draw of a whole mesh.
    Mesh(MeshId),
}

/// A single draw submission.
#[derive(Clone, Copy, Debug)]
pub struct Draw<'a> {
    pub program: ProgramId,
    pub uniforms: &'a Uniforms,
    /// Textures bound by slot name. Names the program does not declare are ignored.
    pub textures: &'a [(&'a str, TextureId)],
    pub geometry: Geometry,
}

/// Vertex input a program expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexInput {
    /// A single `vec2<f32>` position at location 0.
    FullScreen,
    /// The [`Vertex3d`] layout.
    Mesh,
}

/// How a texture slot is declared in the shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlotKind {
    /// `texture_2d<f32>` followed by a filtering sampler.
    Color2d,
    /// `texture_3d<f32>` followed by a filtering sampler.
    Color3d,
    /// `texture_depth_2d`, read with `textureLoad`, no sampler.
    Depth2d,
}

/// A named texture binding declared by a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: &'static str,
    pub kind: TextureSlotKind,
}

impl TextureSlot {
    pub const fn new(name: &'static str, kind: TextureSlotKind) -> Self {
        Self { name, kind }
    }
}

/// Color blending for a program's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Blend {
    Replace,
    Alpha,
}

/// Everything needed to build a shader program.
///
/// Bindings follow a fixed convention in group 0: the uniform block sits at
/// binding 0, texture slot `i` at binding `1 + 2i` and its sampler at
/// `2 + 2i`. Entry points are `vs` and `fs`.
#[derive(Clone, Copy, Debug)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub vertex_input: VertexInput,
    pub uniforms: &'a [UniformField],
    pub textures: &'a [TextureSlot],
    pub blend: Blend,
    pub cull_back_faces: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("shader program `{label}` failed validation: {message}")]
    Invalid { label: String, message: String },
}

/// The operations a render backend provides.
pub trait Device {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;

    /// Replaces the storage behind `texture` with a new allocation of the
    /// given extent. The handle and all sampling parameters are preserved.
    fn reallocate_texture(&mut self, texture: TextureId, width: u32, height: u32);

    fn destroy_texture(&mut self, texture: TextureId);

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, ProgramError>;

    fn create_mesh(&mut self, label: &str, vertices: &[Vertex3d], indices: &[u32]) -> MeshId;

    fn create_vertex_array(&mut self, label: &str, positions: &[[f32; 2]]) -> VertexArrayId;

    fn depth_test(&self) -> bool;

    fn set_depth_test(&mut self, enabled: bool);

    /// Starts a pass, ending any pass still open.
    fn begin_pass(&mut self, pass: &PassBegin<'_>);

    /// Issues a draw into the open pass. Draws outside a pass are dropped.
    fn draw(&mut self, draw: &Draw<'_>);

    fn end_pass(&mut self);
}
