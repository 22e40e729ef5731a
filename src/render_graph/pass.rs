//! Render pass descriptors.

use super::pool::FramebufferSlot;
use crate::device::{Clear, MeshId, ProgramId, TextureId};
use crate::uniforms::{UniformValue, Uniforms};

/// What a pass renders into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PassTarget {
    /// The window surface, optionally with its depth buffer.
    Backbuffer { depth: bool },
    /// A pooled 2D framebuffer.
    Framebuffer(FramebufferSlot),
    /// Every depth slice of a pooled volume framebuffer in turn. The draws
    /// run once per slice with the `slice` uniform set to the slice index.
    VolumeSlices(FramebufferSlot),
}

impl PassTarget {
    pub fn framebuffer(&self) -> Option<FramebufferSlot> {
        match self {
            PassTarget::Backbuffer { .. } => None,
            PassTarget::Framebuffer(slot) | PassTarget::VolumeSlices(slot) => Some(*slot),
        }
    }
}

/// A texture a draw samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureSource {
    /// Color attachment of a pooled framebuffer.
    Color(FramebufferSlot),
    /// Depth attachment of a pooled framebuffer.
    Depth(FramebufferSlot),
    Texture(TextureId),
}

impl TextureSource {
    pub fn framebuffer(&self) -> Option<FramebufferSlot> {
        match self {
            TextureSource::Color(slot) | TextureSource::Depth(slot) => Some(*slot),
            TextureSource::Texture(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawGeometry {
    /// The screen-covering triangle.
    FullScreen,
    Mesh(MeshId),
}

/// One program invocation inside a pass.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawItem {
    pub program: ProgramId,
    pub uniforms: Uniforms,
    pub textures: Vec<(&'static str, TextureSource)>,
    pub geometry: DrawGeometry,
}

impl DrawItem {
    pub fn full_screen(program: ProgramId) -> Self {
        Self::new(program, DrawGeometry::FullScreen)
    }

    pub fn mesh(program: ProgramId, mesh: MeshId) -> Self {
        Self::new(program, DrawGeometry::Mesh(mesh))
    }

    fn new(program: ProgramId, geometry: DrawGeometry) -> Self {
        Self {
            program,
            uniforms: Uniforms::new(),
            textures: Vec::new(),
            geometry,
        }
    }

    pub fn uniform(mut self, name: &'static str, value: impl Into<UniformValue>) -> Self {
        self.uniforms.set(name, value);
        self
    }

    pub fn uniforms(mut self, uniforms: &Uniforms) -> Self {
        for (name, value) in uniforms.iter() {
            self.uniforms.set(name, value);
        }
        self
    }

    pub fn texture(mut self, slot: &'static str, source: TextureSource) -> Self {
        self.textures.push((slot, source));
        self
    }
}

/// A described unit of work: where to render, how to clear, what to draw.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    pub label: &'static str,
    pub target: PassTarget,
    pub clear: Clear,
    pub depth_test: bool,
    pub draws: Vec<DrawItem>,
}

impl RenderPass {
    /// A pass that loads its target and depth-tests its draws.
    pub fn new(label: &'static str, target: PassTarget) -> Self {
        Self {
            label,
            target,
            clear: Clear::load(),
            depth_test: true,
            draws: Vec::new(),
        }
    }

    pub fn clear(mut self, clear: Clear) -> Self {
        self.clear = clear;
        self
    }

    pub fn depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }

    pub fn draw(mut self, item: DrawItem) -> Self {
        self.draws.push(item);
        self
    }

    pub fn draws(mut self, items: impl IntoIterator<Item = DrawItem>) -> Self {
        self.draws.extend(items);
        self
    }

    /// Framebuffers sampled by any draw of this pass.
    pub fn reads(&self) -> impl Iterator<Item = FramebufferSlot> + '_ {
        self.draws
            .iter()
            .flat_map(|d| d.textures.iter())
            .filter_map(|(_, source)| source.framebuffer())
    }
}
