//! A [`Device`] that records commands instead of touching a GPU.
//!
//! Unit tests drive framebuffers, the sequencer and whole lab frames through
//! this device and then inspect the command log.

use slotmap::SlotMap;

use crate::device::{
    Clear, ColorTarget, DepthTarget, Device, Draw, Geometry, MeshId, PassBegin, ProgramDesc,
    ProgramError, ProgramId, TextureId, VertexArrayId,
};
use crate::mesh::Vertex3d;
use crate::texture::TextureDesc;
use crate::uniforms::Uniforms;

/// A draw as the device saw it.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub geometry: Geometry,
    pub depth_test: bool,
    pub uniforms: Uniforms,
    pub textures: Vec<(String, TextureId)>,
    /// Color target of the pass the draw landed in.
    pub target: ColorTarget,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateTexture { id: TextureId, label: String },
    ReallocateTexture { id: TextureId, width: u32, height: u32 },
    DestroyTexture(TextureId),
    CreateProgram { id: ProgramId, label: String },
    CreateMesh { id: MeshId, label: String },
    CreateVertexArray { id: VertexArrayId, label: String },
    SetDepthTest(bool),
    BeginPass {
        label: String,
        color: ColorTarget,
        depth: DepthTarget,
        clear: Clear,
        viewport: (u32, u32),
    },
    Draw(DrawRecord),
    EndPass,
}

#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub commands: Vec<Command>,
    textures: SlotMap<TextureId, TextureDesc>,
    programs: SlotMap<ProgramId, String>,
    meshes: SlotMap<MeshId, usize>,
    vertex_arrays: SlotMap<VertexArrayId, Vec<[f32; 2]>>,
    depth_test: bool,
    open_pass: Option<ColorTarget>,
    /// When set, `create_program` fails for programs with this label.
    pub reject_program: Option<&'static str>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            depth_test: true,
            ..Default::default()
        }
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(id)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn program_label(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(id).map(String::as_str)
    }

    pub fn vertex_array_positions(&self, id: VertexArrayId) -> Option<Vec<[f32; 2]>> {
        self.vertex_arrays.get(id).cloned()
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|c| match c {
            Command::Draw(record) => Some(record),
            _ => None,
        })
    }

    pub fn passes(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|c| match c {
            Command::BeginPass { label, .. } => Some(label.as_str()),
            _ => None,
        })
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_log(&mut self) {
        self.commands.clear();
    }
}

impl Device for RecordingDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = self.textures.insert(desc.clone());
        self.commands.push(Command::CreateTexture {
            id,
            label: desc.label.clone(),
        });
        id
    }

    fn reallocate_texture(&mut self, texture: TextureId, width: u32, height: u32) {
        if let Some(desc) = self.textures.get_mut(texture) {
            *desc = desc.resized(width, height);
        }
        self.commands.push(Command::ReallocateTexture {
            id: texture,
            width,
            height,
        });
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(texture);
        self.commands.push(Command::DestroyTexture(texture));
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, ProgramError> {
        if self.reject_program == Some(desc.label) {
            return Err(ProgramError::Invalid {
                label: desc.label.to_string(),
                message: "rejected by test".to_string(),
            });
        }
        let id = self.programs.insert(desc.label.to_string());
        self.commands.push(Command::CreateProgram {
            id,
            label: desc.label.to_string(),
        });
        Ok(id)
    }

    fn create_mesh(&mut self, label: &str, _vertices: &[Vertex3d], indices: &[u32]) -> MeshId {
        let id = self.meshes.insert(indices.len());
        self.commands.push(Command::CreateMesh {
            id,
            label: label.to_string(),
        });
        id
    }

    fn create_vertex_array(&mut self, label: &str, positions: &[[f32; 2]]) -> VertexArrayId {
        let id = self.vertex_arrays.insert(positions.to_vec());
        self.commands.push(Command::CreateVertexArray {
            id,
            label: label.to_string(),
        });
        id
    }

    fn depth_test(&self) -> bool {
        self.depth_test
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
        self.commands.push(Command::SetDepthTest(enabled));
    }

    fn begin_pass(&mut self, pass: &PassBegin<'_>) {
        if self.open_pass.is_some() {
            self.end_pass();
        }
        self.open_pass = Some(pass.color);
        self.commands.push(Command::BeginPass {
            label: pass.label.to_string(),
            color: pass.color,
            depth: pass.depth,
            clear: pass.clear,
            viewport: pass.viewport,
        });
    }

    fn draw(&mut self, draw: &Draw<'_>) {
        let Some(target) = self.open_pass else {
            return;
        };
        self.commands.push(Command::Draw(DrawRecord {
            program: draw.program,
            geometry: draw.geometry,
            depth_test: self.depth_test,
            uniforms: draw.uniforms.clone(),
            textures: draw
                .textures
                .iter()
                .map(|(name, id)| (name.to_string(), *id))
                .collect(),
            target,
        }));
    }

    fn end_pass(&mut self) {
        if self.open_pass.take().is_some() {
            self.commands.push(Command::EndPass);
        }
    }
}
