//! Drawable models: uploaded mesh parts that reference a material table.
//!
//! A [`Model`] is built from CPU-side [`MeshData`] (procedural or parsed
//! from STL) and turned into [`DrawItem`]s each frame. Materials carry an
//! optional emission texture, which is how a pass consumes another pass's
//! output: the landing pad's screen material points at the security
//! camera's framebuffer.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3, Vec4};

use crate::device::{Device, MeshId, ProgramId};
use crate::mesh::{MeshData, Vertex3d};
use crate::render_graph::{DrawItem, TextureSource};
use crate::uniforms::Uniforms;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported model format `{0}`, expected .stl")]
    UnknownFormat(String),
    #[error("failed to parse STL data")]
    Stl(#[source] std::io::Error),
    #[error("model `{0}` has no triangles")]
    Empty(String),
}

/// Surface parameters shared by the parts that reference them.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Vec4,
    pub emission: Vec3,
    /// Sampled and added to the emission when present.
    pub emission_texture: Option<TextureSource>,
}

impl Material {
    pub fn new(name: impl Into<String>, color: Vec4) -> Self {
        Self {
            name: name.into(),
            color,
            emission: Vec3::ZERO,
            emission_texture: None,
        }
    }

    pub fn emissive(mut self, emission: Vec3) -> Self {
        self.emission = emission;
        self
    }

    pub fn emission_texture(mut self, source: TextureSource) -> Self {
        self.emission_texture = Some(source);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPart {
    pub mesh: MeshId,
    /// Index into the model's material table.
    pub material: usize,
}

#[derive(Clone, Debug)]
pub struct Model {
    name: String,
    parts: Vec<ModelPart>,
    materials: Vec<Material>,
}

impl Model {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            parts: Vec::new(),
            materials: Vec::new(),
        }
    }

    /// Loads an STL file as a single-material model.
    ///
    /// `transform` is applied to the parsed geometry before upload.
    pub fn load_stl<D: Device>(
        device: &mut D,
        path: impl AsRef<Path>,
        transform: Mat4,
        material: Material,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let data = load_stl(path)?.transformed(transform);
        log::info!(
            "loaded `{}` ({} triangles)",
            path.display(),
            data.triangle_count()
        );
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();
        Model::builder(name)
            .material(material)
            .part(data, 0)
            .build(device)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parts(&self) -> &[ModelPart] {
        &self.parts
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn material_mut(&mut self, index: usize) -> Option<&mut Material> {
        self.materials.get_mut(index)
    }

    /// One draw per part, with `base` plus the part's material uniforms.
    pub fn draw_items<'a>(
        &'a self,
        program: ProgramId,
        base: &'a Uniforms,
    ) -> impl Iterator<Item = DrawItem> + 'a {
        self.parts.iter().map(move |part| {
            let mut item = DrawItem::mesh(program, part.mesh).uniforms(base);
            let Some(material) = self.materials.get(part.material) else {
                return item;
            };
            item = item
                .uniform("material_color", material.color)
                .uniform("material_emission", material.emission)
                .uniform(
                    "has_emission_texture",
                    material.emission_texture.is_some() as i32,
                );
            if let Some(source) = material.emission_texture {
                item = item.texture("emission_texture", source);
            }
            item
        })
    }
}

/// Collects parts and materials, then uploads them in one go.
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    parts: Vec<(MeshData, usize)>,
    materials: Vec<Material>,
}

impl ModelBuilder {
    /// Appends a material; the first one added is index 0.
    pub fn material(mut self, material: Material) -> Self {
        self.materials.push(material);
        self
    }

    pub fn part(mut self, data: MeshData, material: usize) -> Self {
        self.parts.push((data, material));
        self
    }

    pub fn build<D: Device>(self, device: &mut D) -> Result<Model, ModelError> {
        if self.parts.iter().all(|(data, _)| data.is_empty()) {
            return Err(ModelError::Empty(self.name));
        }
        let parts = self
            .parts
            .iter()
            .filter(|(data, _)| !data.is_empty())
            .enumerate()
            .map(|(i, (data, material))| ModelPart {
                mesh: data.upload(device, &format!("{} part {i}", self.name)),
                material: *material,
            })
            .collect();
        Ok(Model {
            name: self.name,
            parts,
            materials: self.materials,
        })
    }
}

/// Reads an STL file (binary or ASCII) from disk.
pub fn load_stl(path: &Path) -> Result<MeshData, ModelError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    if ext != "stl" {
        return Err(ModelError::UnknownFormat(ext));
    }
    let file = std::fs::File::open(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_stl(&mut std::io::BufReader::new(file))
}

/// Parses STL data into flat-shaded triangles. STL carries no UVs.
pub fn parse_stl<R: Read + Seek>(reader: &mut R) -> Result<MeshData, ModelError> {
    let stl = stl_io::read_stl(reader).map_err(ModelError::Stl)?;

    let mut vertices = Vec::with_capacity(stl.faces.len() * 3);
    let mut indices = Vec::with_capacity(stl.faces.len() * 3);
    for face in &stl.faces {
        let normal: [f32; 3] = face.normal.into();
        for &index in &face.vertices {
            let position: [f32; 3] = stl.vertices[index].into();
            indices.push(vertices.len() as u32);
            vertices.push(Vertex3d::new(position, normal, [0.0, 0.0]));
        }
    }
    Ok(MeshData::new(vertices, indices))
}
