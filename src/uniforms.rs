//! Named uniform values and their packing into WGSL uniform blocks.
//!
//! Programs declare their uniform block as an ordered list of
//! [`UniformField`]s mirroring the WGSL struct. [`UniformLayout`] computes
//! the byte offsets WGSL assigns to those fields, and [`UniformLayout::pack`]
//! writes a frame's [`Uniforms`] into a staging buffer.
//!
//! Setting a name the program does not declare, or a value of the wrong
//! kind, has no effect.

use glam::{Mat4, Vec2, Vec3, Vec4};

/// The scalar, vector and matrix kinds a uniform block can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    /// Size in bytes inside a uniform block.
    pub const fn size(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
        }
    }

    /// Required alignment in bytes inside a uniform block.
    pub const fn align(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 | UniformKind::Vec4 | UniformKind::Mat4 => 16,
        }
    }
}

/// A uniform value as set by a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    fn write(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Int(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec3(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec4(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Mat4(m) => {
                out.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()))
            }
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

/// One field of a program's uniform block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformField {
    pub name: &'static str,
    pub kind: UniformKind,
}

impl UniformField {
    pub const fn new(name: &'static str, kind: UniformKind) -> Self {
        Self { name, kind }
    }
}

/// A set of named uniform values, recomputed every frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Uniforms {
    values: Vec<(&'static str, UniformValue)>,
}

impl Uniforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Uniforms::set`].
    pub fn with(mut self, name: &'static str, value: impl Into<UniformValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets `name`, replacing any earlier value.
    pub fn set(&mut self, name: &'static str, value: impl Into<UniformValue>) {
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, UniformValue)> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Byte layout of a uniform block following WGSL's uniform address space rules.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformLayout {
    fields: Vec<(UniformField, usize)>,
    size: usize,
}

impl UniformLayout {
    pub fn new(fields: &[UniformField]) -> Self {
        let mut offset = 0;
        let mut laid_out = Vec::with_capacity(fields.len());
        for field in fields {
            offset = align_to(offset, field.kind.align());
            laid_out.push((*field, offset));
            offset += field.kind.size();
        }
        Self {
            fields: laid_out,
            size: align_to(offset, 16),
        }
    }

    /// Total block size in bytes, a multiple of 16. Zero for an empty block.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|(field, _)| field.name == name)
            .map(|(_, offset)| *offset)
    }

    /// Writes every recognised value of `uniforms` into `out`, which must be
    /// at least [`UniformLayout::size`] bytes long. Returns how many values
    /// were written.
    pub fn pack(&self, uniforms: &Uniforms, out: &mut [u8]) -> usize {
        let mut written = 0;
        for (name, value) in uniforms.iter() {
            let Some((field, offset)) = self.fields.iter().find(|(f, _)| f.name == name) else {
                log::trace!("uniform `{name}` not declared by program, ignored");
                continue;
            };
            if field.kind != value.kind() {
                log::trace!(
                    "uniform `{name}` expects {:?}, got {:?}, ignored",
                    field.kind,
                    value.kind()
                );
                continue;
            }
            let end = offset + field.kind.size();
            if end > out.len() {
                continue;
            }
            value.write(&mut out[*offset..end]);
            written += 1;
        }
        written
    }
}

fn align_to(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}
