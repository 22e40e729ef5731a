//! The shader programs both labs use.
//!
//! Each constant pairs a WGSL source with the uniform fields and texture
//! slots its bind group declares. Field lists follow the WGSL struct order
//! so [`UniformLayout`](crate::uniforms::UniformLayout) lands on the same
//! offsets. Full-screen programs share the vertex stage in
//! `shaders/fullscreen.wgsl`.

use crate::device::{Blend, ProgramDesc, TextureSlot, TextureSlotKind, VertexInput};
use crate::uniforms::{UniformField, UniformKind};

macro_rules! full_screen_source {
    ($file:literal) => {
        concat!(include_str!("shaders/fullscreen.wgsl"), include_str!($file))
    };
}

const fn field(name: &'static str, kind: UniformKind) -> UniformField {
    UniformField::new(name, kind)
}

/// Lab 3 meshes: a lit flat color.
pub const SIMPLE: ProgramDesc<'static> = ProgramDesc {
    label: "simple",
    source: include_str!("shaders/simple.wgsl"),
    vertex_input: VertexInput::Mesh,
    uniforms: &[
        field("model_view_projection_matrix", UniformKind::Mat4),
        field("model_matrix", UniformKind::Mat4),
        field("material_color", UniformKind::Vec4),
    ],
    textures: &[],
    blend: Blend::Replace,
    cull_back_faces: false,
};

pub const BACKGROUND: ProgramDesc<'static> = ProgramDesc {
    label: "background",
    source: full_screen_source!("shaders/background.wgsl"),
    vertex_input: VertexInput::FullScreen,
    uniforms: &[
        field("inverse_view_projection_matrix", UniformKind::Mat4),
        field("camera_position", UniformKind::Vec3),
        field("environment_multiplier", UniformKind::Float),
    ],
    textures: &[],
    blend: Blend::Replace,
    cull_back_faces: false,
};

/// Lab 5 meshes: point light, ambient sky and emission.
pub const SHADING: ProgramDesc<'static> = ProgramDesc {
    label: "shading",
    source: include_str!("shaders/shading.wgsl"),
    vertex_input: VertexInput::Mesh,
    uniforms: &[
        field("model_view_projection_matrix", UniformKind::Mat4),
        field("model_view_matrix", UniformKind::Mat4),
        field("normal_matrix", UniformKind::Mat4),
        field("view_inverse", UniformKind::Mat4),
        field("view_space_light_position", UniformKind::Vec3),
        field("point_light_intensity_multiplier", UniformKind::Float),
        field("point_light_color", UniformKind::Vec3),
        field("environment_multiplier", UniformKind::Float),
        field("material_color", UniformKind::Vec4),
        field("material_emission", UniformKind::Vec3),
        field("has_emission_texture", UniformKind::Int),
    ],
    textures: &[TextureSlot::new("emission_texture", TextureSlotKind::Color2d)],
    blend: Blend::Replace,
    cull_back_faces: true,
};

/// Writes one slice of the noise volume; `slice` is set per slice.
pub const NOISE: ProgramDesc<'static> = ProgramDesc {
    label: "noise",
    source: full_screen_source!("shaders/noise.wgsl"),
    vertex_input: VertexInput::FullScreen,
    uniforms: &[
        field("slice", UniformKind::Int),
        field("volume_depth", UniformKind::Int),
    ],
    textures: &[],
    blend: Blend::Replace,
    cull_back_faces: false,
};

pub const VOLUMETRIC: ProgramDesc<'static> = ProgramDesc {
    label: "volumetric",
    source: full_screen_source!("shaders/volumetric.wgsl"),
    vertex_input: VertexInput::FullScreen,
    uniforms: &[
        field("inverse_view_projection_matrix", UniformKind::Mat4),
        field("view_projection_matrix", UniformKind::Mat4),
        field("camera_position", UniformKind::Vec3),
        field("sphere_radius", UniformKind::Float),
        field("sphere_center", UniformKind::Vec3),
        field("density", UniformKind::Float),
        field("normalize_factors", UniformKind::Vec2),
        field("width", UniformKind::Float),
        field("height", UniformKind::Float),
    ],
    textures: &[
        TextureSlot::new("color_texture", TextureSlotKind::Color2d),
        TextureSlot::new("depth_texture", TextureSlotKind::Depth2d),
        TextureSlot::new("noise_texture", TextureSlotKind::Color3d),
    ],
    blend: Blend::Replace,
    cull_back_faces: false,
};

pub const POST_FX: ProgramDesc<'static> = ProgramDesc {
    label: "post fx",
    source: full_screen_source!("shaders/post_fx.wgsl"),
    vertex_input: VertexInput::FullScreen,
    uniforms: &[
        field("time", UniformKind::Float),
        field("current_effect", UniformKind::Int),
        field("filter_size", UniformKind::Int),
    ],
    textures: &[TextureSlot::new("frame_texture", TextureSlotKind::Color2d)],
    blend: Blend::Replace,
    cull_back_faces: false,
};

/// Translucent rectangles for the tuning overlay.
pub const OVERLAY: ProgramDesc<'static> = ProgramDesc {
    label: "overlay",
    source: full_screen_source!("shaders/overlay.wgsl"),
    vertex_input: VertexInput::FullScreen,
    uniforms: &[
        field("rect", UniformKind::Vec4),
        field("color", UniformKind::Vec4),
        field("viewport", UniformKind::Vec2),
    ],
    textures: &[],
    blend: Blend::Alpha,
    cull_back_faces: false,
};

pub const ALL: [&ProgramDesc<'static>; 7] = [
    &SIMPLE,
    &BACKGROUND,
    &SHADING,
    &NOISE,
    &VOLUMETRIC,
    &POST_FX,
    &OVERLAY,
];
