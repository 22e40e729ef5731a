use crate::device::{Device, TextureId};

/// Pixel formats used by the render targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 16-bit float RGBA, the color format of every off-screen target.
    Rgba16Float,
    Rgba8Unorm,
    /// 32-bit float depth.
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    /// Whether the format can be bound as a color attachment.
    pub fn is_color_renderable(self) -> bool {
        !self.is_depth()
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    D3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

impl FilterMode {
    pub fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

impl WrapMode {
    pub fn to_wgpu(self) -> wgpu::AddressMode {
        match self {
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

/// Storage and sampling description of a texture target.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    /// Depth of a 3D texture; always 1 for 2D.
    pub depth: u32,
    pub format: TextureFormat,
    pub filter: FilterMode,
    pub wrap: WrapMode,
}

impl TextureDesc {
    /// RGBA16F color storage with linear filtering and mirrored wrap.
    pub fn color_2d(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            dimension: TextureDimension::D2,
            width,
            height,
            depth: 1,
            format: TextureFormat::Rgba16Float,
            filter: FilterMode::Linear,
            wrap: WrapMode::MirrorRepeat,
        }
    }

    /// Depth32F storage matching [`TextureDesc::color_2d`] sampling.
    pub fn depth_2d(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            format: TextureFormat::Depth32Float,
            ..Self::color_2d(label, width, height)
        }
    }

    /// RGBA16F volume with linear filtering and clamped wrap.
    pub fn volume(label: impl Into<String>, width: u32, height: u32, depth: u32) -> Self {
        Self {
            label: label.into(),
            dimension: TextureDimension::D3,
            width,
            height,
            depth,
            format: TextureFormat::Rgba16Float,
            filter: FilterMode::Linear,
            wrap: WrapMode::ClampToEdge,
        }
    }

    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn extent(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    /// The same description at a new 2D extent.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self.clone()
        }
    }
}

/// A texture allocated on a [`Device`] together with its description.
///
/// Targets are owned by exactly one framebuffer. They are not `Clone`, and
/// releasing one consumes it.
#[derive(Debug)]
pub struct TextureTarget {
    id: TextureId,
    desc: TextureDesc,
}

impl TextureTarget {
    pub fn new<D: Device>(device: &mut D, desc: TextureDesc) -> Self {
        let id = device.create_texture(&desc);
        Self { id, desc }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn depth(&self) -> u32 {
        self.desc.depth
    }

    pub(crate) fn reallocate<D: Device>(&mut self, device: &mut D, width: u32, height: u32) {
        device.reallocate_texture(self.id, width, height);
        self.desc = self.desc.resized(width, height);
    }

    pub(crate) fn release<D: Device>(self, device: &mut D) {
        device.destroy_texture(self.id);
    }
}
