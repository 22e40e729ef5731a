//! Off-screen framebuffers and their completeness rules.

use crate::device::Device;
use crate::texture::{TextureDesc, TextureDimension, TextureFormat, TextureTarget};

/// Why a set of attachments cannot form a usable framebuffer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Incompleteness {
    #[error("color attachment format {0:?} is not color-renderable")]
    ColorNotRenderable(TextureFormat),
    #[error("depth attachment format {0:?} is not a depth format")]
    DepthNotDepthFormat(TextureFormat),
    #[error("depth attachment must be two-dimensional and cannot pair with a volume")]
    DepthDimension,
    #[error("attachment extents differ: color {color:?}, depth {depth:?}")]
    MismatchedExtent { color: (u32, u32), depth: (u32, u32) },
    #[error("attachment has a zero extent")]
    ZeroExtent,
}

#[derive(Debug, thiserror::Error)]
pub enum FramebufferError {
    #[error("framebuffer `{label}` is incomplete: {reason}")]
    Incomplete {
        label: String,
        reason: Incompleteness,
    },
}

/// Checks that `color` and `depth` can be attached together.
pub fn check_completeness(
    color: &TextureDesc,
    depth: Option<&TextureDesc>,
) -> Result<(), Incompleteness> {
    if color.width == 0 || color.height == 0 || color.depth == 0 {
        return Err(Incompleteness::ZeroExtent);
    }
    if !color.format.is_color_renderable() {
        return Err(Incompleteness::ColorNotRenderable(color.format));
    }
    let Some(depth) = depth else {
        return Ok(());
    };
    if !depth.format.is_depth() {
        return Err(Incompleteness::DepthNotDepthFormat(depth.format));
    }
    if depth.dimension != TextureDimension::D2 || color.dimension != TextureDimension::D2 {
        return Err(Incompleteness::DepthDimension);
    }
    if (color.width, color.height) != (depth.width, depth.height) {
        return Err(Incompleteness::MismatchedExtent {
            color: (color.width, color.height),
            depth: (depth.width, depth.height),
        });
    }
    Ok(())
}

/// An off-screen render target owning one color attachment and at most one
/// depth attachment.
///
/// A framebuffer only exists in a complete state: the constructors validate
/// the attachments before allocating anything. Resizing changes extents but
/// never the attachment topology, so completeness is not re-checked.
///
/// Volume framebuffers hold a 3D color target that passes render one depth
/// slice at a time. They have a fixed size and ignore [`Framebuffer::resize`].
#[derive(Debug)]
pub struct Framebuffer {
    label: String,
    color: TextureTarget,
    depth: Option<TextureTarget>,
    contents_valid: bool,
}

impl Framebuffer {
    /// RGBA16F color plus an optional Depth32F attachment.
    pub fn new_2d<D: Device>(
        device: &mut D,
        label: &str,
        width: u32,
        height: u32,
        with_depth: bool,
    ) -> Result<Self, FramebufferError> {
        let color = TextureDesc::color_2d(format!("{label} color"), width, height);
        let depth = with_depth.then(|| TextureDesc::depth_2d(format!("{label} depth"), width, height));
        Self::with_attachments(device, label, color, depth)
    }

    /// A `width × height × depth` RGBA16F volume, clamped and linearly filtered.
    pub fn new_3d<D: Device>(
        device: &mut D,
        label: &str,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<Self, FramebufferError> {
        let color = TextureDesc::volume(format!("{label} volume"), width, height, depth);
        Self::with_attachments(device, label, color, None)
    }

    /// Validates the attachments and allocates them.
    pub fn with_attachments<D: Device>(
        device: &mut D,
        label: &str,
        color: TextureDesc,
        depth: Option<TextureDesc>,
    ) -> Result<Self, FramebufferError> {
        check_completeness(&color, depth.as_ref()).map_err(|reason| {
            FramebufferError::Incomplete {
                label: label.to_string(),
                reason,
            }
        })?;

        log::info!(
            "framebuffer `{label}`: {}x{}x{} {:?}{}",
            color.width,
            color.height,
            color.depth,
            color.format,
            if depth.is_some() { " + depth" } else { "" }
        );

        Ok(Self {
            label: label.to_string(),
            color: TextureTarget::new(device, color),
            depth: depth.map(|desc| TextureTarget::new(device, desc)),
            contents_valid: false,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }

    /// Number of depth slices; 1 for 2D framebuffers.
    pub fn depth_slices(&self) -> u32 {
        self.color.depth()
    }

    pub fn is_volume(&self) -> bool {
        self.color.desc().dimension == TextureDimension::D3
    }

    pub fn color(&self) -> &TextureTarget {
        &self.color
    }

    pub fn depth(&self) -> Option<&TextureTarget> {
        self.depth.as_ref()
    }

    /// Whether a pass has rendered into the color target since it was last
    /// (re)allocated.
    pub fn contents_valid(&self) -> bool {
        self.contents_valid
    }

    pub(crate) fn mark_written(&mut self) {
        self.contents_valid = true;
    }

    /// Reallocates the attachments at the new extent. Returns whether
    /// anything changed.
    ///
    /// Volumes, zero extents and unchanged extents are left alone.
    pub fn resize<D: Device>(&mut self, device: &mut D, width: u32, height: u32) -> bool {
        if self.is_volume() || width == 0 || height == 0 {
            return false;
        }
        if (self.width(), self.height()) == (width, height) {
            return false;
        }

        log::debug!(
            "resizing framebuffer `{}` {}x{} -> {width}x{height}",
            self.label,
            self.width(),
            self.height()
        );
        self.color.reallocate(device, width, height);
        if let Some(depth) = &mut self.depth {
            depth.reallocate(device, width, height);
        }
        self.contents_valid = false;
        true
    }

    /// Releases the owned attachments.
    pub fn destroy<D: Device>(self, device: &mut D) {
        log::debug!("destroying framebuffer `{}`", self.label);
        self.color.release(device);
        if let Some(depth) = self.depth {
            depth.release(device);
        }
    }
}
