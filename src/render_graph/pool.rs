use super::framebuffer::Framebuffer;
use crate::device::Device;

/// Index of a framebuffer inside a [`FramebufferPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferSlot(pub usize);

impl std::fmt::Display for FramebufferSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Ordered collection of the framebuffers a frame renders through.
///
/// Slots are handed out in insertion order and never reused, so a pass can
/// refer to "the security camera target" by a constant slot.
#[derive(Debug, Default)]
pub struct FramebufferPool {
    framebuffers: Vec<Framebuffer>,
}

impl FramebufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, framebuffer: Framebuffer) -> FramebufferSlot {
        self.framebuffers.push(framebuffer);
        FramebufferSlot(self.framebuffers.len() - 1)
    }

    pub fn get(&self, slot: FramebufferSlot) -> Option<&Framebuffer> {
        self.framebuffers.get(slot.0)
    }

    pub fn get_mut(&mut self, slot: FramebufferSlot) -> Option<&mut Framebuffer> {
        self.framebuffers.get_mut(slot.0)
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FramebufferSlot, &Framebuffer)> {
        self.framebuffers
            .iter()
            .enumerate()
            .map(|(i, fb)| (FramebufferSlot(i), fb))
    }

    /// Brings every 2D framebuffer to the live window size.
    ///
    /// Called once per frame before any pass runs. Volumes keep their size,
    /// and a zero extent (minimised window) leaves everything untouched.
    /// Returns how many framebuffers were reallocated.
    pub fn reconcile<D: Device>(&mut self, device: &mut D, width: u32, height: u32) -> usize {
        if width == 0 || height == 0 {
            return 0;
        }
        self.framebuffers
            .iter_mut()
            .filter(|fb| !fb.is_volume())
            .map(|fb| fb.resize(device, width, height))
            .filter(|resized| *resized)
            .count()
    }

    /// Releases every framebuffer.
    pub fn destroy_all<D: Device>(&mut self, device: &mut D) {
        for fb in self.framebuffers.drain(..) {
            fb.destroy(device);
        }
    }
}
