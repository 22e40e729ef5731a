//! The screen-covering triangle every image-space pass draws.
//!
//! One oversized triangle with corners at (-1, 1), (-1, -3) and (3, 1)
//! reaches past the viewport in two corners, so the rasterised area is
//! exactly the screen with no diagonal seam down the middle.

use crate::device::{Device, Draw, Geometry, ProgramId, TextureId, VertexArrayId};
use crate::uniforms::Uniforms;

/// Clip-space corners of the triangle.
pub const FULL_SCREEN_TRIANGLE: [[f32; 2]; 3] = [[-1.0, 1.0], [-1.0, -3.0], [3.0, 1.0]];

/// Draws [`FULL_SCREEN_TRIANGLE`] with depth testing suspended.
///
/// The vertex array is created on first use and reused afterwards.
#[derive(Debug, Default)]
pub struct FullScreenTriangle {
    vertex_array: Option<VertexArrayId>,
}

impl FullScreenTriangle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_allocated(&self) -> bool {
        self.vertex_array.is_some()
    }

    pub fn vertex_array<D: Device>(&mut self, device: &mut D) -> VertexArrayId {
        *self.vertex_array.get_or_insert_with(|| {
            log::debug!("creating full-screen triangle");
            device.create_vertex_array("full-screen triangle", &FULL_SCREEN_TRIANGLE)
        })
    }

    /// Draws the triangle. The device's depth-test state is the same after
    /// the call as before it.
    pub fn draw<D: Device>(
        &mut self,
        device: &mut D,
        program: ProgramId,
        uniforms: &Uniforms,
        textures: &[(&str, TextureId)],
    ) {
        let vertex_array = self.vertex_array(device);

        let depth_test = device.depth_test();
        device.set_depth_test(false);
        device.draw(&Draw {
            program,
            uniforms,
            textures,
            geometry: Geometry::Arrays {
                vertex_array,
                count: 3,
            },
        });
        device.set_depth_test(depth_test);
    }
}
