use std::collections::HashSet;

use super::pass::{DrawGeometry, DrawItem, PassTarget, RenderPass, TextureSource};
use super::pool::{FramebufferPool, FramebufferSlot};
use crate::device::{ColorTarget, DepthTarget, Device, Draw, Geometry, PassBegin, TextureId};
use crate::fullscreen::FullScreenTriangle;

/// Uniform set to the slice index when a pass targets [`PassTarget::VolumeSlices`].
pub const SLICE_UNIFORM: &str = "slice";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("pass `{pass}` references unknown framebuffer {slot}")]
    UnknownFramebuffer {
        pass: &'static str,
        slot: FramebufferSlot,
    },
    #[error("pass `{pass}` samples framebuffer {slot} while rendering into it")]
    FeedbackLoop {
        pass: &'static str,
        slot: FramebufferSlot,
    },
    #[error("pass `{pass}` samples framebuffer {slot} before anything rendered into it")]
    ReadBeforeWrite {
        pass: &'static str,
        slot: FramebufferSlot,
    },
    #[error("pass `{pass}` binds framebuffer {slot} with the wrong dimensionality")]
    WrongTargetKind {
        pass: &'static str,
        slot: FramebufferSlot,
    },
}

/// Runs an ordered list of [`RenderPass`]es against a framebuffer pool.
///
/// Passes run strictly in list order; a pass that samples another pass's
/// output must come after it. [`Sequencer::validate`] checks that ordering
/// before anything is submitted.
#[derive(Debug, Default)]
pub struct Sequencer {
    full_screen: FullScreenTriangle,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full_screen(&self) -> &FullScreenTriangle {
        &self.full_screen
    }

    /// Checks slot references, target kinds and read-after-write ordering.
    ///
    /// A sampled framebuffer must either be rendered by an earlier pass in
    /// `passes` or still hold valid contents from a previous frame.
    pub fn validate(passes: &[RenderPass], pool: &FramebufferPool) -> Result<(), SequenceError> {
        let mut written = HashSet::new();

        for pass in passes {
            let target = pass.target.framebuffer();
            if let Some(slot) = target {
                let Some(fb) = pool.get(slot) else {
                    return Err(SequenceError::UnknownFramebuffer {
                        pass: pass.label,
                        slot,
                    });
                };
                let slices = matches!(pass.target, PassTarget::VolumeSlices(_));
                if fb.is_volume() != slices {
                    return Err(SequenceError::WrongTargetKind {
                        pass: pass.label,
                        slot,
                    });
                }
            }

            for slot in pass.reads() {
                let Some(fb) = pool.get(slot) else {
                    return Err(SequenceError::UnknownFramebuffer {
                        pass: pass.label,
                        slot,
                    });
                };
                if target == Some(slot) {
                    return Err(SequenceError::FeedbackLoop {
                        pass: pass.label,
                        slot,
                    });
                }
                if !written.contains(&slot) && !fb.contents_valid() {
                    return Err(SequenceError::ReadBeforeWrite {
                        pass: pass.label,
                        slot,
                    });
                }
            }

            if let Some(slot) = target {
                written.insert(slot);
            }
        }
        Ok(())
    }

    /// Validates and then runs `passes` in order.
    ///
    /// `backbuffer` is the window size used for passes that render to the
    /// surface. Every framebuffer a pass renders into is marked as holding
    /// valid contents afterwards.
    pub fn execute<D: Device>(
        &mut self,
        device: &mut D,
        pool: &mut FramebufferPool,
        passes: &[RenderPass],
        backbuffer: (u32, u32),
    ) -> Result<(), SequenceError> {
        Self::validate(passes, pool)?;

        for pass in passes {
            log::trace!("pass `{}` ({} draws)", pass.label, pass.draws.len());
            device.set_depth_test(pass.depth_test);

            match pass.target {
                PassTarget::Backbuffer { depth } => {
                    device.begin_pass(&PassBegin {
                        label: pass.label,
                        color: ColorTarget::Backbuffer,
                        depth: if depth {
                            DepthTarget::Backbuffer
                        } else {
                            DepthTarget::None
                        },
                        clear: pass.clear,
                        viewport: backbuffer,
                    });
                    self.draw_items(device, pool, &pass.draws, None);
                    device.end_pass();
                }
                PassTarget::Framebuffer(slot) => {
                    let fb = pool
                        .get(slot)
                        .ok_or(SequenceError::UnknownFramebuffer {
                            pass: pass.label,
                            slot,
                        })?;
                    device.begin_pass(&PassBegin {
                        label: pass.label,
                        color: ColorTarget::Texture(fb.color().id()),
                        depth: fb
                            .depth()
                            .map_or(DepthTarget::None, |d| DepthTarget::Texture(d.id())),
                        clear: pass.clear,
                        viewport: (fb.width(), fb.height()),
                    });
                    self.draw_items(device, pool, &pass.draws, None);
                    device.end_pass();
                }
                PassTarget::VolumeSlices(slot) => {
                    let fb = pool
                        .get(slot)
                        .ok_or(SequenceError::UnknownFramebuffer {
                            pass: pass.label,
                            slot,
                        })?;
                    let texture = fb.color().id();
                    let viewport = (fb.width(), fb.height());
                    for slice in 0..fb.depth_slices() {
                        device.begin_pass(&PassBegin {
                            label: pass.label,
                            color: ColorTarget::Slice { texture, slice },
                            depth: DepthTarget::None,
                            clear: pass.clear,
                            viewport,
                        });
                        self.draw_items(device, pool, &pass.draws, Some(slice));
                        device.end_pass();
                    }
                }
            }

            if let Some(fb) = pass.target.framebuffer().and_then(|slot| pool.get_mut(slot)) {
                fb.mark_written();
            }
        }
        Ok(())
    }

    fn draw_items<D: Device>(
        &mut self,
        device: &mut D,
        pool: &FramebufferPool,
        items: &[DrawItem],
        slice: Option<u32>,
    ) {
        for item in items {
            let textures = resolve_textures(pool, &item.textures);
            let sliced;
            let uniforms = match slice {
                Some(slice) => {
                    sliced = item.uniforms.clone().with(SLICE_UNIFORM, slice as i32);
                    &sliced
                }
                None => &item.uniforms,
            };

            match item.geometry {
                DrawGeometry::FullScreen => {
                    self.full_screen
                        .draw(device, item.program, uniforms, &textures);
                }
                DrawGeometry::Mesh(mesh) => device.draw(&Draw {
                    program: item.program,
                    uniforms,
                    textures: &textures,
                    geometry: Geometry::Mesh(mesh),
                }),
            }
        }
    }
}

fn resolve_textures(
    pool: &FramebufferPool,
    sources: &[(&'static str, TextureSource)],
) -> Vec<(&'static str, TextureId)> {
    sources
        .iter()
        .filter_map(|(name, source)| {
            let id = match source {
                TextureSource::Texture(id) => Some(*id),
                TextureSource::Color(slot) => pool.get(*slot).map(|fb| fb.color().id()),
                TextureSource::Depth(slot) => pool
                    .get(*slot)
                    .and_then(|fb| fb.depth())
                    .map(|d| d.id()),
            };
            if id.is_none() {
                log::trace!("texture slot `{name}` has no backing attachment, left unbound");
            }
            id.map(|id| (*name, id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Blend, Clear, ProgramDesc, ProgramId, VertexInput};
    use crate::recording_device::{Command, RecordingDevice};
    use crate::render_graph::Framebuffer;
    use crate::uniforms::UniformValue;

    const SECURITY: FramebufferSlot = FramebufferSlot(0);
    const MAIN: FramebufferSlot = FramebufferSlot(1);
    const NOISE: FramebufferSlot = FramebufferSlot(2);

    fn program(device: &mut RecordingDevice, label: &'static str) -> ProgramId {
        device
            .create_program(&ProgramDesc {
                label,
                source: "",
                vertex_input: VertexInput::FullScreen,
                uniforms: &[],
                textures: &[],
                blend: Blend::Replace,
                cull_back_faces: false,
            })
            .unwrap()
    }

    fn pool(device: &mut RecordingDevice, noise_depth: u32) -> FramebufferPool {
        let mut pool = FramebufferPool::new();
        pool.push(Framebuffer::new_2d(device, "security", 64, 64, true).unwrap());
        pool.push(Framebuffer::new_2d(device, "main", 64, 64, true).unwrap());
        pool.push(Framebuffer::new_3d(device, "noise", 8, 8, noise_depth).unwrap());
        pool
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn valid_order_passes() {
        let mut device = RecordingDevice::new();
        let pool = pool(&mut device, 4);
        let p = program(&mut device, "p");

        let passes = vec![
            RenderPass::new("security", PassTarget::Framebuffer(SECURITY)),
            RenderPass::new("main", PassTarget::Framebuffer(MAIN))
                .draw(DrawItem::full_screen(p).texture("screen", TextureSource::Color(SECURITY))),
        ];
        assert_eq!(Sequencer::validate(&passes, &pool), Ok(()));
    }

    #[test]
    fn read_before_write_is_rejected() {
        let mut device = RecordingDevice::new();
        let pool = pool(&mut device, 4);
        let p = program(&mut device, "p");

        let passes = vec![
            RenderPass::new("main", PassTarget::Framebuffer(MAIN))
                .draw(DrawItem::full_screen(p).texture("screen", TextureSource::Color(SECURITY))),
            RenderPass::new("security", PassTarget::Framebuffer(SECURITY)),
        ];
        assert_eq!(
            Sequencer::validate(&passes, &pool),
            Err(SequenceError::ReadBeforeWrite {
                pass: "main",
                slot: SECURITY
            })
        );
    }

    #[test]
    fn contents_from_previous_frame_satisfy_reads() {
        let mut device = RecordingDevice::new();
        let mut pool = pool(&mut device, 4);
        let p = program(&mut device, "p");
        pool.get_mut(NOISE).unwrap().mark_written();

        let passes = vec![RenderPass::new("volumetric", PassTarget::Framebuffer(MAIN))
            .draw(DrawItem::full_screen(p).texture("noise", TextureSource::Color(NOISE)))];
        assert_eq!(Sequencer::validate(&passes, &pool), Ok(()));
    }

    #[test]
    fn feedback_loop_is_rejected() {
        let mut device = RecordingDevice::new();
        let mut pool = pool(&mut device, 4);
        let p = program(&mut device, "p");
        pool.get_mut(MAIN).unwrap().mark_written();

        let passes = vec![RenderPass::new("main", PassTarget::Framebuffer(MAIN))
            .draw(DrawItem::full_screen(p).texture("depth", TextureSource::Depth(MAIN)))];
        assert_eq!(
            Sequencer::validate(&passes, &pool),
            Err(SequenceError::FeedbackLoop {
                pass: "main",
                slot: MAIN
            })
        );
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let mut device = RecordingDevice::new();
        let pool = pool(&mut device, 4);

        let passes = vec![RenderPass::new("ghost", PassTarget::Framebuffer(FramebufferSlot(9)))];
        assert!(matches!(
            Sequencer::validate(&passes, &pool),
            Err(SequenceError::UnknownFramebuffer { .. })
        ));
    }

    #[test]
    fn target_kind_must_match() {
        let mut device = RecordingDevice::new();
        let pool = pool(&mut device, 4);

        let flat_as_volume = vec![RenderPass::new("x", PassTarget::VolumeSlices(MAIN))];
        let volume_as_flat = vec![RenderPass::new("y", PassTarget::Framebuffer(NOISE))];
        assert!(matches!(
            Sequencer::validate(&flat_as_volume, &pool),
            Err(SequenceError::WrongTargetKind { .. })
        ));
        assert!(matches!(
            Sequencer::validate(&volume_as_flat, &pool),
            Err(SequenceError::WrongTargetKind { .. })
        ));
    }

    // ========================================================================
    // Execution
    // ========================================================================

    #[test]
    fn noise_volume_draws_once_per_slice() {
        let mut device = RecordingDevice::new();
        let mut pool = pool(&mut device, 128);
        let noise = program(&mut device, "noise");
        let mut sequencer = Sequencer::new();
        device.clear_log();

        let passes = vec![RenderPass::new("noise", PassTarget::VolumeSlices(NOISE))
            .clear(Clear::color([1.0, 1.0, 0.0, 1.0]))
            .depth_test(false)
            .draw(DrawItem::full_screen(noise))];
        sequencer
            .execute(&mut device, &mut pool, &passes, (64, 64))
            .unwrap();

        let volume = pool.get(NOISE).unwrap().color().id();
        let mut bound_slice = None;
        let mut seen = HashSet::new();
        let mut draws = 0;
        for command in &device.commands {
            match command {
                Command::BeginPass { color, .. } => {
                    let ColorTarget::Slice { texture, slice } = color else {
                        panic!("noise pass bound {color:?}");
                    };
                    assert_eq!(*texture, volume);
                    bound_slice = Some(*slice);
                }
                Command::Draw(record) => {
                    let slice = bound_slice.take().expect("draw without a fresh slice bind");
                    assert!(seen.insert(slice), "slice {slice} drawn twice");
                    assert_eq!(
                        record.uniforms.get(SLICE_UNIFORM),
                        Some(UniformValue::Int(slice as i32))
                    );
                    draws += 1;
                }
                _ => {}
            }
        }
        assert_eq!(draws, 128);
        assert_eq!(seen.len(), 128);
    }

    #[test]
    fn execute_marks_targets_written() {
        let mut device = RecordingDevice::new();
        let mut pool = pool(&mut device, 4);
        let mut sequencer = Sequencer::new();

        let passes = vec![RenderPass::new("security", PassTarget::Framebuffer(SECURITY))];
        sequencer
            .execute(&mut device, &mut pool, &passes, (64, 64))
            .unwrap();

        assert!(pool.get(SECURITY).unwrap().contents_valid());
        assert!(!pool.get(MAIN).unwrap().contents_valid());
    }

    #[test]
    fn execute_resolves_attachments() {
        let mut device = RecordingDevice::new();
        let mut pool = pool(&mut device, 4);
        let p = program(&mut device, "p");
        let mut sequencer = Sequencer::new();

        let passes = vec![
            RenderPass::new("main", PassTarget::Framebuffer(MAIN)),
            RenderPass::new("composite", PassTarget::Backbuffer { depth: false }).draw(
                DrawItem::full_screen(p)
                    .texture("color", TextureSource::Color(MAIN))
                    .texture("depth", TextureSource::Depth(MAIN)),
            ),
        ];
        sequencer
            .execute(&mut device, &mut pool, &passes, (64, 64))
            .unwrap();

        let main = pool.get(MAIN).unwrap();
        let draw = device.draws().next().unwrap();
        assert_eq!(draw.target, ColorTarget::Backbuffer);
        assert_eq!(
            draw.textures,
            vec![
                ("color".to_string(), main.color().id()),
                ("depth".to_string(), main.depth().unwrap().id()),
            ]
        );
    }

    #[test]
    fn execute_refuses_invalid_order_without_drawing() {
        let mut device = RecordingDevice::new();
        let mut pool = pool(&mut device, 4);
        let p = program(&mut device, "p");
        let mut sequencer = Sequencer::new();

        let passes = vec![RenderPass::new("main", PassTarget::Framebuffer(MAIN))
            .draw(DrawItem::full_screen(p).texture("s", TextureSource::Color(SECURITY)))];
        assert!(sequencer
            .execute(&mut device, &mut pool, &passes, (64, 64))
            .is_err());
        assert_eq!(device.passes().count(), 0);
    }

    #[test]
    fn pass_depth_test_applies_to_mesh_draws() {
        let mut device = RecordingDevice::new();
        let mut pool = pool(&mut device, 4);
        let p = program(&mut device, "p");
        let mesh = device.create_mesh("cube", &[], &[0, 1, 2]);
        let mut sequencer = Sequencer::new();

        let passes = vec![RenderPass::new("scene", PassTarget::Framebuffer(MAIN))
            .draw(DrawItem::full_screen(p))
            .draw(DrawItem::mesh(p, mesh))];
        sequencer
            .execute(&mut device, &mut pool, &passes, (64, 64))
            .unwrap();

        let depth_tests: Vec<bool> = device.draws().map(|d| d.depth_test).collect();
        assert_eq!(depth_tests, vec![false, true]);
    }

    #[test]
    fn full_screen_geometry_shared_across_passes_and_frames() {
        let mut device = RecordingDevice::new();
        let mut pool = pool(&mut device, 4);
        let p = program(&mut device, "p");
        let mut sequencer = Sequencer::new();
        assert!(!sequencer.full_screen().is_allocated());

        let passes = vec![
            RenderPass::new("security", PassTarget::Framebuffer(SECURITY))
                .draw(DrawItem::full_screen(p)),
            RenderPass::new("main", PassTarget::Framebuffer(MAIN))
                .draw(DrawItem::full_screen(p).texture("screen", TextureSource::Color(SECURITY))),
            RenderPass::new("composite", PassTarget::Backbuffer { depth: false })
                .draw(DrawItem::full_screen(p).texture("frame", TextureSource::Color(MAIN))),
        ];
        for _ in 0..3 {
            sequencer
                .execute(&mut device, &mut pool, &passes, (64, 64))
                .unwrap();
        }

        assert!(sequencer.full_screen().is_allocated());
        assert_eq!(device.count(|c| matches!(c, Command::CreateVertexArray { .. })), 1);
        assert_eq!(device.draws().count(), 9);
    }
}
