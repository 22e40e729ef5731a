//! Lab 5: rendering through off-screen framebuffers.
//!
//! Each frame is five passes over a pool of four framebuffers:
//!
//! 1. bake the 3D noise volume, slice by slice (once, unless configured
//!    otherwise)
//! 2. render the scene from the security camera into [`SECURITY_CAMERA`]
//! 3. render the scene from the main camera into [`MAIN_CAMERA`]; the
//!    monitor on the landing pad shows the security camera's image, and the
//!    security camera itself is drawn where it stands
//! 4. ray-march a noise-filled sphere over the main image into
//!    [`VOLUMETRIC`]
//! 5. post-process the result onto the backbuffer
//!
//! | Input | Effect |
//! |---|---|
//! | W/S, A/D, Q/E | move the main camera |
//! | Left drag | turn the main camera |
//! | Right drag | turn the security camera |

use std::path::PathBuf;
use std::str::FromStr;

use glam::{Mat4, Vec2, Vec3, Vec4};
use winit::event::MouseButton;

use crate::assets;
use crate::camera::Camera;
use crate::device::{Clear, Device, ProgramId};
use crate::error::Result;
use crate::free_fly::{DragScale, FreeFlyControls, MoveKeys};
use crate::input::Input;
use crate::model::{Material, Model};
use crate::overlay::{ControlId, Overlay};
use crate::render_graph::{
    DrawItem, Framebuffer, FramebufferPool, FramebufferSlot, PassTarget, RenderPass, Sequencer,
    TextureSource,
};
use crate::shaders;
use crate::uniforms::Uniforms;

pub const SECURITY_CAMERA: FramebufferSlot = FramebufferSlot(0);
pub const MAIN_CAMERA: FramebufferSlot = FramebufferSlot(1);
pub const VOLUMETRIC: FramebufferSlot = FramebufferSlot(2);
pub const NOISE_VOLUME: FramebufferSlot = FramebufferSlot(3);

pub const SCENE_CLEAR_COLOR: [f32; 4] = [0.2, 0.2, 0.8, 1.0];
const VOLUMETRIC_CLEAR_COLOR: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const NOISE_CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 0.0, 1.0];

/// Post-processing filter widths in pixels, selected by a 1-based index.
pub const FILTER_SIZES: [i32; 12] = [3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 25];

/// Filter width for the 1-based `index`, clamped to the table.
pub fn filter_size(index: i32) -> i32 {
    FILTER_SIZES[(index.clamp(1, FILTER_SIZES.len() as i32) - 1) as usize]
}

pub const NOISE_BAKE_ENV: &str = "RENDER_LABS_NOISE_BAKE";

/// How often the noise volume is regenerated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoiseBake {
    /// Until the volume holds valid contents.
    #[default]
    Once,
    EveryFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown noise bake mode `{0}`, expected `once` or `every-frame`")]
pub struct ParseNoiseBakeError(String);

impl FromStr for NoiseBake {
    type Err = ParseNoiseBakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(NoiseBake::Once),
            "every-frame" | "every_frame" => Ok(NoiseBake::EveryFrame),
            other => Err(ParseNoiseBakeError(other.to_string())),
        }
    }
}

impl NoiseBake {
    /// Reads [`NOISE_BAKE_ENV`]. Unset yields `None`; an unparsable value is
    /// logged and ignored.
    pub fn from_env() -> Option<Self> {
        let value = std::env::var(NOISE_BAKE_ENV).ok()?;
        match value.parse() {
            Ok(bake) => Some(bake),
            Err(e) => {
                log::warn!("{NOISE_BAKE_ENV}: {e}");
                None
            }
        }
    }
}

/// The composite pass's image effect, in shader order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PostEffect {
    #[default]
    None = 0,
    Sepia = 1,
    Mushroom = 2,
    Blur = 3,
    Grayscale = 4,
    /// Mushroom, blur, grayscale and sepia together.
    Composition = 5,
    Mosaic = 6,
    SeparableBlur = 7,
    Bloom = 8,
}

impl PostEffect {
    pub const ALL: [PostEffect; 9] = [
        PostEffect::None,
        PostEffect::Sepia,
        PostEffect::Mushroom,
        PostEffect::Blur,
        PostEffect::Grayscale,
        PostEffect::Composition,
        PostEffect::Mosaic,
        PostEffect::SeparableBlur,
        PostEffect::Bloom,
    ];

    pub const NAMES: [&'static str; 9] = [
        "None",
        "Sepia",
        "Mushroom",
        "Blur",
        "Grayscale",
        "All of the above",
        "Mosaic",
        "Separable blur",
        "Bloom",
    ];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumetricParams {
    pub center: Vec3,
    pub radius: f32,
    pub density: f32,
}

impl Default for VolumetricParams {
    fn default() -> Self {
        Self {
            center: Vec3::new(62.5, -45.833, -61.983),
            radius: 50.0,
            density: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub environment_multiplier: f32,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            position: Vec3::new(20.0, 40.0, 0.0),
            color: Vec3::ONE,
            intensity: 1000.0,
            environment_multiplier: 1.0,
        }
    }
}

/// Parameters tunable while the lab runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lab5Params {
    pub volumetric: VolumetricParams,
    pub light: LightParams,
    pub effect: PostEffect,
    /// 1-based index into [`FILTER_SIZES`].
    pub filter_size_index: i32,
    /// Radians per second the fighter spins about its mast.
    pub fighter_rotate_speed: f32,
}

impl Default for Lab5Params {
    fn default() -> Self {
        Self {
            volumetric: VolumetricParams::default(),
            light: LightParams::default(),
            effect: PostEffect::None,
            filter_size_index: 1,
            fighter_rotate_speed: 0.0,
        }
    }
}

/// Startup options for [`Lab5State::new`].
#[derive(Clone, Debug, PartialEq)]
pub struct Lab5Config {
    pub noise_bake: NoiseBake,
    /// Edge length of the cubic noise volume.
    pub noise_size: u32,
    /// STL replacing the procedural fighter.
    pub fighter_model: Option<PathBuf>,
    /// STL replacing the procedural camera body.
    pub camera_model: Option<PathBuf>,
}

impl Default for Lab5Config {
    fn default() -> Self {
        Self {
            noise_bake: NoiseBake::Once,
            noise_size: 128,
            fighter_model: None,
            camera_model: None,
        }
    }
}

/// Overlay controls mirroring the tunable part of [`Lab5Params`].
#[derive(Clone, Copy, Debug)]
pub struct Lab5Controls {
    center: [ControlId; 3],
    radius: ControlId,
    density: ControlId,
    effect: ControlId,
    filter_size: ControlId,
}

impl Lab5Controls {
    pub fn register(overlay: &mut Overlay, params: &Lab5Params) -> Self {
        let v = params.volumetric;
        Self {
            center: [
                overlay.add_slider("sphere center x", -500.0, 500.0, v.center.x),
                overlay.add_slider("sphere center y", -500.0, 500.0, v.center.y),
                overlay.add_slider("sphere center z", -500.0, 500.0, v.center.z),
            ],
            radius: overlay.add_slider("sphere radius", 10.0, 1000.0, v.radius),
            density: overlay.add_slider("volume density", 0.0, 1.0, v.density),
            effect: overlay.add_choice("post effect", &PostEffect::NAMES, params.effect as usize),
            filter_size: overlay.add_int_slider(
                "filter size",
                1,
                FILTER_SIZES.len() as i32,
                params.filter_size_index,
            ),
        }
    }

    pub fn apply(&self, overlay: &Overlay, params: &mut Lab5Params) {
        let [x, y, z] = self.center.map(|id| overlay.get(id));
        params.volumetric = VolumetricParams {
            center: Vec3::new(x, y, z),
            radius: overlay.get(self.radius),
            density: overlay.get(self.density),
        };
        params.effect = PostEffect::from_index(overlay.get_int(self.effect)).unwrap_or_default();
        params.filter_size_index = overlay.get_int(self.filter_size);
    }
}

#[derive(Clone, Copy, Debug)]
struct Lab5Programs {
    background: ProgramId,
    shading: ProgramId,
    noise: ProgramId,
    volumetric: ProgramId,
    post_fx: ProgramId,
}

impl Lab5Programs {
    fn new<D: Device>(device: &mut D) -> Result<Self> {
        Ok(Self {
            background: device.create_program(&shaders::BACKGROUND)?,
            shading: device.create_program(&shaders::SHADING)?,
            noise: device.create_program(&shaders::NOISE)?,
            volumetric: device.create_program(&shaders::VOLUMETRIC)?,
            post_fx: device.create_program(&shaders::POST_FX)?,
        })
    }
}

/// The two cameras of one frame with the projection each uses.
#[derive(Clone, Copy, Debug)]
struct View {
    camera: Camera,
    view: Mat4,
    projection: Mat4,
}

impl View {
    fn new(camera: &Camera, aspect: f32) -> Self {
        Self {
            camera: *camera,
            view: camera.view_matrix(),
            projection: camera.projection_matrix(aspect),
        }
    }

    fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Everything lab 5 carries from one frame to the next, including the
/// framebuffer pool it renders through.
#[derive(Debug)]
pub struct Lab5State {
    pub main_camera: Camera,
    pub security_camera: Camera,
    pub main_controls: FreeFlyControls,
    pub security_controls: FreeFlyControls,
    pub params: Lab5Params,
    pub noise_bake: NoiseBake,
    /// Seconds since start.
    pub time: f32,
    noise_size: u32,
    pool: FramebufferPool,
    sequencer: Sequencer,
    programs: Lab5Programs,
    landing_pad: Model,
    fighter: Model,
    camera_body: Model,
}

impl Lab5State {
    /// Builds programs, models and the framebuffer pool sized to `size`.
    pub fn new<D: Device>(device: &mut D, size: (u32, u32), config: &Lab5Config) -> Result<Self> {
        let (width, height) = (size.0.max(1), size.1.max(1));
        let programs = Lab5Programs::new(device)?;

        let mut pool = FramebufferPool::new();
        pool.push(Framebuffer::new_2d(device, "security camera", width, height, true)?);
        pool.push(Framebuffer::new_2d(device, "main camera", width, height, true)?);
        pool.push(Framebuffer::new_2d(device, "volumetric", width, height, false)?);
        let n = config.noise_size.max(1);
        pool.push(Framebuffer::new_3d(device, "noise volume", n, n, n)?);

        let landing_pad = assets::landing_pad(device, TextureSource::Color(SECURITY_CAMERA))?;
        let fighter = match &config.fighter_model {
            Some(path) => Model::load_stl(
                device,
                path,
                Mat4::IDENTITY,
                Material::new("hull", Vec4::new(0.6, 0.62, 0.65, 1.0)),
            )?,
            None => assets::fighter(device)?,
        };
        let camera_body = match &config.camera_model {
            Some(path) => Model::load_stl(
                device,
                path,
                Mat4::IDENTITY,
                Material::new("shell", Vec4::new(0.85, 0.85, 0.88, 1.0)),
            )?,
            None => assets::camera_body(device)?,
        };

        let security_position = Vec3::new(70.0, 50.0, -70.0);
        let main_position = Vec3::new(-70.0, 50.0, 70.0);

        Ok(Self {
            main_camera: Camera::new(main_position, Vec3::NEG_Z)
                .looking_at(Vec3::new(0.0, 15.0, 0.0))
                .with_projection(45.0, 10.0, 1000.0),
            security_camera: Camera::new(security_position, Vec3::NEG_Z)
                .looking_at(Vec3::ZERO)
                .with_projection(30.0, 15.0, 1000.0),
            main_controls: FreeFlyControls::new(MoveKeys::SixAxis, 10.0, DragScale::PerSecond(0.1)),
            security_controls: FreeFlyControls::new(
                MoveKeys::SixAxis,
                10.0,
                DragScale::PerSecond(0.1),
            ),
            params: Lab5Params::default(),
            noise_bake: config.noise_bake,
            time: 0.0,
            noise_size: n,
            pool,
            sequencer: Sequencer::new(),
            programs,
            landing_pad,
            fighter,
            camera_body,
        })
    }

    pub fn pool(&self) -> &FramebufferPool {
        &self.pool
    }

    pub fn update(&mut self, input: &Input, dt: f32) {
        self.time += dt;

        let delta = input.mouse_delta();
        if input.mouse_down(MouseButton::Left) {
            self.main_controls
                .apply_drag(&mut self.main_camera, delta, dt);
        } else if input.mouse_down(MouseButton::Right) {
            self.security_controls
                .apply_drag(&mut self.security_camera, delta, dt);
        }
        self.main_controls
            .apply_keys(&mut self.main_camera, input, dt);
    }

    pub fn fighter_matrix(&self) -> Mat4 {
        Mat4::from_translation(10.0 * Vec3::Y)
            * Mat4::from_rotation_y(self.time * self.params.fighter_rotate_speed)
    }

    /// Places the camera body where the security camera stands, lens
    /// pointing along its view.
    pub fn camera_body_matrix(&self) -> Mat4 {
        self.security_camera.view_matrix().inverse()
            * Mat4::from_scale(Vec3::splat(10.0))
            * Mat4::from_rotation_y(std::f32::consts::PI)
    }

    /// Whether this frame regenerates the noise volume.
    pub fn bakes_noise(&self) -> bool {
        match self.noise_bake {
            NoiseBake::EveryFrame => true,
            NoiseBake::Once => self
                .pool
                .get(NOISE_VOLUME)
                .is_none_or(|fb| !fb.contents_valid()),
        }
    }

    /// The frame's passes, in execution order.
    pub fn passes(&self, size: (u32, u32)) -> Vec<RenderPass> {
        let (width, height) = (size.0.max(1), size.1.max(1));
        let aspect = width as f32 / height as f32;
        let security = View::new(&self.security_camera, aspect);
        let main = View::new(&self.main_camera, aspect);

        let mut passes = Vec::with_capacity(5);

        if self.bakes_noise() {
            passes.push(
                RenderPass::new("noise", PassTarget::VolumeSlices(NOISE_VOLUME))
                    .clear(Clear::color(NOISE_CLEAR_COLOR))
                    .depth_test(false)
                    .draw(
                        DrawItem::full_screen(self.programs.noise)
                            .uniform("volume_depth", self.noise_size as i32),
                    ),
            );
        }

        // The monitor cannot show the image it is part of.
        let security_draws = self
            .scene_draws(&security)
            .into_iter()
            .map(|item| without_source(item, SECURITY_CAMERA));
        passes.push(
            RenderPass::new("security camera", PassTarget::Framebuffer(SECURITY_CAMERA))
                .clear(Clear::color_and_depth(SCENE_CLEAR_COLOR))
                .draws(security_draws),
        );

        let camera_body = self.model_draws(&self.camera_body, &main, self.camera_body_matrix());
        passes.push(
            RenderPass::new("main camera", PassTarget::Framebuffer(MAIN_CAMERA))
                .clear(Clear::color_and_depth(SCENE_CLEAR_COLOR))
                .draws(self.scene_draws(&main))
                .draws(camera_body),
        );

        let v = self.params.volumetric;
        let view_projection = main.view_projection();
        passes.push(
            RenderPass::new("volumetric", PassTarget::Framebuffer(VOLUMETRIC))
                .clear(Clear::color(VOLUMETRIC_CLEAR_COLOR))
                .depth_test(false)
                .draw(
                    DrawItem::full_screen(self.programs.volumetric)
                        .uniform("inverse_view_projection_matrix", view_projection.inverse())
                        .uniform("view_projection_matrix", view_projection)
                        .uniform("camera_position", main.camera.position)
                        .uniform("sphere_center", v.center)
                        .uniform("sphere_radius", v.radius)
                        .uniform("density", v.density)
                        .uniform("width", width as f32)
                        .uniform("height", height as f32)
                        .uniform("normalize_factors", Vec2::ONE / Vec2::new(width as f32, height as f32))
                        .texture("color_texture", TextureSource::Color(MAIN_CAMERA))
                        .texture("depth_texture", TextureSource::Depth(MAIN_CAMERA))
                        .texture("noise_texture", TextureSource::Color(NOISE_VOLUME)),
                ),
        );

        passes.push(
            RenderPass::new("composite", PassTarget::Backbuffer { depth: false })
                .clear(Clear::color(SCENE_CLEAR_COLOR))
                .depth_test(false)
                .draw(
                    DrawItem::full_screen(self.programs.post_fx)
                        .uniform("time", self.time)
                        .uniform("current_effect", self.params.effect as i32)
                        .uniform("filter_size", filter_size(self.params.filter_size_index))
                        .texture("frame_texture", TextureSource::Color(VOLUMETRIC)),
                ),
        );

        passes
    }

    /// Resizes the window-sized framebuffers, then runs this frame's passes.
    pub fn render<D: Device>(&mut self, device: &mut D, size: (u32, u32)) -> Result<()> {
        self.pool.reconcile(device, size.0, size.1);
        let passes = self.passes(size);
        self.sequencer
            .execute(device, &mut self.pool, &passes, size)?;
        Ok(())
    }

    /// Releases the framebuffer pool.
    pub fn destroy<D: Device>(&mut self, device: &mut D) {
        self.pool.destroy_all(device);
    }

    /// Background, landing pad and fighter as seen through `view`.
    fn scene_draws(&self, view: &View) -> Vec<DrawItem> {
        let background = DrawItem::full_screen(self.programs.background)
            .uniform(
                "inverse_view_projection_matrix",
                view.view_projection().inverse(),
            )
            .uniform("camera_position", view.camera.position)
            .uniform(
                "environment_multiplier",
                self.params.light.environment_multiplier,
            );

        let mut draws = vec![background];
        draws.extend(self.model_draws(&self.landing_pad, view, Mat4::IDENTITY));
        draws.extend(self.model_draws(&self.fighter, view, self.fighter_matrix()));
        draws
    }

    fn model_draws(&self, model: &Model, view: &View, model_matrix: Mat4) -> Vec<DrawItem> {
        let light = self.params.light;
        let model_view = view.view * model_matrix;
        let base = Uniforms::new()
            .with("model_view_projection_matrix", view.projection * model_view)
            .with("model_view_matrix", model_view)
            .with("normal_matrix", model_view.transpose().inverse())
            .with("view_inverse", view.view.inverse())
            .with(
                "view_space_light_position",
                view.view.transform_point3(light.position),
            )
            .with("point_light_color", light.color)
            .with("point_light_intensity_multiplier", light.intensity)
            .with("environment_multiplier", light.environment_multiplier);
        model.draw_items(self.programs.shading, &base).collect()
    }
}

/// Drops texture bindings that read `slot`, falling back to the material's
/// plain emission.
fn without_source(mut item: DrawItem, slot: FramebufferSlot) -> DrawItem {
    let before = item.textures.len();
    item.textures
        .retain(|(_, source)| source.framebuffer() != Some(slot));
    if item.textures.len() != before {
        item = item.uniform("has_emission_texture", 0);
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ColorTarget, TextureId};
    use crate::recording_device::{Command, RecordingDevice};
    use crate::render_graph::DrawGeometry;
    use crate::uniforms::UniformValue;
    use winit::event::ElementState;

    const SIZE: (u32, u32) = (320, 240);

    fn config(noise_bake: NoiseBake) -> Lab5Config {
        Lab5Config {
            noise_bake,
            noise_size: 8,
            ..Default::default()
        }
    }

    fn setup(noise_bake: NoiseBake) -> (RecordingDevice, Lab5State) {
        let mut device = RecordingDevice::new();
        let lab = Lab5State::new(&mut device, SIZE, &config(noise_bake)).unwrap();
        device.clear_log();
        (device, lab)
    }

    fn labels(passes: &[RenderPass]) -> Vec<&'static str> {
        passes.iter().map(|p| p.label).collect()
    }

    #[test]
    fn pool_layout() {
        let (_, lab) = setup(NoiseBake::Once);
        let pool = lab.pool();
        assert_eq!(pool.len(), 4);
        assert!(pool.get(SECURITY_CAMERA).unwrap().depth().is_some());
        assert!(pool.get(MAIN_CAMERA).unwrap().depth().is_some());
        assert!(pool.get(VOLUMETRIC).unwrap().depth().is_none());
        let noise = pool.get(NOISE_VOLUME).unwrap();
        assert!(noise.is_volume());
        assert_eq!(noise.depth_slices(), 8);
    }

    #[test]
    fn first_frame_runs_all_five_passes() {
        let (_, lab) = setup(NoiseBake::Once);
        assert_eq!(
            labels(&lab.passes(SIZE)),
            vec!["noise", "security camera", "main camera", "volumetric", "composite"]
        );
    }

    #[test]
    fn noise_bakes_once_by_default() {
        let (mut device, mut lab) = setup(NoiseBake::Once);
        lab.render(&mut device, SIZE).unwrap();
        let first = device.count(|c| matches!(c, Command::BeginPass { label, .. } if label == "noise"));
        assert_eq!(first, 8);

        device.clear_log();
        lab.render(&mut device, SIZE).unwrap();
        assert!(!labels(&lab.passes(SIZE)).contains(&"noise"));
        assert_eq!(device.passes().filter(|l| *l == "noise").count(), 0);
        // The volume still feeds the volumetric pass.
        assert_eq!(device.passes().filter(|l| *l == "volumetric").count(), 1);
    }

    #[test]
    fn noise_every_frame() {
        let (mut device, mut lab) = setup(NoiseBake::EveryFrame);
        lab.render(&mut device, SIZE).unwrap();
        lab.render(&mut device, SIZE).unwrap();
        assert_eq!(device.passes().filter(|l| *l == "noise").count(), 16);
    }

    #[test]
    fn noise_pass_binds_each_slice_once() {
        let (mut device, mut lab) = setup(NoiseBake::Once);
        lab.render(&mut device, SIZE).unwrap();

        let mut slices = Vec::new();
        let mut draws_after_slice = 0;
        let mut current = None;
        for command in &device.commands {
            match command {
                Command::BeginPass {
                    color: ColorTarget::Slice { slice, .. },
                    clear,
                    ..
                } => {
                    assert_eq!(*clear, Clear::color(NOISE_CLEAR_COLOR));
                    slices.push(*slice);
                    current = Some(*slice);
                }
                Command::BeginPass { .. } => current = None,
                Command::Draw(record) if current.is_some() => {
                    assert!(!record.depth_test);
                    assert_eq!(
                        record.uniforms.get("slice"),
                        current.map(|s| UniformValue::Int(s as i32))
                    );
                    draws_after_slice += 1;
                }
                _ => {}
            }
        }
        assert_eq!(slices, (0..8).collect::<Vec<_>>());
        assert_eq!(draws_after_slice, 8);
    }

    #[test]
    fn monitor_shows_security_camera_only_in_main_pass() {
        let (_, lab) = setup(NoiseBake::Once);
        let passes = lab.passes(SIZE);
        let reads_security = |pass: &RenderPass| pass.reads().any(|slot| slot == SECURITY_CAMERA);

        let security = passes.iter().find(|p| p.label == "security camera").unwrap();
        let main = passes.iter().find(|p| p.label == "main camera").unwrap();
        assert!(!reads_security(security));
        assert!(reads_security(main));
        assert!(Sequencer::validate(&passes, lab.pool()).is_ok());
    }

    #[test]
    fn monitor_samples_security_color_target() {
        let (mut device, mut lab) = setup(NoiseBake::Once);
        let security_color: TextureId = lab.pool().get(SECURITY_CAMERA).unwrap().color().id();
        lab.render(&mut device, SIZE).unwrap();

        let monitor_draws = device
            .draws()
            .filter(|d| d.textures.iter().any(|(_, id)| *id == security_color))
            .collect::<Vec<_>>();
        assert_eq!(monitor_draws.len(), 1);
        assert_eq!(monitor_draws[0].target, ColorTarget::Texture(
            lab.pool().get(MAIN_CAMERA).unwrap().color().id()
        ));
        assert_eq!(
            monitor_draws[0].uniforms.get("has_emission_texture"),
            Some(UniformValue::Int(1))
        );
    }

    #[test]
    fn camera_body_follows_security_camera() {
        let (_, lab) = setup(NoiseBake::Once);
        let matrix = lab.camera_body_matrix();
        let origin = matrix.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(70.0, 50.0, -70.0), 1e-3));

        // The lens (+Z in model space) points where the camera looks.
        let lens = matrix.transform_vector3(Vec3::Z).normalize();
        assert!(lens.abs_diff_eq(lab.security_camera.direction.normalize(), 1e-4));
    }

    #[test]
    fn fighter_hovers_above_pad() {
        let (_, mut lab) = setup(NoiseBake::Once);
        lab.params.fighter_rotate_speed = 1.0;
        lab.time = 2.0;
        let matrix = lab.fighter_matrix();
        assert!(matrix.w_axis.truncate().abs_diff_eq(Vec3::new(0.0, 10.0, 0.0), 1e-6));
    }

    #[test]
    fn volumetric_uniforms() {
        let (_, lab) = setup(NoiseBake::Once);
        let passes = lab.passes(SIZE);
        let pass = passes.iter().find(|p| p.label == "volumetric").unwrap();
        assert!(!pass.depth_test);
        let item = &pass.draws[0];
        assert_eq!(item.geometry, DrawGeometry::FullScreen);
        assert_eq!(
            item.uniforms.get("normalize_factors"),
            Some(UniformValue::Vec2(Vec2::new(1.0 / 320.0, 1.0 / 240.0)))
        );
        assert_eq!(
            item.uniforms.get("sphere_radius"),
            Some(UniformValue::Float(50.0))
        );
        assert!(item
            .textures
            .contains(&("depth_texture", TextureSource::Depth(MAIN_CAMERA))));
    }

    #[test]
    fn resize_reaches_every_flat_framebuffer() {
        let (mut device, mut lab) = setup(NoiseBake::Once);
        lab.render(&mut device, (640, 480)).unwrap();
        for slot in [SECURITY_CAMERA, MAIN_CAMERA, VOLUMETRIC] {
            let fb = lab.pool().get(slot).unwrap();
            assert_eq!((fb.width(), fb.height()), (640, 480));
        }
        let noise = lab.pool().get(NOISE_VOLUME).unwrap();
        assert_eq!((noise.width(), noise.height()), (8, 8));
    }

    #[test]
    fn destroy_releases_every_target() {
        let (mut device, mut lab) = setup(NoiseBake::Once);
        lab.destroy(&mut device);
        assert_eq!(device.live_textures(), 0);
        assert!(lab.pool().is_empty());
    }

    #[test]
    fn full_size_noise_volume_draws_once_per_slice() {
        let mut device = RecordingDevice::new();
        let mut lab = Lab5State::new(&mut device, SIZE, &Lab5Config::default()).unwrap();
        device.clear_log();
        lab.render(&mut device, SIZE).unwrap();

        let slices: Vec<u32> = device
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass {
                    color: ColorTarget::Slice { slice, .. },
                    ..
                } => Some(*slice),
                _ => None,
            })
            .collect();
        let noise_draws = device
            .draws()
            .filter(|d| d.uniforms.get("slice").is_some())
            .count();
        assert_eq!(slices, (0..128).collect::<Vec<_>>());
        assert_eq!(noise_draws, 128);
    }

    // ==================== Controls ====================

    #[test]
    fn drag_buttons_pick_the_camera() {
        let (_, mut lab) = setup(NoiseBake::Once);
        let main_before = lab.main_camera.direction;
        let security_before = lab.security_camera.direction;

        let mut input = Input::new();
        input.cursor_moved(Vec2::ZERO);
        input.cursor_moved(Vec2::new(20.0, 0.0));
        input.button_event(MouseButton::Right, ElementState::Pressed);
        lab.update(&input, 0.1);
        assert_eq!(lab.main_camera.direction, main_before);
        assert_ne!(lab.security_camera.direction, security_before);

        input.button_event(MouseButton::Left, ElementState::Pressed);
        let security_now = lab.security_camera.direction;
        lab.update(&input, 0.1);
        assert_ne!(lab.main_camera.direction, main_before);
        assert_eq!(lab.security_camera.direction, security_now);
    }

    #[test]
    fn filter_size_mapping() {
        assert_eq!(filter_size(1), 3);
        assert_eq!(filter_size(12), 25);
        assert_eq!(filter_size(0), 3);
        assert_eq!(filter_size(40), 25);
    }

    #[test]
    fn post_effect_indices() {
        for (i, effect) in PostEffect::ALL.iter().enumerate() {
            assert_eq!(*effect as usize, i);
            assert_eq!(PostEffect::from_index(i as i32), Some(*effect));
        }
        assert_eq!(PostEffect::from_index(9), None);
        assert_eq!(PostEffect::Composition.name(), "All of the above");
    }

    #[test]
    fn noise_bake_parse() {
        assert_eq!("once".parse::<NoiseBake>(), Ok(NoiseBake::Once));
        assert_eq!("Every-Frame".parse::<NoiseBake>(), Ok(NoiseBake::EveryFrame));
        assert!("sometimes".parse::<NoiseBake>().is_err());
    }

    #[test]
    fn overlay_drives_params() {
        let (_, mut lab) = setup(NoiseBake::Once);
        let mut overlay = Overlay::new();
        let controls = Lab5Controls::register(&mut overlay, &lab.params);

        let mut unchanged = lab.params;
        controls.apply(&overlay, &mut unchanged);
        assert_eq!(unchanged, lab.params);

        assert!(overlay.set(controls.effect, 8.0));
        assert!(overlay.set(controls.filter_size, 12.0));
        assert!(!overlay.set(controls.radius, 5.0));
        controls.apply(&overlay, &mut lab.params);
        assert_eq!(lab.params.effect, PostEffect::Bloom);
        assert_eq!(lab.params.volumetric.radius, 50.0);

        let passes = lab.passes(SIZE);
        let composite = passes.last().unwrap();
        assert_eq!(
            composite.draws[0].uniforms.get("filter_size"),
            Some(UniformValue::Int(25))
        );
        assert_eq!(
            composite.draws[0].uniforms.get("current_effect"),
            Some(UniformValue::Int(8))
        );
    }
}
