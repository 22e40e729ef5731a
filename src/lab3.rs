//! Lab 3: a free-fly camera over a small city.
//!
//! The player's car drives with the arrow keys; a second car circles a
//! roundabout east of the city. Everything is drawn in one backbuffer pass
//! with the `simple` program.
//!
//! | Input | Effect |
//! |---|---|
//! | W / S | camera forward / back along its direction |
//! | Left drag | turn the camera |
//! | Up / Down | car forward / back |
//! | Left / Right | car turns |

use glam::{Mat4, Vec3};
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::assets;
use crate::camera::Camera;
use crate::device::{Clear, Device, ProgramId};
use crate::error::Result;
use crate::free_fly::{DragScale, FreeFlyControls, MoveKeys};
use crate::input::Input;
use crate::model::Model;
use crate::overlay::{ControlId, Overlay};
use crate::render_graph::{DrawItem, PassTarget, RenderPass};
use crate::shaders;
use crate::uniforms::Uniforms;

pub const CLEAR_COLOR: [f32; 4] = [0.2, 0.2, 0.8, 1.0];

const CAR_SPEED: f32 = 10.0;
const CAR_TURN_SPEED: f32 = 2.0;
const ROUNDABOUT_CENTER: Vec3 = Vec3::new(25.0, 0.0, 0.0);
const ROUNDABOUT_RADIUS: Vec3 = Vec3::new(10.0, 0.0, 0.0);
/// A quarter turn per second.
const ROUNDABOUT_ANGULAR_SPEED: f32 = -std::f32::consts::FRAC_PI_2;

/// Projection parameters, tunable from the overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerspectiveParams {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub width: u32,
    pub height: u32,
    pub near: f32,
    pub far: f32,
}

impl Default for PerspectiveParams {
    fn default() -> Self {
        Self {
            fov: 45.0,
            width: 1280,
            height: 720,
            near: 0.1,
            far: 300.0,
        }
    }
}

impl PerspectiveParams {
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Overlay controls mirroring [`PerspectiveParams`].
#[derive(Clone, Copy, Debug)]
pub struct PerspectiveControls {
    fov: ControlId,
    width: ControlId,
    height: ControlId,
    near: ControlId,
    far: ControlId,
}

impl PerspectiveControls {
    pub fn register(overlay: &mut Overlay, params: &PerspectiveParams) -> Self {
        Self {
            fov: overlay.add_slider("field of view", 1.0, 180.0, params.fov),
            width: overlay.add_int_slider("width", 256, 1920, params.width as i32),
            height: overlay.add_int_slider("height", 256, 1080, params.height as i32),
            near: overlay.add_slider("near plane", 0.1, 300.0, params.near),
            far: overlay.add_slider("far plane", 0.1, 300.0, params.far),
        }
    }

    pub fn read(&self, overlay: &Overlay) -> PerspectiveParams {
        PerspectiveParams {
            fov: overlay.get(self.fov),
            width: overlay.get_int(self.width).max(1) as u32,
            height: overlay.get_int(self.height).max(1) as u32,
            near: overlay.get(self.near),
            far: overlay.get(self.far),
        }
    }

    /// Mirrors a window size into the width and height sliders. Sizes
    /// outside the slider ranges leave them untouched.
    pub fn write_size(&self, overlay: &mut Overlay, width: u32, height: u32) {
        overlay.set(self.width, width as f32);
        overlay.set(self.height, height as f32);
    }
}

/// The programs and models lab 3 draws with.
#[derive(Debug)]
pub struct Lab3Scene {
    program: ProgramId,
    city: Model,
    ground: Model,
    car: Model,
}

impl Lab3Scene {
    pub fn new<D: Device>(device: &mut D) -> Result<Self> {
        Ok(Self {
            program: device.create_program(&shaders::SIMPLE)?,
            city: assets::city(device)?,
            ground: assets::ground(device)?,
            car: assets::car(device)?,
        })
    }
}

/// Everything lab 3 carries from one frame to the next.
#[derive(Clone, Debug, PartialEq)]
pub struct Lab3State {
    pub camera: Camera,
    pub controls: FreeFlyControls,
    pub params: PerspectiveParams,
    /// The player's car.
    pub car_matrix: Mat4,
    /// Seconds since start; drives the roundabout car.
    pub time: f32,
}

impl Default for Lab3State {
    fn default() -> Self {
        Self::new()
    }
}

impl Lab3State {
    pub fn new() -> Self {
        Self {
            camera: Camera::new(Vec3::splat(15.0), Vec3::splat(-1.0)),
            controls: FreeFlyControls::new(MoveKeys::ForwardBack, 5.0, DragScale::Fixed(0.005)),
            params: PerspectiveParams::default(),
            car_matrix: Mat4::from_translation(Vec3::new(1.0, 5.0, 1.0)),
            time: 0.0,
        }
    }

    pub fn update(&mut self, input: &Input, dt: f32) {
        self.time += dt;

        if input.mouse_down(MouseButton::Left) {
            self.controls
                .apply_drag(&mut self.camera, input.mouse_delta(), dt);
        }
        self.controls.apply_keys(&mut self.camera, input, dt);

        let mut forward = 0.0;
        if input.key_down(KeyCode::ArrowUp) {
            forward += CAR_SPEED * dt;
        }
        if input.key_down(KeyCode::ArrowDown) {
            forward -= CAR_SPEED * dt;
        }
        let mut turn = 0.0;
        if input.key_down(KeyCode::ArrowLeft) {
            turn += CAR_TURN_SPEED * dt;
        }
        if input.key_down(KeyCode::ArrowRight) {
            turn -= CAR_TURN_SPEED * dt;
        }
        // Both are applied in the car's own frame.
        if forward != 0.0 || turn != 0.0 {
            self.car_matrix = self.car_matrix
                * Mat4::from_translation(Vec3::new(0.0, 0.0, forward))
                * Mat4::from_rotation_y(turn);
        }
    }

    pub fn projection(&self) -> Mat4 {
        self.camera
            .with_projection(self.params.fov, self.params.near, self.params.far)
            .projection_matrix(self.params.aspect())
    }

    pub fn roundabout_matrix(&self) -> Mat4 {
        roundabout_transform(self.time)
    }

    /// The frame's single backbuffer pass.
    pub fn passes(&self, scene: &Lab3Scene) -> Vec<RenderPass> {
        let view_projection = self.projection() * self.camera.view_matrix();
        let ground = Mat4::from_translation(Vec3::new(0.0, -0.5 + 0.0005, 0.0));

        let placed: [(&Model, Mat4); 4] = [
            (&scene.city, Mat4::IDENTITY),
            (&scene.ground, ground),
            (&scene.car, self.car_matrix),
            (&scene.car, self.roundabout_matrix()),
        ];
        let draws: Vec<DrawItem> = placed
            .iter()
            .flat_map(|(model, matrix)| {
                let base = Uniforms::new()
                    .with("model_view_projection_matrix", view_projection * *matrix)
                    .with("model_matrix", *matrix);
                model.draw_items(scene.program, &base).collect::<Vec<_>>()
            })
            .collect();

        vec![
            RenderPass::new("lab 3 scene", PassTarget::Backbuffer { depth: true })
                .clear(Clear::color_and_depth(CLEAR_COLOR))
                .draws(draws),
        ]
    }
}

/// Model matrix of the car circling the roundabout at time `t`.
///
/// The car sits on the circle and is turned with it, so it always faces
/// along its path.
pub fn roundabout_transform(t: f32) -> Mat4 {
    let rotation = Mat4::from_rotation_y(ROUNDABOUT_ANGULAR_SPEED * t);
    let on_circle = rotation.transform_point3(ROUNDABOUT_RADIUS);
    Mat4::from_translation(ROUNDABOUT_CENTER) * Mat4::from_translation(on_circle) * rotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ColorTarget, DepthTarget};
    use crate::recording_device::{Command, RecordingDevice};
    use crate::render_graph::{FramebufferPool, Sequencer};
    use crate::uniforms::UniformValue;
    use glam::Vec2;
    use winit::event::ElementState;

    #[test]
    fn starting_pose() {
        let state = Lab3State::new();
        assert_eq!(state.camera.position, Vec3::splat(15.0));
        assert_eq!(state.camera.direction, Vec3::splat(-1.0));
        assert_eq!(
            state.car_matrix.w_axis.truncate(),
            Vec3::new(1.0, 5.0, 1.0)
        );
    }

    #[test]
    fn zero_dt_frame_changes_nothing() {
        let mut state = Lab3State::new();
        let before = state.clone();
        let roundabout = state.roundabout_matrix();

        state.update(&Input::new(), 0.0);

        assert_eq!(state, before);
        assert_eq!(state.roundabout_matrix(), roundabout);
    }

    #[test]
    fn car_drives_in_its_own_frame() {
        let mut state = Lab3State::new();
        let mut input = Input::new();
        input.key_event(KeyCode::ArrowLeft, ElementState::Pressed);
        state.update(&input, std::f32::consts::FRAC_PI_4);

        let mut input = Input::new();
        input.key_event(KeyCode::ArrowUp, ElementState::Pressed);
        state.update(&input, 0.1);

        // Turned a quarter left, then one unit forward along the car's new +Z.
        let position = state.car_matrix.w_axis.truncate();
        assert!(position.abs_diff_eq(Vec3::new(2.0, 5.0, 1.0), 1e-4));
    }

    #[test]
    fn drag_needs_left_button() {
        let mut state = Lab3State::new();
        let mut input = Input::new();
        input.cursor_moved(Vec2::new(10.0, 10.0));
        input.begin_frame();
        input.cursor_moved(Vec2::new(60.0, 10.0));
        state.update(&input, 0.016);
        assert_eq!(state.camera.direction, Vec3::splat(-1.0));

        input.button_event(MouseButton::Left, ElementState::Pressed);
        state.update(&input, 0.016);
        assert_ne!(state.camera.direction, Vec3::splat(-1.0));
    }

    #[test]
    fn roundabout_circles_its_center() {
        for t in [0.0, 0.5, 1.0, 3.7] {
            let position = roundabout_transform(t).w_axis.truncate();
            assert!(((position - ROUNDABOUT_CENTER).length() - 10.0).abs() < 1e-4);
        }
        let start = roundabout_transform(0.0).w_axis.truncate();
        assert!(start.abs_diff_eq(Vec3::new(35.0, 0.0, 0.0), 1e-5));
        // A quarter turn after one second.
        let later = roundabout_transform(1.0).w_axis.truncate();
        assert!(later.abs_diff_eq(Vec3::new(25.0, 0.0, 10.0), 1e-4));
    }

    #[test]
    fn aspect_follows_size() {
        let params = PerspectiveParams {
            width: 1920,
            height: 1080,
            ..Default::default()
        };
        assert!((params.aspect() - 16.0 / 9.0).abs() < 1e-6);
    }

    // ==================== Overlay ====================

    #[test]
    fn controls_round_trip_defaults() {
        let mut overlay = Overlay::new();
        let params = PerspectiveParams::default();
        let controls = PerspectiveControls::register(&mut overlay, &params);
        assert_eq!(controls.read(&overlay), params);
    }

    #[test]
    fn window_size_out_of_range_is_ignored() {
        let mut overlay = Overlay::new();
        let controls = PerspectiveControls::register(&mut overlay, &PerspectiveParams::default());

        controls.write_size(&mut overlay, 800, 600);
        let read = controls.read(&overlay);
        assert_eq!((read.width, read.height), (800, 600));

        controls.write_size(&mut overlay, 2560, 1440);
        let read = controls.read(&overlay);
        assert_eq!((read.width, read.height), (800, 600));
    }

    // ==================== Frame ====================

    #[test]
    fn frame_is_one_cleared_backbuffer_pass() {
        let mut device = RecordingDevice::new();
        let scene = Lab3Scene::new(&mut device).unwrap();
        let state = Lab3State::new();
        let mut pool = FramebufferPool::new();
        let mut sequencer = Sequencer::new();
        device.clear_log();

        let passes = state.passes(&scene);
        sequencer
            .execute(&mut device, &mut pool, &passes, (1280, 720))
            .unwrap();

        let begins: Vec<_> = device
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass {
                    color, depth, clear, ..
                } => Some((*color, *depth, *clear)),
                _ => None,
            })
            .collect();
        assert_eq!(
            begins,
            vec![(
                ColorTarget::Backbuffer,
                DepthTarget::Backbuffer,
                Clear::color_and_depth(CLEAR_COLOR)
            )]
        );

        let expected_draws: usize = [&scene.city, &scene.ground, &scene.car, &scene.car]
            .iter()
            .map(|m| m.parts().len())
            .sum();
        assert_eq!(device.draws().count(), expected_draws);
        assert!(device.draws().all(|d| d.depth_test));
    }

    #[test]
    fn ground_sits_just_above_minus_half() {
        let mut device = RecordingDevice::new();
        let scene = Lab3Scene::new(&mut device).unwrap();
        let passes = Lab3State::new().passes(&scene);

        let ground_mesh = scene.ground.parts()[0].mesh;
        let item = passes[0]
            .draws
            .iter()
            .find(|d| d.geometry == crate::render_graph::DrawGeometry::Mesh(ground_mesh))
            .unwrap();
        let Some(UniformValue::Mat4(model)) = item.uniforms.get("model_matrix") else {
            panic!("ground has no model matrix");
        };
        assert!((model.w_axis.y - (-0.4995)).abs() < 1e-6);
    }
}
