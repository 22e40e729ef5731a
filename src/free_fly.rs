//! Keyboard and mouse-drag steering for a [`Camera`].
//!
//! The two labs steer differently:
//!
//! | | Lab 3 | Lab 5 |
//! |---|---|---|
//! | Move keys | W/S | W/S, A/D, Q/E |
//! | Speed | 5 | 10 |
//! | Drag | 0.005 rad/pixel | 0.1·dt rad/pixel |
//!
//! [`FreeFlyControls`] captures both through its [`MoveKeys`] and
//! [`DragScale`] settings.

use glam::{Vec2, Vec3};
use winit::keyboard::KeyCode;

use crate::camera::Camera;
use crate::input::Input;

/// Which keys translate the camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveKeys {
    /// W/S along the view direction.
    ForwardBack,
    /// W/S along the view direction, A/D along its right, Q/E along world up.
    SixAxis,
}

/// Radians turned per pixel of drag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragScale {
    Fixed(f32),
    /// Multiplied by the frame's elapsed seconds.
    PerSecond(f32),
}

impl DragScale {
    pub fn speed(self, dt: f32) -> f32 {
        match self {
            DragScale::Fixed(speed) => speed,
            DragScale::PerSecond(speed) => speed * dt,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FreeFlyControls {
    pub keys: MoveKeys,
    /// Units per second along each movement axis.
    pub move_speed: f32,
    pub drag: DragScale,
}

impl FreeFlyControls {
    pub fn new(keys: MoveKeys, move_speed: f32, drag: DragScale) -> Self {
        Self {
            keys,
            move_speed,
            drag,
        }
    }

    /// Offset produced by the held movement keys over `dt` seconds.
    ///
    /// Axes are used as-is, so an unnormalized direction moves faster.
    pub fn movement(&self, camera: &Camera, input: &Input, dt: f32) -> Vec3 {
        let step = self.move_speed * dt;
        let mut offset = Vec3::ZERO;

        if input.key_down(KeyCode::KeyW) {
            offset += camera.direction * step;
        }
        if input.key_down(KeyCode::KeyS) {
            offset -= camera.direction * step;
        }
        if self.keys == MoveKeys::SixAxis {
            let right = camera.right();
            if input.key_down(KeyCode::KeyA) {
                offset -= right * step;
            }
            if input.key_down(KeyCode::KeyD) {
                offset += right * step;
            }
            if input.key_down(KeyCode::KeyQ) {
                offset -= camera.world_up * step;
            }
            if input.key_down(KeyCode::KeyE) {
                offset += camera.world_up * step;
            }
        }
        offset
    }

    pub fn apply_keys(&self, camera: &mut Camera, input: &Input, dt: f32) {
        let offset = self.movement(camera, input, dt);
        if offset != Vec3::ZERO {
            camera.translate(offset);
        }
    }

    pub fn apply_drag(&self, camera: &mut Camera, delta: Vec2, dt: f32) {
        camera.drag(delta, self.drag.speed(dt));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::event::ElementState;

    fn held(keys: &[KeyCode]) -> Input {
        let mut input = Input::new();
        for key in keys {
            input.key_event(*key, ElementState::Pressed);
        }
        input
    }

    #[test]
    fn forward_back_ignores_strafe_keys() {
        let controls = FreeFlyControls::new(MoveKeys::ForwardBack, 5.0, DragScale::Fixed(0.005));
        let camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z);
        let input = held(&[KeyCode::KeyA, KeyCode::KeyE]);
        assert_eq!(controls.movement(&camera, &input, 1.0), Vec3::ZERO);
    }

    #[test]
    fn w_moves_along_unnormalized_direction() {
        let controls = FreeFlyControls::new(MoveKeys::ForwardBack, 5.0, DragScale::Fixed(0.005));
        let mut camera = Camera::new(Vec3::splat(15.0), Vec3::splat(-1.0));
        controls.apply_keys(&mut camera, &held(&[KeyCode::KeyW]), 0.5);
        assert!(camera.position.abs_diff_eq(Vec3::splat(12.5), 1e-5));
    }

    #[test]
    fn six_axis_strafes_and_climbs() {
        let controls = FreeFlyControls::new(MoveKeys::SixAxis, 10.0, DragScale::PerSecond(0.1));
        let camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z);
        let offset = controls.movement(&camera, &held(&[KeyCode::KeyD, KeyCode::KeyE]), 0.1);
        assert!(offset.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn zero_dt_moves_nothing() {
        let controls = FreeFlyControls::new(MoveKeys::SixAxis, 10.0, DragScale::PerSecond(0.1));
        let mut camera = Camera::new(Vec3::ONE, Vec3::NEG_Z);
        let before = camera;
        controls.apply_keys(&mut camera, &held(&[KeyCode::KeyW, KeyCode::KeyQ]), 0.0);
        controls.apply_drag(&mut camera, Vec2::new(5.0, 5.0), 0.0);
        assert_eq!(camera, before);
    }

    #[test]
    fn drag_scale() {
        assert_eq!(DragScale::Fixed(0.005).speed(0.25), 0.005);
        assert_eq!(DragScale::PerSecond(0.1).speed(0.5), 0.05);
    }
}
