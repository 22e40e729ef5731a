use glam::{Mat4, Quat, Vec2, Vec3};

/// Smallest gap kept between the near and far planes.
const MIN_DEPTH_RANGE: f32 = 1e-3;

/// A free camera defined by a position and a view direction.
///
/// The direction is not required to be unit length; movement along it
/// scales with its length, matching how the labs steer their cameras.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub world_up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            world_up: Vec3::Y,
            fov: 45.0,
            near: 0.1,
            far: 300.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, direction: Vec3) -> Self {
        Self {
            position,
            direction,
            ..Default::default()
        }
    }

    /// Points the camera at `target` with a unit direction.
    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.direction = (target - self.position).normalize_or(Vec3::NEG_Z);
        self
    }

    pub fn with_projection(mut self, fov: f32, near: f32, far: f32) -> Self {
        self.fov = fov;
        self.near = near;
        self.far = far;
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.world_up)
    }

    /// Perspective projection with a [0, 1] depth range.
    ///
    /// A far plane at or in front of the near plane is pushed just past it.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let far = if self.far <= self.near {
            self.near + MIN_DEPTH_RANGE
        } else {
            self.far
        };
        Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// `direction × up`, unnormalized.
    pub fn right(&self) -> Vec3 {
        self.direction.cross(self.world_up)
    }

    /// Turns the view by a mouse drag of `delta` pixels.
    ///
    /// Yaw spins around world up, pitch around the camera's right axis, each
    /// by `-delta * speed` radians.
    pub fn drag(&mut self, delta: Vec2, speed: f32) {
        if delta == Vec2::ZERO {
            return;
        }
        let yaw = Quat::from_axis_angle(self.world_up, -delta.x * speed);
        let pitch_axis = self.right().normalize_or_zero();
        if pitch_axis == Vec3::ZERO {
            // Looking straight along up: only yaw is defined.
            self.direction = yaw * self.direction;
            return;
        }
        let pitch = Quat::from_axis_angle(pitch_axis, -delta.y * speed);
        self.direction = pitch * (yaw * self.direction);
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_drag_is_bit_identical() {
        let mut camera = Camera::new(Vec3::splat(15.0), Vec3::splat(-1.0));
        let before = camera.direction;
        for speed in [0.005, 0.1, 10.0] {
            camera.drag(Vec2::ZERO, speed);
            assert_eq!(camera.direction.to_array(), before.to_array());
        }
    }

    #[test]
    fn horizontal_drag_only_yaws() {
        let mut camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z);
        camera.drag(Vec2::new(-100.0, 0.0), std::f32::consts::FRAC_PI_2 / 100.0);
        // A quarter turn to the left.
        assert!(camera.direction.abs_diff_eq(Vec3::NEG_X, 1e-5));
        assert!(camera.direction.y.abs() < 1e-6);
    }

    #[test]
    fn vertical_drag_pitches_up() {
        let mut camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z);
        camera.drag(Vec2::new(0.0, -10.0), 0.01);
        assert!(camera.direction.y > 0.0);
        assert!((camera.direction.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn drag_looking_straight_up_stays_finite() {
        let mut camera = Camera::new(Vec3::ZERO, Vec3::Y);
        camera.drag(Vec2::new(3.0, 4.0), 0.1);
        assert!(camera.direction.is_finite());
    }

    #[test]
    fn view_matrix_moves_position_to_origin() {
        let camera = Camera::new(Vec3::new(15.0, 15.0, 15.0), Vec3::splat(-1.0));
        let eye = camera.view_matrix().transform_point3(camera.position);
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-4));

        let ahead = camera
            .view_matrix()
            .transform_point3(camera.position + camera.direction);
        assert!(ahead.z < 0.0);
    }

    #[test]
    fn far_behind_near_is_clamped() {
        let camera = Camera::default().with_projection(45.0, 10.0, 5.0);
        let projection = camera.projection_matrix(16.0 / 9.0);
        assert!(projection.is_finite());

        let clip = projection * glam::Vec4::new(0.0, 0.0, -10.0, 1.0);
        assert!((clip.z / clip.w).abs() < 1e-4);
    }

    #[test]
    fn looking_at_normalizes() {
        let camera = Camera::new(Vec3::new(70.0, 50.0, -70.0), Vec3::ZERO).looking_at(Vec3::ZERO);
        assert!((camera.direction.length() - 1.0).abs() < 1e-6);
        assert!(camera.direction.y < 0.0);
    }
}
