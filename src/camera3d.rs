use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use winit::dpi::PhysicalSize;

const DEFAULT_UP: Vec3 = Vec3::Y;

/// World-space ray, direction normalized.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

/// Perspective camera for the task board view.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    /// The default framing: slightly above and in front of the board,
    /// looking at its center.
    pub fn board_view() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 7.5), Vec3::new(0.0, 0.5, 0.0), 50.0_f32.to_radians(), 0.1, 200.0)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    fn aspect(viewport: PhysicalSize<u32>) -> f32 {
        if viewport.height > 0 {
            viewport.width as f32 / viewport.height as f32
        } else {
            1.0
        }
    }

    pub fn view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        self.projection_matrix(Self::aspect(viewport)) * self.view_matrix()
    }

    /// World-space ray from the camera through a pointer position given in
    /// surface-local pixels. Screen-down maps to device-up, hence the
    /// inverted y term.
    pub fn screen_ray(&self, screen: Vec2, viewport: PhysicalSize<u32>) -> Option<Ray> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let ndc_x = (2.0 * screen.x / viewport.width as f32) - 1.0;
        let ndc_y = 1.0 - (2.0 * screen.y / viewport.height as f32);
        let clip = Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        let inv_view_proj = self.view_projection(viewport).inverse();
        let world = inv_view_proj * clip;
        if world.w.abs() < f32::EPSILON {
            return None;
        }
        let towards = (world.truncate() / world.w) - self.position;
        if towards.length_squared() <= f32::EPSILON {
            return None;
        }
        Some(Ray { origin: self.position, dir: towards.normalize() })
    }

    /// Projects a world point back to surface-local pixels. Inverse of the
    /// mapping `screen_ray` uses; picking tests aim through this.
    pub fn project_point(&self, point: Vec3, viewport: PhysicalSize<u32>) -> Option<Vec2> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let clip = self.view_projection(viewport) * point.extend(1.0);
        if clip.w.abs() < f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x + 1.0) * 0.5 * viewport.width as f32;
        let y = (1.0 - ndc.y) * 0.5 * viewport.height as f32;
        Some(Vec2::new(x, y))
    }
}

/// Orbit controller around the board center. Pitch is clamped so the view
/// never flips over the pole.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub radius: f32,
    pub yaw_radians: f32,
    pub pitch_radians: f32,
}

impl OrbitCamera {
    pub fn around(camera: &Camera3D) -> Self {
        let offset = camera.position - camera.target;
        let radius = offset.length().max(0.01);
        let yaw = offset.x.atan2(offset.z);
        let pitch = (offset.y / radius).clamp(-1.0, 1.0).asin();
        Self { target: camera.target, radius, yaw_radians: yaw, pitch_radians: pitch }
    }

    pub fn to_camera(&self, fov_y_radians: f32, near: f32, far: f32) -> Camera3D {
        let rotation = Quat::from_euler(glam::EulerRot::YXZ, self.yaw_radians, -self.pitch_radians, 0.0);
        let offset = rotation * Vec3::new(0.0, 0.0, self.radius);
        Camera3D::new(self.target + offset, self.target, fov_y_radians, near, far)
    }

    pub fn orbit(&mut self, delta: Vec2) {
        self.yaw_radians += delta.x;
        self.pitch_radians = (self.pitch_radians + delta.y)
            .clamp(-std::f32::consts::FRAC_PI_2 + 0.05, std::f32::consts::FRAC_PI_2 - 0.05);
    }

    pub fn zoom(&mut self, factor: f32) {
        self.radius = (self.radius * factor).clamp(2.0, 60.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_view_projection_is_finite() {
        let camera = Camera3D::board_view();
        let vp = camera.view_projection(PhysicalSize::new(1280, 720));
        assert!(!vp.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn projecting_then_ray_casting_round_trips() {
        let camera = Camera3D::board_view();
        let viewport = PhysicalSize::new(1024, 768);
        let point = Vec3::new(1.2, 0.4, 0.1);
        let screen = camera.project_point(point, viewport).expect("point projects");
        let ray = camera.screen_ray(screen, viewport).expect("ray builds");
        let to_point = (point - ray.origin).normalize();
        assert!(ray.dir.dot(to_point) > 0.999, "ray should pass through the projected point");
    }

    #[test]
    fn zero_viewport_yields_no_ray() {
        let camera = Camera3D::board_view();
        assert!(camera.screen_ray(Vec2::new(10.0, 10.0), PhysicalSize::new(0, 0)).is_none());
    }

    #[test]
    fn orbit_reconstructs_initial_framing() {
        let camera = Camera3D::board_view();
        let orbit = OrbitCamera::around(&camera);
        let rebuilt = orbit.to_camera(camera.fov_y_radians, camera.near, camera.far);
        assert!(rebuilt.position.distance(camera.position) < 1e-3);
    }

    #[test]
    fn orbit_pitch_stays_clamped() {
        let camera = Camera3D::board_view();
        let mut orbit = OrbitCamera::around(&camera);
        orbit.orbit(Vec2::new(0.0, 10.0));
        assert!(orbit.pitch_radians < std::f32::consts::FRAC_PI_2);
        orbit.zoom(0.01);
        assert!(orbit.radius >= 2.0);
    }
}
