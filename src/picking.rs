use glam::{Mat4, Vec2, Vec3};
use winit::dpi::PhysicalSize;

use crate::camera3d::{Camera3D, Ray};
use crate::mesh::MeshBounds;
use crate::mesh_registry::MeshRegistry;
use crate::scene::{TaskScene, Transform3D};
use crate::task::TaskId;

pub fn ray_sphere_intersection(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let b = oc.dot(dir);
    let c = oc.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt_d = discriminant.sqrt();
    let mut t = -b - sqrt_d;
    if t < 0.0 {
        t = -b + sqrt_d;
    }
    if t < 0.0 {
        return None;
    }
    Some(t)
}

pub fn ray_aabb_intersection(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = f32::INFINITY;
    let origin_arr = origin.to_array();
    let dir_arr = dir.to_array();
    let min_arr = min.to_array();
    let max_arr = max.to_array();
    for i in 0..3 {
        let o = origin_arr[i];
        let d = dir_arr[i];
        let min_axis = min_arr[i];
        let max_axis = max_arr[i];
        if d.abs() < 1e-6 {
            if o < min_axis || o > max_axis {
                return None;
            }
        } else {
            let inv_d = 1.0 / d;
            let mut t1 = (min_axis - o) * inv_d;
            let mut t2 = (max_axis - o) * inv_d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }
    if t_max < 0.0 {
        return None;
    }
    let t_hit = if t_min >= 0.0 { t_min } else { t_max };
    let hit = origin + dir * t_hit;
    Some((t_hit, hit))
}

/// Intersects a ray with a transformed bounding box by testing in the
/// box's local space. Returns the world-space hit distance.
pub fn ray_hit_obb(ray: Ray, transform: &Transform3D, bounds: &MeshBounds) -> Option<f32> {
    if !transform.scale.is_finite() {
        return None;
    }
    let min_scale = 0.0001;
    let scale = Vec3::new(
        transform.scale.x.abs().max(min_scale),
        transform.scale.y.abs().max(min_scale),
        transform.scale.z.abs().max(min_scale),
    );
    let world = Mat4::from_scale_rotation_translation(scale, transform.rotation, transform.translation);
    let inv = world.inverse();
    if !matrix_is_finite(&inv) {
        return None;
    }
    let origin_local = inv.transform_point3(ray.origin);
    let dir_local = inv.transform_vector3(ray.dir);
    if dir_local.length_squared() <= f32::EPSILON {
        return None;
    }
    let dir_local = dir_local.normalize();
    let (t_local, hit_local) = ray_aabb_intersection(origin_local, dir_local, bounds.min, bounds.max)?;
    if t_local < 0.0 {
        return None;
    }
    let hit_world = world.transform_point3(hit_local);
    Some((hit_world - ray.origin).length())
}

pub fn matrix_is_finite(mat: &Mat4) -> bool {
    mat.to_cols_array().iter().all(|v| v.is_finite())
}

/// Pointer-to-task resolution: surface-local cursor position in, task
/// identifier out. A miss, an empty scene, or a degenerate viewport all
/// yield `None` without side effects.
pub fn resolve_pick(
    cursor: Vec2,
    viewport: PhysicalSize<u32>,
    camera: &Camera3D,
    scene: &mut TaskScene,
    registry: &MeshRegistry,
) -> Option<TaskId> {
    let ray = camera.screen_ray(cursor, viewport)?;
    scene.pick_task(ray, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn sphere_hit_and_miss() {
        let origin = Vec3::new(0.0, 0.0, 5.0);
        let dir = Vec3::new(0.0, 0.0, -1.0);
        assert!(ray_sphere_intersection(origin, dir, Vec3::ZERO, 1.0).is_some());
        assert!(ray_sphere_intersection(origin, dir, Vec3::new(5.0, 0.0, 0.0), 1.0).is_none());
    }

    #[test]
    fn aabb_hit_reports_nearest_face() {
        let (t, hit) = ray_aabb_intersection(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::splat(-1.0),
            Vec3::splat(1.0),
        )
        .expect("ray should hit the box");
        assert!((t - 4.0).abs() < 1e-5);
        assert!((hit.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ray_starting_inside_box_still_hits() {
        let result = ray_aabb_intersection(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::splat(-1.0),
            Vec3::splat(1.0),
        );
        assert!(result.is_some());
    }

    #[test]
    fn obb_respects_rotation() {
        let bounds = MeshBounds {
            min: Vec3::new(-1.0, -0.1, -0.1),
            max: Vec3::new(1.0, 0.1, 0.1),
            center: Vec3::ZERO,
            radius: 1.0,
        };
        // A long thin box rotated 90 degrees around y now extends along z.
        let transform = Transform3D {
            translation: Vec3::ZERO,
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            scale: Vec3::ONE,
        };
        let along_z = Ray { origin: Vec3::new(0.0, 0.0, 5.0), dir: Vec3::new(0.0, 0.0, -1.0) };
        assert!(ray_hit_obb(along_z, &transform, &bounds).is_some());
        let offset_x = Ray { origin: Vec3::new(0.9, 0.0, 5.0), dir: Vec3::new(0.0, 0.0, -1.0) };
        assert!(ray_hit_obb(offset_x, &transform, &bounds).is_none(), "rotated box is thin along x");
    }
}
