use bevy_ecs::prelude::{Component, Entity, World};
use glam::{Mat4, Quat, Vec3, Vec4};
use std::collections::HashMap;

use crate::camera3d::Ray;
use crate::glyph::LabelShaper;
use crate::mesh::Mesh;
use crate::mesh_registry::MeshRegistry;
use crate::picking::{ray_hit_obb, ray_sphere_intersection};
use crate::renderer::MeshDraw;
use crate::task::{Task, TaskId};

pub(crate) const CARD_WIDTH: f32 = 2.2;
pub(crate) const CARD_HEIGHT: f32 = 1.1;
pub(crate) const CARD_DEPTH: f32 = 0.18;
pub(crate) const COLUMN_SPACING: f32 = 2.8;
pub(crate) const ROW_SPACING: f32 = 1.6;
pub(crate) const DEPTH_STAGGER: f32 = 0.35;
pub(crate) const BOARD_TOP_Y: f32 = 2.6;
pub(crate) const LABEL_MAX_WIDTH_RATIO: f32 = 0.85;
pub(crate) const GROUND_EXTENT: f32 = 26.0;
pub(crate) const AXIS_LENGTH: f32 = 1.4;
pub(crate) const AXIS_THICKNESS: f32 = 0.04;

const GROUND_KEY: &str = "helper/ground";
const AXIS_KEYS: [(&str, Vec3, Vec4); 3] = [
    ("helper/axis_x", Vec3::X, Vec4::new(0.55, 0.25, 0.25, 1.0)),
    ("helper/axis_y", Vec3::Y, Vec4::new(0.25, 0.55, 0.25, 1.0)),
    ("helper/axis_z", Vec3::Z, Vec4::new(0.25, 0.30, 0.55, 1.0)),
];

#[derive(Component, Clone, Copy)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform3D {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

#[derive(Component, Clone)]
pub struct MeshRef {
    pub key: String,
}

#[derive(Component, Clone, Copy)]
pub struct Tint(pub Vec4);

/// Present only on objects whose text produced geometry.
#[derive(Component, Clone)]
pub struct Label {
    pub key: String,
    pub scale: f32,
    pub tint: Vec4,
}

/// Grid slot for the object at `index` in the current visible ordering.
/// Three columns, rows descending without bound, depth staggered by
/// parity. Pure: the same index always maps to the same position.
pub fn layout_slot(index: usize) -> Vec3 {
    let column = (index % 3) as f32 - 1.0;
    let row = (index / 3) as f32;
    let depth = if index % 2 == 0 { DEPTH_STAGGER } else { -DEPTH_STAGGER };
    Vec3::new(column * COLUMN_SPACING, BOARD_TOP_Y - row * ROW_SPACING, depth)
}

/// Card color is a function of the completion flag alone.
pub fn visual_state(completed: bool) -> Vec4 {
    if completed {
        Vec4::new(0.30, 0.52, 0.38, 1.0)
    } else {
        Vec4::new(0.38, 0.52, 0.86, 1.0)
    }
}

fn label_tint(completed: bool) -> Vec4 {
    if completed {
        Vec4::new(0.75, 0.82, 0.76, 1.0)
    } else {
        Vec4::new(0.96, 0.96, 0.92, 1.0)
    }
}

fn card_key(id: TaskId) -> String {
    format!("card/{id}")
}

fn label_key(id: TaskId) -> String {
    format!("label/{id}")
}

/// The scene's object graph: one entity per task plus unpickable helper
/// geometry. Task identity lives in a side table keyed by entity, not on
/// the entities themselves; the pick path resolves hits through it.
pub struct TaskScene {
    world: World,
    tags: HashMap<Entity, TaskId>,
    objects: Vec<Entity>,
    helpers: Vec<Entity>,
    synced_revision: Option<u64>,
}

impl TaskScene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            tags: HashMap::new(),
            objects: Vec::new(),
            helpers: Vec::new(),
            synced_revision: None,
        }
    }

    /// Spawns the static ground plane and orientation rods. Called once
    /// at mount; further calls are no-ops.
    pub fn mount_helpers(&mut self, registry: &mut MeshRegistry) {
        if !self.helpers.is_empty() {
            return;
        }
        registry.insert(GROUND_KEY, Mesh::ground_plane(GROUND_EXTENT));
        let ground = self
            .world
            .spawn((
                Transform3D { translation: Vec3::new(0.0, -3.2, 0.0), ..Default::default() },
                MeshRef { key: GROUND_KEY.to_string() },
                Tint(Vec4::new(0.16, 0.17, 0.20, 1.0)),
            ))
            .id();
        self.helpers.push(ground);
        for (key, axis, color) in AXIS_KEYS {
            registry.insert(key, Mesh::axis_rod(axis, AXIS_LENGTH, AXIS_THICKNESS));
            let rod = self
                .world
                .spawn((
                    Transform3D { translation: Vec3::new(0.0, -3.19, 0.0), ..Default::default() },
                    MeshRef { key: key.to_string() },
                    Tint(color),
                ))
                .id();
            self.helpers.push(rod);
        }
    }

    /// Full-rebuild synchronization. No-op while the glyph resource is
    /// pending (`shaper` is `None`) and when the store revision already
    /// matches, so redundant calls are safe and cheap. Returns whether a
    /// rebuild happened.
    pub fn synchronize(
        &mut self,
        tasks: &[Task],
        revision: u64,
        shaper: Option<&dyn LabelShaper>,
        label_height: f32,
        registry: &mut MeshRegistry,
    ) -> bool {
        let Some(shaper) = shaper else {
            return false;
        };
        if self.synced_revision == Some(revision) {
            return false;
        }

        // Destroy-all before recreate-all: every object's meshes are
        // released before any new ones are built, so repeated passes
        // cannot accumulate GPU resources.
        for entity in self.objects.drain(..) {
            if let Some(id) = self.tags.remove(&entity) {
                registry.remove(&card_key(id));
                registry.remove(&label_key(id));
            }
            let _ = self.world.despawn(entity);
        }

        for (index, task) in tasks.iter().enumerate() {
            let card = card_key(task.id);
            registry.insert(card.clone(), Mesh::card(CARD_WIDTH, CARD_HEIGHT, CARD_DEPTH));

            let label = shaper.shape_label(&task.text, label_height).map(|mesh| {
                let width = mesh.bounds.max.x - mesh.bounds.min.x;
                let max_width = CARD_WIDTH * LABEL_MAX_WIDTH_RATIO;
                let scale = if width > max_width { max_width / width } else { 1.0 };
                let key = label_key(task.id);
                registry.insert(key.clone(), mesh);
                Label { key, scale, tint: label_tint(task.completed) }
            });

            let mut spawned = self.world.spawn((
                Transform3D { translation: layout_slot(index), ..Default::default() },
                MeshRef { key: card },
                Tint(visual_state(task.completed)),
            ));
            if let Some(label) = label {
                spawned.insert(label);
            }
            let entity = spawned.id();
            self.tags.insert(entity, task.id);
            self.objects.push(entity);
        }

        self.synced_revision = Some(revision);
        true
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn tagged_ids(&self) -> Vec<TaskId> {
        self.tags.values().copied().collect()
    }

    pub fn translation_of(&self, id: TaskId) -> Option<Vec3> {
        let entity = self.tags.iter().find(|(_, tag)| **tag == id).map(|(entity, _)| *entity)?;
        self.world.get::<Transform3D>(entity).map(|transform| transform.translation)
    }

    /// Nearest tagged hit wins; helpers have no side-table entry and can
    /// never resolve. Safe on an empty scene.
    pub fn pick_task(&mut self, ray: Ray, registry: &MeshRegistry) -> Option<TaskId> {
        if ray.dir.length_squared() <= f32::EPSILON {
            return None;
        }
        let mut closest: Option<(TaskId, f32)> = None;
        let mut query = self.world.query::<(Entity, &Transform3D, &MeshRef)>();
        for (entity, transform, mesh_ref) in query.iter(&self.world) {
            let Some(&task_id) = self.tags.get(&entity) else {
                continue;
            };
            let Some(bounds) = registry.bounds(&mesh_ref.key) else {
                continue;
            };
            let max_scale =
                transform.scale.x.abs().max(transform.scale.y.abs()).max(transform.scale.z.abs()).max(0.0001);
            // Coarse sphere reject keeps the exact test off distant cards.
            let sphere_radius = bounds.radius * max_scale;
            if sphere_radius <= 0.0
                || ray_sphere_intersection(ray.origin, ray.dir, transform.translation, sphere_radius)
                    .is_none()
            {
                continue;
            }
            if let Some(distance) = ray_hit_obb(ray, transform, bounds) {
                match closest {
                    Some((_, best)) if distance >= best => {}
                    _ => closest = Some((task_id, distance)),
                }
            }
        }
        closest.map(|(id, _)| id)
    }

    /// Flattens the scene into renderer draws: helpers, cards, then
    /// labels floating just in front of their card faces.
    pub fn collect_draws(&mut self, draws: &mut Vec<MeshDraw>) {
        let mut cards = self.world.query::<(&Transform3D, &MeshRef, &Tint)>();
        for (transform, mesh_ref, tint) in cards.iter(&self.world) {
            draws.push(MeshDraw {
                key: mesh_ref.key.clone(),
                model: Mat4::from_scale_rotation_translation(
                    transform.scale,
                    transform.rotation,
                    transform.translation,
                ),
                color: tint.0,
            });
        }
        let mut labels = self.world.query::<(&Transform3D, &Label)>();
        for (transform, label) in labels.iter(&self.world) {
            let lift = Vec3::new(0.0, 0.0, CARD_DEPTH * 0.5 + 0.02);
            let model = Mat4::from_scale_rotation_translation(
                transform.scale * label.scale,
                transform.rotation,
                transform.translation + transform.rotation * lift,
            );
            draws.push(MeshDraw { key: label.key.clone(), model, color: label.tint });
        }
    }

    /// Teardown: despawns everything and releases every scene-owned mesh.
    pub fn clear(&mut self, registry: &mut MeshRegistry) {
        for entity in self.objects.drain(..) {
            if let Some(id) = self.tags.remove(&entity) {
                registry.remove(&card_key(id));
                registry.remove(&label_key(id));
            }
            let _ = self.world.despawn(entity);
        }
        for entity in self.helpers.drain(..) {
            let _ = self.world.despawn(entity);
        }
        registry.remove(GROUND_KEY);
        for (key, _, _) in AXIS_KEYS {
            registry.remove(key);
        }
        self.tags.clear();
        self.synced_revision = None;
    }
}

impl Default for TaskScene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_deterministic() {
        for index in 0..32 {
            assert_eq!(layout_slot(index), layout_slot(index));
        }
    }

    #[test]
    fn layout_walks_three_columns() {
        assert!((layout_slot(0).x - (-COLUMN_SPACING)).abs() < 1e-6);
        assert!(layout_slot(1).x.abs() < 1e-6);
        assert!((layout_slot(2).x - COLUMN_SPACING).abs() < 1e-6);
        assert_eq!(layout_slot(0).y, layout_slot(2).y);
        assert!(layout_slot(3).y < layout_slot(0).y, "fourth slot starts the next row down");
        assert_eq!(layout_slot(0).x, layout_slot(3).x);
    }

    #[test]
    fn layout_depth_staggers_by_parity() {
        assert!(layout_slot(0).z > 0.0);
        assert!(layout_slot(1).z < 0.0);
        assert_eq!(layout_slot(0).z, layout_slot(4).z);
    }

    #[test]
    fn rows_keep_descending_for_overflowing_boards() {
        // No paging: slot 30 simply sits ten rows below the top.
        let slot = layout_slot(30);
        assert!((slot.y - (BOARD_TOP_Y - 10.0 * ROW_SPACING)).abs() < 1e-6);
    }

    #[test]
    fn completion_flag_picks_the_visual_state() {
        assert_ne!(visual_state(false), visual_state(true));
        assert_eq!(visual_state(false), visual_state(false));
    }
}
