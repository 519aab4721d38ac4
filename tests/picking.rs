use glam::Vec2;
use winit::dpi::PhysicalSize;

use taskscape::camera3d::Camera3D;
use taskscape::glyph::LabelShaper;
use taskscape::mesh::Mesh;
use taskscape::mesh_registry::MeshRegistry;
use taskscape::picking::resolve_pick;
use taskscape::scene::TaskScene;
use taskscape::task::{Priority, Task};

struct QuadShaper;

impl LabelShaper for QuadShaper {
    fn shape_label(&self, text: &str, height: f32) -> Option<Mesh> {
        if text.trim().is_empty() {
            return None;
        }
        let width = height * text.chars().count() as f32 * 0.5;
        let mut mesh = Mesh::from_flat_triangles(
            &[[0.0, 0.0], [width, 0.0], [width, height], [0.0, height]],
            vec![0, 1, 2, 0, 2, 3],
            0.0,
        );
        mesh.recenter();
        Some(mesh)
    }
}

fn viewport() -> PhysicalSize<u32> {
    PhysicalSize::new(1280, 720)
}

fn board_with(texts: &[&str]) -> (TaskScene, MeshRegistry, Vec<Task>) {
    let mut scene = TaskScene::new();
    let mut registry = MeshRegistry::new();
    let tasks: Vec<Task> = texts.iter().map(|text| Task::new(*text, Priority::Medium)).collect();
    scene.synchronize(&tasks, 1, Some(&QuadShaper), 0.2, &mut registry);
    (scene, registry, tasks)
}

#[test]
fn clicking_a_card_center_resolves_its_task() {
    let (mut scene, registry, tasks) = board_with(&["left", "middle", "right"]);
    let camera = Camera3D::board_view();

    for (index, task) in tasks.iter().enumerate() {
        let center = scene.translation_of(task.id).expect("object placed");
        let cursor = camera.project_point(center, viewport()).expect("center projects on screen");
        let picked = resolve_pick(cursor, viewport(), &camera, &mut scene, &registry);
        assert_eq!(picked, Some(task.id), "click on card {index} center should resolve it");
    }
}

#[test]
fn clicking_empty_space_resolves_nothing() {
    let (mut scene, registry, _tasks) = board_with(&["left", "middle", "right"]);
    let camera = Camera3D::board_view();

    let corner = Vec2::new(2.0, 2.0);
    assert_eq!(resolve_pick(corner, viewport(), &camera, &mut scene, &registry), None);
}

#[test]
fn picking_an_empty_scene_is_safe() {
    let mut scene = TaskScene::new();
    let registry = MeshRegistry::new();
    let camera = Camera3D::board_view();

    let center = Vec2::new(viewport().width as f32 * 0.5, viewport().height as f32 * 0.5);
    assert_eq!(resolve_pick(center, viewport(), &camera, &mut scene, &registry), None);
}

#[test]
fn helper_geometry_never_resolves_to_a_task() {
    let mut scene = TaskScene::new();
    let mut registry = MeshRegistry::new();
    scene.mount_helpers(&mut registry);
    let camera = Camera3D::board_view();

    // The center ray crosses the ground plane; the ground has no side
    // table entry, so the pick must stay empty.
    let center = Vec2::new(viewport().width as f32 * 0.5, viewport().height as f32 * 0.5);
    assert_eq!(resolve_pick(center, viewport(), &camera, &mut scene, &registry), None);
}

#[test]
fn degenerate_viewport_yields_no_pick() {
    let (mut scene, registry, _tasks) = board_with(&["solo"]);
    let camera = Camera3D::board_view();
    assert_eq!(
        resolve_pick(Vec2::new(10.0, 10.0), PhysicalSize::new(0, 0), &camera, &mut scene, &registry),
        None
    );
}
