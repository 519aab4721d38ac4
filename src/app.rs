use anyhow::{Context, Result};
use glam::Vec2;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};

use crate::camera3d::{Camera3D, OrbitCamera};
use crate::config::{AppConfig, AppConfigOverrides};
use crate::events::{EventBus, SceneEvent};
use crate::glyph::{GlyphLoader, GlyphSource};
use crate::mesh_registry::MeshRegistry;
use crate::picking::resolve_pick;
use crate::priority::{Heuristic, SuggestPriority};
use crate::renderer::{MeshDraw, Renderer};
use crate::scene::TaskScene;
use crate::task::TaskStore;
use crate::time::FrameClock;

const CAMERA_FOV_RADIANS: f32 = 50.0_f32.to_radians();
const CAMERA_NEAR: f32 = 0.1;
const CAMERA_FAR: f32 = 200.0;
const ORBIT_SENSITIVITY: f32 = 0.008;
const ZOOM_STEP: f32 = 0.1;

/// Stand-in backlog for the excluded list UI; the N key walks through it.
const SAMPLE_BACKLOG: &[&str] = &[
    "Fix the deploy pipeline ASAP",
    "Buy milk",
    "Read the consensus paper someday",
    "Rotate the API keys today",
    "Water the office plants",
    "Maybe archive the old boards",
    "Prepare the quarterly review",
    "Urgent: renew the TLS certificate",
];

pub async fn run() -> Result<()> {
    run_with_overrides(AppConfigOverrides::default()).await
}

pub async fn run_with_overrides(overrides: AppConfigOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default("config/app.json");
    config.apply_overrides(&overrides);
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

#[derive(Default)]
struct PointerState {
    cursor: Option<Vec2>,
    right_held: bool,
}

pub struct App {
    config: AppConfig,
    renderer: Renderer,
    scene: TaskScene,
    registry: MeshRegistry,
    store: TaskStore,
    events: EventBus,
    clock: FrameClock,
    orbit: OrbitCamera,
    glyphs: Option<GlyphLoader>,
    pointer: PointerState,
    suggester: Heuristic,
    sample_cursor: usize,
    glyph_failure_reported: bool,
    should_close: bool,
    mounted: bool,
    torn_down: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let store = match config.tasks.as_deref() {
            Some(path) => match TaskStore::load(path) {
                Ok(store) => store,
                Err(err) => {
                    eprintln!("[tasks] seed load failed: {err:?}. Starting with the demo backlog.");
                    Self::demo_backlog()
                }
            },
            None => Self::demo_backlog(),
        };
        let size = PhysicalSize::new(config.window.width.max(1), config.window.height.max(1));
        let renderer = Renderer::new(size, config.window.vsync);
        Self {
            config,
            renderer,
            scene: TaskScene::new(),
            registry: MeshRegistry::new(),
            store,
            events: EventBus::default(),
            clock: FrameClock::new(),
            orbit: OrbitCamera::around(&Camera3D::board_view()),
            glyphs: None,
            pointer: PointerState::default(),
            suggester: Heuristic,
            sample_cursor: 0,
            glyph_failure_reported: false,
            should_close: false,
            mounted: false,
            torn_down: false,
        }
    }

    fn demo_backlog() -> TaskStore {
        let suggester = Heuristic;
        let mut store = TaskStore::new();
        for text in &SAMPLE_BACKLOG[..4] {
            store.add(*text, suggester.suggest(text));
        }
        store
    }

    fn camera(&self) -> Camera3D {
        self.orbit.to_camera(CAMERA_FOV_RADIANS, CAMERA_NEAR, CAMERA_FAR)
    }

    fn mount(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        self.renderer.ensure_window(event_loop, &self.config.window.title)?;
        self.renderer.init_mesh_pipeline()?;
        self.scene.mount_helpers(&mut self.registry);
        let source = GlyphSource::parse(&self.config.glyph.source);
        eprintln!("[glyph] loading typeface from {source}");
        self.glyphs = Some(GlyphLoader::spawn(source));
        Ok(())
    }

    fn add_sample_task(&mut self) {
        let text = SAMPLE_BACKLOG[self.sample_cursor % SAMPLE_BACKLOG.len()];
        self.sample_cursor += 1;
        let priority = self.suggester.suggest(text);
        let id = self.store.add(text, priority);
        self.events.push(SceneEvent::TaskAdded { id });
    }

    fn remove_last_task(&mut self) {
        if let Some(id) = self.store.remove_last() {
            self.events.push(SceneEvent::TaskRemoved { id });
        }
    }

    fn handle_click(&mut self) {
        let Some(cursor) = self.pointer.cursor else {
            return;
        };
        let camera = self.camera();
        let viewport = self.renderer.size();
        let Some(id) = resolve_pick(cursor, viewport, &camera, &mut self.scene, &self.registry) else {
            return;
        };
        if self.store.toggle(id) {
            let completed = self
                .store
                .tasks()
                .iter()
                .find(|task| task.id == id)
                .map(|task| task.completed)
                .unwrap_or(false);
            self.events.push(SceneEvent::TaskToggled { id, completed });
        }
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => self.should_close = true,
            Key::Character(text) => {
                if text.eq_ignore_ascii_case("n") {
                    self.add_sample_task();
                } else if text.eq_ignore_ascii_case("x") {
                    self.remove_last_task();
                }
            }
            _ => {}
        }
    }

    fn frame(&mut self) {
        self.clock.tick();

        if let Some(loader) = self.glyphs.as_mut() {
            if loader.poll() {
                self.events.push(SceneEvent::GlyphReady);
            } else if !loader.is_pending() && !loader.is_ready() && !self.glyph_failure_reported {
                self.glyph_failure_reported = true;
                self.events.push(SceneEvent::GlyphFailed {
                    message: "typeface unavailable, rendering without labels".to_string(),
                });
            }
        }

        // Synchronization triggers: glyph readiness flips the resource
        // from None, task mutations move the store revision. Both funnel
        // through the same idempotent call.
        let shaper = self.glyphs.as_ref().and_then(GlyphLoader::resource).cloned();
        if let Some(shaper) = &shaper {
            let rebuilt = self.scene.synchronize(
                self.store.tasks(),
                self.store.revision(),
                Some(shaper.as_ref() as &dyn crate::glyph::LabelShaper),
                self.config.glyph.label_height,
                &mut self.registry,
            );
            if rebuilt {
                self.events.push(SceneEvent::SceneRebuilt { objects: self.scene.object_count() });
            }
        }

        for event in self.events.drain() {
            eprintln!("[event] {event}");
        }

        let mut draws: Vec<MeshDraw> = Vec::new();
        self.scene.collect_draws(&mut draws);
        for draw in &draws {
            if let Err(err) = self.registry.ensure_gpu(&draw.key, &self.renderer) {
                eprintln!("[renderer] upload failed for '{}': {err:?}", draw.key);
            }
        }

        let camera = self.camera();
        let viewport = self.renderer.size();
        match self.renderer.render_meshes(
            &self.registry,
            &draws,
            camera.view_projection(viewport),
            camera.position,
        ) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => self.renderer.resize(viewport),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                eprintln!("[renderer] out of device memory, closing");
                self.should_close = true;
            }
            Err(err) => eprintln!("[renderer] frame error: {err:?}"),
        }

        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }

    /// Ordered teardown. Runs once; the guard makes a second trigger a
    /// no-op. Order: stop the loop, silence the async load, drop pointer
    /// state and the camera controller, release scene meshes, then the
    /// renderer and its window.
    fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.should_close = true;
        if let Some(mut loader) = self.glyphs.take() {
            loader.cancel();
        }
        self.pointer = PointerState::default();
        self.orbit = OrbitCamera::around(&Camera3D::board_view());
        self.scene.clear(&mut self.registry);
        self.registry.clear();
        self.renderer.destroy();
        eprintln!("[scene] teardown complete after {} frames", self.clock.frame_index());
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.mounted || self.torn_down {
            return;
        }
        match self.mount(event_loop) {
            Ok(()) => self.mounted = true,
            Err(err) => {
                eprintln!("[scene] mount failed: {err:?}");
                self.should_close = true;
            }
        }
    }

    fn window_event(&mut self, _el: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.renderer.resize(size),
            WindowEvent::CursorMoved { position, .. } => {
                let cursor = Vec2::new(position.x as f32, position.y as f32);
                if self.pointer.right_held {
                    if let Some(last) = self.pointer.cursor {
                        let delta = (cursor - last) * ORBIT_SENSITIVITY;
                        self.orbit.orbit(delta);
                    }
                }
                self.pointer.cursor = Some(cursor);
            }
            WindowEvent::MouseInput { state, button, .. } => match button {
                MouseButton::Left => {
                    if state == ElementState::Pressed {
                        self.handle_click();
                    }
                }
                MouseButton::Right => self.pointer.right_held = state == ElementState::Pressed,
                _ => {}
            },
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 40.0,
                };
                self.orbit.zoom(1.0 - scroll * ZOOM_STEP);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Liveness check first: once teardown starts, the loop stops
        // rescheduling itself.
        if self.should_close {
            self.shutdown();
            event_loop.exit();
            return;
        }
        if !self.mounted {
            return;
        }
        self.frame();
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
