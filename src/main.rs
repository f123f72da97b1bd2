// Lumen host binary
//
// Owns the winit event loop and window, builds the graphics backend
// through the factory, and drives one begin_frame/end_frame pair per
// redraw. The backend recovers from resizes on its own; the host only
// skips rendering while the window is minimized.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Fullscreen, Window, WindowAttributes};

use lumen::config::Config;
use lumen::error::GraphicsError;
use lumen::graphics::{create_backend, Backend, BackendKind};
use lumen::window::WinitBridge;

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!(
        "Starting {} ({}x{}, {})",
        config.window.title,
        config.window.width,
        config.window.height,
        if config.window.fullscreen {
            "fullscreen"
        } else {
            "windowed"
        }
    );

    let backend_kind = BackendKind::from_str(&config.graphics.backend)
        .context("invalid graphics.backend in config.toml")?;

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, backend_kind);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

struct App {
    config: Config,
    backend_kind: BackendKind,

    window: Option<Arc<Window>>,
    backend: Option<Backend>,

    is_fullscreen: bool,
    /// Zero-sized window; skip rendering entirely until restored.
    is_minimized: bool,

    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config, backend_kind: BackendKind) -> Self {
        let is_fullscreen = config.window.fullscreen;
        Self {
            config,
            backend_kind,
            window: None,
            backend: None,
            is_fullscreen,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }

    fn init_graphics(&mut self, window: Arc<Window>) -> Result<(), GraphicsError> {
        let bridge = Arc::new(WinitBridge::new(window));
        let backend = create_backend(self.backend_kind, bridge, &self.config)?;
        self.backend = Some(backend);
        Ok(())
    }

    fn render_frame(&mut self) -> Result<(), GraphicsError> {
        if self.is_minimized {
            return Ok(());
        }
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };

        backend.begin_frame()?;
        backend.end_frame()?;

        self.update_fps();
        Ok(())
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;
        let elapsed = self.last_fps_update.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            if let Some(ref window) = self.window {
                window.set_title(&format!("{} - {:.0} FPS", self.config.window.title, fps));
            }
            self.frame_count = 0;
            self.last_fps_update = Instant::now();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        // Initialization failure is reported and the loop exits; the
        // half-built backend releases its resources when dropped.
        if let Err(e) = self.init_graphics(window.clone()) {
            log::error!("Failed to initialize graphics: {e}");
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                if let Some(ref mut backend) = self.backend {
                    backend.shutdown();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                // The backend notices resizes itself through stale
                // acquire/present results; only minimization matters here.
                self.is_minimized = size.width == 0 || size.height == 0;
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    log::error!("Render failed: {e}");
                    event_loop.exit();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("Escape pressed, exiting");
                                event_loop.exit();
                            }
                            KeyCode::F11 => {
                                self.toggle_fullscreen();
                            }
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
