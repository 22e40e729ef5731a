//! Window lifecycle and the frame loop shared by both labs.
//!
//! A lab is a setup closure that builds its state against the device and
//! returns a frame closure. Every frame the shell drains window events into
//! [`Input`], calls the frame closure (which updates and renders the lab),
//! draws the overlay on top and presents.

use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::device::{Clear, Device, ProgramId};
use crate::input::Input;
use crate::lab5::{Lab5Config, NoiseBake};
use crate::overlay::Overlay;
use crate::render_graph::{FramebufferPool, PassTarget, RenderPass, Sequencer};
use crate::shaders;
use crate::wgpu_device::WgpuDevice;

const DEFAULT_LOG_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn";
/// Seconds between window title refreshes.
const TITLE_INTERVAL: f32 = 0.25;

static LOGGER: Once = Once::new();

/// Installs `env_logger`, honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_logging() {
    LOGGER.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER);
        let _ = env_logger::Builder::from_env(env).try_init();
    });
}

/// Configuration for the application window and the lab it hosts.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub noise_bake: NoiseBake,
    /// Edge length of lab 5's noise volume.
    pub noise_size: u32,
    pub screenshot_dir: PathBuf,
    pub fighter_model: Option<PathBuf>,
    pub camera_model: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "render labs".to_string(),
            width: 1280,
            height: 720,
            noise_bake: NoiseBake::Once,
            noise_size: 128,
            screenshot_dir: PathBuf::from("screenshots"),
            fighter_model: None,
            camera_model: None,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn noise_bake(mut self, noise_bake: NoiseBake) -> Self {
        self.noise_bake = noise_bake;
        self
    }

    pub fn noise_size(mut self, size: u32) -> Self {
        self.noise_size = size;
        self
    }

    pub fn screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    pub fn fighter_model(mut self, path: Option<PathBuf>) -> Self {
        self.fighter_model = path;
        self
    }

    pub fn camera_model(mut self, path: Option<PathBuf>) -> Self {
        self.camera_model = path;
        self
    }

    /// Applies environment overrides on top of the builder values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(noise_bake) = NoiseBake::from_env() {
            self.noise_bake = noise_bake;
        }
        self
    }

    /// The lab 5 part of this configuration.
    pub fn lab5(&self) -> Lab5Config {
        Lab5Config {
            noise_bake: self.noise_bake,
            noise_size: self.noise_size,
            fighter_model: self.fighter_model.clone(),
            camera_model: self.camera_model.clone(),
        }
    }
}

type ExitFn = Box<dyn FnOnce(&mut WgpuDevice)>;

/// Context provided during lab setup.
pub struct SetupContext<'a> {
    pub device: &'a mut WgpuDevice,
    pub config: &'a AppConfig,
    pub overlay: &'a mut Overlay,
    on_exit: &'a mut Vec<ExitFn>,
}

impl SetupContext<'_> {
    /// Backbuffer size in pixels.
    pub fn size(&self) -> (u32, u32) {
        self.device.size()
    }

    /// Runs `f` with the device when the app shuts down, in registration
    /// order.
    pub fn on_exit(&mut self, f: impl FnOnce(&mut WgpuDevice) + 'static) {
        self.on_exit.push(Box::new(f));
    }
}

/// Per-frame context handed to the frame closure.
pub struct Frame<'a> {
    pub device: &'a mut WgpuDevice,
    pub input: &'a Input,
    pub overlay: &'a mut Overlay,
    /// Seconds since the loop started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
    /// Backbuffer size in pixels.
    pub size: (u32, u32),
    /// Whether an overlay value changed this frame.
    pub overlay_changed: bool,
    window_resized: Option<(u32, u32)>,
    requested_size: &'a mut Option<(u32, u32)>,
}

impl Frame<'_> {
    pub fn fps(&self) -> f32 {
        if self.dt > 0.0 { 1.0 / self.dt } else { 0.0 }
    }

    pub fn width(&self) -> u32 {
        self.size.0
    }

    pub fn height(&self) -> u32 {
        self.size.1
    }

    /// The new size when the user resized the window since the last frame.
    pub fn window_resized(&self) -> Option<(u32, u32)> {
        self.window_resized
    }

    /// Asks the window to take the given inner size after this frame.
    pub fn request_window_size(&mut self, width: u32, height: u32) {
        *self.requested_size = Some((width, height));
    }
}

type FrameFn = Box<dyn FnMut(&mut Frame) -> anyhow::Result<()>>;
type SetupFn = Box<dyn FnOnce(&mut SetupContext) -> anyhow::Result<FrameFn>>;

/// Opens the window and runs the lab until it exits.
///
/// `setup` runs once the window and device exist. Its error, or the first
/// error a frame returns, ends the loop and is returned from here.
///
/// # Example
/// ```ignore
/// render_labs::run_with_config(AppConfig::new().title("lab"), |ctx| {
///     let scene = Lab3Scene::new(ctx.device)?;
///     let mut state = Lab3State::new();
///     Ok(move |frame: &mut Frame| {
///         state.update(frame.input, frame.dt);
///         Sequencer::new().execute(frame.device, &mut pool, &state.passes(&scene), frame.size)?;
///         Ok(())
///     })
/// })?;
/// ```
pub fn run_with_config<S, F>(config: AppConfig, setup: S) -> anyhow::Result<()>
where
    S: FnOnce(&mut SetupContext) -> anyhow::Result<F> + 'static,
    F: FnMut(&mut Frame) -> anyhow::Result<()> + 'static,
{
    init_logging();
    let config = config.with_env_overrides();
    log::info!(
        "starting `{}` at {}x{}, noise bake {:?}",
        config.title,
        config.width,
        config.height,
        config.noise_bake
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = LabApp::Pending {
        config,
        setup: Some(Box::new(move |ctx| {
            let frame_fn = setup(ctx)?;
            Ok(Box::new(frame_fn) as FrameFn)
        })),
    };
    event_loop.run_app(&mut app)?;

    match app {
        LabApp::Failed(e) => Err(e),
        _ => Ok(()),
    }
}

/// Overlay drawing on top of the lab's output.
struct OverlayPass {
    program: ProgramId,
    sequencer: Sequencer,
    pool: FramebufferPool,
}

impl OverlayPass {
    fn new(device: &mut WgpuDevice) -> anyhow::Result<Self> {
        Ok(Self {
            program: device.create_program(&shaders::OVERLAY)?,
            sequencer: Sequencer::new(),
            pool: FramebufferPool::new(),
        })
    }

    fn render(
        &mut self,
        device: &mut WgpuDevice,
        overlay: &Overlay,
        size: (u32, u32),
    ) -> anyhow::Result<()> {
        if !overlay.is_visible() {
            return Ok(());
        }
        let pass = RenderPass::new("overlay", PassTarget::Backbuffer { depth: false })
            .clear(Clear::load())
            .depth_test(false)
            .draws(overlay.draw_items(self.program, size));
        self.sequencer
            .execute(device, &mut self.pool, &[pass], size)?;
        Ok(())
    }
}

struct Running {
    window: Arc<Window>,
    config: AppConfig,
    device: WgpuDevice,
    input: Input,
    overlay: Overlay,
    overlay_pass: OverlayPass,
    frame_fn: FrameFn,
    on_exit: Vec<ExitFn>,
    start_time: Instant,
    last_frame: Instant,
    last_title: Instant,
    pending_resize: Option<(u32, u32)>,
}

enum LabApp {
    Pending {
        config: AppConfig,
        setup: Option<SetupFn>,
    },
    Running(Box<Running>),
    Failed(anyhow::Error),
    Exited,
}

impl LabApp {
    fn start(
        event_loop: &ActiveEventLoop,
        config: AppConfig,
        setup: SetupFn,
    ) -> anyhow::Result<Running> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let mut device = WgpuDevice::new(window.clone())?;
        let overlay_pass = OverlayPass::new(&mut device)?;

        let mut overlay = Overlay::new();
        let mut on_exit = Vec::new();
        let frame_fn = {
            let mut ctx = SetupContext {
                device: &mut device,
                config: &config,
                overlay: &mut overlay,
                on_exit: &mut on_exit,
            };
            setup(&mut ctx)?
        };

        let now = Instant::now();
        Ok(Running {
            window,
            config,
            device,
            input: Input::new(),
            overlay,
            overlay_pass,
            frame_fn,
            on_exit,
            start_time: now,
            last_frame: now,
            last_title: now,
            pending_resize: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.shutdown();
        *self = LabApp::Failed(error);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let LabApp::Running(running) = self {
            let hooks = std::mem::take(&mut running.on_exit);
            for hook in hooks {
                hook(&mut running.device);
            }
        }
    }
}

impl ApplicationHandler for LabApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let LabApp::Pending { config, setup } = self else {
            return;
        };
        let Some(setup) = setup.take() else {
            return;
        };
        match Self::start(event_loop, config.clone(), setup) {
            Ok(running) => {
                running.window.request_redraw();
                *self = LabApp::Running(Box::new(running));
            }
            Err(e) => self.fail(event_loop, e.context("lab setup failed")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let LabApp::Running(running) = self else {
            return;
        };

        running.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                *self = LabApp::Exited;
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event: key, .. }
                if key.state == ElementState::Released
                    && key.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                self.shutdown();
                *self = LabApp::Exited;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                running.device.resize(size.width, size.height);
                if size.width > 0 && size.height > 0 {
                    running.pending_resize = Some((size.width, size.height));
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = running.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }
}

impl Running {
    fn redraw(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let time = self.start_time.elapsed().as_secs_f32();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        if self.input.key_pressed(KeyCode::KeyG) {
            self.overlay.toggle();
        }
        if self.input.key_pressed(KeyCode::PrintScreen) {
            if self.device.gpu().supports_readback() {
                self.device.request_screenshot(&self.config.screenshot_dir);
            } else {
                log::warn!("screenshots are not supported by this surface");
            }
        }
        let overlay_changed = self.overlay.handle_input(&self.input);

        let mut requested_size = None;
        if self.device.begin_frame() {
            let size = self.device.size();
            let mut frame = Frame {
                device: &mut self.device,
                input: &self.input,
                overlay: &mut self.overlay,
                time,
                dt,
                size,
                overlay_changed,
                window_resized: self.pending_resize.take(),
                requested_size: &mut requested_size,
            };
            (self.frame_fn)(&mut frame)?;
            let fps = frame.fps();

            self.overlay_pass
                .render(&mut self.device, &self.overlay, size)?;
            match self.device.end_frame() {
                Ok(Some(path)) => log::info!("saved screenshot to {}", path.display()),
                Ok(None) => {}
                Err(e) => log::warn!("screenshot dropped: {e}"),
            }

            if now.duration_since(self.last_title).as_secs_f32() >= TITLE_INTERVAL {
                self.last_title = now;
                self.window.set_title(&self.title(fps));
            }
        }

        if let Some((width, height)) = requested_size {
            log::debug!("requesting window size {width}x{height}");
            if let Some(size) = self
                .window
                .request_inner_size(PhysicalSize::new(width, height))
            {
                self.device.resize(size.width, size.height);
            }
        }

        self.input.begin_frame();
        self.window.request_redraw();
        Ok(())
    }

    fn title(&self, fps: f32) -> String {
        if self.overlay.is_visible() {
            format!(
                "{} | {fps:.0} fps | {}",
                self.config.title,
                self.overlay.status_line()
            )
        } else {
            format!("{} | {fps:.0} fps | G: overlay", self.config.title)
        }
    }
}
