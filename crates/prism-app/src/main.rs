// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use prism_core::{config::DEFAULT_CONFIG_PATH, init_tracing, AppConfig, ShaderPaths, Validation};
use prism_platform::{create_window, DrawableSize, PauseChange};
use prism_render::{FrameStatus, RenderSize, Renderer};
use prism_render_vk::{ShaderSet, VkRenderer};
use tracing::{debug, error, info, warn};

use prism_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Exit cleanly after this many presented frames
    #[arg(long)]
    frames: Option<u64>,

    #[arg(long, value_enum)]
    validation: Option<ValidationArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ValidationArg {
    Auto,
    On,
    Off,
}

impl From<ValidationArg> for Validation {
    fn from(v: ValidationArg) -> Self {
        match v {
            ValidationArg::Auto => Validation::Auto,
            ValidationArg::On => Validation::On,
            ValidationArg::Off => Validation::Off,
        }
    }
}

/// CLI values win over the file.
fn apply_overrides(cfg: &mut AppConfig, args: &Args) {
    if let Some(w) = args.width {
        cfg.window.width = w;
    }
    if let Some(h) = args.height {
        cfg.window.height = h;
    }
    if let Some(v) = args.validation {
        cfg.render.validation = v.into();
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut cfg = AppConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    apply_overrides(&mut cfg, args);
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn load_shaders(paths: &ShaderPaths) -> Result<ShaderSet> {
    match (&paths.vertex, &paths.fragment) {
        (Some(v), Some(f)) => {
            info!("shaders: {} + {}", v.display(), f.display());
            ShaderSet::from_paths(v, f).context("loading shaders")
        }
        _ => ShaderSet::builtin().context("decoding built-in shaders"),
    }
}

/// How long a suspended renderer waits before asking the surface again.
const SUSPEND_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pace {
    Redraw,
    WaitUntil(Instant),
}

struct App {
    cfg: AppConfig,
    shaders: Option<ShaderSet>,
    frame_limit: Option<u64>,

    // Renderer before window: the surface must go before the window does.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    size: DrawableSize,
    suspended_until: Option<Instant>,

    error: Option<anyhow::Error>,
    exiting: bool,
    presented: u64,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppConfig, shaders: ShaderSet, frame_limit: Option<u64>) -> Self {
        let size = DrawableSize::new(RenderSize::new(cfg.window.width, cfg.window.height));
        App {
            cfg,
            shaders: Some(shaders),
            frame_limit,
            renderer: None,
            window: None,
            size,
            suspended_until: None,
            error: None,
            exiting: false,
            presented: 0,
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = create_window(event_loop, &self.cfg.window)?;
        self.size = DrawableSize::of(&window);

        let shaders = match self.shaders.take() {
            Some(s) => s,
            None => ShaderSet::builtin()?,
        };
        let renderer = VkRenderer::new(
            &window,
            &window,
            self.size.render_size(),
            &self.cfg.render,
            shaders,
        )
        .context("Vulkan init")?;

        window.request_redraw();
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Drain the GPU, then release renderer and window in that order.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        self.exiting = true;
        if let Some(r) = &mut self.renderer {
            if let Err(e) = r.wait_idle() {
                warn!("wait_idle on shutdown: {e:#}");
            }
        }
        self.renderer = None;
        self.window = None;
        info!("shutdown after {} presented frame(s)", self.presented);
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.error.get_or_insert(err);
        self.shutdown(event_loop);
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting || self.size.paused() {
            return;
        }
        let Some(renderer) = &mut self.renderer else {
            return;
        };

        let status = renderer.render();
        if let Ok(s) = &status {
            self.note_status(*s, Instant::now());
        }
        match status {
            Ok(FrameStatus::Presented) => {
                self.presented += 1;
                self.frames = self.frames.saturating_add(1);
                if self.frame_limit.is_some_and(|n| self.presented >= n) {
                    info!("frame limit reached");
                    self.shutdown(event_loop);
                }
            }
            Ok(FrameStatus::Skipped) => debug!("frame skipped, chain rebuilt"),
            Ok(FrameStatus::Suspended) => {}
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn note_status(&mut self, status: FrameStatus, now: Instant) {
        self.suspended_until = match status {
            FrameStatus::Suspended => Some(now + SUSPEND_POLL),
            FrameStatus::Presented | FrameStatus::Skipped => None,
        };
    }

    fn pace(&self, now: Instant) -> Pace {
        match self.suspended_until {
            Some(deadline) if now < deadline => Pace::WaitUntil(deadline),
            _ => Pace::Redraw,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.suspended_until = None;
                let change = self.size.update(new_size.width, new_size.height);
                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.resize(self.size.render_size()) {
                        self.fail(event_loop, e);
                        return;
                    }
                }
                if change == PauseChange::Resumed {
                    self.frames = 0;
                    self.last_fps_instant = Instant::now();
                }
                if !self.size.paused() {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.size.paused() {
            self.frames = 0;
            return;
        }
        let now = Instant::now();
        match self.pace(now) {
            Pace::WaitUntil(deadline) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
                return;
            }
            Pace::Redraw => {
                event_loop.set_control_flow(ControlFlow::Wait);
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }
        }

        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_config(&args)?;
    let shaders = load_shaders(&cfg.shaders)?;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, shaders, args.frames);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
