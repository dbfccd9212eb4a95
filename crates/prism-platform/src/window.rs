// SPDX-License-Identifier: CEPL-1.0
//! The window collaborator: attributes from config and drawable-size
//! tracking for pause/resume.

use anyhow::{Context, Result};
use prism_core::WindowConfig;
use prism_render::RenderSize;
use tracing::info;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

pub fn window_attributes(cfg: &WindowConfig) -> WindowAttributes {
    Window::default_attributes()
        .with_title(cfg.title.clone())
        .with_inner_size(LogicalSize::new(cfg.width, cfg.height))
        .with_resizable(cfg.resizable)
}

pub fn create_window(event_loop: &ActiveEventLoop, cfg: &WindowConfig) -> Result<Window> {
    event_loop
        .create_window(window_attributes(cfg))
        .context("create_window")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PauseChange {
    Unchanged,
    Paused,
    Resumed,
}

/// Latest pixel size of the window. Rendering is paused while either side
/// is zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawableSize {
    size: RenderSize,
    paused: bool,
}

impl DrawableSize {
    pub fn new(size: RenderSize) -> Self {
        DrawableSize {
            size,
            paused: size.is_empty(),
        }
    }

    pub fn of(window: &Window) -> Self {
        let PhysicalSize { width, height } = window.inner_size();
        Self::new(RenderSize::new(width, height))
    }

    pub fn update(&mut self, width: u32, height: u32) -> PauseChange {
        self.size = RenderSize::new(width, height);
        let now_paused = self.size.is_empty();
        let change = match (self.paused, now_paused) {
            (false, true) => PauseChange::Paused,
            (true, false) => PauseChange::Resumed,
            _ => PauseChange::Unchanged,
        };
        self.paused = now_paused;

        if change != PauseChange::Unchanged {
            info!("resized to {width}x{height} (paused={now_paused})");
        }
        change
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn render_size(&self) -> RenderSize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::Size;

    #[test]
    fn attributes_follow_config() {
        let cfg = WindowConfig {
            title: "tri".into(),
            width: 1024,
            height: 768,
            resizable: false,
        };
        let attrs = window_attributes(&cfg);
        assert_eq!(attrs.title, "tri");
        assert!(!attrs.resizable);
        assert_eq!(
            attrs.inner_size,
            Some(Size::Logical(LogicalSize::new(1024.0, 768.0)))
        );
    }

    #[test]
    fn zero_side_pauses_and_area_resumes() {
        let mut d = DrawableSize::new(RenderSize::new(800, 600));
        assert!(!d.paused());

        assert_eq!(d.update(0, 600), PauseChange::Paused);
        assert!(d.paused());
        assert_eq!(d.update(0, 0), PauseChange::Unchanged);

        assert_eq!(d.update(640, 480), PauseChange::Resumed);
        assert!(!d.paused());
        assert_eq!(d.render_size(), RenderSize::new(640, 480));
        assert_eq!(d.update(800, 600), PauseChange::Unchanged);
    }

    #[test]
    fn starts_paused_when_minimized() {
        let d = DrawableSize::new(RenderSize::new(0, 0));
        assert!(d.paused());
    }
}
