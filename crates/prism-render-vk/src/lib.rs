// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device selection, presentation chain and frame pacing
//! for a single triangle.

use std::sync::Arc;

use anyhow::Result;
use prism_core::RenderConfig;
use prism_render::{FrameStatus, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

pub mod ash_backend;
pub mod backend;
pub mod chain;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod pass;
pub mod probe;
pub mod select;
pub mod shader;

#[cfg(test)]
mod testing;

pub use error::{ChainError, PresentError, RenderResult, VkError};
pub use frame::FrameSettings;
pub use pass::ShaderSet;
pub use shader::load_compiled_shader;

use ash_backend::{AshDevice, AshSurface};
use device::create_logical_device;
use frame::FrameOrchestrator;
use instance::InstanceBundle;
use probe::REQUIRED_DEVICE_EXTENSIONS;
use select::select_device;

// Drop order: the orchestrator (device, then surface) before the instance.
pub struct VkRenderer {
    frames: FrameOrchestrator<AshSurface, AshDevice>,
    instance: InstanceBundle,
}

impl VkRenderer {
    // Order matters: instance, then the surface from it, then devices are
    // probed against that surface.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &RenderConfig,
        shaders: ShaderSet,
    ) -> RenderResult<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| VkError::SurfaceCreation(e.to_string()))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| VkError::SurfaceCreation(e.to_string()))?
            .as_raw();

        let validation = cfg.validation.enabled();
        let instance = InstanceBundle::new(dh, validation)?;
        let surface = AshSurface::new(&instance, instance.create_surface(dh, wh)?);

        let selected = select_device(&surface, REQUIRED_DEVICE_EXTENSIONS)?;
        let device = Arc::new(create_logical_device(
            instance.instance(),
            &selected,
            validation,
        )?);

        let frames = FrameOrchestrator::new(
            surface,
            device,
            selected,
            FrameSettings::from(cfg),
            shaders,
            size,
        )?;
        info!(
            "Vulkan renderer ready on {} ({} frame(s) in flight, {} chain image(s))",
            frames.device_name(),
            frames.frames_in_flight(),
            frames.image_count()
        );

        Ok(VkRenderer { frames, instance })
    }

    pub fn instance(&self) -> &InstanceBundle {
        &self.instance
    }
}

impl Renderer for VkRenderer {
    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.frames.request_resize(size);
        Ok(())
    }

    fn render(&mut self) -> Result<FrameStatus> {
        Ok(self.frames.draw_frame()?)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.frames.set_clear_color(rgba);
    }

    fn wait_idle(&mut self) -> Result<()> {
        Ok(self.frames.drain()?)
    }
}
