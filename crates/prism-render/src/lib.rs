// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        RenderSize { width, height }
    }

    /// A minimized window reports no drawable area.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What happened to one `render` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The chain was stale; it has been rebuilt and this frame was dropped.
    Skipped,
    /// No drawable area; nothing was submitted.
    Suspended,
}

pub trait Renderer {
    /// Record a new window size. The backend rebuilds before its next frame.
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<FrameStatus>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    /// Block until the GPU has finished everything submitted so far.
    fn wait_idle(&mut self) -> Result<()>;
}
