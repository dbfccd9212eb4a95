// SPDX-License-Identifier: CEPL-1.0
//! The per-frame loop: K frame slots cycling over N chain images.
//!
//! A slot's fence is the only thing that says its command buffer and
//! semaphores are free again. Rebuilds of the chain always start from a
//! fully drained ring.

use std::sync::Arc;

use ash::vk;
use prism_core::{PresentModePref, RenderConfig};
use prism_render::{FrameStatus, RenderSize};
use tracing::{debug, info, warn};

use crate::backend::{DrawRecording, GpuDevice, Presentation, Submission, SurfaceProbe};
use crate::chain::PresentChain;
use crate::device::Queues;
use crate::error::{frame_sync, ChainError, PresentError, RenderResult, VkError};
use crate::pass::{FixedPipelineState, PassBundle, ShaderSet};
use crate::select::SelectedDevice;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSettings {
    /// K: how many frames may be recorded ahead of the GPU.
    pub frames_in_flight: usize,
    pub acquire_timeout_ns: u64,
    pub present_mode: PresentModePref,
    pub clear_color: [f32; 4],
}

impl From<&RenderConfig> for FrameSettings {
    fn from(cfg: &RenderConfig) -> Self {
        FrameSettings {
            frames_in_flight: cfg.frames_in_flight.max(1),
            acquire_timeout_ns: cfg.acquire_timeout_ns(),
            present_mode: cfg.present_mode,
            clear_color: cfg.clear_color,
        }
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        FrameSettings::from(&RenderConfig::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Submitted,
}

#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub fence: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
    pub state: SlotState,
}

/// Sync objects and command buffers for K slots, all from one pool.
pub struct FrameRing<D: GpuDevice> {
    device: Arc<D>,
    pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
    current: usize,
}

impl<D: GpuDevice> FrameRing<D> {
    pub fn new(device: Arc<D>, family: u32, count: usize) -> RenderResult<Self> {
        let pool = device
            .create_command_pool(family)
            .map_err(frame_sync("create_command_pool"))?;
        let mut ring = FrameRing {
            device,
            pool,
            slots: Vec::with_capacity(count),
            current: 0,
        };

        let cmds = ring
            .device
            .allocate_command_buffers(pool, count as u32)
            .map_err(frame_sync("allocate_command_buffers"))?;
        for command_buffer in cmds {
            let (image_available, render_finished) = ring.semaphore_pair()?;
            // Signaled so the first wait on each slot returns at once.
            let fence = match ring.device.create_fence(true) {
                Ok(f) => f,
                Err(e) => {
                    ring.device.destroy_semaphore(image_available);
                    ring.device.destroy_semaphore(render_finished);
                    return Err(frame_sync("create_fence")(e));
                }
            };
            ring.slots.push(FrameSlot {
                image_available,
                render_finished,
                fence,
                command_buffer,
                state: SlotState::Idle,
            });
        }
        Ok(ring)
    }

    fn semaphore_pair(&self) -> RenderResult<(vk::Semaphore, vk::Semaphore)> {
        let a = self
            .device
            .create_semaphore()
            .map_err(frame_sync("create_semaphore"))?;
        match self.device.create_semaphore() {
            Ok(b) => Ok((a, b)),
            Err(e) => {
                self.device.destroy_semaphore(a);
                Err(frame_sync("create_semaphore")(e))
            }
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    pub fn states(&self) -> Vec<SlotState> {
        self.slots.iter().map(|s| s.state).collect()
    }

    /// Fences of slots whose last submit has not been waited on.
    pub fn submitted_fences(&self) -> Vec<vk::Fence> {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Submitted)
            .map(|s| s.fence)
            .collect()
    }

    fn mark_all_idle(&mut self) {
        for slot in &mut self.slots {
            slot.state = SlotState::Idle;
        }
    }

    /// Replace every semaphore. An aborted acquire or present can leave a
    /// binary semaphore signaled with nothing left to wait on it.
    /// Only valid on a drained ring.
    pub fn recycle_semaphores(&mut self) -> RenderResult<()> {
        for i in 0..self.slots.len() {
            let (image_available, render_finished) = self.semaphore_pair()?;
            let slot = &mut self.slots[i];
            let old = [slot.image_available, slot.render_finished];
            slot.image_available = image_available;
            slot.render_finished = render_finished;
            for s in old {
                self.device.destroy_semaphore(s);
            }
        }
        Ok(())
    }
}

impl<D: GpuDevice> Drop for FrameRing<D> {
    fn drop(&mut self) {
        for slot in &self.slots {
            self.device.destroy_semaphore(slot.image_available);
            self.device.destroy_semaphore(slot.render_finished);
            self.device.destroy_fence(slot.fence);
        }
        // Frees the command buffers with it.
        self.device.destroy_command_pool(self.pool);
    }
}

/// Owns the device, the surface and everything built on them.
///
/// Field order is drop order: pass, chain, ring, then the device and
/// finally the surface.
pub struct FrameOrchestrator<S: SurfaceProbe, D: GpuDevice> {
    pass: Option<PassBundle<D>>,
    chain: Option<PresentChain<D>>,
    ring: FrameRing<D>,
    /// Per chain image: fence of the slot last rendering into it, or null.
    images_in_flight: Vec<vk::Fence>,
    settings: FrameSettings,
    shaders: ShaderSet,
    pipeline_state: FixedPipelineState,
    selected: SelectedDevice,
    queues: Queues,
    window_size: RenderSize,
    pending_resize: bool,
    suspended: bool,
    device: Arc<D>,
    surface: S,
}

impl<S: SurfaceProbe, D: GpuDevice> FrameOrchestrator<S, D> {
    pub fn new(
        surface: S,
        device: Arc<D>,
        selected: SelectedDevice,
        settings: FrameSettings,
        shaders: ShaderSet,
        window_size: RenderSize,
    ) -> RenderResult<Self> {
        let queues = Queues::fetch(device.as_ref(), &selected);
        let ring = FrameRing::new(
            device.clone(),
            selected.graphics_family(),
            settings.frames_in_flight.max(1),
        )?;

        let mut frames = FrameOrchestrator {
            pass: None,
            chain: None,
            ring,
            images_in_flight: Vec::new(),
            settings,
            shaders,
            pipeline_state: FixedPipelineState::TRIANGLE,
            selected,
            queues,
            window_size,
            pending_resize: false,
            suspended: false,
            device,
            surface,
        };
        frames.build_targets(false)?;
        Ok(frames)
    }

    /// Record a new drawable size; the chain is rebuilt after the next
    /// present, or before the next frame when the size is empty.
    pub fn request_resize(&mut self, size: RenderSize) {
        if size != self.window_size {
            debug!("resize requested: {}x{}", size.width, size.height);
        }
        self.window_size = size;
        self.pending_resize = true;
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.settings.clear_color = rgba;
    }

    pub fn draw_frame(&mut self) -> RenderResult<FrameStatus> {
        if self.window_size.is_empty() && self.chain.is_some() {
            self.rebuild("window has no drawable area")?;
        }
        if self.chain.is_none() {
            // Suspended: poll the surface again.
            self.build_targets(true)?;
            if self.chain.is_none() {
                return Ok(FrameStatus::Suspended);
            }
        }

        let i = self.ring.current();
        let slot = *self.ring.slot(i);

        // 1) This slot's previous submit must be finished before reuse.
        self.device
            .wait_for_fences(&[slot.fence], u64::MAX)
            .map_err(frame_sync("wait_for_fences"))?;
        self.ring.slots[i].state = SlotState::Idle;

        let (swapchain, extent) = match &self.chain {
            Some(c) => (c.handle(), c.extent()),
            None => return Ok(FrameStatus::Suspended),
        };

        // 2) Acquire
        let (image_index, acquire_suboptimal) = match self.device.acquire_next_image(
            swapchain,
            self.settings.acquire_timeout_ns,
            slot.image_available,
        ) {
            Ok(pair) => pair,
            Err(r) => match PresentError::classify("acquire_next_image", r) {
                PresentError::Stale(r) => {
                    self.rebuild(&format!("acquire reported {r}"))?;
                    return Ok(FrameStatus::Skipped);
                }
                fatal => return Err(fatal.into()),
            },
        };

        // 3) The image may still be in use by a frame from another slot.
        let img = image_index as usize;
        let Some(&image_fence) = self.images_in_flight.get(img) else {
            return Err(VkError::FrameSync {
                step: "acquire_next_image",
                result: vk::Result::ERROR_UNKNOWN,
            });
        };
        if image_fence != vk::Fence::null() && image_fence != slot.fence {
            self.device
                .wait_for_fences(&[image_fence], u64::MAX)
                .map_err(frame_sync("wait_for_fences(image)"))?;
        }
        self.images_in_flight[img] = slot.fence;

        // 4) Only now is it safe to unsignal: a skipped frame never resets.
        self.device
            .reset_fences(&[slot.fence])
            .map_err(frame_sync("reset_fences"))?;

        // 5) Record
        let (render_pass, pipeline, framebuffer, vertex_count) = match &self.pass {
            Some(p) => (
                p.render_pass(),
                p.pipeline(),
                p.framebuffer(image_index),
                p.vertex_count(),
            ),
            None => (vk::RenderPass::null(), vk::Pipeline::null(), None, 0),
        };
        let framebuffer = framebuffer.ok_or(VkError::FrameSync {
            step: "record_draw",
            result: vk::Result::ERROR_UNKNOWN,
        })?;
        self.device
            .record_draw(
                slot.command_buffer,
                &DrawRecording {
                    render_pass,
                    framebuffer,
                    pipeline,
                    extent,
                    clear: self.settings.clear_color,
                    vertex_count,
                },
            )
            .map_err(frame_sync("record_draw"))?;

        // 6) Submit
        self.device
            .queue_submit(
                self.queues.graphics,
                &Submission {
                    wait: slot.image_available,
                    wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    command_buffer: slot.command_buffer,
                    signal: slot.render_finished,
                    fence: slot.fence,
                },
            )
            .map_err(VkError::Submit)?;
        self.ring.slots[i].state = SlotState::Submitted;

        // 7) Present
        let presented = self.device.queue_present(
            self.queues.present,
            &Presentation {
                wait: slot.render_finished,
                swapchain,
                image_index,
            },
        );

        // 8) Rotate
        self.ring.advance();

        match presented {
            Ok(suboptimal) => {
                if suboptimal || acquire_suboptimal {
                    self.rebuild("chain is suboptimal")?;
                } else if self.pending_resize {
                    self.rebuild("window resized")?;
                }
                Ok(FrameStatus::Presented)
            }
            Err(r) => match PresentError::classify("queue_present", r) {
                PresentError::Stale(r) => {
                    self.rebuild(&format!("present reported {r}"))?;
                    Ok(FrameStatus::Skipped)
                }
                fatal => Err(fatal.into()),
            },
        }
    }

    /// Block until no slot has outstanding GPU work.
    pub fn drain(&mut self) -> RenderResult<()> {
        let pending = self.ring.submitted_fences();
        if !pending.is_empty() {
            self.device
                .wait_for_fences(&pending, u64::MAX)
                .map_err(frame_sync("wait_for_fences(all)"))?;
        }
        self.device
            .device_wait_idle()
            .map_err(frame_sync("device_wait_idle"))?;
        self.ring.mark_all_idle();
        Ok(())
    }

    fn rebuild(&mut self, reason: &str) -> RenderResult<()> {
        info!("rebuilding presentation chain: {reason}");
        self.drain()?;

        self.pass = None;
        self.chain = None;
        self.images_in_flight.clear();
        self.ring.recycle_semaphores()?;

        self.build_targets(true)
    }

    fn try_chain(&self) -> Result<PresentChain<D>, ChainError> {
        PresentChain::build(
            &self.surface,
            self.selected.physical,
            self.device.clone(),
            self.selected.queues,
            self.window_size,
            self.settings.present_mode,
        )
    }

    /// Build chain and pass for the current surface. An empty surface
    /// leaves both unset and marks the orchestrator suspended.
    fn build_targets(&mut self, retry: bool) -> RenderResult<()> {
        if self.window_size.is_empty() {
            self.suspend();
            return Ok(());
        }

        let chain = match self.try_chain() {
            Ok(c) => c,
            Err(ChainError::ZeroExtent) => {
                self.suspend();
                return Ok(());
            }
            Err(first) if retry => {
                warn!("chain rebuild failed ({first}), retrying once");
                match self.try_chain() {
                    Ok(c) => c,
                    Err(ChainError::ZeroExtent) => {
                        self.suspend();
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };
        let pass = PassBundle::build(
            self.device.clone(),
            &chain,
            &self.shaders,
            &self.pipeline_state,
        )?;

        self.images_in_flight = vec![vk::Fence::null(); chain.image_count()];
        self.chain = Some(chain);
        self.pass = Some(pass);
        self.pending_resize = false;
        if self.suspended {
            self.suspended = false;
            info!("surface has area again, rendering resumed");
        }
        Ok(())
    }

    fn suspend(&mut self) {
        if !self.suspended {
            self.suspended = true;
            info!("surface has no area, rendering suspended");
        }
        self.pending_resize = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn chain_extent(&self) -> Option<vk::Extent2D> {
        self.chain.as_ref().map(|c| c.extent())
    }

    pub fn image_count(&self) -> usize {
        self.chain.as_ref().map_or(0, |c| c.image_count())
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.ring.states()
    }

    pub fn current_slot(&self) -> usize {
        self.ring.current()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.slot_count()
    }

    pub fn device_name(&self) -> &str {
        &self.selected.name
    }
}

impl<S: SurfaceProbe, D: GpuDevice> Drop for FrameOrchestrator<S, D> {
    fn drop(&mut self) {
        if let Err(e) = self.drain() {
            warn!("drain before teardown failed: {e}");
        }
    }
}
