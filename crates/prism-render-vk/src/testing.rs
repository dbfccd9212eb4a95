// SPDX-License-Identifier: CEPL-1.0
//! In-memory stand-ins for the driver, used by the unit tests.
//!
//! `MockDevice` models fence and semaphore state closely enough to catch
//! protocol mistakes: it panics on a wait that can never complete, on
//! re-recording a command buffer that is still executing, on double use of a
//! binary semaphore, and on destroying chain resources while frames are in
//! flight.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::backend::{
    ChainRequest, DrawRecording, GpuDevice, PipelineRequest, Presentation, Submission,
    SurfaceProbe,
};
use crate::pass::FixedPipelineState;

pub fn graphics_family() -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
        queue_count: 1,
        ..Default::default()
    }
}

pub fn transfer_family() -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: vk::QueueFlags::TRANSFER,
        queue_count: 1,
        ..Default::default()
    }
}

pub fn bgra_srgb() -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

pub fn caps(
    width: u32,
    height: u32,
    min_images: u32,
    max_images: u32,
) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: min_images,
        max_image_count: max_images,
        current_extent: vk::Extent2D { width, height },
        min_image_extent: vk::Extent2D {
            width: 1,
            height: 1,
        },
        max_image_extent: vk::Extent2D {
            width: 4096,
            height: 4096,
        },
        max_image_array_layers: 1,
        current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        ..Default::default()
    }
}

#[derive(Clone, Debug)]
pub struct MockAdapter {
    pub name: String,
    pub families: Vec<vk::QueueFamilyProperties>,
    pub present_support: Vec<bool>,
    pub extensions: Vec<String>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl MockAdapter {
    /// One graphics+present family, swapchain support, an 800x600 surface.
    pub fn new(name: &str) -> Self {
        MockAdapter {
            name: name.to_owned(),
            families: vec![graphics_family()],
            present_support: vec![true],
            extensions: vec!["VK_KHR_swapchain".to_owned()],
            capabilities: caps(800, 600, 2, 0),
            formats: vec![bgra_srgb()],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    pub fn with_families(mut self, families: Vec<vk::QueueFamilyProperties>) -> Self {
        self.families = families;
        self
    }

    pub fn with_present_support(mut self, support: Vec<bool>) -> Self {
        self.present_support = support;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_capabilities(mut self, capabilities: vk::SurfaceCapabilitiesKHR) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_formats(mut self, formats: Vec<vk::SurfaceFormatKHR>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_present_modes(mut self, modes: Vec<vk::PresentModeKHR>) -> Self {
        self.present_modes = modes;
        self
    }
}

#[derive(Default)]
struct ProbeState {
    adapters: Vec<MockAdapter>,
    present_support_queries: Vec<usize>,
    surface_queries: Vec<usize>,
}

/// Cloning shares state, so a test can keep a handle after giving one away.
#[derive(Clone)]
pub struct MockProbe {
    state: Rc<RefCell<ProbeState>>,
}

impl MockProbe {
    pub fn new(adapters: Vec<MockAdapter>) -> Self {
        let n = adapters.len();
        MockProbe {
            state: Rc::new(RefCell::new(ProbeState {
                adapters,
                present_support_queries: vec![0; n],
                surface_queries: vec![0; n],
            })),
        }
    }

    pub fn handle(&self, index: usize) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(index as u64 + 1)
    }

    fn index(phys: vk::PhysicalDevice) -> usize {
        phys.as_raw() as usize - 1
    }

    pub fn present_support_queries(&self, index: usize) -> usize {
        self.state.borrow().present_support_queries[index]
    }

    pub fn surface_queries(&self, index: usize) -> usize {
        self.state.borrow().surface_queries[index]
    }

    pub fn set_current_extent(&self, index: usize, width: u32, height: u32) {
        self.state.borrow_mut().adapters[index]
            .capabilities
            .current_extent = vk::Extent2D { width, height };
    }

    fn adapter<T>(&self, phys: vk::PhysicalDevice, f: impl FnOnce(&MockAdapter) -> T) -> T {
        f(&self.state.borrow().adapters[Self::index(phys)])
    }

    fn count_surface_query(&self, phys: vk::PhysicalDevice) {
        self.state.borrow_mut().surface_queries[Self::index(phys)] += 1;
    }
}

impl SurfaceProbe for MockProbe {
    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0xface)
    }

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        let n = self.state.borrow().adapters.len();
        Ok((0..n).map(|i| self.handle(i)).collect())
    }

    fn device_name(&self, phys: vk::PhysicalDevice) -> String {
        self.adapter(phys, |a| a.name.clone())
    }

    fn queue_families(&self, phys: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        self.adapter(phys, |a| a.families.clone())
    }

    fn presentation_support(&self, phys: vk::PhysicalDevice, family: u32) -> VkResult<bool> {
        self.state.borrow_mut().present_support_queries[Self::index(phys)] += 1;
        Ok(self.adapter(phys, |a| {
            a.present_support.get(family as usize).copied().unwrap_or(false)
        }))
    }

    fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        Ok(self.adapter(phys, |a| a.extensions.clone()))
    }

    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        self.count_surface_query(phys);
        Ok(self.adapter(phys, |a| a.capabilities))
    }

    fn surface_formats(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        self.count_surface_query(phys);
        Ok(self.adapter(phys, |a| a.formats.clone()))
    }

    fn present_modes(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<vk::PresentModeKHR>> {
        self.count_surface_query(phys);
        Ok(self.adapter(phys, |a| a.present_modes.clone()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    CreateSwapchain {
        extent: vk::Extent2D,
        min_image_count: u32,
    },
    DestroySwapchain,
    DestroyImageView,
    DestroyFramebuffer,
    DestroyPipeline,
    DestroyRenderPass,
    WaitFences(Vec<vk::Fence>),
    ResetFence(vk::Fence),
    Acquire,
    Record {
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
    },
    Submit {
        queue: vk::Queue,
        fence: vk::Fence,
    },
    Present {
        queue: vk::Queue,
        image_index: u32,
    },
    WaitIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Default)]
struct DeviceState {
    next_handle: u64,
    live: HashSet<u64>,
    fences: HashMap<vk::Fence, FenceState>,
    semaphores: HashMap<vk::Semaphore, bool>,
    swapchain_images: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    image_count_override: Option<u32>,
    next_image: u32,
    acquire_script: VecDeque<VkResult<(u32, bool)>>,
    present_script: VecDeque<VkResult<bool>>,
    failures: HashMap<&'static str, VecDeque<vk::Result>>,
    cmd_fence: HashMap<vk::CommandBuffer, vk::Fence>,
    in_flight: HashSet<vk::Fence>,
    max_in_flight: usize,
    events: Vec<Event>,
    chain_requests: Vec<ChainRequest>,
    pipelines: Vec<(vk::Extent2D, FixedPipelineState)>,
    framebuffer_extents: Vec<vk::Extent2D>,
    submits: usize,
}

impl DeviceState {
    fn alloc(&mut self) -> u64 {
        self.next_handle += 1;
        let raw = 0x1_0000 + self.next_handle;
        self.live.insert(raw);
        raw
    }

    fn release(&mut self, raw: u64, what: &str) {
        assert!(self.live.remove(&raw), "{what} {raw:#x} destroyed twice or never created");
    }

    fn take_failure(&mut self, op: &'static str) -> VkResult<()> {
        match self.failures.get_mut(op).and_then(|q| q.pop_front()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn assert_idle(&self, what: &str) {
        assert!(
            self.in_flight.is_empty(),
            "{what} destroyed while {} frame(s) are in flight",
            self.in_flight.len()
        );
    }
}

#[derive(Default)]
pub struct MockDevice {
    state: RefCell<DeviceState>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `op` call fail with `result`. Calls queue up.
    pub fn fail_next(&self, op: &'static str, result: vk::Result) {
        self.state
            .borrow_mut()
            .failures
            .entry(op)
            .or_default()
            .push_back(result);
    }

    pub fn script_acquire(&self, result: VkResult<(u32, bool)>) {
        self.state.borrow_mut().acquire_script.push_back(result);
    }

    pub fn script_present(&self, result: VkResult<bool>) {
        self.state.borrow_mut().present_script.push_back(result);
    }

    /// Hand out this many images per swapchain regardless of the request.
    pub fn set_image_count(&self, count: u32) {
        self.state.borrow_mut().image_count_override = Some(count);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.borrow().max_in_flight
    }

    pub fn in_flight(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    pub fn submits(&self) -> usize {
        self.state.borrow().submits
    }

    pub fn live_objects(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn chain_requests(&self) -> Vec<ChainRequest> {
        self.state.borrow().chain_requests.clone()
    }

    pub fn pipelines(&self) -> Vec<(vk::Extent2D, FixedPipelineState)> {
        self.state.borrow().pipelines.clone()
    }

    pub fn framebuffer_extents(&self) -> Vec<vk::Extent2D> {
        self.state.borrow().framebuffer_extents.clone()
    }
}

impl GpuDevice for MockDevice {
    fn queue(&self, family: u32) -> vk::Queue {
        vk::Queue::from_raw(0x100 + family as u64)
    }

    fn create_swapchain(&self, req: &ChainRequest) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_swapchain")?;
        let sc = vk::SwapchainKHR::from_raw(s.alloc());
        let count = s.image_count_override.unwrap_or(req.min_image_count);
        let images = (0..count)
            .map(|i| vk::Image::from_raw(0xa000 + sc.as_raw() * 16 + i as u64))
            .collect();
        s.swapchain_images.insert(sc, images);
        s.next_image = 0;
        s.chain_requests.push(req.clone());
        s.events.push(Event::CreateSwapchain {
            extent: req.extent,
            min_image_count: req.min_image_count,
        });
        Ok(sc)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let s = self.state.borrow();
        Ok(s.swapchain_images.get(&swapchain).cloned().unwrap_or_default())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state.borrow_mut();
        s.assert_idle("swapchain");
        s.release(swapchain.as_raw(), "swapchain");
        s.swapchain_images.remove(&swapchain);
        s.events.push(Event::DestroySwapchain);
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_image_view")?;
        Ok(vk::ImageView::from_raw(s.alloc()))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut s = self.state.borrow_mut();
        s.assert_idle("image view");
        s.release(view.as_raw(), "image view");
        s.events.push(Event::DestroyImageView);
    }

    fn create_render_pass(&self, _format: vk::Format) -> VkResult<vk::RenderPass> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_render_pass")?;
        Ok(vk::RenderPass::from_raw(s.alloc()))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut s = self.state.borrow_mut();
        s.release(render_pass.as_raw(), "render pass");
        s.events.push(Event::DestroyRenderPass);
    }

    fn create_pipeline_layout(&self) -> VkResult<vk::PipelineLayout> {
        let mut s = self.state.borrow_mut();
        Ok(vk::PipelineLayout::from_raw(s.alloc()))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state
            .borrow_mut()
            .release(layout.as_raw(), "pipeline layout");
    }

    fn create_shader_module(&self, words: &[u32]) -> VkResult<vk::ShaderModule> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_shader_module")?;
        assert!(!words.is_empty(), "empty shader blob");
        Ok(vk::ShaderModule::from_raw(s.alloc()))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state
            .borrow_mut()
            .release(module.as_raw(), "shader module");
    }

    fn create_graphics_pipeline(&self, req: &PipelineRequest<'_>) -> VkResult<vk::Pipeline> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_graphics_pipeline")?;
        for module in [req.vertex, req.fragment] {
            assert!(s.live.contains(&module.as_raw()), "pipeline built from a dead module");
        }
        s.pipelines.push((req.extent, *req.state));
        Ok(vk::Pipeline::from_raw(s.alloc()))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut s = self.state.borrow_mut();
        s.assert_idle("pipeline");
        s.release(pipeline.as_raw(), "pipeline");
        s.events.push(Event::DestroyPipeline);
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_framebuffer")?;
        assert!(s.live.contains(&view.as_raw()), "framebuffer over a dead view");
        s.framebuffer_extents.push(extent);
        Ok(vk::Framebuffer::from_raw(s.alloc()))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut s = self.state.borrow_mut();
        s.assert_idle("framebuffer");
        s.release(framebuffer.as_raw(), "framebuffer");
        s.events.push(Event::DestroyFramebuffer);
    }

    fn create_command_pool(&self, _family: u32) -> VkResult<vk::CommandPool> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_command_pool")?;
        Ok(vk::CommandPool::from_raw(s.alloc()))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut s = self.state.borrow_mut();
        s.assert_idle("command pool");
        s.release(pool.as_raw(), "command pool");
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state.borrow_mut();
        let base = 0xc000 + s.next_handle * 16;
        s.next_handle += 1;
        Ok((0..count as u64)
            .map(|i| vk::CommandBuffer::from_raw(base + i))
            .collect())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_semaphore")?;
        let sem = vk::Semaphore::from_raw(s.alloc());
        s.semaphores.insert(sem, false);
        Ok(sem)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut s = self.state.borrow_mut();
        s.assert_idle("semaphore");
        s.semaphores.remove(&semaphore);
        s.release(semaphore.as_raw(), "semaphore");
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state.borrow_mut();
        s.take_failure("create_fence")?;
        let fence = vk::Fence::from_raw(s.alloc());
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        s.fences.insert(fence, state);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state.borrow_mut();
        assert_ne!(
            s.fences.get(&fence),
            Some(&FenceState::Pending),
            "fence destroyed while its batch is executing"
        );
        s.fences.remove(&fence);
        s.release(fence.as_raw(), "fence");
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], _timeout: u64) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.take_failure("wait_for_fences")?;
        for f in fences {
            match s.fences.get(f).copied() {
                Some(FenceState::Pending) => {
                    s.fences.insert(*f, FenceState::Signaled);
                    s.in_flight.remove(f);
                }
                Some(FenceState::Signaled) => {}
                Some(FenceState::Unsignaled) => {
                    panic!("waiting on fence {f:?} that was reset but never submitted")
                }
                None => panic!("waiting on unknown fence {f:?}"),
            }
        }
        s.events.push(Event::WaitFences(fences.to_vec()));
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        for f in fences {
            assert_ne!(
                s.fences.get(f),
                Some(&FenceState::Pending),
                "reset of a fence still in use"
            );
            s.fences.insert(*f, FenceState::Unsignaled);
            s.events.push(Event::ResetFence(*f));
        }
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state.borrow_mut();
        assert!(s.live.contains(&swapchain.as_raw()), "acquire from a dead swapchain");
        s.events.push(Event::Acquire);
        let result = match s.acquire_script.pop_front() {
            Some(scripted) => scripted,
            None => {
                let count = s.swapchain_images.get(&swapchain).map_or(1, |v| v.len()) as u32;
                let idx = s.next_image % count;
                s.next_image = s.next_image.wrapping_add(1);
                Ok((idx, false))
            }
        };
        if result.is_ok() {
            let pending = s.semaphores.insert(signal, true);
            assert_eq!(pending, Some(false), "acquire signaled a semaphore already pending");
        }
        result
    }

    fn record_draw(&self, cmd: vk::CommandBuffer, rec: &DrawRecording) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        if let Some(f) = s.cmd_fence.get(&cmd) {
            assert!(
                !s.in_flight.contains(f),
                "command buffer {cmd:?} re-recorded while still executing"
            );
        }
        assert!(s.live.contains(&rec.framebuffer.as_raw()), "recording into a dead framebuffer");
        assert_eq!(rec.vertex_count, 3);
        s.events.push(Event::Record {
            cmd,
            framebuffer: rec.framebuffer,
        });
        Ok(())
    }

    fn queue_submit(&self, queue: vk::Queue, sub: &Submission) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.take_failure("queue_submit")?;
        assert_eq!(
            s.semaphores.insert(sub.wait, false),
            Some(true),
            "submit waits on a semaphore nothing signaled"
        );
        assert_eq!(
            s.semaphores.insert(sub.signal, true),
            Some(false),
            "submit signals a semaphore already pending"
        );
        assert_eq!(
            s.fences.get(&sub.fence),
            Some(&FenceState::Unsignaled),
            "submit with a fence that was not reset"
        );
        s.fences.insert(sub.fence, FenceState::Pending);
        s.in_flight.insert(sub.fence);
        s.max_in_flight = s.max_in_flight.max(s.in_flight.len());
        s.cmd_fence.insert(sub.command_buffer, sub.fence);
        s.submits += 1;
        s.events.push(Event::Submit {
            queue,
            fence: sub.fence,
        });
        Ok(())
    }

    fn queue_present(&self, queue: vk::Queue, p: &Presentation) -> VkResult<bool> {
        let mut s = self.state.borrow_mut();
        assert!(s.live.contains(&p.swapchain.as_raw()), "present to a dead swapchain");
        s.events.push(Event::Present {
            queue,
            image_index: p.image_index,
        });
        let result = s.present_script.pop_front().unwrap_or(Ok(false));
        if result.is_ok() {
            assert_eq!(
                s.semaphores.insert(p.wait, false),
                Some(true),
                "present waits on a semaphore nothing signaled"
            );
        }
        result
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        let done: Vec<_> = s.in_flight.drain().collect();
        for f in done {
            s.fences.insert(f, FenceState::Signaled);
        }
        s.events.push(Event::WaitIdle);
        Ok(())
    }
}
