// SPDX-License-Identifier: CEPL-1.0
//! The seam between the frame logic and the driver.
//!
//! Selection, chain management and the frame loop only talk to Vulkan
//! through these two traits. [`crate::ash_backend`] implements them over
//! `ash`; the test suite implements them in memory.

use ash::prelude::VkResult;
use ash::vk;

use crate::pass::FixedPipelineState;

/// Instance-level queries against one window surface.
pub trait SurfaceProbe {
    fn surface(&self) -> vk::SurfaceKHR;
    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;
    fn device_name(&self, phys: vk::PhysicalDevice) -> String;
    fn queue_families(&self, phys: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn presentation_support(&self, phys: vk::PhysicalDevice, family: u32) -> VkResult<bool>;
    fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>>;
    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn present_modes(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<vk::PresentModeKHR>>;
}

/// Everything the swapchain create call needs, already decided.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainRequest {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub sharing_mode: vk::SharingMode,
    /// Only populated for `CONCURRENT` sharing.
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
}

pub struct PipelineRequest<'a> {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub extent: vk::Extent2D,
    pub vertex: vk::ShaderModule,
    pub fragment: vk::ShaderModule,
    pub state: &'a FixedPipelineState,
}

#[derive(Clone, Copy, Debug)]
pub struct DrawRecording {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear: [f32; 4],
    pub vertex_count: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct Submission {
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub command_buffer: vk::CommandBuffer,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

#[derive(Clone, Copy, Debug)]
pub struct Presentation {
    pub wait: vk::Semaphore,
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
}

/// Logical-device operations used after selection.
///
/// `acquire_next_image` and `queue_present` report `(index, suboptimal)` /
/// `suboptimal` on success; out-of-date and timeout come back as errors.
pub trait GpuDevice {
    fn queue(&self, family: u32) -> vk::Queue;

    fn create_swapchain(&self, req: &ChainRequest) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_pipeline_layout(&self) -> VkResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_shader_module(&self, words: &[u32]) -> VkResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_graphics_pipeline(&self, req: &PipelineRequest<'_>) -> VkResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_command_pool(&self, family: u32) -> VkResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VkResult<()>;
    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    fn record_draw(&self, cmd: vk::CommandBuffer, rec: &DrawRecording) -> VkResult<()>;
    fn queue_submit(&self, queue: vk::Queue, submission: &Submission) -> VkResult<()>;
    fn queue_present(&self, queue: vk::Queue, presentation: &Presentation) -> VkResult<bool>;
    fn device_wait_idle(&self) -> VkResult<()>;
}
