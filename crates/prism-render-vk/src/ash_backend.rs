// SPDX-License-Identifier: CEPL-1.0
//! [`SurfaceProbe`] and [`GpuDevice`] over `ash`.
//!
//! These are thin: each method is one Vulkan call plus the create-info it
//! needs. Handles passed in must come from the same device.

use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::vk;

use crate::backend::{
    ChainRequest, DrawRecording, GpuDevice, PipelineRequest, Presentation, Submission,
    SurfaceProbe,
};
use crate::instance::InstanceBundle;

/// Owns the window surface; destroyed on drop, before the instance.
pub struct AshSurface {
    instance: ash::Instance,
    loader: surface::Instance,
    surface: vk::SurfaceKHR,
}

impl AshSurface {
    pub fn new(bundle: &InstanceBundle, surface: vk::SurfaceKHR) -> Self {
        AshSurface {
            instance: bundle.instance().clone(),
            loader: surface::Instance::new(bundle.entry(), bundle.instance()),
            surface,
        }
    }
}

impl Drop for AshSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

impl SurfaceProbe for AshSurface {
    fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
    }

    fn device_name(&self, phys: vk::PhysicalDevice) -> String {
        let props = unsafe { self.instance.get_physical_device_properties(phys) };
        props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| format!("{phys:?}"))
    }

    fn queue_families(&self, phys: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(phys)
        }
    }

    fn presentation_support(&self, phys: vk::PhysicalDevice, family: u32) -> VkResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(phys, family, self.surface)
        }
    }

    fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let props = unsafe { self.instance.enumerate_device_extension_properties(phys)? };
        Ok(props
            .iter()
            .filter_map(|p| p.extension_name_as_c_str().ok())
            .map(|n| n.to_string_lossy().into_owned())
            .collect())
    }

    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(phys, self.surface)
        }
    }

    fn surface_formats(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(phys, self.surface)
        }
    }

    fn present_modes(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(phys, self.surface)
        }
    }
}

/// Owns the logical device. Everything created from it must be destroyed
/// first; the frame orchestrator's field order takes care of that.
pub struct AshDevice {
    swapchain: swapchain::Device,
    device: ash::Device,
}

impl AshDevice {
    pub fn new(instance: &ash::Instance, device: ash::Device) -> Self {
        AshDevice {
            swapchain: swapchain::Device::new(instance, &device),
            device,
        }
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }
}

impl GpuDevice for AshDevice {
    fn queue(&self, family: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(family, 0) }
    }

    fn create_swapchain(&self, req: &ChainRequest) -> VkResult<vk::SwapchainKHR> {
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: req.surface,
            min_image_count: req.min_image_count,
            image_format: req.format.format,
            image_color_space: req.format.color_space,
            image_extent: req.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: req.sharing_mode,
            queue_family_index_count: req.queue_family_indices.len() as u32,
            p_queue_family_indices: req.queue_family_indices.as_ptr(),
            pre_transform: req.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: req.present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };
        unsafe { self.swapchain.create_swapchain(&info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain.destroy_swapchain(swapchain, None) };
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            components: vk::ComponentMapping::default(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass> {
        let color_att = vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        };
        let att_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &att_ref,
            ..Default::default()
        };
        // The acquire semaphore is waited at this stage, so the layout
        // transition must not start before it.
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_att,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        unsafe { self.device.create_render_pass(&info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) };
    }

    fn create_pipeline_layout(&self) -> VkResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        unsafe { self.device.create_pipeline_layout(&info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_shader_module(&self, words: &[u32]) -> VkResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            p_code: words.as_ptr(),
            code_size: std::mem::size_of_val(words),
            ..Default::default()
        };
        unsafe { self.device.create_shader_module(&info, None) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_graphics_pipeline(&self, req: &PipelineRequest<'_>) -> VkResult<vk::Pipeline> {
        let s = req.state;
        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: req.vertex,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: req.fragment,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
        ];

        // Vertices come from gl_VertexIndex: no bindings, no attributes.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: s.topology,
            primitive_restart_enable: s.primitive_restart.into(),
            ..Default::default()
        };

        // Static viewport and scissor; the pipeline is rebuilt with the chain.
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: req.extent.width as f32,
            height: req.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: req.extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            p_viewports: &viewport,
            scissor_count: 1,
            p_scissors: &scissor,
            ..Default::default()
        };

        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            depth_clamp_enable: vk::FALSE,
            rasterizer_discard_enable: vk::FALSE,
            polygon_mode: s.polygon_mode,
            cull_mode: s.cull_mode,
            front_face: s.front_face,
            depth_bias_enable: s.depth_bias.into(),
            line_width: s.line_width,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: s.samples,
            sample_shading_enable: vk::FALSE,
            min_sample_shading: 1.0,
            ..Default::default()
        };

        let blend = &s.blend;
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            blend_enable: blend.enable.into(),
            src_color_blend_factor: blend.src_color,
            dst_color_blend_factor: blend.dst_color,
            color_blend_op: blend.color_op,
            src_alpha_blend_factor: blend.src_alpha,
            dst_alpha_blend_factor: blend.dst_alpha,
            alpha_blend_op: blend.alpha_op,
            color_write_mask: blend.write_mask,
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            logic_op_enable: vk::FALSE,
            logic_op: vk::LogicOp::COPY,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        let info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            layout: req.layout,
            render_pass: req.render_pass,
            subpass: 0,
            ..Default::default()
        };

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&info),
                None,
            )
        }
        .map_err(|(_, err)| err)?;
        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: 1,
            p_attachments: &view,
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        unsafe { self.device.create_framebuffer(&info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_command_pool(&self, family: u32) -> VkResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: family,
            ..Default::default()
        };
        unsafe { self.device.create_command_pool(&info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&info) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(fences, true, timeout) }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        unsafe { self.device.reset_fences(fences) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain
                .acquire_next_image(swapchain, timeout, signal, vk::Fence::null())
        }
    }

    fn record_draw(&self, cmd: vk::CommandBuffer, rec: &DrawRecording) -> VkResult<()> {
        let d = &self.device;
        unsafe {
            d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)?;

            let clears = [vk::ClearValue {
                color: vk::ClearColorValue { float32: rec.clear },
            }];
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: rec.render_pass,
                framebuffer: rec.framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: rec.extent,
                },
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, rec.pipeline);
            d.cmd_draw(cmd, rec.vertex_count, 1, 0, 0);
            d.cmd_end_render_pass(cmd);

            d.end_command_buffer(cmd)
        }
    }

    fn queue_submit(&self, queue: vk::Queue, sub: &Submission) -> VkResult<()> {
        let info = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &sub.wait,
            p_wait_dst_stage_mask: &sub.wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &sub.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &sub.signal,
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(queue, std::slice::from_ref(&info), sub.fence)
        }
    }

    fn queue_present(&self, queue: vk::Queue, p: &Presentation) -> VkResult<bool> {
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &p.wait,
            swapchain_count: 1,
            p_swapchains: &p.swapchain,
            p_image_indices: &p.image_index,
            ..Default::default()
        };
        unsafe { self.swapchain.queue_present(queue, &info) }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}
