// SPDX-License-Identifier: CEPL-1.0
//! Render pass, pipeline and framebuffers for the triangle.
//!
//! Everything here is sized to one [`PresentChain`] and is rebuilt with it.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::backend::{GpuDevice, PipelineRequest};
use crate::chain::PresentChain;
use crate::error::{RenderResult, VkError};

/// Fixed-function state baked into the graphics pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedPipelineState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub polygon_mode: vk::PolygonMode,
    pub line_width: f32,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias: bool,
    pub samples: vk::SampleCountFlags,
    pub blend: BlendState,
    pub vertex_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendState {
    pub enable: bool,
    pub src_color: vk::BlendFactor,
    pub dst_color: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha: vk::BlendFactor,
    pub dst_alpha: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
    pub write_mask: vk::ColorComponentFlags,
}

impl FixedPipelineState {
    /// Three vertices generated in the vertex shader, alpha-blended over the
    /// clear color.
    pub const TRIANGLE: FixedPipelineState = FixedPipelineState {
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart: false,
        polygon_mode: vk::PolygonMode::FILL,
        line_width: 1.0,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        depth_bias: false,
        samples: vk::SampleCountFlags::TYPE_1,
        blend: BlendState {
            enable: true,
            src_color: vk::BlendFactor::SRC_ALPHA,
            dst_color: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_op: vk::BlendOp::ADD,
            src_alpha: vk::BlendFactor::ONE,
            dst_alpha: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
            write_mask: vk::ColorComponentFlags::RGBA,
        },
        vertex_count: 3,
    };
}

impl Default for FixedPipelineState {
    fn default() -> Self {
        Self::TRIANGLE
    }
}

/// SPIR-V words for the two stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSet {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

fn failed(what: &'static str) -> impl Fn(vk::Result) -> VkError {
    move |e| VkError::PipelineCreation(format!("{what}: {e}"))
}

pub struct PassBundle<D: GpuDevice> {
    device: Arc<D>,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    framebuffers: Vec<vk::Framebuffer>,
    vertex_count: u32,
}

impl<D: GpuDevice> PassBundle<D> {
    pub fn build(
        device: Arc<D>,
        chain: &PresentChain<D>,
        shaders: &ShaderSet,
        state: &FixedPipelineState,
    ) -> RenderResult<Self> {
        // Partially built bundles release whatever they hold on drop.
        let mut bundle = PassBundle {
            render_pass: device
                .create_render_pass(chain.format().format)
                .map_err(failed("render pass"))?,
            device,
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::with_capacity(chain.views().len()),
            vertex_count: state.vertex_count,
        };

        bundle.layout = bundle
            .device
            .create_pipeline_layout()
            .map_err(failed("pipeline layout"))?;

        let vertex = bundle
            .device
            .create_shader_module(&shaders.vertex)
            .map_err(failed("vertex shader module"))?;
        let fragment = match bundle.device.create_shader_module(&shaders.fragment) {
            Ok(m) => m,
            Err(e) => {
                bundle.device.destroy_shader_module(vertex);
                return Err(failed("fragment shader module")(e));
            }
        };

        let pipeline = bundle.device.create_graphics_pipeline(&PipelineRequest {
            render_pass: bundle.render_pass,
            layout: bundle.layout,
            extent: chain.extent(),
            vertex,
            fragment,
            state,
        });
        // Modules are only needed while the pipeline is compiled.
        bundle.device.destroy_shader_module(fragment);
        bundle.device.destroy_shader_module(vertex);
        bundle.pipeline = pipeline.map_err(failed("graphics pipeline"))?;

        for &view in chain.views() {
            let fb = bundle
                .device
                .create_framebuffer(bundle.render_pass, view, chain.extent())
                .map_err(failed("framebuffer"))?;
            bundle.framebuffers.push(fb);
        }

        debug!(
            "pass ready: {} framebuffer(s) at {}x{}",
            bundle.framebuffers.len(),
            chain.extent().width,
            chain.extent().height
        );
        Ok(bundle)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}

impl<D: GpuDevice> Drop for PassBundle<D> {
    fn drop(&mut self) {
        for &fb in &self.framebuffers {
            self.device.destroy_framebuffer(fb);
        }
        if self.pipeline != vk::Pipeline::null() {
            self.device.destroy_pipeline(self.pipeline);
        }
        if self.layout != vk::PipelineLayout::null() {
            self.device.destroy_pipeline_layout(self.layout);
        }
        self.device.destroy_render_pass(self.render_pass);
    }
}
