// SPDX-License-Identifier: CEPL-1.0
//! Presentation chain: the swapchain and one view per image.
//!
//! The choice of format, present mode, extent and image count is made by
//! [`plan_chain`], which is pure. [`PresentChain::build`] runs the plan
//! against the device. Dropping a [`PresentChain`] destroys its views and
//! then the swapchain, so anything built over the views (framebuffers) must
//! be dropped first.

use std::sync::Arc;

use ash::vk;
use prism_core::PresentModePref;
use prism_render::RenderSize;
use tracing::info;

use crate::backend::{ChainRequest, GpuDevice, SurfaceProbe};
use crate::error::ChainError;
use crate::probe::{query_chain_support, ChainSupport, QueueFamilyIndices};

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// FIFO is the only mode every surface must support, so it is the fallback.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentModePref,
) -> vk::PresentModeKHR {
    match pref {
        PresentModePref::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, so the driver never stalls us waiting for an
/// image. A `max_image_count` of zero means no upper bound.
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

pub fn plan_chain(
    support: &ChainSupport,
    queues: QueueFamilyIndices,
    hint: RenderSize,
    pref: PresentModePref,
) -> Result<ChainPlan, ChainError> {
    let caps = &support.capabilities;
    let format = choose_surface_format(&support.formats).ok_or(ChainError::NoSurfaceFormats)?;
    let present_mode = choose_present_mode(&support.present_modes, pref);
    let extent = extent_from_caps(caps, hint);
    if extent.width == 0 || extent.height == 0 {
        return Err(ChainError::ZeroExtent);
    }

    let unique = queues.unique();
    let (sharing_mode, queue_family_indices) = if unique.len() > 1 {
        (vk::SharingMode::CONCURRENT, unique)
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    };

    Ok(ChainPlan {
        format,
        present_mode,
        extent,
        image_count: image_count(caps),
        sharing_mode,
        queue_family_indices,
        pre_transform: caps.current_transform,
    })
}

pub struct PresentChain<D: GpuDevice> {
    device: Arc<D>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl<D: GpuDevice> PresentChain<D> {
    /// Query the surface as it is right now and build a chain for it.
    pub fn build<S: SurfaceProbe>(
        probe: &S,
        phys: vk::PhysicalDevice,
        device: Arc<D>,
        queues: QueueFamilyIndices,
        hint: RenderSize,
        pref: PresentModePref,
    ) -> Result<Self, ChainError> {
        let support =
            query_chain_support(probe, phys).map_err(ChainError::vulkan("surface query"))?;
        let plan = plan_chain(&support, queues, hint, pref)?;

        let req = ChainRequest {
            surface: probe.surface(),
            min_image_count: plan.image_count,
            format: plan.format,
            extent: plan.extent,
            sharing_mode: plan.sharing_mode,
            queue_family_indices: plan.queue_family_indices.clone(),
            pre_transform: plan.pre_transform,
            present_mode: plan.present_mode,
        };
        let swapchain = device
            .create_swapchain(&req)
            .map_err(ChainError::vulkan("create_swapchain"))?;

        let mut chain = PresentChain {
            device,
            swapchain,
            images: Vec::new(),
            views: Vec::new(),
            format: plan.format,
            present_mode: plan.present_mode,
            extent: plan.extent,
        };

        // The driver may hand back more images than requested.
        chain.images = chain
            .device
            .swapchain_images(swapchain)
            .map_err(ChainError::vulkan("get_swapchain_images"))?;
        for &image in &chain.images {
            let view = chain
                .device
                .create_image_view(image, plan.format.format)
                .map_err(ChainError::vulkan("create_image_view"))?;
            chain.views.push(view);
        }

        info!(
            "chain ready: {}x{} {:?}/{:?} {:?}, {} images",
            chain.extent.width,
            chain.extent.height,
            chain.format.format,
            chain.format.color_space,
            chain.present_mode,
            chain.images.len()
        );
        Ok(chain)
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

impl<D: GpuDevice> Drop for PresentChain<D> {
    fn drop(&mut self) {
        for &view in &self.views {
            self.device.destroy_image_view(view);
        }
        self.device.destroy_swapchain(self.swapchain);
    }
}
