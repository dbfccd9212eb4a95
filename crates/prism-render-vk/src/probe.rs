// SPDX-License-Identifier: CEPL-1.0
//! Capability probing for one physical device against one surface.

use std::ffi::CStr;

use ash::vk;
use tracing::debug;

use crate::backend::SurfaceProbe;

/// Device extensions every candidate must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// `(graphics, present)` once both are known.
    pub fn resolved(&self) -> Option<(u32, u32)> {
        Some((self.graphics?, self.present?))
    }

    /// Distinct family indices in first-seen order; graphics and present
    /// collapse to one entry when they alias.
    pub fn unique(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(2);
        for family in [self.graphics, self.present].into_iter().flatten() {
            if !out.contains(&family) {
                out.push(family);
            }
        }
        out
    }
}

/// The surface capability triple for one device.
#[derive(Clone, Debug, Default)]
pub struct ChainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl ChainSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    IncompleteQueues(QueueFamilyIndices),
    MissingExtensions(Vec<String>),
    InadequateChain { formats: usize, present_modes: usize },
    QueryFailed(vk::Result),
}

#[derive(Clone, Debug)]
pub enum Verdict {
    Suitable {
        indices: QueueFamilyIndices,
        support: ChainSupport,
    },
    Rejected(Rejection),
}

/// Scan queue families in order and keep the first graphics-capable and the
/// first present-capable index. The scan stops as soon as both are known.
pub fn find_queue_families<S: SurfaceProbe>(
    probe: &S,
    phys: vk::PhysicalDevice,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in probe.queue_families(phys).iter().enumerate() {
        if indices.is_complete() {
            break;
        }
        if family.queue_count == 0 {
            continue;
        }
        let i = i as u32;

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(i);
        }
        if indices.present.is_none() {
            let supported = probe.presentation_support(phys, i).unwrap_or_else(|e| {
                debug!("presentation support query for family {i} failed: {e}");
                false
            });
            if supported {
                indices.present = Some(i);
            }
        }
    }

    indices
}

/// Required names absent from `available`, in the order they were required.
pub fn missing_names(required: &[&CStr], available: &[String]) -> Vec<String> {
    required
        .iter()
        .map(|name| name.to_string_lossy())
        .filter(|name| !available.iter().any(|a| a.as_str() == name.as_ref()))
        .map(|name| name.into_owned())
        .collect()
}

pub fn query_chain_support<S: SurfaceProbe>(
    probe: &S,
    phys: vk::PhysicalDevice,
) -> ash::prelude::VkResult<ChainSupport> {
    Ok(ChainSupport {
        capabilities: probe.surface_capabilities(phys)?,
        formats: probe.surface_formats(phys)?,
        present_modes: probe.present_modes(phys)?,
    })
}

/// A candidate is suitable when its queues are complete, it has every
/// required extension, and the surface offers at least one format and one
/// present mode. Missing extensions reject before the surface is queried.
pub fn probe_candidate<S: SurfaceProbe>(
    probe: &S,
    phys: vk::PhysicalDevice,
    required: &[&CStr],
) -> Verdict {
    let indices = find_queue_families(probe, phys);

    let available = match probe.device_extensions(phys) {
        Ok(list) => list,
        Err(e) => return Verdict::Rejected(Rejection::QueryFailed(e)),
    };
    let missing = missing_names(required, &available);
    if !missing.is_empty() {
        return Verdict::Rejected(Rejection::MissingExtensions(missing));
    }

    let support = match query_chain_support(probe, phys) {
        Ok(s) => s,
        Err(e) => return Verdict::Rejected(Rejection::QueryFailed(e)),
    };
    if !support.is_adequate() {
        return Verdict::Rejected(Rejection::InadequateChain {
            formats: support.formats.len(),
            present_modes: support.present_modes.len(),
        });
    }

    if !indices.is_complete() {
        return Verdict::Rejected(Rejection::IncompleteQueues(indices));
    }

    Verdict::Suitable { indices, support }
}
