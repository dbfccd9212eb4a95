// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection: first suitable candidate in enumeration order.

use std::ffi::CStr;

use ash::vk;
use tracing::{info, warn};

use crate::backend::SurfaceProbe;
use crate::error::{RenderResult, VkError};
use crate::probe::{probe_candidate, ChainSupport, QueueFamilyIndices, Verdict};

#[derive(Clone, Debug)]
pub struct SelectedDevice {
    pub physical: vk::PhysicalDevice,
    pub name: String,
    pub queues: QueueFamilyIndices,
    /// Support as seen during selection; the chain re-queries on every build.
    pub support: ChainSupport,
}

impl SelectedDevice {
    pub fn graphics_family(&self) -> u32 {
        self.queues.graphics.unwrap_or_default()
    }

    pub fn present_family(&self) -> u32 {
        self.queues.present.unwrap_or_default()
    }
}

pub fn select_device<S: SurfaceProbe>(
    probe: &S,
    required: &[&CStr],
) -> RenderResult<SelectedDevice> {
    let candidates = probe.physical_devices().map_err(|result| VkError::Query {
        step: "enumerate_physical_devices",
        result,
    })?;
    if candidates.is_empty() {
        return Err(VkError::NoCompatibleDevice);
    }

    let mut rejected = 0;
    for phys in candidates {
        let name = probe.device_name(phys);
        match probe_candidate(probe, phys, required) {
            Verdict::Suitable { indices, support } => {
                info!(
                    "using GPU {name} (graphics queue {:?}, present queue {:?})",
                    indices.graphics, indices.present
                );
                return Ok(SelectedDevice {
                    physical: phys,
                    name,
                    queues: indices,
                    support,
                });
            }
            Verdict::Rejected(why) => {
                warn!("skipping GPU {name}: {why:?}");
                rejected += 1;
            }
        }
    }

    Err(VkError::NoSuitableDevice { rejected })
}
