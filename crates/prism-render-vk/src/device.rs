// SPDX-License-Identifier: CEPL-1.0
//! Logical device creation and queue retrieval.

use std::ffi::{c_char, CStr};

use ash::vk;
use tracing::debug;

use crate::ash_backend::AshDevice;
use crate::backend::GpuDevice;
use crate::error::{RenderResult, VkError};
use crate::instance::VALIDATION_LAYER;
use crate::probe::{QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};
use crate::select::SelectedDevice;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueueRequest {
    pub family: u32,
    pub priority: f32,
}

/// One request per distinct family, each for a single queue at priority 1.0.
pub fn queue_requests(indices: &QueueFamilyIndices) -> Vec<QueueRequest> {
    indices
        .unique()
        .into_iter()
        .map(|family| QueueRequest {
            family,
            priority: 1.0,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Queues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
}

impl Queues {
    pub fn fetch<D: GpuDevice>(device: &D, selected: &SelectedDevice) -> Self {
        Queues {
            graphics: device.queue(selected.graphics_family()),
            present: device.queue(selected.present_family()),
        }
    }
}

/// Device layers are ignored by current loaders; older ones still read them.
pub fn device_layers(validation: bool) -> &'static [&'static CStr] {
    if validation {
        &[VALIDATION_LAYER]
    } else {
        &[]
    }
}

pub fn create_logical_device(
    instance: &ash::Instance,
    selected: &SelectedDevice,
    validation: bool,
) -> RenderResult<AshDevice> {
    let requests = queue_requests(&selected.queues);
    let priorities: Vec<[f32; 1]> = requests.iter().map(|r| [r.priority]).collect();
    let qinfos: Vec<vk::DeviceQueueCreateInfo> = requests
        .iter()
        .zip(&priorities)
        .map(|(r, p)| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: r.family,
            queue_count: 1,
            p_queue_priorities: p.as_ptr(),
            ..Default::default()
        })
        .collect();

    let exts: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|n: &&CStr| n.as_ptr())
        .collect();
    let layers: Vec<*const c_char> = device_layers(validation)
        .iter()
        .map(|n| n.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default();
    #[allow(deprecated)]
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: qinfos.len() as u32,
        p_queue_create_infos: qinfos.as_ptr(),
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    let device = unsafe { instance.create_device(selected.physical, &dinfo, None) }
        .map_err(VkError::DeviceCreation)?;
    debug!(
        "logical device created with {} queue famil{}",
        requests.len(),
        if requests.len() == 1 { "y" } else { "ies" }
    );
    Ok(AshDevice::new(instance, device))
}
