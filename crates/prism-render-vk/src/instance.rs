// SPDX-License-Identifier: CEPL-1.0
//! Vulkan instance, validation layer and debug messenger.

use std::ffi::{c_char, c_void, CStr};

use ash::{ext::debug_utils, vk, Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, error, info, trace, warn, Level};

use crate::error::{RenderResult, VkError};
use crate::probe::missing_names;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Which `tracing` level a validation message is logged at.
pub fn message_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    match message_level(severity) {
        Level::ERROR => error!("[vulkan {types:?}] {msg}"),
        Level::WARN => warn!("[vulkan {types:?}] {msg}"),
        Level::DEBUG => debug!("[vulkan {types:?}] {msg}"),
        _ => trace!("[vulkan {types:?}] {msg}"),
    }
    vk::FALSE
}

fn names_of(props: impl Iterator<Item = [c_char; vk::MAX_EXTENSION_NAME_SIZE]>) -> Vec<String> {
    props
        .map(|raw| {
            // Names are NUL-terminated inside a fixed array.
            let bytes: Vec<u8> = raw
                .iter()
                .take_while(|&&c| c != 0)
                .map(|&c| c as u8)
                .collect();
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .collect()
}

/// First required name that `available` lacks, if any.
pub fn first_missing(required: &[&CStr], available: &[String]) -> Option<String> {
    missing_names(required, available).into_iter().next()
}

pub struct InstanceBundle {
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    instance: Instance,
    entry: Entry,
}

impl InstanceBundle {
    pub fn new(display: RawDisplayHandle, validation: bool) -> RenderResult<Self> {
        let entry = Entry::linked();

        if validation {
            let layers = unsafe { entry.enumerate_instance_layer_properties() }.map_err(|result| {
                VkError::Query {
                    step: "enumerate_instance_layer_properties",
                    result,
                }
            })?;
            let available = names_of(layers.iter().map(|l| l.layer_name));
            if let Some(name) = first_missing(&[VALIDATION_LAYER], &available) {
                return Err(VkError::MissingValidationLayer(name));
            }
        }

        let mut ext_ptrs: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .map_err(VkError::InstanceCreation)?
            .to_vec();
        if validation {
            ext_ptrs.push(debug_utils::NAME.as_ptr());
        }

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(|result| VkError::Query {
                step: "enumerate_instance_extension_properties",
                result,
            })?;
        let available = names_of(available.iter().map(|e| e.extension_name));
        let required: Vec<&CStr> = ext_ptrs
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect();
        if let Some(name) = first_missing(&required, &available) {
            return Err(VkError::MissingInstanceExtension(name));
        }

        let app = c"Prism";
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app.as_ptr(),
            application_version: vk::make_api_version(0, 0, 1, 0),
            p_engine_name: app.as_ptr(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };

        let layers = [VALIDATION_LAYER.as_ptr()];
        let (enabled_layer_count, pp_enabled_layer_names) = if validation {
            (layers.len() as u32, layers.as_ptr())
        } else {
            (0u32, std::ptr::null())
        };

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            enabled_layer_count,
            pp_enabled_layer_names,
            ..Default::default()
        };
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(VkError::InstanceCreation)?;

        let mut bundle = InstanceBundle {
            debug: None,
            instance,
            entry,
        };
        if validation {
            bundle.debug = Some(bundle.create_messenger()?);
            info!("validation layer enabled");
        }
        Ok(bundle)
    }

    fn create_messenger(
        &self,
    ) -> RenderResult<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let loader = debug_utils::Instance::new(&self.entry, &self.instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            ..Default::default()
        };
        let messenger = unsafe { loader.create_debug_utils_messenger(&ci, None) }.map_err(|result| {
            VkError::Query {
                step: "create_debug_utils_messenger",
                result,
            }
        })?;
        Ok((loader, messenger))
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RenderResult<vk::SurfaceKHR> {
        unsafe { ash_window::create_surface(&self.entry, &self.instance, display, window, None) }
            .map_err(|e| VkError::SurfaceCreation(e.to_string()))
    }
}

// Everything created from the instance (surface, device) must be gone
// before this runs.
impl Drop for InstanceBundle {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
