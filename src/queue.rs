//! Vulkan queue access.
//!
//! Submissions to a queue begin in order but may finish out of order;
//! cross-submission dependencies are expressed with semaphores by the caller.

use std::sync::Mutex;

use ash::{prelude::VkResult, vk};

use crate::{Device, HasDevice, utils::AsVkHandle};

/// A Vulkan queue for scheduling GPU work.
///
/// Vulkan requires external synchronization around `vkQueueSubmit`; since the
/// transfer task and the renderer may share a queue object, submissions are
/// serialized by an internal lock rather than by `&mut` access.
pub struct Queue {
    device: Device,
    handle: vk::Queue,
    family_index: u32,
    submit_lock: Mutex<()>,
}

impl HasDevice for Queue {
    fn device(&self) -> &Device {
        &self.device
    }
}

impl AsVkHandle for Queue {
    type Handle = vk::Queue;
    fn vk_handle(&self) -> Self::Handle {
        self.handle
    }
}

impl Queue {
    /// Wraps a queue retrieved from the device.
    pub fn new(device: Device, handle: vk::Queue, family_index: u32) -> Self {
        Self {
            device,
            handle,
            family_index,
            submit_lock: Mutex::new(()),
        }
    }

    /// Returns the queue family index this queue belongs to.
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Submits batches of command buffers for execution.
    pub fn submit(&self, submits: &[vk::SubmitInfo]) -> VkResult<()> {
        let _guard = self.submit_lock.lock().unwrap();
        unsafe {
            self.device
                .queue_submit(self.handle, submits, vk::Fence::null())
        }
    }
}
