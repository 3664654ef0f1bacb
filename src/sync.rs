//! GPU synchronization primitives.
//!
//! The transfer task signals a binary [`Semaphore`] when a frame's transfer
//! submission completes, and waits on semaphores handed to it by the caller.
//! Timeline semaphores are not used here: the submission path is classic
//! `vkQueueSubmit`, and chaining across frames is the caller's concern.

use ash::{prelude::VkResult, vk};

use crate::{Device, HasDevice, utils::AsVkHandle};

/// A binary semaphore together with the pipeline stages a waiter should
/// block.
///
/// The stage mask travels with the semaphore so that whoever puts it into a
/// wait list can fill `pWaitDstStageMask` without further bookkeeping.
pub struct Semaphore {
    device: Device,
    handle: vk::Semaphore,
    pipeline_stage_flags: vk::PipelineStageFlags,
}

impl HasDevice for Semaphore {
    fn device(&self) -> &Device {
        &self.device
    }
}

impl AsVkHandle for Semaphore {
    type Handle = vk::Semaphore;
    fn vk_handle(&self) -> Self::Handle {
        self.handle
    }
}

impl Semaphore {
    /// Creates a new unsignaled binary semaphore.
    pub fn new(device: Device, pipeline_stage_flags: vk::PipelineStageFlags) -> VkResult<Self> {
        let handle =
            unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };
        Ok(Self {
            device,
            handle,
            pipeline_stage_flags,
        })
    }

    /// Returns the stage mask a waiting submission should use for this
    /// semaphore.
    pub fn pipeline_stage_flags(&self) -> vk::PipelineStageFlags {
        self.pipeline_stage_flags
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}
