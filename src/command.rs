//! Command buffer allocation.

use ash::{prelude::VkResult, vk};

use crate::{Device, HasDevice, utils::AsVkHandle};

/// A command pool bound to one queue family.
///
/// Created with `RESET_COMMAND_BUFFER` so individual command buffers can be
/// reset and re-recorded each frame without recreating the pool.
pub struct CommandPool {
    device: Device,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl HasDevice for CommandPool {
    fn device(&self) -> &Device {
        &self.device
    }
}

impl AsVkHandle for CommandPool {
    type Handle = vk::CommandPool;
    fn vk_handle(&self) -> Self::Handle {
        self.pool
    }
}

impl CommandPool {
    /// Creates a command pool on the given queue family.
    pub fn new(device: Device, queue_family_index: u32) -> VkResult<Self> {
        let pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                    .queue_family_index(queue_family_index),
                None,
            )?
        };
        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the queue family this pool allocates for.
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates one primary command buffer.
    ///
    /// The buffer is freed together with the pool.
    pub fn allocate_primary(&self) -> VkResult<vk::CommandBuffer> {
        let buffers = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )?
        };
        Ok(buffers[0])
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
