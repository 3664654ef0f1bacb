//! Vulkan buffer wrappers.
//!
//! Two allocation strategies are provided:
//!
//! - [`Buffer::new_staging`]: HOST_VISIBLE | HOST_COHERENT memory with a
//!   persistent mapping, used as the source of transfer copies. Coherent
//!   memory means no flushes are needed between the CPU memcpy and the
//!   recorded copy commands.
//! - [`Buffer::new_device_local`]: DEVICE_LOCAL memory for the destination
//!   side of transfers (vertex/index/uniform buffers owned by the renderer).

use std::fmt::Debug;

use ash::{prelude::VkResult, vk};
use vk_mem::Alloc;

use crate::{Allocator, Device, HasDevice, utils::AsVkHandle};

/// A buffer fully bound to a memory allocation.
pub struct Buffer {
    allocator: Allocator,
    allocation: vk_mem::Allocation,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    /// Persistent mapping. Null when the memory is not host-visible.
    ptr: *mut u8,
}

unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl HasDevice for Buffer {
    fn device(&self) -> &Device {
        self.allocator.device()
    }
}

impl AsVkHandle for Buffer {
    type Handle = vk::Buffer;
    fn vk_handle(&self) -> Self::Handle {
        self.buffer
    }
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.size)
            .field("mapped", &!self.ptr.is_null())
            .finish_non_exhaustive()
    }
}

impl Buffer {
    fn from_raw(
        allocator: Allocator,
        buffer: vk::Buffer,
        allocation: vk_mem::Allocation,
        size: vk::DeviceSize,
    ) -> Self {
        let ptr = allocator.get_allocation_info(&allocation).mapped_data as *mut u8;
        Self {
            allocator,
            allocation,
            buffer,
            size,
            ptr,
        }
    }

    /// Creates a persistently mapped HOST_VISIBLE | HOST_COHERENT buffer
    /// usable as a transfer source.
    pub fn new_staging(allocator: Allocator, size: vk::DeviceSize) -> VkResult<Self> {
        unsafe {
            let (buffer, allocation) = allocator.create_buffer(
                &vk::BufferCreateInfo {
                    size,
                    usage: vk::BufferUsageFlags::TRANSFER_SRC,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    ..Default::default()
                },
                &vk_mem::AllocationCreateInfo {
                    usage: vk_mem::MemoryUsage::AutoPreferHost,
                    flags: vk_mem::AllocationCreateFlags::MAPPED
                        | vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                    required_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                        | vk::MemoryPropertyFlags::HOST_COHERENT,
                    ..Default::default()
                },
            )?;
            Ok(Self::from_raw(allocator, buffer, allocation, size))
        }
    }

    /// Creates a buffer accessible exclusively from the GPU.
    pub fn new_device_local(
        allocator: Allocator,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VkResult<Self> {
        unsafe {
            let (buffer, allocation) = allocator.create_buffer(
                &vk::BufferCreateInfo {
                    size,
                    usage,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    ..Default::default()
                },
                &vk_mem::AllocationCreateInfo {
                    usage: vk_mem::MemoryUsage::AutoPreferDevice,
                    preferred_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                    ..Default::default()
                },
            )?;
            Ok(Self::from_raw(allocator, buffer, allocation, size))
        }
    }

    /// Returns the buffer size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the persistent mapping, or null if the memory is not
    /// host-visible.
    pub fn mapped_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Returns the mapped memory as a mutable byte slice.
    ///
    /// Returns `None` for buffers without a host-visible mapping.
    pub fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        if self.ptr.is_null() {
            None
        } else {
            unsafe { Some(std::slice::from_raw_parts_mut(self.ptr, self.size as usize)) }
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.allocator
                .destroy_buffer(self.buffer, &mut self.allocation);
        }
    }
}
