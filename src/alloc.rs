//! GPU memory allocation.
//!
//! [`Allocator`] wraps the Vulkan Memory Allocator (VMA) library. Create one
//! per device and pass it to buffer and image constructors.

use std::{ops::Deref, sync::Arc};

use ash::prelude::VkResult;

use crate::{Device, HasDevice};

/// A GPU memory allocator backed by VMA.
///
/// Reference-counted; clones share the same underlying allocator and can be
/// handed to resource constructors freely.
#[derive(Clone)]
pub struct Allocator(Arc<AllocatorInner>);

struct AllocatorInner {
    device: Device,
    inner: vk_mem::Allocator,
}

impl HasDevice for Allocator {
    fn device(&self) -> &Device {
        &self.0.device
    }
}

impl Allocator {
    /// Creates a new allocator for the given device.
    pub fn new(device: Device) -> VkResult<Self> {
        let info = vk_mem::AllocatorCreateInfo::new(
            device.instance(),
            &device,
            device.physical_device(),
        );
        let alloc = unsafe { vk_mem::Allocator::new(info)? };
        Ok(Self(Arc::new(AllocatorInner {
            device,
            inner: alloc,
        })))
    }
}

impl Deref for Allocator {
    type Target = vk_mem::Allocator;

    fn deref(&self) -> &Self::Target {
        &self.0.inner
    }
}
