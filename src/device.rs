//! Logical device access.
//!
//! This crate does not create Vulkan instances or devices; the surrounding
//! runtime does. [`Device`] wraps externally created handles so the transfer
//! task and its resources can share them cheaply, and assigns each logical
//! device a process-unique id used to key per-device modified-count caches.

use std::{
    fmt::Debug,
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use ash::vk;

use crate::utils::AsVkHandle;

/// Trait for types associated with a logical device.
pub trait HasDevice {
    /// Returns a reference to the Vulkan device.
    fn device(&self) -> &Device;
}

static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(0);

/// A reference-counted handle to a logical device.
///
/// Cloning is cheap. Equality is identity: two `Device`s compare equal iff
/// they wrap the same underlying handle set.
///
/// The wrapped `ash` handles remain owned by whoever created them; dropping
/// the last `Device` clone does not destroy the Vulkan device.
#[derive(Clone)]
pub struct Device(Arc<DeviceInner>);

struct DeviceInner {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    device_id: u32,
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Device {}
impl Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("device_id", &self.0.device_id)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Wraps externally created device handles.
    ///
    /// # Safety
    ///
    /// `device` must have been created from `physical_device` on `instance`,
    /// and all three must remain valid for as long as any clone of the
    /// returned `Device` (or any resource created through it) is alive.
    pub unsafe fn from_raw(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Self {
        Self(Arc::new(DeviceInner {
            instance,
            physical_device,
            device,
            device_id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
        }))
    }

    /// Returns the instance the device was created from.
    pub fn instance(&self) -> &ash::Instance {
        &self.0.instance
    }

    /// Returns the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.0.physical_device
    }

    /// Returns the process-unique id of this logical device.
    ///
    /// Modified-count caches on [`BufferInfo`](crate::transfer::BufferInfo)
    /// and [`ImageInfo`](crate::transfer::ImageInfo) are keyed by this id, so
    /// the same data object can be tracked independently per device.
    pub fn device_id(&self) -> u32 {
        self.0.device_id
    }
}

impl HasDevice for Device {
    fn device(&self) -> &Device {
        self
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.0.device
    }
}

impl AsVkHandle for Device {
    type Handle = vk::Device;

    fn vk_handle(&self) -> Self::Handle {
        self.0.device.handle()
    }
}
