//! Vulkan sampler wrapper.

use ash::{prelude::VkResult, vk};

use crate::{Data, Device, HasDevice, utils::AsVkHandle};

/// A Vulkan sampler.
///
/// The maximum LOD from the creation info is retained; it decides whether an
/// image assigned with this sampler gets a full mip chain.
pub struct Sampler {
    device: Device,
    handle: vk::Sampler,
    max_lod: f32,
}

impl HasDevice for Sampler {
    fn device(&self) -> &Device {
        &self.device
    }
}

impl AsVkHandle for Sampler {
    type Handle = vk::Sampler;
    fn vk_handle(&self) -> Self::Handle {
        self.handle
    }
}

impl Sampler {
    /// Creates a new sampler.
    pub fn new(device: Device, info: &vk::SamplerCreateInfo) -> VkResult<Self> {
        let handle = unsafe { device.create_sampler(info, None)? };
        Ok(Self {
            device,
            handle,
            max_lod: info.max_lod,
        })
    }

    pub fn max_lod(&self) -> f32 {
        self.max_lod
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.handle, None);
        }
    }
}

/// Number of mip levels an upload of `data` should target.
///
/// Data that already stores multiple levels wins. Otherwise a sampler with a
/// non-zero max LOD asks for the full chain implied by the extent; the levels
/// beyond the stored data are transitioned but left for the renderer to
/// generate.
pub fn compute_mip_levels(data: &Data, sampler: Option<&Sampler>) -> u32 {
    if data.mip_levels() > 1 {
        return data.mip_levels();
    }
    match sampler {
        Some(sampler) if sampler.max_lod() > 0.0 => {
            let max_dim = data.width().max(data.height()).max(data.depth());
            32 - max_dim.max(1).leading_zeros()
        }
        _ => 1,
    }
}
