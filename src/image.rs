//! Vulkan image and image view wrappers, and the staging-to-image upload
//! recorder.

use std::sync::Arc;

use ash::{prelude::VkResult, vk};
use glam::UVec3;
use vk_mem::Alloc;

use crate::{
    Allocator, Device, HasDevice,
    buffer::Buffer,
    data::{Data, DataProperties},
    utils::AsVkHandle,
};

/// An image fully backed by a memory allocation, optionally carrying the
/// CPU-side payload it should be populated from.
pub struct Image {
    allocator: Allocator,
    allocation: vk_mem::Allocation,
    handle: vk::Image,
    format: vk::Format,
    extent: UVec3,
    mip_level_count: u32,
    data: Option<Arc<Data>>,
}

unsafe impl Send for Image {}
unsafe impl Sync for Image {}

impl HasDevice for Image {
    fn device(&self) -> &Device {
        self.allocator.device()
    }
}

impl AsVkHandle for Image {
    type Handle = vk::Image;
    fn vk_handle(&self) -> Self::Handle {
        self.handle
    }
}

impl Image {
    /// Creates a GPU-exclusive image. `data`, when present, is what the
    /// transfer task will upload into it.
    pub fn new_device_local(
        allocator: Allocator,
        info: &vk::ImageCreateInfo,
        data: Option<Arc<Data>>,
    ) -> VkResult<Self> {
        unsafe {
            let (handle, allocation) = allocator.create_image(
                info,
                &vk_mem::AllocationCreateInfo {
                    usage: vk_mem::MemoryUsage::AutoPreferDevice,
                    preferred_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                    ..Default::default()
                },
            )?;
            Ok(Self {
                extent: UVec3::new(info.extent.width, info.extent.height, info.extent.depth),
                allocator,
                allocation,
                handle,
                format: info.format,
                mip_level_count: info.mip_levels,
                data,
            })
        }
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
    pub fn extent(&self) -> UVec3 {
        self.extent
    }
    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }

    /// The CPU-side payload assigned to this image, if any.
    pub fn data(&self) -> Option<&Arc<Data>> {
        self.data.as_ref()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.allocator
                .destroy_image(self.handle, &mut self.allocation);
        }
    }
}

/// A view over an [`Image`].
///
/// The view format is the transfer target format: when it differs from the
/// payload's source format, texel data is converted while being packed into
/// staging memory.
pub struct ImageView {
    image: Arc<Image>,
    handle: vk::ImageView,
    format: vk::Format,
}

impl HasDevice for ImageView {
    fn device(&self) -> &Device {
        self.image.device()
    }
}

impl AsVkHandle for ImageView {
    type Handle = vk::ImageView;
    fn vk_handle(&self) -> Self::Handle {
        self.handle
    }
}

impl ImageView {
    /// Creates a 2D view covering all mip levels of the image.
    pub fn new(image: Arc<Image>, format: vk::Format) -> VkResult<Self> {
        let handle = unsafe {
            image.device().create_image_view(
                &vk::ImageViewCreateInfo::default()
                    .image(image.vk_handle())
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: aspect_mask(format),
                        base_mip_level: 0,
                        level_count: image.mip_level_count(),
                        base_array_layer: 0,
                        layer_count: 1,
                    }),
                None,
            )?
        };
        Ok(Self {
            image,
            handle,
            format,
        })
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.image.device().destroy_image_view(self.handle, None);
        }
    }
}

fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Records the commands that populate an image from staging memory.
///
/// On entry, staging holds the texel data for the stored mip levels starting
/// at `source_offset`, laid out per `properties` (which reflects any format
/// conversion already applied). Records a transition of all `mip_levels`
/// levels to TRANSFER_DST_OPTIMAL, one buffer-to-image copy per stored level,
/// and a transition to `final_layout`. Levels beyond the stored data are
/// transitioned but not filled.
#[allow(clippy::too_many_arguments)]
pub fn transfer_image_data(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    staging: &Buffer,
    source_offset: vk::DeviceSize,
    image_view: &ImageView,
    final_layout: vk::ImageLayout,
    properties: &DataProperties,
    width: u32,
    height: u32,
    depth: u32,
    mip_levels: u32,
    mipmap_offsets: &[u64],
) {
    let image = image_view.image();
    let aspect_mask = aspect_mask(image_view.format());
    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: mip_levels,
        base_array_layer: 0,
        layer_count: 1,
    };

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .image(image.vk_handle())
                .subresource_range(subresource_range)],
        );

        let stored_levels = (mipmap_offsets.len() as u32).min(mip_levels).max(1);
        let mut regions = Vec::with_capacity(stored_levels as usize);
        for level in 0..stored_levels {
            let value_offset = mipmap_offsets.get(level as usize).copied().unwrap_or(0);
            regions.push(vk::BufferImageCopy {
                buffer_offset: source_offset + value_offset * properties.stride as u64,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: (width >> level).max(1),
                    height: (height >> level).max(1),
                    depth: (depth >> level).max(1),
                },
            });
        }
        device.cmd_copy_buffer_to_image(
            command_buffer,
            staging.vk_handle(),
            image.vk_handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &regions,
        );

        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(final_layout)
                .image(image.vk_handle())
                .subresource_range(subresource_range)],
        );
    }
}
