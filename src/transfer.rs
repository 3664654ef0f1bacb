//! Asynchronous CPU→GPU data transfer.
//!
//! [`TransferTask`] moves application-side [`Data`] payloads into device
//! buffers and images, one coalesced staging submission per frame. Its frame
//! cycle is:
//!
//! 1. [`advance`](TransferTask::advance) rotates to the next staging slot.
//! 2. [`assign_*`](TransferTask::assign_buffer_infos) hands pending uploads
//!    to the ledger (callable any time, from any thread).
//! 3. [`transfer_data`](TransferTask::transfer_data) sizes the pending set,
//!    grows the slot's staging buffer if needed, packs modified payloads into
//!    the persistently mapped staging memory, records the copy commands and
//!    submits them.
//!
//! The renderer chains on
//! [`current_transfer_completed_semaphore`](TransferTask::current_transfer_completed_semaphore)
//! for the same frame, and hands semaphores back through
//! [`add_wait_semaphore`](TransferTask::add_wait_semaphore) to keep a staging
//! slot from being rewritten while its previous submission is still in
//! flight. The task itself never waits on a fence; slot reuse is safe because
//! the ring is as deep as the number of frames in flight.
//!
//! Entries whose only remaining holder is the ledger are dropped without
//! copying; entries with static data are dropped once their upload has been
//! recorded; dynamic entries stay resident and re-upload whenever their
//! payload is marked dirty.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use ash::vk;

use crate::{
    Allocator, Device, Queue, Sampler,
    buffer::Buffer,
    command::CommandPool,
    data::{Data, DataVariance},
    image::{ImageView, transfer_image_data},
    sampler::compute_mip_levels,
    sync::Semaphore,
    utils::{
        AsVkHandle, align_up,
        format::{format_traits, widen_texels},
    },
};

/// Staging offsets are packed to this alignment. Callers needing wider
/// alignment guarantees must wrap the task.
const STAGING_ALIGNMENT: vk::DeviceSize = 4;

/// Staging buffers are never allocated smaller than this, so early small
/// frames don't trigger a reallocation cascade as scenes grow.
pub const DEFAULT_MINIMUM_STAGING_BUFFER_SIZE: vk::DeviceSize = 16 * 1024 * 1024;

/// Errors produced by a transfer cycle.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
    /// The source and target image formats cannot be bridged by packing:
    /// either one of them has no byte-addressable texel description, or the
    /// source texel is wider than the target texel.
    #[error(
        "cannot convert texel data from {source_format:?} ({source_size} bytes/texel) to {target:?} ({target_size} bytes/texel)"
    )]
    IncompatibleFormats {
        source_format: vk::Format,
        source_size: u32,
        target: vk::Format,
        target_size: u32,
    },
}

/// A shift register over staging slot indices.
///
/// `index(0)` is the slot for the current frame, `index(k)` the slot that was
/// current `k` frames ago. Before the first [`advance`](FrameRing::advance),
/// and for ages that have not been populated yet, the ring length is returned
/// as a sentinel; consumers treat it as "no slot yet" and skip work.
#[derive(Debug, Clone)]
pub struct FrameRing {
    current: usize,
    indices: Vec<usize>,
}

impl FrameRing {
    pub fn new(len: usize) -> Self {
        assert!(len > 0);
        Self {
            current: len,
            indices: vec![len; len],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.indices.len()
    }

    /// Rotates to the next slot and shifts the historical indices.
    pub fn advance(&mut self) {
        if self.current >= self.indices.len() {
            // first frame
            self.current = 0;
        } else {
            self.current += 1;
            if self.current >= self.indices.len() {
                self.current = 0;
            }
            for i in (1..self.indices.len()).rev() {
                self.indices[i] = self.indices[i - 1];
            }
        }
        self.indices[0] = self.current;
    }

    /// Returns the slot index used `age` frames ago, or the ring length as a
    /// sentinel when that history does not exist.
    pub fn index(&self, age: usize) -> usize {
        if age < self.indices.len() {
            self.indices[age]
        } else {
            self.indices.len()
        }
    }
}

/// Accumulates ranges with [`STAGING_ALIGNMENT`] padding between entries.
/// Returns the packed end offset and the number of entries.
fn packed_size_and_regions<I: IntoIterator<Item = vk::DeviceSize>>(
    ranges: I,
) -> (vk::DeviceSize, usize) {
    let mut offset = 0;
    let mut regions = 0;
    for range in ranges {
        offset = align_up(offset + range, STAGING_ALIGNMENT);
        regions += 1;
    }
    (offset, regions)
}

/// A pending upload into a region of a destination buffer.
///
/// Shared between the application (which mutates the payload and marks it
/// dirty) and the transfer ledger. When the ledger finds itself the last
/// holder of an entry, the entry is dropped without copying.
pub struct BufferInfo {
    buffer: Option<Arc<Buffer>>,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
    data: Arc<Data>,
    /// Modification count last uploaded, per device id.
    copied_modifications: Mutex<BTreeMap<u32, u64>>,
}

impl BufferInfo {
    /// Creates an entry targeting `range` bytes at `offset` within `buffer`.
    pub fn new(
        buffer: Arc<Buffer>,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
        data: Arc<Data>,
    ) -> Arc<Self> {
        assert!(
            offset + range <= buffer.size(),
            "buffer region out of bounds"
        );
        Arc::new(Self {
            buffer: Some(buffer),
            offset,
            range,
            data,
            copied_modifications: Mutex::new(BTreeMap::new()),
        })
    }

    /// Creates an entry with no backing buffer yet. Such entries are ignored
    /// by [`TransferTask::assign_buffer_infos`] until a backed replacement is
    /// assigned.
    pub fn detached(offset: vk::DeviceSize, range: vk::DeviceSize, data: Arc<Data>) -> Arc<Self> {
        Arc::new(Self {
            buffer: None,
            offset,
            range,
            data,
            copied_modifications: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn buffer(&self) -> Option<&Arc<Buffer>> {
        self.buffer.as_ref()
    }
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }
    pub fn range(&self) -> vk::DeviceSize {
        self.range
    }
    pub fn data(&self) -> &Arc<Data> {
        &self.data
    }

    /// Returns true iff the cached per-device count was behind the payload's
    /// modification count, updating the cache. A `true` result is the sole
    /// trigger for re-uploading this entry in the current frame.
    pub fn sync_modified_counts(&self, device_id: u32) -> bool {
        sync_modified_counts(&self.copied_modifications, device_id, &self.data)
    }
}

/// A pending upload into an image, reached through its view.
///
/// The payload travels on the image (`image_view.image().data()`); the view's
/// format is the upload target format.
pub struct ImageInfo {
    image_view: Arc<ImageView>,
    image_layout: vk::ImageLayout,
    sampler: Option<Arc<Sampler>>,
    copied_modifications: Mutex<BTreeMap<u32, u64>>,
}

impl ImageInfo {
    pub fn new(
        image_view: Arc<ImageView>,
        image_layout: vk::ImageLayout,
        sampler: Option<Arc<Sampler>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            image_view,
            image_layout,
            sampler,
            copied_modifications: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn image_view(&self) -> &Arc<ImageView> {
        &self.image_view
    }
    pub fn image_layout(&self) -> vk::ImageLayout {
        self.image_layout
    }
    pub fn sampler(&self) -> Option<&Sampler> {
        self.sampler.as_deref()
    }
    pub fn data(&self) -> Option<&Arc<Data>> {
        self.image_view.image().data()
    }

    /// Per-device modified-count synchronization; see
    /// [`BufferInfo::sync_modified_counts`].
    pub fn sync_modified_counts(&self, device_id: u32) -> bool {
        match self.data() {
            Some(data) => sync_modified_counts(&self.copied_modifications, device_id, data),
            None => false,
        }
    }
}

fn sync_modified_counts(
    cache: &Mutex<BTreeMap<u32, u64>>,
    device_id: u32,
    data: &Data,
) -> bool {
    let mut cache = cache.lock().unwrap();
    let seen = cache.entry(device_id).or_insert(0);
    let current = data.modification_count();
    if *seen < current {
        *seen = current;
        true
    } else {
        false
    }
}

/// Buffer and image uploads collected by a compile or update traversal,
/// handed to the task in one call.
#[derive(Default)]
pub struct DynamicData {
    pub buffer_infos: Vec<Arc<BufferInfo>>,
    pub image_infos: Vec<Arc<ImageInfo>>,
}

/// Pending uploads for one destination buffer, ordered by destination
/// offset. Stable, monotonically increasing iteration is what makes the
/// packing pass deterministic.
struct DestinationBuffer {
    buffer: Arc<Buffer>,
    infos: BTreeMap<vk::DeviceSize, Arc<BufferInfo>>,
}

/// The pending-upload ledger. One instance is submitted before rendering
/// ("early"); a second is reserved for transfers recorded after rendering.
#[derive(Default)]
struct DataToCopy {
    buffers: BTreeMap<vk::Buffer, DestinationBuffer>,
    image_infos: Vec<Arc<ImageInfo>>,
}

impl DataToCopy {
    fn contains_data_to_transfer(&self) -> bool {
        !self.buffers.is_empty() || !self.image_infos.is_empty()
    }
}

/// One frame slot: staging memory, command buffer and completion semaphore,
/// all created lazily on the slot's first non-empty frame.
#[derive(Default)]
struct TransferBlock {
    staging: Option<Buffer>,
    commands: Option<(CommandPool, vk::CommandBuffer)>,
    semaphore: Option<Arc<Semaphore>>,
    copy_regions: Vec<vk::BufferCopy>,
}

struct TransferState {
    ring: FrameRing,
    frames: Vec<TransferBlock>,
    early: DataToCopy,
    late: DataToCopy,
    wait_semaphores: Vec<Arc<Semaphore>>,
    signal_semaphores: Vec<Arc<Semaphore>>,
    current_transfer_completed_semaphore: Option<Arc<Semaphore>>,
}

/// Per-frame transfer of modified payloads into device-local resources.
///
/// All entry points lock one internal mutex, so the task may be driven from
/// different threads across frames. During a submit the queue's own lock is
/// taken while the task mutex is held; callers must not hold the queue lock
/// while calling into the task.
pub struct TransferTask {
    device: Device,
    allocator: Allocator,
    transfer_queue: Arc<Queue>,
    minimum_staging_buffer_size: vk::DeviceSize,
    state: Mutex<TransferState>,
}

impl TransferTask {
    /// Creates a task with `num_frames` independent staging slots, typically
    /// matching the renderer's frames in flight.
    pub fn new(
        device: Device,
        allocator: Allocator,
        transfer_queue: Arc<Queue>,
        num_frames: usize,
    ) -> Self {
        Self {
            device,
            allocator,
            transfer_queue,
            minimum_staging_buffer_size: DEFAULT_MINIMUM_STAGING_BUFFER_SIZE,
            state: Mutex::new(TransferState {
                ring: FrameRing::new(num_frames),
                frames: (0..num_frames).map(|_| TransferBlock::default()).collect(),
                early: DataToCopy::default(),
                late: DataToCopy::default(),
                wait_semaphores: Vec::new(),
                signal_semaphores: Vec::new(),
                current_transfer_completed_semaphore: None,
            }),
        }
    }

    /// Overrides the lower bound on staging buffer allocations.
    pub fn with_minimum_staging_size(mut self, size: vk::DeviceSize) -> Self {
        self.minimum_staging_buffer_size = size;
        self
    }

    /// Rotates to the next staging slot. Call once per frame, before
    /// [`transfer_data`](TransferTask::transfer_data).
    pub fn advance(&self) {
        self.state.lock().unwrap().ring.advance();
    }

    /// Returns the staging slot index used `age` frames ago, or the ring
    /// length as a sentinel when that history does not exist yet.
    pub fn index(&self, age: usize) -> usize {
        self.state.lock().unwrap().ring.index(age)
    }

    /// Whether any uploads are pending.
    pub fn contains_data_to_transfer(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.early.contains_data_to_transfer() || state.late.contains_data_to_transfer()
    }

    /// Hands buffer uploads to the ledger. Entries without a backing buffer
    /// are ignored. A later entry for the same (buffer, offset) replaces the
    /// earlier one.
    pub fn assign_buffer_infos<I>(&self, buffer_infos: I)
    where
        I: IntoIterator<Item = Arc<BufferInfo>>,
    {
        let mut state = self.state.lock().unwrap();
        for info in buffer_infos {
            let Some(buffer) = info.buffer().cloned() else {
                continue;
            };
            state
                .early
                .buffers
                .entry(buffer.vk_handle())
                .or_insert_with(|| DestinationBuffer {
                    buffer,
                    infos: BTreeMap::new(),
                })
                .infos
                .insert(info.offset(), info);
        }
    }

    /// Hands image uploads to the ledger. Entries whose view has no payload
    /// attached to its image are ignored; re-assigning an entry already in
    /// the ledger is a no-op.
    pub fn assign_image_infos<I>(&self, image_infos: I)
    where
        I: IntoIterator<Item = Arc<ImageInfo>>,
    {
        let mut state = self.state.lock().unwrap();
        for info in image_infos {
            if info.data().is_none() {
                continue;
            }
            if !state
                .early
                .image_infos
                .iter()
                .any(|existing| Arc::ptr_eq(existing, &info))
            {
                state.early.image_infos.push(info);
            }
        }
    }

    /// Hands a combined collection of uploads to the ledger.
    pub fn assign_dynamic_data(&self, dynamic_data: DynamicData) {
        self.assign_buffer_infos(dynamic_data.buffer_infos);
        self.assign_image_infos(dynamic_data.image_infos);
    }

    /// Adds a semaphore the next submission will wait on. Wait semaphores are
    /// consumed by the next [`transfer_data`](TransferTask::transfer_data)
    /// call, whether or not it submits.
    pub fn add_wait_semaphore(&self, semaphore: Arc<Semaphore>) {
        self.state.lock().unwrap().wait_semaphores.push(semaphore);
    }

    /// Adds a semaphore every submission will signal, in addition to the
    /// frame slot's completion semaphore.
    pub fn add_signal_semaphore(&self, semaphore: Arc<Semaphore>) {
        self.state.lock().unwrap().signal_semaphores.push(semaphore);
    }

    /// The completion semaphore published by the most recent submission.
    /// Unchanged by frames that had nothing to submit.
    pub fn current_transfer_completed_semaphore(&self) -> Option<Arc<Semaphore>> {
        self.state
            .lock()
            .unwrap()
            .current_transfer_completed_semaphore
            .clone()
    }

    /// Runs the transfer cycle for the current frame slot: size the pending
    /// set, grow staging if needed, pack modified payloads, record and submit
    /// the copy commands.
    ///
    /// Returns without work during warmup frames (before the first
    /// [`advance`](TransferTask::advance)) and when nothing is pending. On
    /// error the ledger keeps whatever progress was made; the caller treats
    /// the frame as lost and the next cycle re-scans from ground truth.
    pub fn transfer_data(&self) -> Result<(), TransferError> {
        let mut state = self.state.lock().unwrap();
        let mut early = std::mem::take(&mut state.early);
        let result = state.transfer(self, &mut early);
        state.early = early;
        result
    }
}

impl TransferState {
    fn transfer(
        &mut self,
        task: &TransferTask,
        data_to_copy: &mut DataToCopy,
    ) -> Result<(), TransferError> {
        let device = &task.device;
        let frame_index = self.ring.index(0);
        if frame_index >= self.frames.len() {
            // warmup: no slot has been made current yet
            return Ok(());
        }

        // size pass: images, then buffers
        let (image_total_size, _) = packed_size_and_regions(
            data_to_copy.image_infos.iter().filter_map(|info| {
                let data = info.data()?;
                let target_traits = format_traits(info.image_view().format());
                Some(target_traits.size as vk::DeviceSize * data.value_count())
            }),
        );

        let (data_total_size, data_total_regions) = packed_size_and_regions(
            data_to_copy
                .buffers
                .values()
                .flat_map(|destination| destination.infos.values().map(|info| info.range())),
        );

        let total_size = data_total_size + image_total_size;
        if total_size == 0 {
            return Ok(());
        }
        tracing::debug!(
            frame_index,
            data_total_size,
            data_total_regions,
            image_total_size,
            "transfer cycle"
        );

        let frame = &mut self.frames[frame_index];

        if frame
            .staging
            .as_ref()
            .map_or(true, |staging| staging.size() < total_size)
        {
            let mut allocation_size = total_size;
            if allocation_size < task.minimum_staging_buffer_size {
                allocation_size = task.minimum_staging_buffer_size;
            }
            let previous_size = frame.staging.as_ref().map_or(0, |staging| staging.size());
            frame.staging = Some(Buffer::new_staging(
                task.allocator.clone(),
                allocation_size,
            )?);
            tracing::info!(
                frame_index,
                previous_size,
                allocation_size,
                "allocated staging buffer"
            );
        }

        let command_buffer = match &frame.commands {
            Some((_, command_buffer)) => {
                unsafe {
                    device.reset_command_buffer(
                        *command_buffer,
                        vk::CommandBufferResetFlags::empty(),
                    )?;
                }
                *command_buffer
            }
            None => {
                let pool = CommandPool::new(device.clone(), task.transfer_queue.family_index())?;
                let command_buffer = pool.allocate_primary()?;
                frame.commands = Some((pool, command_buffer));
                command_buffer
            }
        };

        let semaphore = match &frame.semaphore {
            Some(semaphore) => semaphore.clone(),
            None => {
                let semaphore = Arc::new(Semaphore::new(
                    device.clone(),
                    vk::PipelineStageFlags::ALL_COMMANDS,
                )?);
                frame.semaphore = Some(semaphore.clone());
                semaphore
            }
        };

        let TransferBlock {
            staging,
            copy_regions,
            ..
        } = frame;
        let staging = staging.as_ref().expect("staging allocated above");
        copy_regions.clear();
        copy_regions.reserve(data_total_regions);

        unsafe {
            device.begin_command_buffer(
                command_buffer,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }

        let mut offset: vk::DeviceSize = 0;
        record_buffer_copies(
            device,
            command_buffer,
            data_to_copy,
            staging,
            copy_regions,
            &mut offset,
        );
        let image_result =
            record_image_copies(device, command_buffer, data_to_copy, staging, &mut offset);

        unsafe {
            device.end_command_buffer(command_buffer)?;
        }
        image_result?;

        if offset > 0 {
            let wait_handles: Vec<vk::Semaphore> = self
                .wait_semaphores
                .iter()
                .map(|semaphore| semaphore.vk_handle())
                .collect();
            let wait_stages: Vec<vk::PipelineStageFlags> = self
                .wait_semaphores
                .iter()
                .map(|semaphore| semaphore.pipeline_stage_flags())
                .collect();
            let mut signal_handles = vec![semaphore.vk_handle()];
            signal_handles.extend(
                self.signal_semaphores
                    .iter()
                    .map(|semaphore| semaphore.vk_handle()),
            );
            let command_buffers = [command_buffer];

            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_handles)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_handles);
            let result = task.transfer_queue.submit(&[submit_info]);

            // wait semaphores are consumed exactly once, submit or not
            self.wait_semaphores.clear();
            result?;

            self.current_transfer_completed_semaphore = Some(semaphore);
        } else {
            tracing::trace!(frame_index, "nothing recorded, no submission");
            self.wait_semaphores.clear();
        }

        Ok(())
    }
}

/// Packs each modified buffer payload into staging memory and records one
/// `vkCmdCopyBuffer` per destination buffer. Static entries leave the ledger
/// after their copy is recorded; entries the ledger holds alone leave without
/// copying; destinations left without entries are compacted away.
fn record_buffer_copies(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    data_to_copy: &mut DataToCopy,
    staging: &Buffer,
    copy_regions: &mut Vec<vk::BufferCopy>,
    offset: &mut vk::DeviceSize,
) {
    let device_id = device.device_id();
    let staging_ptr = staging.mapped_ptr();

    data_to_copy.buffers.retain(|_, destination| {
        let first_region = copy_regions.len();
        destination.infos.retain(|_, info| {
            if Arc::strong_count(info) == 1 {
                tracing::trace!(
                    dst_offset = info.offset(),
                    "dropping upload entry with no other holders"
                );
                return false;
            }
            if info.sync_modified_counts(device_id) {
                let bytes = info.data().read();
                debug_assert!(bytes.len() as vk::DeviceSize >= info.range());
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        bytes.as_ptr(),
                        staging_ptr.add(*offset as usize),
                        info.range() as usize,
                    );
                }
                copy_regions.push(vk::BufferCopy {
                    src_offset: *offset,
                    dst_offset: info.offset(),
                    size: info.range(),
                });
                *offset = align_up(*offset + info.range(), STAGING_ALIGNMENT);
            }
            info.data().properties().data_variance == DataVariance::Dynamic
        });

        let regions = &copy_regions[first_region..];
        if !regions.is_empty() {
            unsafe {
                device.cmd_copy_buffer(
                    command_buffer,
                    staging.vk_handle(),
                    destination.buffer.vk_handle(),
                    regions,
                );
            }
        }
        !destination.infos.is_empty()
    });
}

/// Applies the same retention rules as the buffer pass to the image set,
/// recording an upload for each modified entry.
fn record_image_copies(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    data_to_copy: &mut DataToCopy,
    staging: &Buffer,
    offset: &mut vk::DeviceSize,
) -> Result<(), TransferError> {
    let device_id = device.device_id();
    let mut index = 0;
    while index < data_to_copy.image_infos.len() {
        let info = &data_to_copy.image_infos[index];
        if Arc::strong_count(info) == 1 {
            tracing::trace!("dropping image upload entry with no other holders");
            data_to_copy.image_infos.remove(index);
            continue;
        }
        if info.sync_modified_counts(device_id) {
            record_image_upload(device, command_buffer, staging, offset, info)?;
        }
        let is_static = info
            .data()
            .map_or(true, |data| data.properties().data_variance == DataVariance::Static);
        if is_static {
            data_to_copy.image_infos.remove(index);
        } else {
            index += 1;
        }
    }
    Ok(())
}

/// Stages one image payload, converting texels when the view format is wider
/// than the payload format, and records the buffer-to-image upload.
fn record_image_upload(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    staging: &Buffer,
    offset: &mut vk::DeviceSize,
    info: &ImageInfo,
) -> Result<(), TransferError> {
    let image_view = info.image_view();
    let Some(data) = image_view.image().data() else {
        return Ok(());
    };

    let mut properties = data.properties();
    let width = data.width();
    let height = data.height();
    let depth = data.depth();
    let mipmap_offsets = data.compute_mipmap_offsets();
    let mip_levels = compute_mip_levels(data, info.sampler());

    let source_offset = *offset;
    let source_format = properties.format;
    let target_format = image_view.format();
    let source_traits = format_traits(source_format);
    let target_traits = format_traits(target_format);

    let convertible = target_traits.size > 0
        && (source_format == target_format || source_traits.size > 0);
    if !convertible || source_traits.size > target_traits.size {
        return Err(TransferError::IncompatibleFormats {
            source_format,
            source_size: source_traits.size,
            target: target_format,
            target_size: target_traits.size,
        });
    }

    let staging_ptr = staging.mapped_ptr();
    if source_format == target_format || source_traits.size == target_traits.size {
        let bytes = data.read();
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                staging_ptr.add(*offset as usize),
                bytes.len(),
            );
        }
        *offset += bytes.len() as vk::DeviceSize;
    } else {
        let image_total_size = target_traits.size as vk::DeviceSize * data.value_count();
        properties.format = target_format;
        properties.stride = target_traits.size;

        let bytes = data.read();
        let staged = unsafe {
            std::slice::from_raw_parts_mut(
                staging_ptr.add(*offset as usize),
                image_total_size as usize,
            )
        };
        widen_texels(
            &bytes,
            source_traits.size as usize,
            target_traits.size as usize,
            &target_traits.default_value,
            staged,
        );
        *offset += image_total_size;
    }
    // keep the packing in step with the size pass
    *offset = align_up(*offset, STAGING_ALIGNMENT);

    transfer_image_data(
        device,
        command_buffer,
        staging,
        source_offset,
        image_view,
        info.image_layout(),
        &properties,
        width,
        height,
        depth,
        mip_levels,
        &mipmap_offsets,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataProperties;

    #[test]
    fn test_ring_starts_unset() {
        let ring = FrameRing::new(3);
        assert_eq!(ring.index(0), 3);
        assert_eq!(ring.index(1), 3);
        assert_eq!(ring.index(5), 3);
    }

    #[test]
    fn test_ring_first_advance() {
        let mut ring = FrameRing::new(3);
        ring.advance();
        assert_eq!(ring.index(0), 0);
        // history beyond the first frame is still unset
        assert_eq!(ring.index(1), 3);
        assert_eq!(ring.index(2), 3);
    }

    #[test]
    fn test_ring_is_a_shift_register() {
        let mut ring = FrameRing::new(3);
        let mut history = Vec::new();
        for frame in 0..7 {
            ring.advance();
            history.push(ring.index(0));
            assert_eq!(ring.index(0), frame % 3);
            for age in 1..3 {
                if age <= frame {
                    assert_eq!(ring.index(age), history[frame - age]);
                }
            }
        }
    }

    #[test]
    fn test_packed_size_aligns_between_entries() {
        assert_eq!(packed_size_and_regions([]), (0, 0));
        assert_eq!(packed_size_and_regions([100]), (100, 1));
        assert_eq!(packed_size_and_regions([100, 3, 5]), (112, 3));
        assert_eq!(packed_size_and_regions([1, 1, 1, 1]), (16, 4));
    }

    fn test_data(variance: DataVariance) -> Arc<Data> {
        Arc::new(Data::new(
            DataProperties {
                format: vk::Format::UNDEFINED,
                stride: 4,
                data_variance: variance,
            },
            25,
            1,
            1,
            1,
            vec![0; 100],
        ))
    }

    #[test]
    fn test_sync_modified_counts_triggers_once_per_change() {
        let data = test_data(DataVariance::Dynamic);
        let info = BufferInfo::detached(0, 100, data.clone());

        // fresh data is ahead of the empty cache
        assert!(info.sync_modified_counts(0));
        assert!(!info.sync_modified_counts(0));

        data.dirty();
        assert!(info.sync_modified_counts(0));
        assert!(!info.sync_modified_counts(0));
    }

    #[test]
    fn test_sync_modified_counts_is_per_device() {
        let data = test_data(DataVariance::Static);
        let info = BufferInfo::detached(0, 100, data);
        assert!(info.sync_modified_counts(0));
        // a second device has its own cache
        assert!(info.sync_modified_counts(1));
        assert!(!info.sync_modified_counts(0));
        assert!(!info.sync_modified_counts(1));
    }

    #[test]
    fn test_detached_entries_have_no_buffer() {
        let info = BufferInfo::detached(16, 84, test_data(DataVariance::Static));
        assert!(info.buffer().is_none());
        assert_eq!(info.offset(), 16);
        assert_eq!(info.range(), 84);
    }
}
