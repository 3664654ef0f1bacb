//! Application-side data payloads.
//!
//! A [`Data`] object owns the CPU copy of a buffer's or image's contents and
//! a monotonically increasing modification count. Transfer bookkeeping caches
//! the last-seen count per device; a data object whose count has moved past
//! the cache is re-uploaded on the next transfer cycle.

use std::sync::{
    RwLock, RwLockReadGuard, RwLockWriteGuard,
    atomic::{AtomicU64, Ordering},
};

use ash::vk;
use serde::{Deserialize, Serialize};

/// How often the contents of a data object are expected to change.
///
/// `Static` entries are uploaded once and then dropped from the transfer
/// ledger; `Dynamic` entries stay and are re-uploaded whenever marked dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataVariance {
    #[default]
    Static,
    Dynamic,
}

/// Layout description of a data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataProperties {
    /// Texel or element format. For plain buffer data this may be
    /// `vk::Format::UNDEFINED`; only the stride is consulted.
    pub format: vk::Format,
    /// Bytes per value.
    pub stride: u32,
    pub data_variance: DataVariance,
}

/// A CPU-side payload with extent, layout and a modification count.
///
/// Values are laid out tightly, mip level after mip level. Writers mutate the
/// bytes through [`write`](Data::write) and then call [`dirty`](Data::dirty);
/// the length of the byte vector must never change.
///
/// The modification count starts at 1, so a freshly created payload is always
/// ahead of an empty per-device cache and gets uploaded on its first frame.
pub struct Data {
    bytes: RwLock<Vec<u8>>,
    properties: DataProperties,
    width: u32,
    height: u32,
    depth: u32,
    mip_levels: u32,
    modification_count: AtomicU64,
}

impl Data {
    /// Creates a payload from raw bytes.
    ///
    /// `bytes` must hold exactly `value_count × stride` bytes for the given
    /// extent and mip level count.
    pub fn new(
        properties: DataProperties,
        width: u32,
        height: u32,
        depth: u32,
        mip_levels: u32,
        bytes: Vec<u8>,
    ) -> Self {
        let data = Self {
            bytes: RwLock::new(bytes),
            properties,
            width,
            height,
            depth,
            mip_levels: mip_levels.max(1),
            modification_count: AtomicU64::new(1),
        };
        assert_eq!(
            data.bytes.read().unwrap().len() as u64,
            data.value_count() * properties.stride as u64,
            "byte length does not match extent, mip levels and stride"
        );
        data
    }

    /// Creates a payload from a typed slice. `T`'s size must equal the
    /// declared stride.
    pub fn from_values<T: bytemuck::Pod>(
        properties: DataProperties,
        width: u32,
        height: u32,
        depth: u32,
        values: &[T],
    ) -> Self {
        assert_eq!(std::mem::size_of::<T>() as u32, properties.stride);
        Self::new(
            properties,
            width,
            height,
            depth,
            1,
            bytemuck::cast_slice(values).to_vec(),
        )
    }

    pub fn properties(&self) -> DataProperties {
        self.properties
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn depth(&self) -> u32 {
        self.depth
    }
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Number of values across all stored mip levels.
    pub fn value_count(&self) -> u64 {
        let (mut w, mut h, mut d) = (self.width, self.height, self.depth);
        let mut count = 0u64;
        for _ in 0..self.mip_levels {
            count += w as u64 * h as u64 * d as u64;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            d = (d / 2).max(1);
        }
        count
    }

    /// Total payload size in bytes.
    pub fn data_size(&self) -> u64 {
        self.bytes.read().unwrap().len() as u64
    }

    /// Offset of each mip level from the start of the payload, in *values*.
    ///
    /// Value offsets stay correct when a format conversion changes the
    /// stride; multiply by the stride in effect to get byte offsets.
    pub fn compute_mipmap_offsets(&self) -> Vec<u64> {
        let (mut w, mut h, mut d) = (self.width, self.height, self.depth);
        let mut offsets = Vec::with_capacity(self.mip_levels as usize);
        let mut offset = 0u64;
        for _ in 0..self.mip_levels {
            offsets.push(offset);
            offset += w as u64 * h as u64 * d as u64;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            d = (d / 2).max(1);
        }
        offsets
    }

    /// Current modification count.
    pub fn modification_count(&self) -> u64 {
        self.modification_count.load(Ordering::Acquire)
    }

    /// Marks the payload as modified. Every tracking cache behind the new
    /// count re-uploads on its next transfer cycle.
    pub fn dirty(&self) {
        self.modification_count.fetch_add(1, Ordering::Release);
    }

    /// Read access to the payload bytes.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.bytes.read().unwrap()
    }

    /// Write access to the payload bytes. Call [`dirty`](Data::dirty) after
    /// releasing the guard; the vector's length must not be changed.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.bytes.write().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba8(variance: DataVariance) -> DataProperties {
        DataProperties {
            format: vk::Format::R8G8B8A8_UNORM,
            stride: 4,
            data_variance: variance,
        }
    }

    #[test]
    fn test_value_count_with_mipmaps() {
        let data = Data::new(
            rgba8(DataVariance::Static),
            4,
            4,
            1,
            3,
            vec![0; (16 + 4 + 1) * 4],
        );
        assert_eq!(data.value_count(), 21);
        assert_eq!(data.compute_mipmap_offsets(), vec![0, 16, 20]);
        assert_eq!(data.data_size(), 84);
    }

    #[test]
    fn test_dirty_advances_count() {
        let data = Data::from_values(rgba8(DataVariance::Dynamic), 2, 1, 1, &[0u32, 1u32]);
        assert_eq!(data.modification_count(), 1);
        data.write()[0] = 0xab;
        data.dirty();
        assert_eq!(data.modification_count(), 2);
        assert_eq!(data.read()[0], 0xab);
    }

    #[test]
    #[should_panic(expected = "byte length does not match")]
    fn test_mismatched_length_rejected() {
        Data::new(rgba8(DataVariance::Static), 2, 2, 1, 1, vec![0; 15]);
    }
}
