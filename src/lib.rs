//! # Scoria
//!
//! Asynchronous CPU→GPU data transfer and polytope-based picking for
//! Vulkan scene-graph runtimes, built on [`ash`].
//!
//! ## Transfer
//!
//! [`TransferTask`](transfer::TransferTask) moves application-side
//! [`Data`] payloads into device-local buffers and images, coalescing each
//! frame's uploads into a single staging allocation and one transfer-queue
//! submission. Staging memory is double/triple buffered across a ring of
//! frame slots; the renderer chains on the published completion semaphore.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use scoria::{Device, Allocator, Queue, transfer::{TransferTask, BufferInfo}};
//! # fn demo(device: Device, allocator: Allocator, queue: Arc<Queue>,
//! #         buffer_info: Arc<BufferInfo>) {
//! let task = TransferTask::new(device, allocator, queue, 3);
//! task.assign_buffer_infos([buffer_info]);
//!
//! // per frame:
//! task.advance();
//! task.transfer_data().unwrap();
//! let transfer_finished = task.current_transfer_completed_semaphore();
//! // make the render submission wait on `transfer_finished`
//! # }
//! ```
//!
//! Payloads carry a modification count ([`Data::dirty`]); the task caches the
//! last-uploaded count per device and re-uploads only what changed. Static
//! payloads leave the ledger after their first upload, dynamic payloads stay
//! resident, and entries nobody else holds anymore are reclaimed silently.
//!
//! ## Picking
//!
//! [`PolytopeIntersector`](intersector::PolytopeIntersector) walks a scene
//! graph under a transform stack and tests bounding spheres and triangle
//! draws against a convex region — typically the sub-frustum of a screen
//! rectangle built by
//! [`Polytope::from_camera_rect`](polytope::Polytope::from_camera_rect).

mod alloc;
pub mod buffer;
pub mod command;
pub mod data;
pub mod device;
pub mod image;
pub mod intersector;
pub mod polytope;
mod queue;
mod sampler;
pub mod sync;
pub mod transfer;
pub mod utils;

pub use alloc::Allocator;
pub use data::{Data, DataProperties, DataVariance};
pub use device::{Device, HasDevice};
pub use queue::Queue;
pub use sampler::Sampler;

pub use ash;

pub mod prelude {
    pub use crate::{
        Allocator, Data, DataProperties, DataVariance, Device, HasDevice, Queue, Sampler, ash,
        ash::vk,
        buffer::Buffer,
        image::{Image, ImageView},
        intersector::PolytopeIntersector,
        polytope::{Camera, Plane, Polytope, Sphere},
        sync::Semaphore,
        transfer::{BufferInfo, DynamicData, ImageInfo, TransferTask},
        utils::AsVkHandle,
    };
}
