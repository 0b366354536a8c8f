//! Common types and descriptors for GPU resources.
//!
//! This module contains buffer usage flags, descriptors and the element
//! encodings used to move host data in and out of buffers.

mod buffer;
mod encoding;

pub use buffer::{BufferDescriptor, BufferUsage, COPY_BUFFER_ALIGNMENT, MAP_ALIGNMENT};
pub use encoding::{ElementEncoding, TypedData};
