//! Buffer validation shared by every backend.
//!
//! These checks run before a command reaches the device so both backends
//! report the same failure for the same misuse.

use crate::error::{GpuError, GpuResult};
use crate::resources::Buffer;
use crate::session::DeviceLimits;
use crate::types::{BufferDescriptor, BufferUsage, COPY_BUFFER_ALIGNMENT, MAP_ALIGNMENT};

fn buffer_name(buffer: &Buffer) -> &str {
    buffer.label().unwrap_or("<unnamed>")
}

fn check_usage(buffer: &Buffer, required: BufferUsage, operation: &str) -> GpuResult<()> {
    if !buffer.usage().contains(required) {
        return Err(GpuError::Device(format!(
            "{operation}: buffer '{}' lacks {:?} usage",
            buffer_name(buffer),
            required
        )));
    }
    Ok(())
}

fn check_bounds(buffer: &Buffer, offset: u64, size: u64, operation: &str) -> GpuResult<()> {
    match offset.checked_add(size) {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(GpuError::Device(format!(
            "{operation}: range {offset}+{size} out of bounds for buffer '{}' of size {}",
            buffer_name(buffer),
            buffer.size()
        ))),
    }
}

fn check_alignment(value: u64, alignment: u64, what: &str, operation: &str) -> GpuResult<()> {
    if value % alignment != 0 {
        return Err(GpuError::Device(format!(
            "{operation}: {what} {value} is not a multiple of {alignment}"
        )));
    }
    Ok(())
}

fn check_unmapped(buffer: &Buffer, operation: &str) -> GpuResult<()> {
    if buffer.is_mapped() {
        return Err(GpuError::Device(format!(
            "{operation}: buffer '{}' is mapped",
            buffer_name(buffer)
        )));
    }
    Ok(())
}

/// Usage combinations and sizes a device refuses at creation.
///
/// Mappable buffers may only be copy endpoints: `MAP_READ` pairs with
/// `COPY_DST` and `MAP_WRITE` with `COPY_SRC`.
pub(super) fn validate_create_buffer(
    descriptor: &BufferDescriptor,
    limits: &DeviceLimits,
) -> GpuResult<()> {
    const OP: &str = "create_buffer";
    let name = descriptor.label.as_deref().unwrap_or("<unnamed>");
    if descriptor.usage.is_empty() {
        return Err(GpuError::Device(format!("{OP}: buffer '{name}' has no usage")));
    }
    let read_mismatch = descriptor.usage.contains(BufferUsage::MAP_READ)
        && !(BufferUsage::MAP_READ | BufferUsage::COPY_DST).contains(descriptor.usage);
    let write_mismatch = descriptor.usage.contains(BufferUsage::MAP_WRITE)
        && !(BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC).contains(descriptor.usage);
    if read_mismatch || write_mismatch {
        return Err(GpuError::Device(format!(
            "{OP}: usage {:?} of buffer '{name}' combines mapping with other usages",
            descriptor.usage
        )));
    }
    if descriptor.size > limits.max_buffer_size {
        return Err(GpuError::Device(format!(
            "{OP}: buffer '{name}' size {} exceeds max buffer size {}",
            descriptor.size, limits.max_buffer_size
        )));
    }
    Ok(())
}

pub(super) fn validate_write(buffer: &Buffer, offset: u64, size: u64) -> GpuResult<()> {
    const OP: &str = "write_buffer";
    check_usage(buffer, BufferUsage::COPY_DST, OP)?;
    check_alignment(offset, COPY_BUFFER_ALIGNMENT, "offset", OP)?;
    check_alignment(size, COPY_BUFFER_ALIGNMENT, "size", OP)?;
    check_bounds(buffer, offset, size, OP)?;
    check_unmapped(buffer, OP)
}

pub(super) fn validate_copy(
    source: &Buffer,
    source_offset: u64,
    destination: &Buffer,
    destination_offset: u64,
    size: u64,
) -> GpuResult<()> {
    const OP: &str = "copy_buffer_to_buffer";
    if source.same_buffer(destination) {
        return Err(GpuError::Device(format!(
            "{OP}: source and destination are the same buffer '{}'",
            buffer_name(source)
        )));
    }
    check_usage(source, BufferUsage::COPY_SRC, OP)?;
    check_usage(destination, BufferUsage::COPY_DST, OP)?;
    check_alignment(source_offset, COPY_BUFFER_ALIGNMENT, "source offset", OP)?;
    check_alignment(destination_offset, COPY_BUFFER_ALIGNMENT, "destination offset", OP)?;
    check_alignment(size, COPY_BUFFER_ALIGNMENT, "size", OP)?;
    check_bounds(source, source_offset, size, OP)?;
    check_bounds(destination, destination_offset, size, OP)?;
    check_unmapped(source, OP)?;
    check_unmapped(destination, OP)
}

pub(super) fn validate_map_read(buffer: &Buffer, offset: u64, size: u64) -> GpuResult<()> {
    const OP: &str = "map_read";
    check_usage(buffer, BufferUsage::MAP_READ, OP)?;
    check_alignment(offset, MAP_ALIGNMENT, "offset", OP)?;
    if size == 0 {
        return Err(GpuError::Device(format!(
            "{OP}: empty range of buffer '{}'",
            buffer_name(buffer)
        )));
    }
    check_alignment(size, COPY_BUFFER_ALIGNMENT, "size", OP)?;
    check_bounds(buffer, offset, size, OP)?;
    if buffer.is_mapped() {
        return Err(GpuError::Device(format!(
            "{OP}: buffer '{}' is already mapped",
            buffer_name(buffer)
        )));
    }
    Ok(())
}
