//! Buffer pipeline: allocate, write, copy to a readable buffer, map, decode.
//!
//! Mapped ranges are never released implicitly. [`map_buffer`] hands out a
//! [`MappedView`] whose [`MappedRange`] guard must be released before the
//! buffer is mapped again or used in a copy. Dropping the view without
//! releasing it leaves the buffer mapped, and the next map fails at the
//! device level.
//!
//! [`map_buffer`]: GpuResourceManager::map_buffer

use std::borrow::Cow;

use futures::future::join_all;

use crate::error::{GpuError, GpuResult};
use crate::registry::ResourceName;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferUsage, ElementEncoding, TypedData};

use super::{CommandEncoder, GpuResourceManager};

/// One source of a buffer copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Registered name of the source buffer.
    pub name: ResourceName,
    /// Byte offset into the source.
    pub offset: u64,
    /// Bytes to copy. `None` copies from `offset` to the end of the source.
    pub size: Option<u64>,
}

impl CopyRequest {
    pub fn new(name: impl Into<ResourceName>) -> Self {
        Self {
            name: name.into(),
            offset: 0,
            size: None,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Acquisition guard of a mapped buffer range.
///
/// The range stays mapped until [`release`](Self::release) is called.
/// Dropping the guard does not unmap.
#[derive(Debug)]
#[must_use = "the buffer stays mapped until the range is released"]
pub struct MappedRange {
    buffer: Buffer,
    offset: u64,
    size: u64,
}

impl MappedRange {
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Unmap the buffer.
    pub fn release(self) {
        log::trace!("Releasing mapped range of {:?}", self.buffer.label());
        self.buffer.gpu_handle().unmap();
    }
}

/// Decoded host copy of a mapped buffer range, plus its guard.
#[derive(Debug)]
#[must_use = "the buffer stays mapped until the view is released"]
pub struct MappedView {
    data: TypedData,
    range: MappedRange,
}

impl MappedView {
    pub fn data(&self) -> &TypedData {
        &self.data
    }

    pub fn encoding(&self) -> ElementEncoding {
        self.data.encoding()
    }

    pub fn range(&self) -> &MappedRange {
        &self.range
    }

    /// Unmap the buffer and keep the decoded data.
    pub fn release(self) -> TypedData {
        self.range.release();
        self.data
    }

    /// Split into the data and the still-held guard.
    pub fn into_parts(self) -> (TypedData, MappedRange) {
        (self.data, self.range)
    }
}

impl GpuResourceManager {
    /// Allocate an unregistered buffer.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::BufferTooLarge`] if `size` exceeds the device's
    /// max storage buffer binding size. The check applies to every usage and
    /// runs before the device is called.
    pub fn allocate_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
        label: Option<&str>,
    ) -> GpuResult<Buffer> {
        let session = self.session()?;
        let limit = session.limits().max_storage_buffer_binding_size;
        if size > limit {
            return Err(GpuError::BufferTooLarge { size, limit });
        }

        let descriptor = BufferDescriptor::new(size, usage).with_optional_label(label);
        session.backend().create_buffer(&descriptor)
    }

    /// Allocate a buffer labelled `name` and register it under `name`.
    pub fn allocate_and_register(
        &mut self,
        name: impl Into<ResourceName>,
        size: u64,
        usage: BufferUsage,
    ) -> GpuResult<Buffer> {
        let name = name.into();
        let buffer = self.allocate_buffer(size, usage, Some(name.as_str()))?;
        self.buffers.set(name, buffer.clone());
        Ok(buffer)
    }

    /// Allocate, register and fill a buffer with `data`.
    ///
    /// With `encode`, `data` is first converted element-wise and the buffer
    /// is sized to the converted data.
    pub fn create_registered_buffer(
        &mut self,
        name: impl Into<ResourceName>,
        data: &TypedData,
        usage: BufferUsage,
        encode: Option<ElementEncoding>,
    ) -> GpuResult<Buffer> {
        let data = encoded(data, encode);
        let buffer = self.allocate_and_register(name, data.byte_len(), usage)?;
        self.write_buffer_1to1(&buffer, &data, None)?;
        Ok(buffer)
    }

    /// Queue a write of elements `[data_offset, data_offset + data_size)` of
    /// `data` into `buffer` at byte `buffer_offset`.
    ///
    /// Offsets and sizes on the host side count elements of the (encoded)
    /// data; `data_size` defaults to the rest of the data. Bounds on the
    /// buffer side are enforced by the device.
    pub fn write_buffer(
        &self,
        buffer: &Buffer,
        buffer_offset: u64,
        data: &TypedData,
        data_offset: usize,
        data_size: Option<usize>,
        encode: Option<ElementEncoding>,
    ) -> GpuResult<()> {
        let backend = self.backend()?;
        let data = encoded(data, encode);
        let bytes = data.element_range_bytes(data_offset, data_size)?;
        log::debug!(
            "Writing {} bytes to {:?} at offset {}",
            bytes.len(),
            buffer.label(),
            buffer_offset
        );
        backend.write_buffer(buffer, buffer_offset, bytes)
    }

    /// [`write_buffer`](Self::write_buffer) into the buffer registered as `name`.
    pub fn write_registered_buffer(
        &self,
        name: &str,
        buffer_offset: u64,
        data: &TypedData,
        data_offset: usize,
        data_size: Option<usize>,
        encode: Option<ElementEncoding>,
    ) -> GpuResult<()> {
        let buffer = self.buffers.get(name)?;
        self.write_buffer(buffer, buffer_offset, data, data_offset, data_size, encode)
    }

    /// Write all of `data` at offset 0.
    pub fn write_buffer_1to1(
        &self,
        buffer: &Buffer,
        data: &TypedData,
        encode: Option<ElementEncoding>,
    ) -> GpuResult<()> {
        self.write_buffer(buffer, 0, data, 0, None, encode)
    }

    pub fn write_registered_buffer_1to1(
        &self,
        name: &str,
        data: &TypedData,
        encode: Option<ElementEncoding>,
    ) -> GpuResult<()> {
        self.write_registered_buffer(name, 0, data, 0, None, encode)
    }

    /// Copy a registered buffer into a new `<name>_copy` buffer that can be
    /// mapped for reading.
    ///
    /// The copy is recorded into `encoder`, or into a fresh encoder when
    /// none is given. The encoder is submitted and the queue awaited when no
    /// encoder was given or `flush_and_wait` is set. The destination is
    /// returned and never registered.
    pub async fn copy_buffer(
        &self,
        request: &CopyRequest,
        encoder: Option<&mut CommandEncoder>,
        flush_and_wait: bool,
    ) -> GpuResult<Buffer> {
        let source = self.buffers.get(request.name.as_str())?;
        let size = request
            .size
            .unwrap_or_else(|| source.size().saturating_sub(request.offset));
        let copy_name = request.name.copy_name();
        let destination =
            self.allocate_buffer(size, BufferUsage::READBACK, Some(copy_name.as_str()))?;

        log::debug!(
            "Copying {} bytes of '{}' at offset {} into '{}'",
            size,
            request.name,
            request.offset,
            copy_name
        );

        match encoder {
            Some(encoder) => {
                self.encode_copy(encoder, source, request.offset, &destination, size)?;
                if flush_and_wait {
                    self.flush_and_wait(encoder).await?;
                }
            }
            None => {
                let mut encoder = self.create_command_encoder(Some(copy_name.as_str()))?;
                self.encode_copy(&mut encoder, source, request.offset, &destination, size)?;
                self.flush_and_wait(&mut encoder).await?;
            }
        }

        Ok(destination)
    }

    /// Copy several registered buffers through one encoder and one
    /// submission.
    ///
    /// Only the last request flushes and waits. Results follow input order.
    /// An empty request list submits nothing.
    pub async fn copy_buffers(
        &self,
        requests: &[CopyRequest],
        encoder: Option<&mut CommandEncoder>,
    ) -> GpuResult<Vec<Buffer>> {
        let Some(last) = requests.len().checked_sub(1) else {
            return Ok(Vec::new());
        };

        let mut owned;
        let encoder = match encoder {
            Some(encoder) => encoder,
            None => {
                owned = self.create_command_encoder(Some("copy_buffers"))?;
                &mut owned
            }
        };

        let mut copies = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let copy = self
                .copy_buffer(request, Some(&mut *encoder), index == last)
                .await?;
            copies.push(copy);
        }
        Ok(copies)
    }

    /// Map `size` bytes of `buffer` at `offset` for reading and decode them.
    ///
    /// `offset` defaults to 0 and `size` to the rest of the buffer. The
    /// buffer must be mappable (`MAP_READ`) and not already mapped.
    pub async fn map_buffer(
        &self,
        buffer: &Buffer,
        decode: ElementEncoding,
        offset: Option<u64>,
        size: Option<u64>,
    ) -> GpuResult<MappedView> {
        let backend = self.backend()?;
        let offset = offset.unwrap_or(0);
        let size = size.unwrap_or_else(|| buffer.size().saturating_sub(offset));
        decode.check_byte_len(size)?;

        let bytes = backend.map_read(buffer, offset, size).await?;
        let range = MappedRange {
            buffer: buffer.clone(),
            offset,
            size,
        };
        let data = match decode.decode(&bytes) {
            Ok(data) => data,
            Err(e) => {
                range.release();
                return Err(e);
            }
        };
        Ok(MappedView { data, range })
    }

    /// Read back the registered buffer `name` through a transient copy.
    pub async fn read_buffer(&self, name: &str, decode: ElementEncoding) -> GpuResult<TypedData> {
        let copy = self.copy_buffer(&CopyRequest::new(name), None, false).await?;
        let view = self.map_buffer(&copy, decode, None, None).await?;
        Ok(view.release())
    }

    /// Read back `name` and log its contents.
    pub async fn log_buffer(&self, name: &str, decode: ElementEncoding) -> GpuResult<()> {
        let data = self.read_buffer(name, decode).await?;
        log::info!("{} ({}): {:?}", name, decode, data);
        Ok(())
    }

    /// Map several whole buffers concurrently.
    ///
    /// Either every buffer ends up mapped or none does: when one map fails,
    /// the ranges that did map are released and the first error is returned.
    pub async fn map_buffers(
        &self,
        buffers: &[(&Buffer, ElementEncoding)],
    ) -> GpuResult<Vec<MappedView>> {
        let results = join_all(
            buffers
                .iter()
                .map(|(buffer, decode)| self.map_buffer(buffer, *decode, None, None)),
        )
        .await;

        let mut views = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(view) => views.push(view),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                log::debug!("Releasing {} mapped views after a failed map", views.len());
                for view in views {
                    view.range.release();
                }
                Err(e)
            }
            None => Ok(views),
        }
    }

    /// Read back several buffers in one submission and log their contents.
    ///
    /// The copies are mapped concurrently.
    pub async fn log_buffers(&self, buffers: &[(&str, ElementEncoding)]) -> GpuResult<()> {
        let requests: Vec<_> = buffers
            .iter()
            .map(|(name, _)| CopyRequest::new(*name))
            .collect();
        let copies = self.copy_buffers(&requests, None).await?;

        let targets: Vec<_> = copies
            .iter()
            .zip(buffers)
            .map(|(copy, (_, decode))| (copy, *decode))
            .collect();
        let views = self.map_buffers(&targets).await?;

        for ((name, decode), view) in buffers.iter().zip(views) {
            log::info!("{} ({}): {:?}", name, decode, view.data());
            view.release();
        }
        Ok(())
    }

    fn encode_copy(
        &self,
        encoder: &mut CommandEncoder,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        size: u64,
    ) -> GpuResult<()> {
        self.backend()?.copy_buffer_to_buffer(
            encoder.raw_mut()?,
            source,
            source_offset,
            destination,
            0,
            size,
        )
    }

    async fn flush_and_wait(&self, encoder: &mut CommandEncoder) -> GpuResult<()> {
        self.submit(encoder)?;
        self.wait_for_completion().await
    }
}

fn encoded(data: &TypedData, encode: Option<ElementEncoding>) -> Cow<'_, TypedData> {
    match encode {
        Some(encoding) => data.encode(encoding),
        None => Cow::Borrowed(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuBackend;
    use crate::session::{DeviceOptions, DummyAdapterConfig};

    fn manager() -> GpuResourceManager {
        let mut manager = GpuResourceManager::new();
        pollster::block_on(manager.initialize(&DeviceOptions::dummy())).unwrap();
        manager
    }

    fn submissions(manager: &GpuResourceManager) -> u64 {
        match manager.backend().unwrap() {
            GpuBackend::Dummy(backend) => backend.submission_count(),
            #[allow(unreachable_patterns)]
            _ => unreachable!("dummy backend expected"),
        }
    }

    #[test]
    fn test_allocate_checks_limit_for_every_usage() {
        let mut manager = GpuResourceManager::new();
        let options = DeviceOptions::dummy().with_dummy_config(
            DummyAdapterConfig::default().with_max_storage_buffer_binding_size(64),
        );
        pollster::block_on(manager.initialize(&options)).unwrap();

        for usage in [BufferUsage::STORAGE, BufferUsage::UNIFORM, BufferUsage::READBACK] {
            assert!(manager.allocate_buffer(64, usage, None).is_ok());
            assert_eq!(
                manager.allocate_buffer(65, usage, None).unwrap_err(),
                GpuError::BufferTooLarge {
                    size: 65,
                    limit: 64
                }
            );
        }
    }

    #[test]
    fn test_create_registered_buffer_encodes() {
        let mut manager = manager();
        let buffer = manager
            .create_registered_buffer(
                "ints",
                &TypedData::from(vec![1.0f32, 2.0, 3.0]),
                BufferUsage::STORAGE | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
                Some(ElementEncoding::U32),
            )
            .unwrap();
        assert_eq!(buffer.size(), 12);
        assert_eq!(buffer.label(), Some("ints"));
        assert!(manager.buffers().contains("ints"));

        let data = pollster::block_on(manager.read_buffer("ints", ElementEncoding::U32)).unwrap();
        assert_eq!(data.as_u32(), Some(&[1u32, 2, 3][..]));
    }

    #[test]
    fn test_partial_write() {
        let mut manager = manager();
        manager
            .allocate_and_register(
                "partial",
                16,
                BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
            )
            .unwrap();

        let data = TypedData::from(vec![10u32, 20, 30, 40]);
        manager
            .write_registered_buffer("partial", 8, &data, 1, Some(2), None)
            .unwrap();

        let read = pollster::block_on(manager.read_buffer("partial", ElementEncoding::U32)).unwrap();
        assert_eq!(read.as_u32(), Some(&[0u32, 0, 20, 30][..]));

        assert_eq!(
            manager
                .write_registered_buffer("partial", 0, &data, 3, Some(2), None)
                .unwrap_err(),
            GpuError::DataRange {
                offset: 3,
                size: 2,
                len: 4
            }
        );
    }

    #[test]
    fn test_write_unregistered_name() {
        let manager = manager();
        let err = manager
            .write_registered_buffer_1to1("missing", &TypedData::from(vec![0u32]), None)
            .unwrap_err();
        assert!(matches!(err, GpuError::NotFound { .. }));
    }

    #[test]
    fn test_copy_buffer_with_offset_and_size() {
        let mut manager = manager();
        manager
            .create_registered_buffer(
                "source",
                &TypedData::from(vec![1u32, 2, 3, 4]),
                BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
                None,
            )
            .unwrap();

        let request = CopyRequest::new("source").with_offset(4).with_size(8);
        let copy = pollster::block_on(manager.copy_buffer(&request, None, false)).unwrap();
        assert_eq!(copy.label(), Some("source_copy"));
        assert_eq!(copy.size(), 8);
        assert!(!manager.buffers().contains("source_copy"));

        let view = pollster::block_on(manager.map_buffer(&copy, ElementEncoding::U32, None, None))
            .unwrap();
        assert_eq!(view.data().as_u32(), Some(&[2u32, 3][..]));
        view.release();
    }

    #[test]
    fn test_copy_into_caller_encoder_defers_submission() {
        let mut manager = manager();
        manager
            .allocate_and_register("deferred", 8, BufferUsage::COPY_SRC)
            .unwrap();

        let mut encoder = manager.create_command_encoder(None).unwrap();
        pollster::block_on(manager.copy_buffer(
            &CopyRequest::new("deferred"),
            Some(&mut encoder),
            false,
        ))
        .unwrap();
        assert_eq!(submissions(&manager), 0);
        assert!(!encoder.is_finished());

        manager.submit(&mut encoder).unwrap();
        assert_eq!(submissions(&manager), 1);
    }

    #[test]
    fn test_copy_buffers_empty() {
        let manager = manager();
        let copies = pollster::block_on(manager.copy_buffers(&[], None)).unwrap();
        assert!(copies.is_empty());
        assert_eq!(submissions(&manager), 0);
    }

    #[test]
    fn test_map_rejects_partial_elements() {
        let mut manager = manager();
        manager
            .allocate_and_register("odd", 12, BufferUsage::COPY_SRC)
            .unwrap();
        let copy =
            pollster::block_on(manager.copy_buffer(&CopyRequest::new("odd"), None, false)).unwrap();

        let err = pollster::block_on(manager.map_buffer(&copy, ElementEncoding::U32, Some(8), Some(2)))
            .unwrap_err();
        assert_eq!(
            err,
            GpuError::MisalignedData {
                len: 2,
                element_size: 4
            }
        );
        assert!(!copy.is_mapped());
    }

    #[test]
    fn test_into_parts_keeps_mapping() {
        let mut manager = manager();
        manager
            .allocate_and_register("parts", 8, BufferUsage::COPY_SRC)
            .unwrap();
        let copy =
            pollster::block_on(manager.copy_buffer(&CopyRequest::new("parts"), None, false))
                .unwrap();

        let view =
            pollster::block_on(manager.map_buffer(&copy, ElementEncoding::U8, None, None)).unwrap();
        let (data, range) = view.into_parts();
        assert_eq!(data.len(), 8);
        assert!(copy.is_mapped());
        assert_eq!(range.size(), 8);

        range.release();
        assert!(!copy.is_mapped());
    }

    #[test]
    fn test_log_buffers() {
        let mut manager = manager();
        manager
            .create_registered_buffer(
                "a",
                &TypedData::from(vec![1.5f32]),
                BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
                None,
            )
            .unwrap();
        manager
            .create_registered_buffer(
                "b",
                &TypedData::from(vec![7i32, -7]),
                BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
                None,
            )
            .unwrap();

        pollster::block_on(manager.log_buffers(&[
            ("a", ElementEncoding::F32),
            ("b", ElementEncoding::I32),
        ]))
        .unwrap();
        assert_eq!(submissions(&manager), 1);

        pollster::block_on(manager.log_buffer("a", ElementEncoding::F32)).unwrap();
        assert_eq!(submissions(&manager), 2);
    }

    #[test]
    fn test_map_buffers_releases_all_on_failure() {
        let mut manager = manager();
        for name in ["first", "second"] {
            manager
                .allocate_and_register(name, 8, BufferUsage::COPY_SRC)
                .unwrap();
        }
        let copies = pollster::block_on(manager.copy_buffers(
            &[CopyRequest::new("first"), CopyRequest::new("second")],
            None,
        ))
        .unwrap();

        let held =
            pollster::block_on(manager.map_buffer(&copies[1], ElementEncoding::U8, None, None))
                .unwrap();
        let err = pollster::block_on(manager.map_buffers(&[
            (&copies[0], ElementEncoding::U8),
            (&copies[1], ElementEncoding::U32),
        ]))
        .unwrap_err();
        assert!(matches!(err, GpuError::Device(_)));
        assert!(!copies[0].is_mapped());
        assert!(copies[1].is_mapped());
        held.release();

        let views = pollster::block_on(manager.map_buffers(&[
            (&copies[0], ElementEncoding::U8),
            (&copies[1], ElementEncoding::U32),
        ]))
        .unwrap();
        assert_eq!(views[1].data().as_u32(), Some(&[0u32, 0][..]));
        assert!(copies[0].is_mapped() && copies[1].is_mapped());
        for view in views {
            view.release();
        }
    }
}
