//! Command encoders, queue submission and completion barriers.

use web_time::Instant;

use crate::backend::GpuCommandEncoder;
use crate::error::{GpuError, GpuResult};

use super::GpuResourceManager;

/// Records device commands until it is submitted.
///
/// An encoder can be submitted once. Afterwards every use fails with
/// [`GpuError::EncoderFinished`].
#[derive(Debug)]
pub struct CommandEncoder {
    label: Option<String>,
    raw: Option<GpuCommandEncoder>,
}

impl CommandEncoder {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether the encoder was already submitted.
    pub fn is_finished(&self) -> bool {
        self.raw.is_none()
    }

    pub(crate) fn raw_mut(&mut self) -> GpuResult<&mut GpuCommandEncoder> {
        self.raw.as_mut().ok_or(GpuError::EncoderFinished)
    }

    fn finish(&mut self) -> GpuResult<GpuCommandEncoder> {
        self.raw.take().ok_or(GpuError::EncoderFinished)
    }
}

impl GpuResourceManager {
    /// Create a command encoder on the active device.
    pub fn create_command_encoder(&self, label: Option<&str>) -> GpuResult<CommandEncoder> {
        let raw = self.backend()?.create_command_encoder(label);
        Ok(CommandEncoder {
            label: label.map(str::to_owned),
            raw: Some(raw),
        })
    }

    /// Finish `encoder` and submit it to the queue.
    ///
    /// Returns the time captured immediately before submission, for
    /// caller-side timing.
    pub fn submit(&self, encoder: &mut CommandEncoder) -> GpuResult<Instant> {
        let backend = self.backend()?;
        let raw = encoder.finish()?;
        log::debug!("Submitting command encoder {:?}", encoder.label);
        let started = Instant::now();
        backend.submit(raw)?;
        Ok(started)
    }

    /// Wait until every submission made so far has finished executing.
    ///
    /// This is the barrier between device-side writes and host reads of
    /// mapped memory.
    pub async fn wait_for_completion(&self) -> GpuResult<()> {
        self.backend()?.wait_idle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DeviceOptions;

    fn manager() -> GpuResourceManager {
        let mut manager = GpuResourceManager::new();
        pollster::block_on(manager.initialize(&DeviceOptions::dummy())).unwrap();
        manager
    }

    #[test]
    fn test_submit_once() {
        let manager = manager();
        let mut encoder = manager.create_command_encoder(Some("once")).unwrap();
        let before = Instant::now();
        let started = manager.submit(&mut encoder).unwrap();
        assert!(started >= before);
        assert!(encoder.is_finished());
        assert_eq!(
            manager.submit(&mut encoder).unwrap_err(),
            GpuError::EncoderFinished
        );
    }

    #[test]
    fn test_encoder_requires_session() {
        let manager = GpuResourceManager::new();
        assert_eq!(
            manager.create_command_encoder(None).unwrap_err(),
            GpuError::NotInitialized
        );
        assert_eq!(
            pollster::block_on(manager.wait_for_completion()).unwrap_err(),
            GpuError::NotInitialized
        );
    }
}
