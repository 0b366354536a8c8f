//! Device session and its configuration.
//!
//! A [`DeviceSession`] is the one active device of a manager together with
//! the limits it reported at creation. Sessions are created from
//! [`DeviceOptions`], which select the backend and describe what the device
//! must support.

use std::str::FromStr;

use crate::backend::GpuBackend;
use crate::error::GpuResult;

/// Environment variable read by [`DeviceOptions::from_env`].
pub const BACKEND_ENV_VAR: &str = "REDLILIUM_GPU_BACKEND";

/// Device limits the manager depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest buffer range bindable as a storage buffer, in bytes.
    pub max_storage_buffer_binding_size: u64,
    /// Largest buffer the device can allocate, in bytes.
    pub max_buffer_size: u64,
}

impl Default for DeviceLimits {
    /// The WebGPU default limits.
    fn default() -> Self {
        Self {
            max_storage_buffer_binding_size: 128 << 20,
            max_buffer_size: 256 << 20,
        }
    }
}

impl DeviceLimits {
    /// Whether every limit in `self` is satisfied by `available`.
    pub fn fits_within(&self, available: &DeviceLimits) -> bool {
        self.max_storage_buffer_binding_size <= available.max_storage_buffer_binding_size
            && self.max_buffer_size <= available.max_buffer_size
    }
}

/// Kind of adapter a device was created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterType {
    Discrete,
    Integrated,
    /// CPU or host-memory implementation.
    Software,
    Unknown,
}

/// Description of the adapter backing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: AdapterType,
}

/// Adapter power preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// Try wgpu, fall back to the dummy backend.
    #[default]
    Auto,
    /// Host-memory device, always available.
    Dummy,
    /// wgpu device. Requires the `wgpu-backend` feature.
    Wgpu,
}

/// Error returned when parsing an unknown [`BackendType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown GPU backend '{0}' (expected auto, dummy or wgpu)")]
pub struct ParseBackendTypeError(String);

impl FromStr for BackendType {
    type Err = ParseBackendTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "dummy" => Ok(Self::Dummy),
            "wgpu" | "webgpu" => Ok(Self::Wgpu),
            _ => Err(ParseBackendTypeError(s.to_owned())),
        }
    }
}

/// Platform simulated by the dummy backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyAdapterConfig {
    /// When false, initialization fails with `UnsupportedPlatform`.
    pub platform_supported: bool,
    /// When false, initialization fails with `NoAdapter`.
    pub adapter_available: bool,
    /// Limits the simulated adapter reports.
    pub limits: DeviceLimits,
    pub adapter_name: String,
}

impl Default for DummyAdapterConfig {
    fn default() -> Self {
        Self {
            platform_supported: true,
            adapter_available: true,
            limits: DeviceLimits::default(),
            adapter_name: "Dummy Adapter".to_owned(),
        }
    }
}

impl DummyAdapterConfig {
    pub fn with_platform_supported(mut self, supported: bool) -> Self {
        self.platform_supported = supported;
        self
    }

    pub fn with_adapter_available(mut self, available: bool) -> Self {
        self.adapter_available = available;
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Shorthand for lowering only the storage buffer binding limit.
    pub fn with_max_storage_buffer_binding_size(mut self, size: u64) -> Self {
        self.limits.max_storage_buffer_binding_size = size;
        self
    }
}

/// Options for creating a device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    pub backend: BackendType,
    pub power_preference: PowerPreference,
    /// Limits the device must support. `None` takes the adapter's limits.
    pub required_limits: Option<DeviceLimits>,
    pub force_fallback_adapter: bool,
    /// Debug label for the device.
    pub label: String,
    /// Platform simulated when the dummy backend is selected.
    pub dummy: DummyAdapterConfig,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            power_preference: PowerPreference::default(),
            required_limits: None,
            force_fallback_adapter: false,
            label: "RedLilium GPU Device".to_owned(),
            dummy: DummyAdapterConfig::default(),
        }
    }
}

impl DeviceOptions {
    /// Options for the dummy backend with default settings.
    pub fn dummy() -> Self {
        Self::default().with_backend(BackendType::Dummy)
    }

    /// Default options with the backend taken from [`BACKEND_ENV_VAR`].
    ///
    /// Unset or unparsable values keep [`BackendType::Auto`].
    pub fn from_env() -> Self {
        let value = std::env::var(BACKEND_ENV_VAR).ok();
        Self::default().with_backend_override(value.as_deref())
    }

    /// Apply a backend override given as text, as read from the
    /// environment. `None` and unparsable values leave the backend as is.
    pub fn with_backend_override(mut self, value: Option<&str>) -> Self {
        if let Some(value) = value {
            match value.parse() {
                Ok(backend) => self.backend = backend,
                Err(e) => log::warn!("Ignoring {}: {}", BACKEND_ENV_VAR, e),
            }
        }
        self
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_power_preference(mut self, preference: PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    pub fn with_required_limits(mut self, limits: DeviceLimits) -> Self {
        self.required_limits = Some(limits);
        self
    }

    pub fn with_force_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_dummy_config(mut self, config: DummyAdapterConfig) -> Self {
        self.dummy = config;
        self
    }
}

/// The active device of a manager.
#[derive(Debug)]
pub struct DeviceSession {
    backend: GpuBackend,
    limits: DeviceLimits,
    adapter: AdapterInfo,
}

impl DeviceSession {
    /// Request an adapter, then a device, as described by `options`.
    ///
    /// No retry is attempted; callers re-invoke on failure.
    pub async fn request(options: &DeviceOptions) -> GpuResult<Self> {
        let backend = GpuBackend::request(options).await?;
        let limits = backend.limits();
        let adapter = backend.adapter_info();

        log::info!(
            "GPU session created: {} on '{}' ({:?})",
            backend.name(),
            adapter.name,
            adapter.device_type
        );
        log::info!(
            "  max storage buffer binding size: {} bytes",
            limits.max_storage_buffer_binding_size
        );

        Ok(Self {
            backend,
            limits,
            adapter,
        })
    }

    pub fn backend(&self) -> &GpuBackend {
        &self.backend
    }

    /// Limits reported by the device when the session was created.
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!("dummy".parse::<BackendType>(), Ok(BackendType::Dummy));
        assert_eq!(" WGPU ".parse::<BackendType>(), Ok(BackendType::Wgpu));
        assert_eq!("webgpu".parse::<BackendType>(), Ok(BackendType::Wgpu));
        assert_eq!("Auto".parse::<BackendType>(), Ok(BackendType::Auto));
        assert!("vulkan".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_backend_override() {
        let options = DeviceOptions::default().with_backend_override(Some("dummy"));
        assert_eq!(options.backend, BackendType::Dummy);

        let options = DeviceOptions::dummy().with_backend_override(Some("metal"));
        assert_eq!(options.backend, BackendType::Dummy);

        let options = DeviceOptions::dummy().with_backend_override(None);
        assert_eq!(options.backend, BackendType::Dummy);
    }

    #[test]
    fn test_from_env() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var(BACKEND_ENV_VAR, "dummy") };
        assert_eq!(DeviceOptions::from_env().backend, BackendType::Dummy);

        unsafe { std::env::set_var(BACKEND_ENV_VAR, "not-a-backend") };
        assert_eq!(DeviceOptions::from_env().backend, BackendType::Auto);

        unsafe { std::env::remove_var(BACKEND_ENV_VAR) };
        assert_eq!(DeviceOptions::from_env().backend, BackendType::Auto);
    }

    #[test]
    fn test_limits_fit() {
        let small = DeviceLimits {
            max_storage_buffer_binding_size: 16,
            max_buffer_size: 32,
        };
        assert!(small.fits_within(&DeviceLimits::default()));
        assert!(!DeviceLimits::default().fits_within(&small));
    }

    #[test]
    fn test_dummy_session() {
        let options = DeviceOptions::dummy()
            .with_dummy_config(DummyAdapterConfig::default().with_max_storage_buffer_binding_size(64));
        let session = pollster::block_on(DeviceSession::request(&options)).unwrap();
        assert_eq!(session.backend().name(), "Dummy Backend");
        assert_eq!(session.limits().max_storage_buffer_binding_size, 64);
        assert_eq!(session.adapter().device_type, AdapterType::Software);
    }

    #[test]
    fn test_dummy_session_failures() {
        let options = DeviceOptions::dummy()
            .with_dummy_config(DummyAdapterConfig::default().with_platform_supported(false));
        assert_eq!(
            pollster::block_on(DeviceSession::request(&options)).unwrap_err(),
            GpuError::UnsupportedPlatform
        );

        let options = DeviceOptions::dummy()
            .with_dummy_config(DummyAdapterConfig::default().with_adapter_available(false));
        assert!(matches!(
            pollster::block_on(DeviceSession::request(&options)),
            Err(GpuError::NoAdapter(_))
        ));
    }
}
