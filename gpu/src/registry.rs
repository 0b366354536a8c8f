//! Named resource registries.
//!
//! Each resource kind gets its own [`Registry`], so a buffer name can never
//! resolve to a shader. Registries are plain lookup tables: a later `set`
//! overwrites an earlier one, nothing is ever evicted, and no reference
//! counting happens here. The device owns the underlying memory.

use std::borrow::Borrow;
use std::collections::HashMap;

use crate::error::{GpuError, GpuResult};

/// Kind of resource stored in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Shader,
    Pipeline,
    BindGroup,
    BindGroupLayout,
}

impl ResourceKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Shader => "shader",
            Self::Pipeline => "pipeline",
            Self::BindGroup => "bind group",
            Self::BindGroupLayout => "bind group layout",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller-chosen name of a registered resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name given to the readback copy of this resource.
    pub fn copy_name(&self) -> ResourceName {
        Self(format!("{}_copy", self.0))
    }
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ResourceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ResourceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&ResourceName> for ResourceName {
    fn from(name: &ResourceName) -> Self {
        name.clone()
    }
}

/// Name to handle map for one resource kind.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    kind: ResourceKind,
    entries: HashMap<ResourceName, T>,
}

impl<T> Registry<T> {
    /// Create an empty registry for `kind`.
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Kind of resource this registry holds.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Store `value` under `name`, returning the handle it replaced.
    pub fn set(&mut self, name: impl Into<ResourceName>, value: T) -> Option<T> {
        let name = name.into();
        log::debug!("Registry: set {} '{}'", self.kind, name);
        self.entries.insert(name, value)
    }

    /// Look up `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NotFound`] if nothing was registered under `name`.
    pub fn get(&self, name: &str) -> GpuResult<&T> {
        self.entries.get(name).ok_or_else(|| GpuError::NotFound {
            kind: self.kind,
            name: name.into(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &ResourceName> {
        self.entries.keys()
    }
}

impl<T> Registry<Vec<T>> {
    /// Append `item` to the list stored under `name`, creating the list on
    /// first use.
    pub fn append(&mut self, name: impl Into<ResourceName>, item: T) {
        let name = name.into();
        log::debug!("Registry: append {} to '{}'", self.kind, name);
        self.entries.entry(name).or_default().push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites() {
        let mut registry = Registry::new(ResourceKind::Buffer);
        assert_eq!(registry.set("a", 1), None);
        assert_eq!(registry.set("a", 2), Some(1));
        assert_eq!(registry.get("a"), Ok(&2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let registry: Registry<u32> = Registry::new(ResourceKind::Shader);
        assert_eq!(
            registry.get("missing"),
            Err(GpuError::NotFound {
                kind: ResourceKind::Shader,
                name: "missing".into(),
            })
        );
    }

    #[test]
    fn test_append() {
        let mut registry: Registry<Vec<&str>> = Registry::new(ResourceKind::BindGroup);
        registry.append("groups", "first");
        registry.append("groups", "second");
        assert_eq!(registry.get("groups").unwrap(), &vec!["first", "second"]);
        assert!(registry.contains("groups"));
        assert!(!registry.contains("other"));
    }

    #[test]
    fn test_names_and_kind() {
        let mut registry = Registry::new(ResourceKind::Pipeline);
        registry.set("b", ());
        registry.set("a", ());
        registry.set("b", ());
        assert_eq!(registry.kind(), ResourceKind::Pipeline);

        let mut names: Vec<_> = registry.names().map(ResourceName::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_copy_name() {
        assert_eq!(ResourceName::from("weights").copy_name().as_str(), "weights_copy");
    }
}
