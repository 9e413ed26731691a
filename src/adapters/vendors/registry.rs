//! Vendor registry and factory.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::ports::{AgentVendor, VendorFactory};

use super::claude_code::ClaudeCodeVendor;
use super::shell::ShellVendor;

type VendorConstructor = Arc<dyn Fn() -> Box<dyn AgentVendor> + Send + Sync>;

/// Registry of available agent vendors.
///
/// Ships with `claude-code` and `shell`; further vendors register by name
/// without touching the orchestrator or the sandbox runner.
#[derive(Clone)]
pub struct VendorRegistry {
    vendors: BTreeMap<&'static str, VendorConstructor>,
}

impl VendorRegistry {
    /// Registry holding the built-in vendors.
    pub fn new() -> Self {
        let mut registry = Self {
            vendors: BTreeMap::new(),
        };
        registry.register("claude-code", || Box::new(ClaudeCodeVendor::new()));
        registry.register("shell", || Box::new(ShellVendor::new()));
        registry
    }

    /// Register (or replace) a vendor constructor.
    pub fn register<F>(&mut self, name: &'static str, constructor: F)
    where
        F: Fn() -> Box<dyn AgentVendor> + Send + Sync + 'static,
    {
        self.vendors.insert(name, Arc::new(constructor));
    }
}

impl Default for VendorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("vendors", &self.vendors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VendorFactory for VendorRegistry {
    fn create(&self, name: &str) -> Option<Box<dyn AgentVendor>> {
        self.vendors.get(name).map(|constructor| constructor())
    }

    fn available_vendors(&self) -> Vec<&'static str> {
        self.vendors.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;

    #[test]
    fn test_builtin_vendors() {
        let registry = VendorRegistry::new();
        assert_eq!(registry.available_vendors(), vec!["claude-code", "shell"]);
        assert_eq!(registry.create("shell").map(|v| v.name()), Some("shell"));
    }

    #[test]
    fn test_unknown_vendor() {
        let registry = VendorRegistry::new();
        assert!(registry.create("cursor").is_none());
        assert!(matches!(registry.resolve("cursor"), Err(DomainError::UnknownVendor(name)) if name == "cursor"));
    }

    #[test]
    fn test_register_custom_vendor() {
        let mut registry = VendorRegistry::new();
        registry.register("alias", || Box::new(ShellVendor::new()));
        assert!(registry.available_vendors().contains(&"alias"));
        assert!(registry.resolve("alias").is_ok());
    }
}
