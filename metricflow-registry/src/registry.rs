//! Registry of module types indexed by category and type name

use std::collections::BTreeMap;

use metricflow_interfaces::ModuleCategory;

use crate::descriptor::ModuleDescriptor;
use crate::error::{RegistryError, RegistryResult};

/// Module types available to flows
///
/// The registry is populated before any flow is built and is read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    modules: BTreeMap<ModuleCategory, BTreeMap<String, ModuleDescriptor>>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one descriptor
    ///
    /// Contract violations and duplicate type names within a category are errors.
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> RegistryResult<()> {
        let warnings =
            descriptor
                .check_contract()
                .map_err(|reason| RegistryError::ContractViolation {
                    name: descriptor.type_name().to_string(),
                    reason,
                })?;

        for warning in warnings {
            tracing::warn!(target: "module_registry", "{}", warning);
        }

        let category = descriptor.category();
        let name = descriptor.type_name().to_string();
        let modules = self.modules.entry(category).or_default();

        if modules.contains_key(&name) {
            return Err(RegistryError::DuplicateType { category, name });
        }

        tracing::debug!(
            target: "module_registry",
            module = %name,
            category = %category,
            "Module registered"
        );
        modules.insert(name, descriptor);
        Ok(())
    }

    /// Register every descriptor that satisfies its contract
    ///
    /// Descriptors violating the contract are skipped with an error log. A duplicate type
    /// name aborts discovery. Returns the number of registered descriptors.
    pub fn discover<I>(&mut self, descriptors: I) -> RegistryResult<usize>
    where
        I: IntoIterator<Item = ModuleDescriptor>,
    {
        let mut registered = 0;
        for descriptor in descriptors {
            match self.register(descriptor) {
                Ok(()) => registered += 1,
                Err(RegistryError::ContractViolation { name, reason }) => {
                    tracing::error!(
                        target: "module_registry",
                        module = %name,
                        "Not loading module: {}",
                        reason
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            target: "module_registry",
            "Successfully initialized {} modules.",
            registered
        );
        Ok(registered)
    }

    /// Build a registry from descriptors
    pub fn with_modules<I>(descriptors: I) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = ModuleDescriptor>,
    {
        let mut registry = Self::new();
        registry.discover(descriptors)?;
        Ok(registry)
    }

    /// Look up a descriptor
    pub fn get(&self, category: ModuleCategory, name: &str) -> RegistryResult<&ModuleDescriptor> {
        self.modules
            .get(&category)
            .and_then(|modules| modules.get(name))
            .ok_or_else(|| RegistryError::UnknownModule {
                category,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, category: ModuleCategory, name: &str) -> bool {
        self.get(category, name).is_ok()
    }

    /// Registered type names of a category, sorted
    pub fn type_names(&self, category: ModuleCategory) -> Vec<&str> {
        self.modules
            .get(&category)
            .map(|modules| modules.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Total number of registered descriptors
    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
