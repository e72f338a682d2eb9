//! Module registry for mapping type identifiers to constructors.
//!
//! Registration happens once at startup through [`ModuleRegistryBuilder`].
//! [`ModuleRegistryBuilder::build`] freezes it into a read-only
//! [`ModuleRegistry`], so no module can be created before registration is
//! complete and nothing can be registered afterwards.

use std::collections::BTreeMap;

use crate::{
    module::{Module, ModuleSpecification},
    modules, EngineError, Result,
};

/// Constructor stored per module type.
pub type ModuleConstructor = fn() -> Box<dyn Module>;

#[derive(Clone)]
struct RegistryEntry {
    constructor: ModuleConstructor,
    specification: ModuleSpecification,
}

/// Mutable registration phase of the registry.
#[derive(Default)]
pub struct ModuleRegistryBuilder {
    entries: BTreeMap<String, RegistryEntry>,
}

impl ModuleRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-populated with every built-in module.
    pub fn with_builtin_modules() -> Result<Self> {
        let mut builder = Self::new();
        modules::register_builtin(&mut builder)?;
        Ok(builder)
    }

    /// Registers `constructor` under `identifier`.
    ///
    /// A throwaway instance is created to capture the module's
    /// self-description; its identifier must match and its port specs must
    /// parse.
    pub fn register(
        &mut self,
        identifier: &str,
        constructor: ModuleConstructor,
    ) -> Result<&mut Self> {
        if self.entries.contains_key(identifier) {
            return Err(EngineError::DuplicateModuleType(identifier.to_string()));
        }

        let specification = constructor().module_info();
        if specification.identifier != identifier {
            return Err(EngineError::InvalidSpec(format!(
                "module registered as `{identifier}` describes itself as `{}`",
                specification.identifier
            )));
        }
        specification.in_params()?;
        specification.out_params()?;

        self.entries.insert(
            identifier.to_string(),
            RegistryEntry {
                constructor,
                specification,
            },
        );
        Ok(self)
    }

    /// Registers a module type using its own identifier.
    pub fn register_module<M: Module + Default + 'static>(&mut self) -> Result<&mut Self> {
        let identifier = M::default().module_info().identifier;
        self.register(&identifier, create_module::<M>)
    }

    pub fn build(self) -> ModuleRegistry {
        tracing::debug!(modules = self.entries.len(), "module registry sealed");
        ModuleRegistry {
            entries: self.entries,
        }
    }
}

/// Read-only catalog of available module types.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl ModuleRegistry {
    /// Registry holding every built-in module.
    pub fn builtin() -> Result<Self> {
        Ok(ModuleRegistryBuilder::with_builtin_modules()?.build())
    }

    /// Creates a fresh, undeclared instance of `identifier`.
    pub fn create(&self, identifier: &str) -> Result<Box<dyn Module>> {
        self.entries
            .get(identifier)
            .map(|entry| (entry.constructor)())
            .ok_or_else(|| EngineError::UnknownModuleType(identifier.to_string()))
    }

    pub fn specification(&self, identifier: &str) -> Option<&ModuleSpecification> {
        self.entries.get(identifier).map(|entry| &entry.specification)
    }

    /// Identifiers under a taxonomy prefix, in sorted order.
    ///
    /// The prefix matches whole segments: `maths;conv` does not match
    /// `maths;converters;float_to_float3`. An empty prefix lists everything.
    /// The returned iterator is lazy and can be cloned to restart it.
    pub fn list<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + Clone + 'a {
        let prefix = prefix.trim_end_matches(';');
        self.entries
            .keys()
            .map(String::as_str)
            .filter(move |identifier| matches_prefix(identifier, prefix))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.entries.len())
            .finish()
    }
}

fn matches_prefix(identifier: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    identifier
        .strip_prefix(prefix)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with(';'))
}

fn create_module<M: Module + Default + 'static>() -> Box<dyn Module> {
    Box::new(M::default())
}
