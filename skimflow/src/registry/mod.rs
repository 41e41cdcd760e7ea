//! Stage implementation registry.
//!
//! A [`Library`] maps implementation identifiers (e.g. `"core::Tag"`) to stage
//! factories. A [`LibraryCatalog`] holds every library the process is able to
//! load; a run "loads" the libraries it declares by name and resolves each
//! stage's implementation against them. No dynamic loading takes place.

use crate::errors::{LibraryLoadError, SkimflowError};
use crate::stages::{Stage, StageFactory};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A named set of stage implementations.
#[derive(Clone)]
pub struct Library {
    name: String,
    factories: HashMap<String, StageFactory>,
}

impl Library {
    /// Creates an empty library.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factories: HashMap::new(),
        }
    }

    /// Registers a stage factory under an implementation identifier.
    #[must_use]
    pub fn with_stage<F>(mut self, implementation: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Stage> + Send + Sync + 'static,
    {
        self.register(implementation, Arc::new(factory));
        self
    }

    /// Registers a stage factory, replacing any existing one.
    pub fn register(&mut self, implementation: impl Into<String>, factory: StageFactory) {
        self.factories.insert(implementation.into(), factory);
    }

    /// Returns the library name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks if the library provides an implementation.
    #[must_use]
    pub fn provides(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }

    /// Gets the factory for an implementation.
    #[must_use]
    pub fn factory(&self, implementation: &str) -> Option<StageFactory> {
        self.factories.get(implementation).cloned()
    }

    /// Lists implementation identifiers, sorted.
    #[must_use]
    pub fn implementations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("implementations", &self.implementations())
            .finish()
    }
}

/// Registry of loadable libraries.
#[derive(Default)]
pub struct LibraryCatalog {
    libraries: RwLock<HashMap<String, Arc<Library>>>,
}

impl LibraryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the built-in `libSkimCore.so`.
    #[must_use]
    pub fn builtin() -> Self {
        let catalog = Self::new();
        catalog.register(crate::stages::builtin::core_library());
        catalog
    }

    /// Registers a library, replacing any library of the same name.
    pub fn register(&self, library: Library) {
        let name = library.name().to_string();
        self.libraries.write().insert(name, Arc::new(library));
    }

    /// Lists registered library names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.libraries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Loads libraries by name, in the given order.
    ///
    /// # Errors
    ///
    /// Returns `LibraryLoadError` for the first name not in the catalog.
    pub fn load<S: AsRef<str>>(&self, names: &[S]) -> Result<LoadedLibraries, LibraryLoadError> {
        let libraries = self.libraries.read();
        let mut loaded: Vec<Arc<Library>> = Vec::with_capacity(names.len());

        for name in names {
            let name = name.as_ref();
            if loaded.iter().any(|lib| lib.name() == name) {
                continue;
            }
            let library = libraries.get(name).ok_or_else(|| {
                LibraryLoadError::new(
                    name,
                    format!("not registered (available: {})", Self::available(&libraries)),
                )
            })?;
            debug!(library = %name, implementations = library.factories.len(), "Loaded library");
            loaded.push(Arc::clone(library));
        }

        Ok(LoadedLibraries { libraries: loaded })
    }

    fn available(libraries: &HashMap<String, Arc<Library>>) -> String {
        let mut names: Vec<&str> = libraries.keys().map(String::as_str).collect();
        names.sort_unstable();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
}

impl fmt::Debug for LibraryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryCatalog")
            .field("libraries", &self.list())
            .finish()
    }
}

/// The libraries loaded for one run.
#[derive(Debug, Clone, Default)]
pub struct LoadedLibraries {
    libraries: Vec<Arc<Library>>,
}

impl LoadedLibraries {
    /// Returns the loaded library names in load order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.libraries.iter().map(|lib| lib.name()).collect()
    }

    /// Resolves a stage's implementation to a factory.
    ///
    /// Libraries are searched in load order; the first match wins.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedImplementation` if no loaded library provides it.
    pub fn resolve(&self, stage: &str, implementation: &str) -> Result<StageFactory, SkimflowError> {
        self.libraries
            .iter()
            .find_map(|lib| lib.factory(implementation))
            .ok_or_else(|| SkimflowError::UnresolvedImplementation {
                stage: stage.to_string(),
                implementation: implementation.to_string(),
            })
    }
}
