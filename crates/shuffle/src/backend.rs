use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use nexec_common::Result;
use tracing::debug;

use crate::config::ShuffleConfig;
use crate::local::LocalPersistentShuffle;

/// Factory contract for pluggable shuffle backends.
///
/// Conversion only needs a backend to validate its configuration and report
/// the partition count; reading and writing shuffle data is the runtime's job.
pub trait ShuffleBackendFactory: Send + Sync {
    /// Stable backend name selected by `shuffle_name` in batch conversions.
    fn name(&self) -> &str;

    /// Validate `config` and return the total partition count it declares.
    ///
    /// The default only checks `numPartitions`; backends with required keys
    /// of their own override this.
    fn num_partitions(&self, config: &ShuffleConfig) -> Result<u32> {
        config.num_partitions()
    }
}

/// Registry for shuffle backend factories.
///
/// Registration is expected to happen at worker start-up; conversions only
/// take the read lock.
#[derive(Default)]
pub struct ShuffleBackendRegistry {
    inner: RwLock<HashMap<String, Arc<dyn ShuffleBackendFactory>>>,
}

impl std::fmt::Debug for ShuffleBackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShuffleBackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

impl ShuffleBackendRegistry {
    /// Registry with the reference `local-persistent` backend registered.
    pub fn with_defaults() -> Self {
        let registry = Self::default();
        registry.register(Arc::new(LocalPersistentShuffle));
        registry
    }

    /// Register or replace a backend.
    ///
    /// Returns `true` when an existing backend with the same name was replaced.
    pub fn register(&self, factory: Arc<dyn ShuffleBackendFactory>) -> bool {
        let name = factory.name().to_string();
        debug!(backend = %name, "registering shuffle backend");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, factory)
            .is_some()
    }

    /// Deregister a backend by name.
    ///
    /// Returns `true` when an existing backend was removed.
    pub fn deregister(&self, name: &str) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Fetch a backend by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ShuffleBackendFactory>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// List registered backend names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

fn global_registry() -> &'static Arc<ShuffleBackendRegistry> {
    static REGISTRY: OnceLock<Arc<ShuffleBackendRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Arc::new(ShuffleBackendRegistry::with_defaults()))
}

/// Return the process-wide shuffle backend registry.
pub fn global_shuffle_backend_registry() -> Arc<ShuffleBackendRegistry> {
    Arc::clone(global_registry())
}

/// Register a backend in the process-wide registry.
///
/// Returns `true` when an existing backend with the same name was replaced.
pub fn register_global_shuffle_backend(factory: Arc<dyn ShuffleBackendFactory>) -> bool {
    global_registry().register(factory)
}
