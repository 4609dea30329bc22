//! Creation of the plugin set for a session.
//!
//! A session asks a [`CollectorFactory`] for its plugins exactly once. The
//! default factory is the process-wide [`PluginRegistry`], to which collector
//! crates add their constructors at startup.

use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use crate::options::ProfileOptions;
use crate::plugin::CollectorPlugin;

/// Produces the ordered plugin set for a session.
///
/// The returned order is the start order; the session also stops and collects
/// in this order.
pub trait CollectorFactory: Send + Sync {
    fn create(&self, options: &ProfileOptions) -> Vec<Box<dyn CollectorPlugin>>;
}

impl<F> CollectorFactory for F
where
    F: Fn(&ProfileOptions) -> Vec<Box<dyn CollectorPlugin>> + Send + Sync,
{
    fn create(&self, options: &ProfileOptions) -> Vec<Box<dyn CollectorPlugin>> {
        self(options)
    }
}

/// Constructor of one collector. Returns `None` when the collector does not
/// apply to the given options.
pub type PluginConstructor =
    dyn Fn(&ProfileOptions) -> Option<Box<dyn CollectorPlugin>> + Send + Sync;

static GLOBAL_REGISTRY: LazyLock<Arc<PluginRegistry>> =
    LazyLock::new(|| Arc::new(PluginRegistry::new()));

/// Ordered list of collector constructors.
#[derive(Default)]
pub struct PluginRegistry {
    constructors: Mutex<Vec<Arc<PluginConstructor>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> Arc<PluginRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Appends a constructor. Constructors run in registration order.
    pub fn register<F>(&self, constructor: F)
    where
        F: Fn(&ProfileOptions) -> Option<Box<dyn CollectorPlugin>> + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(constructor));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every registered constructor.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<PluginConstructor>>> {
        self.constructors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl CollectorFactory for PluginRegistry {
    fn create(&self, options: &ProfileOptions) -> Vec<Box<dyn CollectorPlugin>> {
        // Constructors run outside the registry mutex so they may register more.
        let constructors = self.lock().clone();
        constructors
            .iter()
            .filter_map(|constructor| constructor(options))
            .collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("constructors", &self.len())
            .finish()
    }
}
