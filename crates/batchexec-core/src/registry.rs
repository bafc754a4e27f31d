//! Executor registry for backend discovery.
//!
//! The [`ExecutorRegistry`] maps backend names to adapter constructors.
//! Probing walks the backends in registration order and builds the first one
//! whose tools are present on the host.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{ExecError, ExecResult};
use crate::executor::Executor;

/// Factory building an executor bound to a partition/queue.
type ExecutorFactory = Box<dyn Fn(&str) -> ExecResult<Arc<dyn Executor>> + Send + Sync>;

/// Cheap host check deciding whether a backend can be built.
type AvailabilityCheck = Box<dyn Fn() -> bool + Send + Sync>;

struct Entry {
    available: AvailabilityCheck,
    factory: ExecutorFactory,
}

/// Central registry for executor backends.
pub struct ExecutorRegistry {
    entries: FxHashMap<String, Entry>,
    /// Registration order, which is also probe order.
    order: Vec<String>,
}

impl ExecutorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Register a backend. Re-registering a name replaces its factory but
    /// keeps its original probe position.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        available: impl Fn() -> bool + Send + Sync + 'static,
        factory: impl Fn(&str) -> ExecResult<Arc<dyn Executor>> + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!("Registering executor backend: {}", name);
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(
            name,
            Entry {
                available: Box::new(available),
                factory: Box::new(factory),
            },
        );
    }

    /// Build the backend registered as `name` for `partition`.
    pub fn get(&self, name: &str, partition: &str) -> ExecResult<Arc<dyn Executor>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ExecError::UnknownBackend(name.to_string()))?;
        (entry.factory)(partition)
    }

    /// Build the first available backend for `partition`.
    pub fn probe(&self, partition: &str) -> ExecResult<Arc<dyn Executor>> {
        for name in &self.order {
            let Some(entry) = self.entries.get(name) else {
                continue;
            };
            if (entry.available)() {
                debug!("Probe selected executor backend: {}", name);
                return (entry.factory)(partition);
            }
            debug!("Executor backend {} is not available on this host", name);
        }
        Err(ExecError::NoBackendDetected)
    }

    /// List all registered backend names, sorted.
    pub fn available_executors(&self) -> Vec<String> {
        let mut names = self.order.clone();
        names.sort();
        names
    }

    /// Check if a backend is registered by name.
    pub fn has_executor(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use async_trait::async_trait;

    struct NamedExecutor(String);

    #[async_trait]
    impl Executor for NamedExecutor {
        fn name(&self) -> &str {
            &self.0
        }

        async fn submit(&self, _job: &mut Job) -> ExecResult<()> {
            Ok(())
        }

        async fn update(&self, _job: &mut Job, _wait: bool) -> ExecResult<()> {
            Ok(())
        }

        async fn cancel(&self, _job: &mut Job, _wait: bool) -> ExecResult<()> {
            Ok(())
        }
    }

    fn named(name: &'static str) -> impl Fn(&str) -> ExecResult<Arc<dyn Executor>> {
        move |partition| {
            Ok(Arc::new(NamedExecutor(format!("{name}:{partition}"))) as Arc<dyn Executor>)
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = ExecutorRegistry::new();
        assert!(registry.available_executors().is_empty());
        assert!(!registry.has_executor("torque"));
        assert!(matches!(
            registry.probe("batch"),
            Err(ExecError::NoBackendDetected)
        ));
    }

    #[test]
    fn test_get_by_name() {
        let mut registry = ExecutorRegistry::new();
        registry.register("torque", || false, named("torque"));

        let executor = registry.get("torque", "batch").unwrap();
        assert_eq!(executor.name(), "torque:batch");

        assert!(matches!(
            registry.get("slurm", "batch"),
            Err(ExecError::UnknownBackend(name)) if name == "slurm"
        ));
    }

    #[test]
    fn test_probe_respects_registration_order() {
        let mut registry = ExecutorRegistry::new();
        registry.register("zeta", || false, named("zeta"));
        registry.register("beta", || true, named("beta"));
        registry.register("alpha", || true, named("alpha"));

        let executor = registry.probe("short").unwrap();
        assert_eq!(executor.name(), "beta:short");
        assert_eq!(registry.available_executors(), vec!["alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_reregister_keeps_position() {
        let mut registry = ExecutorRegistry::new();
        registry.register("first", || true, named("first"));
        registry.register("second", || true, named("second"));
        registry.register("first", || true, named("replaced"));

        let executor = registry.probe("q").unwrap();
        assert_eq!(executor.name(), "replaced:q");
    }
}
