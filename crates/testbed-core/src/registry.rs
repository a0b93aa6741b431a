//! Processes started during one attempt.

use testbed_net::Supervised;
use tracing::debug;

use crate::obs;

/// Every background process of one attempt, so cleanup can stop exactly
/// what the attempt started.
#[derive(Default)]
pub struct ProcessRegistry {
    collector: Option<Box<dyn Supervised>>,
    workload: Vec<Box<dyn Supervised>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_collector(&mut self, handle: Box<dyn Supervised>) {
        self.collector = Some(handle);
    }

    pub fn collector_mut(&mut self) -> Option<&mut (dyn Supervised + 'static)> {
        self.collector.as_deref_mut()
    }

    pub fn register(&mut self, handle: Box<dyn Supervised>) {
        self.workload.push(handle);
    }

    pub fn len(&self) -> usize {
        self.workload.len() + usize::from(self.collector.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.collector
            .iter()
            .chain(self.workload.iter())
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Terminate workload processes newest first, then the collector.
    ///
    /// Drains the registry. Termination errors are logged, not returned.
    pub async fn terminate_all(&mut self) -> usize {
        let mut terminated = 0;
        let handles = self.workload.drain(..).rev().chain(self.collector.take());
        for mut handle in handles {
            match handle.terminate().await {
                Ok(()) => {
                    debug!(process = %handle.name(), "Terminated");
                    terminated += 1;
                }
                Err(e) => obs::emit_best_effort_failure("process.terminate", &e),
            }
        }
        terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use testbed_net::{FakePlatform, LaunchSpec, NetworkPlatform, PlatformCall};

    #[tokio::test]
    async fn test_terminate_all_drains_in_order() {
        let fake = FakePlatform::new();
        let mut registry = ProcessRegistry::new();

        let collector = fake
            .spawn(None, &LaunchSpec::new("collector", "/bin/collector"))
            .await
            .unwrap();
        registry.set_collector(collector);
        for name in ["h1", "h2"] {
            let handle = fake
                .spawn(Some(name), &LaunchSpec::new(name, "/bin/app"))
                .await
                .unwrap();
            registry.register(handle);
        }
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["collector", "h1", "h2"]);

        assert_eq!(registry.terminate_all().await, 3);
        assert!(registry.is_empty());
        assert!(fake.running().is_empty());

        let order: Vec<String> = fake
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                PlatformCall::Terminate(name) => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["h2", "h1", "collector"]);
        assert!(fake.spawns_of(Path::new("/bin/app")).len() == 2);
    }

    #[tokio::test]
    async fn test_terminate_all_is_idempotent() {
        let mut registry = ProcessRegistry::new();
        assert_eq!(registry.terminate_all().await, 0);
        assert_eq!(registry.terminate_all().await, 0);
    }
}
