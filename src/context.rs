//! Device context: owns the compute units and creates queues, buffers and
//! programs for one selected device.

use crate::config::Config;
use crate::error::Result;
use crate::executor::{CpuPool, PoolStats};
use crate::memory::{DeviceBuffer, MemFlags, Scalar};
use crate::platform::{select_device, DeviceInfo, DeviceSelection, HostProvider, Platform};
use crate::program::{KernelRegistry, Program};
use crate::queue::CommandQueue;
use crate::telemetry::{Metrics, MetricsSnapshot};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) struct ContextInner {
    pub(crate) selection: DeviceSelection,
    pub(crate) pool: CpuPool,
    pub(crate) metrics: Metrics,
    registry: KernelRegistry,
    next_queue: AtomicUsize,
}

/// Cloning shares the same device and compute units.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Open the host device on `config.platform_index`.
    pub fn host(config: &Config) -> Result<Self> {
        config.validate()?;
        let provider = HostProvider::new(config.compute_unit_count());
        let selection = select_device(&provider, config.platform_index)?;
        Self::new(selection, config)
    }

    pub fn new(selection: DeviceSelection, config: &Config) -> Result<Self> {
        Self::with_registry(selection, config, KernelRegistry::with_builtins())
    }

    /// Like `new`, binding programs against a custom set of kernels.
    pub fn with_registry(
        selection: DeviceSelection,
        config: &Config,
        registry: KernelRegistry,
    ) -> Result<Self> {
        let pool = CpuPool::new(config)?;
        info!(
            platform = %selection.platform.name,
            device = %selection.device.name,
            compute_units = pool.num_threads(),
            "context created"
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                selection,
                pool,
                metrics: Metrics::new(),
                registry,
                next_queue: AtomicUsize::new(0),
            }),
        })
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.inner.selection.device
    }

    pub fn platform(&self) -> &Platform {
        &self.inner.selection.platform
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.inner.registry
    }

    pub fn create_buffer<T: Scalar>(&self, len: usize, flags: MemFlags) -> DeviceBuffer<T> {
        DeviceBuffer::new(len, flags)
    }

    pub fn create_buffer_from<T: Scalar>(&self, data: &[T], flags: MemFlags) -> DeviceBuffer<T> {
        DeviceBuffer::from_slice(data, flags)
    }

    pub fn create_queue(&self) -> Result<CommandQueue> {
        let index = self.inner.next_queue.fetch_add(1, Ordering::Relaxed);
        CommandQueue::new(Arc::clone(&self.inner), index)
    }

    pub fn build_program(&self, source: &str, options: &str) -> Result<Program> {
        Program::build(source, options, self.device(), &self.inner.registry)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("platform", &self.platform().name)
            .field("device", &self.device().name)
            .field("pool", &self.inner.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::kernels;

    #[test]
    fn test_host_context() {
        let config = Config::builder().compute_units(2).build().unwrap();
        let ctx = Context::host(&config).unwrap();
        assert_eq!(ctx.device().compute_units, 2);
        assert_eq!(ctx.pool_stats().compute_units, 2);
        assert!(ctx.build_program(kernels::VECADD_SOURCE, "").is_ok());
    }

    #[test]
    fn test_host_context_bad_platform() {
        let config = Config::builder().platform_index(5).build().unwrap();
        assert!(matches!(
            Context::host(&config),
            Err(Error::PlatformNotFound { index: 5, .. })
        ));
    }

    #[test]
    fn test_custom_registry_limits_programs() {
        let config = Config::builder().compute_units(1).build().unwrap();
        let selection = select_device(&HostProvider::new(1), 0).unwrap();
        let ctx = Context::with_registry(selection, &config, KernelRegistry::new()).unwrap();
        assert!(ctx.build_program(kernels::VECADD_SOURCE, "").is_err());
    }
}
