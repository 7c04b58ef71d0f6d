use crate::error::{Error, Result};
use crate::partition::RemainderPolicy;
use crate::verify::Tolerance;
use std::path::PathBuf;

/// Build options used when none are given, matching an OpenCL 2.0 toolchain.
pub const DEFAULT_BUILD_OPTIONS: &str = "-cl-std=CL2.0 -cl-mad-enable -cl-fast-relaxed-math";

pub const MAX_LANES: usize = 1024;
pub const MAX_COMPUTE_UNITS: usize = 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub platform_index: usize,
    pub elements: usize,
    pub work_group_size: usize,
    pub lanes: usize,
    pub kernel_path: Option<PathBuf>,
    pub build_options: String,
    pub remainder: RemainderPolicy,
    pub tolerance: Tolerance,
    pub seed: Option<u64>,

    /// Threads backing the host device; defaults to the number of CPUs.
    pub compute_units: Option<usize>,
    pub pin_workers: bool,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform_index: 0,
            elements: 10_000,
            work_group_size: 512,
            lanes: 4,
            kernel_path: None,
            build_options: DEFAULT_BUILD_OPTIONS.to_string(),
            remainder: RemainderPolicy::default(),
            tolerance: Tolerance::default(),
            seed: None,
            compute_units: None,
            pin_workers: false,
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "offload-cu".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.lanes == 0 {
            return Err(Error::config("lanes must be > 0"));
        }
        if self.lanes > MAX_LANES {
            return Err(Error::config(format!(
                "lanes too large (max {})",
                MAX_LANES
            )));
        }

        if self.work_group_size == 0 {
            return Err(Error::config("work_group_size must be > 0"));
        }

        if let Some(n) = self.compute_units {
            if n == 0 {
                return Err(Error::config("compute_units must be > 0"));
            }
            if n > MAX_COMPUTE_UNITS {
                return Err(Error::config(format!(
                    "compute_units too large (max {})",
                    MAX_COMPUTE_UNITS
                )));
            }
        }

        match self.tolerance {
            Tolerance::Exact => {}
            Tolerance::Absolute(eps) | Tolerance::Relative(eps) => {
                if !eps.is_finite() || eps < 0.0 {
                    return Err(Error::config("tolerance must be finite and >= 0"));
                }
            }
        }

        Ok(())
    }

    pub fn compute_unit_count(&self) -> usize {
        self.compute_units.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn platform_index(mut self, index: usize) -> Self {
        self.config.platform_index = index;
        self
    }

    pub fn elements(mut self, n: usize) -> Self {
        self.config.elements = n;
        self
    }

    pub fn work_group_size(mut self, n: usize) -> Self {
        self.config.work_group_size = n;
        self
    }

    pub fn lanes(mut self, n: usize) -> Self {
        self.config.lanes = n;
        self
    }

    pub fn kernel_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.kernel_path = Some(path.into());
        self
    }

    pub fn build_options<S: Into<String>>(mut self, options: S) -> Self {
        self.config.build_options = options.into();
        self
    }

    pub fn remainder(mut self, policy: RemainderPolicy) -> Self {
        self.config.remainder = policy;
        self
    }

    pub fn tolerance(mut self, tolerance: Tolerance) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn compute_units(mut self, n: usize) -> Self {
        self.config.compute_units = Some(n);
        self
    }

    pub fn pin_workers(mut self, pin: bool) -> Self {
        self.config.pin_workers = pin;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
