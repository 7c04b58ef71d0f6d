use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Build log emitted by one device when a program fails to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLog {
    pub device: String,
    pub log: String,
}

/// All build logs of a failed program build, one per target device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub logs: Vec<BuildLog>,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.logs {
            writeln!(f, "[{}]", entry.device)?;
            writeln!(f, "{}", entry.log.trim_end())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("platform {index} not found ({available} available)")]
    PlatformNotFound { index: usize, available: usize },

    #[error("platform '{0}' exposes no devices")]
    NoDevice(String),

    #[error("program build failed:\n{0}")]
    Build(BuildFailure),

    #[error("kernel '{0}' not found in program")]
    KernelNotFound(String),

    #[error("kernel '{kernel}': argument {index} is not set")]
    MissingArg { kernel: String, index: usize },

    #[error("kernel '{kernel}': argument {index} has the wrong type (expected {expected})")]
    ArgType {
        kernel: String,
        index: usize,
        expected: String,
    },

    #[error("kernel '{kernel}' takes {arity} arguments, index {index} is out of range")]
    ArgIndex {
        kernel: String,
        index: usize,
        arity: usize,
    },

    #[error("invalid NDRange: {0}")]
    InvalidNdRange(String),

    #[error("buffer access out of range: offset {offset} + len {len} > size {size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    #[error("kernel execution failed: {0}")]
    Execution(String),

    #[error("command queue closed")]
    QueueClosed,

    #[error("partition error: {0}")]
    Partition(String),

    #[error("image error: {0}")]
    Image(String),

    #[cfg(feature = "opencl")]
    #[error("OpenCL error: {0}")]
    OpenCl(String),

    // io::Error is not Clone, so only its rendering is kept
    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn ndrange<S: Into<String>>(msg: S) -> Self {
        Error::InvalidNdRange(msg.into())
    }

    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Error::Execution(msg.into())
    }

    pub fn partition<S: Into<String>>(msg: S) -> Self {
        Error::Partition(msg.into())
    }

    pub fn image<S: Into<String>>(msg: S) -> Self {
        Error::Image(msg.into())
    }

    #[cfg(feature = "opencl")]
    pub fn opencl<S: Into<String>>(msg: S) -> Self {
        Error::OpenCl(msg.into())
    }

    pub(crate) fn out_of_bounds(offset: usize, len: usize, size: usize) -> Self {
        Error::OutOfBounds { offset, len, size }
    }

    /// Build logs carried by a build failure, if this is one.
    pub fn build_logs(&self) -> Option<&[BuildLog]> {
        match self {
            Error::Build(failure) => Some(&failure.logs),
            _ => None,
        }
    }
}
