//! Compute units of the host device.
//!
//! A kernel launch is cut into batches of work-groups which the pool's
//! worker threads pull from a shared injector and steal from each other.

pub mod cpu_pool;
pub mod launch;
pub mod panic_handler;
pub mod task;
pub mod worker;

pub use cpu_pool::{CpuPool, PoolStats};
pub use panic_handler::{PanicHandler, PanicInfo};
