mod aggregate;
mod executor;
mod handlers;
mod scoring;

#[cfg(test)]
pub(crate) mod fakes;

pub use aggregate::{MethodComparison, compare_by_method};
pub use executor::{MethodRun, PhaseExecutor};
#[cfg(test)]
pub(crate) use handlers::{DRIFT_SEED_FILE, IMPL_FILE, RESIDUAL_FILE, SYNTHETIC_DIR};
