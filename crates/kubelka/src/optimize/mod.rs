//! Colour matching: solve for the concentrations that reproduce a target.
//!
//! [`Minimizer`] wraps a [`Formulator`](crate::formulate::Formulator) and a
//! bound- and sum-constrained least-squares solver
//! ([`ProjectedLevenbergMarquardt`]). Each target is matched on its own
//! background; failed attempts are retried from progressively smaller
//! start points before the target is reported as failed.

mod history;
mod minimizer;
mod solver;

pub use history::{BatchReport, MatchHistory, OptimizationResult, ReflectanceEntry, SeriesKind, TargetFailure};
pub use minimizer::{
    default_bounds, Bounds, Minimizer, MinimizerOptions, DEFAULT_MAX_ITER, DEFAULT_MAX_RETRIES, DEFAULT_TOTAL_CEILING,
};
pub use solver::{FeasibleSet, Optimum, ProjectedLevenbergMarquardt, SolverError, SolverOptions};
