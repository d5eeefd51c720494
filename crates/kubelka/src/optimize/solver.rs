//! Projected Levenberg-Marquardt for box- and sum-constrained least squares.
//!
//! Minimizes `‖r(x)‖²` over `{ lower ≤ x ≤ upper, Σx ≤ ceiling }`. Each
//! damped Gauss-Newton step is projected back onto the feasible set, so
//! every iterate is feasible.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Failure of a single optimization attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("objective is not finite at iteration {iteration}")]
    NonFiniteObjective { iteration: usize },

    #[error("start point has {got} variables, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("infeasible constraints: {0}")]
    Infeasible(String),
}

/// `lower ≤ x ≤ upper` intersected with the optional `Σx ≤ ceiling`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibleSet {
    lower: Vec<f64>,
    upper: Vec<f64>,
    ceiling: Option<f64>,
}

impl FeasibleSet {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>, ceiling: Option<f64>) -> Result<Self, SolverError> {
        if lower.len() != upper.len() {
            return Err(SolverError::DimensionMismatch {
                expected: lower.len(),
                got: upper.len(),
            });
        }
        for (i, (l, u)) in lower.iter().zip(&upper).enumerate() {
            if !l.is_finite() || !u.is_finite() || l > u {
                return Err(SolverError::Infeasible(format!("bounds [{}, {}] for variable {}", l, u, i)));
            }
        }
        if let Some(ceiling) = ceiling {
            let floor: f64 = lower.iter().sum();
            if !ceiling.is_finite() || floor > ceiling {
                return Err(SolverError::Infeasible(format!(
                    "lower bounds sum to {} above ceiling {}",
                    floor, ceiling
                )));
            }
        }
        Ok(Self { lower, upper, ceiling })
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn ceiling(&self) -> Option<f64> {
        self.ceiling
    }

    /// Euclidean projection onto the set.
    ///
    /// Box clipping alone when the sum is satisfied; otherwise
    /// `x_i = clip(v_i - λ)` with `λ ≥ 0` found by bisection so the sum
    /// meets the ceiling.
    pub fn project(&self, v: &[f64]) -> Vec<f64> {
        let clip = |shift: f64| -> Vec<f64> {
            v.iter()
                .zip(self.lower.iter().zip(&self.upper))
                .map(|(&x, (&l, &u))| (x - shift).clamp(l, u))
                .collect()
        };
        let clipped = clip(0.0);
        let Some(ceiling) = self.ceiling else {
            return clipped;
        };
        if clipped.iter().sum::<f64>() <= ceiling {
            return clipped;
        }

        let mut lo = 0.0;
        let mut hi = v
            .iter()
            .zip(&self.lower)
            .map(|(x, l)| x - l)
            .fold(0.0, f64::max);
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if clip(mid).iter().sum::<f64>() > ceiling {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
                break;
            }
        }
        clip(hi)
    }

    pub fn contains(&self, x: &[f64], tolerance: f64) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(&x, (&l, &u))| x >= l - tolerance && x <= u + tolerance)
            && self
                .ceiling
                .map_or(true, |c| x.iter().sum::<f64>() <= c + tolerance)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    pub max_iter: usize,
    /// Relative reduction of the cost below which iteration stops.
    pub ftol: f64,
    /// Relative step size below which iteration stops.
    pub xtol: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            ftol: 1e-12,
            xtol: 1e-12,
        }
    }
}

/// Converged (or iteration-capped) solution of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimum {
    pub x: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Sum of squared residuals at `x`.
    pub cost: f64,
    pub iterations: usize,
    pub success: bool,
    pub message: String,
}

const MU_INIT: f64 = 1e-3;
const MU_MAX: f64 = 1e12;
const MU_DOWN: f64 = 3.0;
const MU_UP: f64 = 4.0;
const FD_STEP: f64 = 6e-6;
const COST_FLOOR: f64 = 1e-24;

#[derive(Debug, Clone)]
pub struct ProjectedLevenbergMarquardt {
    set: FeasibleSet,
    options: SolverOptions,
}

impl ProjectedLevenbergMarquardt {
    pub fn new(set: FeasibleSet, options: SolverOptions) -> Self {
        Self { set, options }
    }

    pub fn feasible_set(&self) -> &FeasibleSet {
        &self.set
    }

    /// Minimize `‖residuals(x)‖²` starting from the projection of `x0`.
    ///
    /// Running out of iterations is not an error: the best point so far is
    /// returned with `success == false`.
    pub fn minimize<F>(&self, residuals: F, x0: &[f64]) -> Result<Optimum, SolverError>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        if x0.len() != self.set.dim() {
            return Err(SolverError::DimensionMismatch {
                expected: self.set.dim(),
                got: x0.len(),
            });
        }

        let mut x = self.set.project(x0);
        let mut r = residuals(&x);
        if !all_finite(&r) {
            return Err(SolverError::NonFiniteObjective { iteration: 0 });
        }
        let mut cost = sum_sq(&r);
        let mut mu = MU_INIT;

        let done = |x: Vec<f64>, r: Vec<f64>, cost: f64, iterations: usize, success: bool, message: &str| Optimum {
            x,
            residuals: r,
            cost,
            iterations,
            success,
            message: message.to_string(),
        };

        for iteration in 1..=self.options.max_iter {
            if cost < COST_FLOOR {
                return Ok(done(x, r, cost, iteration - 1, true, "Residuals vanished"));
            }

            let jac = self.jacobian(&residuals, &x, &r);
            if jac.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::NonFiniteObjective { iteration });
            }
            let r_vec = DVector::from_column_slice(&r);
            let jtj = jac.transpose() * &jac;
            let gradient = jac.transpose() * &r_vec;

            loop {
                let mut damped = jtj.clone();
                for j in 0..damped.ncols() {
                    damped[(j, j)] += mu * jtj[(j, j)].max(1e-12);
                }
                let Some(chol) = damped.cholesky() else {
                    mu *= MU_UP;
                    if mu > MU_MAX {
                        return Ok(done(x, r, cost, iteration, true, "No further reduction possible"));
                    }
                    continue;
                };
                let delta = chol.solve(&(-&gradient));
                let trial: Vec<f64> = x.iter().zip(delta.iter()).map(|(x, d)| x + d).collect();
                let x_new = self.set.project(&trial);
                let step: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();

                let step_norm = sum_sq(&step).sqrt();
                if step_norm <= self.options.xtol * (sum_sq(&x).sqrt() + self.options.xtol) {
                    return Ok(done(x, r, cost, iteration, true, "Step size below xtol"));
                }

                let r_new = residuals(&x_new);
                let cost_new = sum_sq(&r_new);
                if all_finite(&r_new) && cost_new < cost {
                    let linear = &r_vec + &jac * DVector::from_column_slice(&step);
                    let predicted = cost - linear.norm_squared();
                    let actual = cost - cost_new;
                    let converged = actual <= self.options.ftol * cost && predicted <= self.options.ftol * cost;

                    x = x_new;
                    r = r_new;
                    cost = cost_new;
                    mu = (mu / MU_DOWN).max(1e-15);
                    tracing::trace!(iteration, cost, mu, "Accepted step");

                    if converged {
                        return Ok(done(x, r, cost, iteration, true, "Relative reduction below ftol"));
                    }
                    break;
                }

                mu *= MU_UP;
                if mu > MU_MAX {
                    return Ok(done(x, r, cost, iteration, true, "No further reduction possible"));
                }
            }
        }

        let iterations = self.options.max_iter;
        Ok(done(x, r, cost, iterations, false, "Maximum number of iterations reached"))
    }

    /// Central differences, one-sided next to a bound.
    fn jacobian<F>(&self, residuals: &F, x: &[f64], r: &[f64]) -> DMatrix<f64>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let mut jac = DMatrix::zeros(r.len(), x.len());
        for j in 0..x.len() {
            let (l, u) = (self.set.lower[j], self.set.upper[j]);
            let range = u - l;
            if range <= 0.0 {
                continue;
            }
            let h = FD_STEP * x[j].abs().max(range);
            let can_up = x[j] + h <= u;
            let can_down = x[j] - h >= l;

            let eval = |offset: f64| {
                let mut probe = x.to_vec();
                probe[j] += offset;
                residuals(&probe)
            };
            let column: Vec<f64> = match (can_down, can_up) {
                (true, true) => {
                    let (plus, minus) = (eval(h), eval(-h));
                    plus.iter().zip(&minus).map(|(p, m)| (p - m) / (2.0 * h)).collect()
                }
                (false, true) => eval(h).iter().zip(r).map(|(p, r0)| (p - r0) / h).collect(),
                (true, false) => eval(-h).iter().zip(r).map(|(m, r0)| (r0 - m) / h).collect(),
                (false, false) => continue,
            };
            for (i, value) in column.into_iter().enumerate() {
                jac[(i, j)] = value;
            }
        }
        jac
    }
}

fn sum_sq(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}
