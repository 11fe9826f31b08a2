//! Weighted least-squares estimation of the reflectivity falloff exponent.
//!
//! Fits R(Q) = scale · (Q/M_ref)^(−alpha) to the measured curve above the
//! critical edge, minimizing the 1/dR²-weighted squared residuals with a
//! damped Gauss–Newton iteration. The fit is bounded: it either converges
//! within a fixed iteration count or fails with
//! [`ReductionError::FitDidNotConverge`].

use log::debug;
use serde::Serialize;

use crate::curve::ReflectivityCurve;
use crate::error::{ReductionError, Result};

const MAX_ITERATIONS: usize = 100;
const STEP_TOL: f64 = 1e-10;
const EPS: f64 = 1e-300;

/// Converged power-law fit result.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AlphaFit {
    /// Fitted plateau scale at the critical edge.
    pub scale: f64,
    /// Fitted falloff exponent.
    pub alpha: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Fits the falloff exponent from all points with Q > `m_ref`.
///
/// Starting values are estimated from the data itself; use
/// [`fit_power_law`] via the validator for specification-seeded fits.
pub fn fit_alpha(curve: &ReflectivityCurve, m_ref: f64) -> Result<AlphaFit> {
    let usable = usable_points(curve, m_ref, f64::INFINITY);
    if usable.len() < 2 {
        return Err(ReductionError::FitDidNotConverge {
            iterations: 0,
            points: usable.len(),
        });
    }
    let (q0, r0, _) = usable[0];
    let (q1, r1, _) = usable[usable.len() - 1];
    let alpha0 = if r0 > 0.0 && r1 > 0.0 && q1 > q0 {
        -(r1 / r0).ln() / (q1 / q0).ln()
    } else {
        1.0
    };
    fit_power_law(curve, m_ref, f64::INFINITY, r0.max(EPS), alpha0)
}

/// Damped Gauss–Newton fit of (scale, alpha) over points with
/// `m_ref` < Q ≤ `q_max`, seeded with explicit starting values.
pub(crate) fn fit_power_law(
    curve: &ReflectivityCurve,
    m_ref: f64,
    q_max: f64,
    scale0: f64,
    alpha0: f64,
) -> Result<AlphaFit> {
    let usable = usable_points(curve, m_ref, q_max);
    if usable.len() < 2 {
        return Err(ReductionError::FitDidNotConverge {
            iterations: 0,
            points: usable.len(),
        });
    }

    let chi2 = |scale: f64, alpha: f64| -> f64 {
        usable
            .iter()
            .map(|&(q, r, w)| {
                let model = scale * (q / m_ref).powf(-alpha);
                w * (r - model).powi(2)
            })
            .sum()
    };

    let mut scale = scale0;
    let mut alpha = alpha0;
    let mut cost = chi2(scale, alpha);
    let mut damping = 1e-3;

    for iteration in 0..MAX_ITERATIONS {
        let mut a11 = 0.0;
        let mut a12 = 0.0;
        let mut a22 = 0.0;
        let mut b1 = 0.0;
        let mut b2 = 0.0;
        for &(q, r, w) in &usable {
            let base = (q / m_ref).powf(-alpha);
            let model = scale * base;
            let resid = r - model;
            let j_s = base;
            let j_a = -scale * base * (q / m_ref).ln();
            a11 += w * j_s * j_s;
            a12 += w * j_s * j_a;
            a22 += w * j_a * j_a;
            b1 += w * j_s * resid;
            b2 += w * j_a * resid;
        }

        let m11 = a11 * (1.0 + damping);
        let m22 = a22 * (1.0 + damping);
        let det = m11 * m22 - a12 * a12;
        if det.abs() <= EPS || !det.is_finite() {
            return Err(ReductionError::FitDidNotConverge {
                iterations: iteration,
                points: usable.len(),
            });
        }
        let d_scale = (m22 * b1 - a12 * b2) / det;
        let d_alpha = (m11 * b2 - a12 * b1) / det;

        let trial_cost = chi2(scale + d_scale, alpha + d_alpha);
        if !trial_cost.is_finite() {
            return Err(ReductionError::FitDidNotConverge {
                iterations: iteration,
                points: usable.len(),
            });
        }
        if trial_cost <= cost {
            scale += d_scale;
            alpha += d_alpha;
            cost = trial_cost;
            damping = (damping * 0.3).max(1e-12);
            let step = d_scale.abs() / scale.abs().max(STEP_TOL)
                + d_alpha.abs() / alpha.abs().max(STEP_TOL);
            if step < STEP_TOL {
                debug!("alpha fit converged: alpha={alpha:.4} scale={scale:.4e} iter={iteration}");
                return Ok(AlphaFit {
                    scale,
                    alpha,
                    converged: true,
                    iterations: iteration + 1,
                });
            }
        } else {
            damping *= 10.0;
            if damping > 1e12 {
                break;
            }
        }
    }
    Err(ReductionError::FitDidNotConverge {
        iterations: MAX_ITERATIONS,
        points: usable.len(),
    })
}

/// (q, r, weight) triples above the critical edge. Points with reported
/// uncertainty weigh as 1/dR²; synthetic zero-uncertainty points weigh 1.
fn usable_points(curve: &ReflectivityCurve, m_ref: f64, q_max: f64) -> Vec<(f64, f64, f64)> {
    curve
        .iter()
        .filter(|p| p.q > m_ref && p.q <= q_max && p.q.is_finite() && p.r.is_finite())
        .map(|p| {
            let w = if p.dr > 0.0 { 1.0 / (p.dr * p.dr) } else { 1.0 };
            (p.q, p.r, w)
        })
        .collect()
}
