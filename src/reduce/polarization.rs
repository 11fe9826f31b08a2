//! Polarization correction over spin-state channels.
//!
//! Imperfect polarizer/analyzer arms mix the true spin cross sections into
//! the measured channel intensities. The mixing is a fixed-size matrix (2×2
//! for polarizer-only setups, 4×4 for full polarization analysis as the
//! Kronecker product of the two arm matrices); the correction inverts it and
//! propagates the channel uncertainties through the inverse.

use nalgebra::{Matrix2, Matrix4, Vector2, Vector4};

use crate::curve::{ReflectivityCurve, ReflectivityPoint};
use crate::error::{ReductionError, Result};
use crate::frame::PolarizationEfficiency;

use super::Measured;

/// 2×2 mixing matrix of one arm: polarizing efficiency `p`, flipper
/// efficiency `f`. Row 0 is the flipper-off channel, row 1 flipper-on.
fn arm_matrix(p: f64, f: f64) -> Matrix2<f64> {
    let t = (1.0 + p) / 2.0;
    let c = (1.0 - p) / 2.0;
    // flipper-on row blends the flipped and unflipped responses
    Matrix2::new(t, c, f * c + (1.0 - f) * t, f * t + (1.0 - f) * c)
}

fn singular(frame: Option<usize>) -> ReductionError {
    ReductionError::DivisionByZero {
        stage: "polarization efficiency inversion",
        frame,
    }
}

/// Corrector holding the inverted efficiency matrices. Built once per run so
/// a degenerate efficiency set fails before any per-point work.
#[derive(Clone, Debug)]
pub(crate) struct PolarizationCorrector {
    inv2: Matrix2<f64>,
    inv4: Matrix4<f64>,
}

impl PolarizationCorrector {
    pub(crate) fn new(eff: &PolarizationEfficiency) -> Result<Self> {
        let arm1 = arm_matrix(eff.polarizer, eff.spin_flipper_1);
        let arm2 = arm_matrix(eff.analyzer, eff.spin_flipper_2);
        let inv2 = arm1.try_inverse().ok_or_else(|| singular(None))?;
        let inv4 = arm1.kronecker(&arm2).try_inverse().ok_or_else(|| singular(None))?;
        Ok(Self { inv2, inv4 })
    }

    /// Unmix an (up, down) intensity pair measured without an analyzer.
    pub(crate) fn correct_two(&self, measured: [Measured; 2]) -> [Measured; 2] {
        let values = self.inv2 * Vector2::new(measured[0].value, measured[1].value);
        let mut out = [Measured::new(0.0, 0.0); 2];
        for i in 0..2 {
            let mut var = 0.0;
            for (j, m) in measured.iter().enumerate() {
                var += (self.inv2[(i, j)] * m.sigma).powi(2);
            }
            out[i] = Measured::new(values[i], var.sqrt());
        }
        out
    }

    /// Unmix the four analyzed channels ordered (uu, ud, du, dd).
    pub(crate) fn correct_four(&self, measured: [Measured; 4]) -> [Measured; 4] {
        let values = self.inv4
            * Vector4::new(
                measured[0].value,
                measured[1].value,
                measured[2].value,
                measured[3].value,
            );
        let mut out = [Measured::new(0.0, 0.0); 4];
        for i in 0..4 {
            let mut var = 0.0;
            for (j, m) in measured.iter().enumerate() {
                var += (self.inv4[(i, j)] * m.sigma).powi(2);
            }
            out[i] = Measured::new(values[i], var.sqrt());
        }
        out
    }
}

/// Derives the polarization curve P = (R⁺ − R⁻) / (R⁺ + R⁻) from reduced
/// spin-up and spin-down curves sharing one Q grid.
///
/// The result reuses the curve data model: `r` holds P and `dr` its
/// propagated uncertainty.
pub fn polarization_curve(
    up: &ReflectivityCurve,
    down: &ReflectivityCurve,
) -> Result<ReflectivityCurve> {
    if up.len() != down.len() {
        return Err(ReductionError::IncompletePolarizationData {
            detail: format!(
                "spin channels have {} and {} points",
                up.len(),
                down.len()
            ),
        });
    }
    let mut points = Vec::with_capacity(up.len());
    for (i, (a, b)) in up.iter().zip(down.iter()).enumerate() {
        let q_scale = a.q.abs().max(b.q.abs()).max(1e-12);
        if (a.q - b.q).abs() / q_scale > 1e-6 {
            return Err(ReductionError::IncompletePolarizationData {
                detail: format!("q grids diverge at point {i} ({} vs {})", a.q, b.q),
            });
        }
        let denom = a.r + b.r;
        if denom == 0.0 {
            return Err(ReductionError::DivisionByZero {
                stage: "polarization ratio",
                frame: Some(i),
            });
        }
        let p = (a.r - b.r) / denom;
        let dp = ((2.0 * b.r * a.dr / denom.powi(2)).powi(2)
            + (2.0 * a.r * b.dr / denom.powi(2)).powi(2))
        .sqrt();
        points.push(ReflectivityPoint {
            q: a.q,
            dq: a.dq,
            r: p,
            dr: dp,
            intensity_raw: a.intensity_raw,
            intensity_corrected: a.intensity_corrected,
            background: a.background,
            flags: a.flags,
        });
    }
    Ok(ReflectivityCurve {
        channel: None,
        points,
        corrections: vec!["polarization ratio (up - down) / (up + down)".to_string()],
    })
}
