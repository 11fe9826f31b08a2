//! Footprint and absorption correction factors.
//!
//! Both are pure functions of the incident angle and the beam/sample
//! geometry, returning multiplicative factors applied to the reflectivity
//! and its uncertainty alike.

use crate::error::{ReductionError, Result};
use crate::frame::{SampleGeometry, SlitGeometry};

/// Footprint correction factor for a two-slit trapezoidal beam profile.
///
/// The beam intensity is constant over the central `beam_center` span and
/// falls off linearly out to `beam_size`. Below the angle where the full
/// trapezoid fits on the sample, only a fraction of the beam hits it; the
/// returned factor (≥ 1) rescales the measured intensity to the full beam.
pub(crate) fn footprint_factor(
    theta_deg: f64,
    slits: &SlitGeometry,
    sample_length: f64,
    frame_idx: usize,
) -> Result<f64> {
    let theta = theta_deg.to_radians();
    let s1w = slits.slit1_width;
    let s2w = slits.slit2_width;
    let l1 = slits.slit1_position.abs();
    let l2 = slits.slit2_position.abs();

    let beam_center = s2w - (s1w - s2w) * l2 / (l1 + l2);
    let beam_size = (s1w + s2w) * (l1 + l2) / (l1 - l2) - s1w;

    let theta2 = (beam_center / sample_length).clamp(-1.0, 1.0).asin();
    let theta3 = (beam_size / sample_length).clamp(-1.0, 1.0).asin();

    let full_beam = beam_center + (beam_size - beam_center) / 2.0;
    let scale_outer = (beam_size - beam_center) / 2.0 / full_beam;

    let illuminated = if theta >= theta3 {
        1.0
    } else if theta < theta2 {
        (1.0 - scale_outer) * theta / theta2
    } else {
        let falloff = (theta - theta3).powi(2) / (theta3 - theta2).powi(2);
        (1.0 - scale_outer) + (1.0 - falloff) * scale_outer
    };

    if !(illuminated > 0.0) || !illuminated.is_finite() {
        return Err(ReductionError::DivisionByZero {
            stage: "footprint correction",
            frame: Some(frame_idx),
        });
    }
    Ok(1.0 / illuminated)
}

/// Absorption correction factor exp(−μ·λ·x) for the beam path through the
/// sample.
///
/// The path switches from grazing transit along the sample length to deep
/// penetration through its thickness at θ₁ = atan(2·thickness/length).
pub(crate) fn absorption_factor(
    theta_deg: f64,
    lambda: f64,
    mu: f64,
    sample: &SampleGeometry,
) -> f64 {
    let theta = theta_deg.to_radians();
    let theta1 = (2.0 * sample.thickness / sample.length).atan();
    let sin_theta = theta.sin().max(1e-6);
    let cos_theta = theta.cos().max(1e-6);
    let path = if theta < theta1 {
        sample.length / cos_theta
    } else {
        2.0 * sample.thickness / sin_theta
    };
    (-mu * lambda * path).exp()
}
