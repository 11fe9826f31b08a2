//! Q-space utilities used across the reduction pipeline.

use crate::frame::SlitGeometry;

/// Default relative wavelength spread Δλ/λ of the monochromator.
pub const WAVELENGTH_RESOLUTION: f64 = 0.01;

/// Converts incident angle (degrees) and wavelength (Angstrom) to momentum
/// transfer Q in 1/Angstrom.
#[inline]
pub fn theta_lambda_to_q(theta_deg: f64, lambda: f64) -> f64 {
    (4.0 * std::f64::consts::PI / lambda) * theta_deg.to_radians().sin()
}

/// Computes Q and the slit-defined resolution ΔQ for one scan point.
///
/// The angular divergence is Δθ = (S1 + S2) / (2·L12) with L12 the
/// slit separation; the relative Q resolution combines Δθ/tanθ with the
/// relative wavelength spread in quadrature.
pub fn q_with_resolution(
    theta_deg: f64,
    lambda: f64,
    slits: &SlitGeometry,
    dlam_rel: f64,
) -> (f64, f64) {
    let theta = theta_deg.to_radians();
    let q = (4.0 * std::f64::consts::PI / lambda) * theta.sin();

    let l12 = (slits.slit1_position - slits.slit2_position).abs();
    let dtheta = (slits.slit1_width + slits.slit2_width) / (2.0 * l12);
    // tanθ → 0 at grazing incidence; the clamp keeps dq finite at q == 0.
    let rel_dtheta = dtheta / theta.tan().abs().max(1e-12);
    let rel_dq = (dlam_rel * dlam_rel + rel_dtheta * rel_dtheta).sqrt();
    (q, q.abs() * rel_dq)
}
