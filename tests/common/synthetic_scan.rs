//! Deterministic synthetic scans whose signal region follows an ideal
//! supermirror reflectivity curve.

use refl_reducer::frame::{
    DetectorFrame, InstrumentSettings, PolarizationEfficiency, SampleGeometry, Scan,
    SlitGeometry, SpinChannel,
};
use refl_reducer::qspace::theta_lambda_to_q;
use refl_reducer::region::PixelBox;
use refl_reducer::spec::SpecificationCurve;

pub const WAVELENGTH: f64 = 4.5;

pub fn signal_region() -> PixelBox {
    PixelBox::new(24, 39, 24, 39)
}

pub fn instrument() -> InstrumentSettings {
    InstrumentSettings {
        wavelength: WAVELENGTH,
        dlam_rel: 0.01,
        slits: SlitGeometry {
            slit1_width: 1.0,
            slit2_width: 0.5,
            slit1_position: -2000.0,
            slit2_position: -200.0,
        },
        efficiency: PolarizationEfficiency::default(),
    }
}

pub fn sample() -> SampleGeometry {
    SampleGeometry {
        length: 50.0,
        thickness: 5.0,
    }
}

/// Angles chosen so every point lands strictly above zero incidence.
pub fn thetas(n: usize) -> Vec<f64> {
    (1..=n).map(|i| 0.05 * i as f64).collect()
}

/// Builds a scan whose per-pixel signal level equals
/// `level_scale * theory(q)` inside the signal region, with flat
/// `background_level` everywhere else.
pub fn scan_from_theory(
    theory: &SpecificationCurve,
    channel: SpinChannel,
    n_points: usize,
    level_scale: f64,
    background_level: f64,
) -> Scan {
    let region = signal_region();
    let frames = thetas(n_points)
        .into_iter()
        .map(|theta| {
            let q = theta_lambda_to_q(theta, WAVELENGTH);
            let mut frame = DetectorFrame::new(64, 64, 10.0, 1e6, theta);
            let level = level_scale * theory.evaluate(q);
            for y in 0..64 {
                for x in 0..64 {
                    let v = if region.contains(x, y) {
                        level + background_level
                    } else {
                        background_level
                    };
                    frame.counts.set(x, y, v);
                }
            }
            frame
        })
        .collect();
    Scan {
        channel,
        frames,
        instrument: instrument(),
        sample: sample(),
    }
}

pub fn default_theory() -> SpecificationCurve {
    SpecificationCurve {
        m_ref: 0.02,
        r_ref: 1.0,
        m_max: 0.1,
        alpha: 3.0,
    }
}
