//! Time, monitor and intensity normalization with uncertainty propagation.
//!
//! Exact divisors (acquisition time, a supplied constant) scale value and
//! uncertainty alike. Count-derived references (monitor counts, region
//! integrals, maximum-intensity points) also fold their own Poisson
//! uncertainty into the point's error in quadrature.

use crate::config::NormalizationConfig;
use crate::error::Result;
use crate::frame::DetectorFrame;

use super::Measured;

/// Intensity-normalization divisor resolved by the caller.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Reference {
    /// Fixed constant with no uncertainty contribution.
    Constant(f64),
    /// Count-derived reference carrying its own uncertainty.
    Counted(Measured),
}

/// Applies the enabled normalizations to one point.
///
/// Disabled corrections are identity operations. The caller resolves the
/// intensity reference (scan maximum, dataset maximum, reference region)
/// since those are not point-local.
pub(crate) fn normalize_point(
    value: Measured,
    frame: &DetectorFrame,
    frame_idx: usize,
    cfg: &NormalizationConfig,
    reference: Option<Reference>,
) -> Result<Measured> {
    let mut out = value;
    if cfg.time {
        out = out.div_exact(frame.time, "time normalization", Some(frame_idx))?;
    }
    if cfg.monitor {
        let monitor = Measured {
            value: frame.monitor,
            sigma: frame.monitor.max(0.0).sqrt(),
        };
        out = out.div_counted(monitor, "monitor normalization", Some(frame_idx))?;
    }
    if cfg.intensity {
        match reference {
            Some(Reference::Constant(c)) => {
                out = out.div_exact(c, "intensity normalization", Some(frame_idx))?;
            }
            Some(Reference::Counted(r)) => {
                out = out.div_counted(r, "intensity normalization", Some(frame_idx))?;
            }
            None => {}
        }
    }
    Ok(out)
}
