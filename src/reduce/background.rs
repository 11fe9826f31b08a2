//! Background estimation: constant level, PSD side region, or a per-Q table.
//!
//! All estimates are expressed in raw signal units (counts per pixel per
//! frame) so subtraction happens before any normalization. PSD estimates are
//! per-pixel means, which makes signal and background regions of different
//! sizes directly comparable; overlap with the signal region is excluded
//! from the background estimate.

use crate::config::{BackgroundConfig, BackgroundInterpolation, BackgroundMode, BackgroundTable};
use crate::error::{ReductionError, Result};
use crate::frame::CountGrid;
use crate::region::{integrate_region, PixelBox};

use super::Measured;

/// Estimates the background level for one frame at momentum transfer `q`.
pub(crate) fn estimate_background(
    grid: &CountGrid,
    cfg: &BackgroundConfig,
    signal_box: &PixelBox,
    q: f64,
) -> Result<Measured> {
    if !cfg.use_correction {
        return Ok(Measured::new(0.0, 0.0));
    }
    match cfg.mode {
        BackgroundMode::ConstValue => Ok(Measured::new(cfg.value, 0.0)),
        BackgroundMode::PsdRegion => {
            // region presence is checked at config validation
            let region = cfg.region.as_ref().expect("validated background region");
            let sum = integrate_region(grid, region, Some(signal_box))?;
            Ok(Measured::new(sum.mean(), sum.mean_error()))
        }
        BackgroundMode::ExtraFile => {
            let table = cfg.table.as_ref().expect("validated background table");
            lookup_table(table, q, cfg.interpolation)
        }
    }
}

/// Nearest or linear lookup on the background table's Q grid.
///
/// Extrapolation beyond the table range is a [`ReductionError::BackgroundRange`].
pub(crate) fn lookup_table(
    table: &BackgroundTable,
    q: f64,
    interpolation: BackgroundInterpolation,
) -> Result<Measured> {
    let q_min = table.q[0];
    let q_max = table.q[table.q.len() - 1];
    if q < q_min || q > q_max {
        return Err(ReductionError::BackgroundRange { q, q_min, q_max });
    }
    let hi = table.q.partition_point(|&g| g < q);
    if hi == 0 {
        return Ok(Measured::new(table.value[0], table.error[0]));
    }
    if table.q[hi] == q {
        return Ok(Measured::new(table.value[hi], table.error[hi]));
    }
    let lo = hi - 1;
    match interpolation {
        BackgroundInterpolation::Nearest => {
            let i = if q - table.q[lo] <= table.q[hi] - q {
                lo
            } else {
                hi
            };
            Ok(Measured::new(table.value[i], table.error[i]))
        }
        BackgroundInterpolation::Linear => {
            let t = (q - table.q[lo]) / (table.q[hi] - table.q[lo]);
            Ok(Measured::new(
                table.value[lo] + t * (table.value[hi] - table.value[lo]),
                table.error[lo] + t * (table.error[hi] - table.error[lo]),
            ))
        }
    }
}
