//! Pipeline configuration: one struct per correction axis, each a closed set
//! of named options, validated eagerly before any numeric work.
//!
//! Strategy enums map to tagged variants dispatched by pattern matching so
//! the option space stays statically checkable.

use serde::{Deserialize, Serialize};

use crate::error::{ReductionError, Result};
use crate::region::PixelBox;

/// Intensity-normalization reference strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntensityReference {
    /// Divide by a supplied constant.
    ConstValue,
    /// Divide by the maximum raw intensity of the current scan.
    MaxValue,
    /// Divide by the maximum raw intensity across the whole dataset.
    MaxValueGlobal,
    /// Divide by the integrated intensity of a reference PSD region.
    PsdRegion,
}

/// Background estimation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundMode {
    ConstValue,
    PsdRegion,
    ExtraFile,
}

/// Lookup method for per-Q background tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundInterpolation {
    Nearest,
    Linear,
}

/// Absorption coefficient source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbsorptionMode {
    ConstValue,
    Typical,
}

/// Typical substrates with tabulated linear attenuation coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Substrate {
    Glass,
    Si,
    SiO2,
    Al2O3,
}

impl Substrate {
    /// Linear attenuation coefficient in 1/mm/Angstrom.
    pub fn mu(&self) -> f64 {
        match self {
            Substrate::Glass => 1.667e-4,
            Substrate::Si => 5.56e-5,
            Substrate::SiO2 => 2.78e-5,
            Substrate::Al2O3 => 2.78e-5,
        }
    }
}

/// Per-Q background table supplied by an external file reader.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTable {
    /// Strictly increasing Q grid.
    pub q: Vec<f64>,
    /// Background level per grid point, in raw signal units.
    pub value: Vec<f64>,
    /// Reported uncertainty per grid point.
    pub error: Vec<f64>,
}

/// Time/monitor/intensity normalization options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizationConfig {
    pub time: bool,
    pub monitor: bool,
    pub intensity: bool,
    pub intensity_reference: IntensityReference,
    /// Divisor for [`IntensityReference::ConstValue`].
    pub intensity_value: f64,
    /// Reference region for [`IntensityReference::PsdRegion`].
    pub intensity_region: Option<PixelBox>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            time: true,
            monitor: true,
            intensity: true,
            intensity_reference: IntensityReference::ConstValue,
            intensity_value: 1.0,
            intensity_region: None,
        }
    }
}

/// Background estimation and subtraction options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackgroundConfig {
    pub use_correction: bool,
    pub mode: BackgroundMode,
    /// Level for [`BackgroundMode::ConstValue`], in raw signal units.
    pub value: f64,
    /// Side region for [`BackgroundMode::PsdRegion`].
    pub region: Option<PixelBox>,
    /// Table for [`BackgroundMode::ExtraFile`].
    pub table: Option<BackgroundTable>,
    pub interpolation: BackgroundInterpolation,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            use_correction: true,
            mode: BackgroundMode::ConstValue,
            value: 1e-12,
            region: None,
            table: None,
            interpolation: BackgroundInterpolation::Linear,
        }
    }
}

/// Footprint/absorption/polarization correction toggles.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReductionConfig {
    pub footprint: bool,
    pub absorption: bool,
    pub polarization: bool,
    pub absorption_mode: AbsorptionMode,
    pub substrate: Substrate,
    /// Coefficient for [`AbsorptionMode::ConstValue`], in 1/mm/Angstrom.
    pub mu_value: f64,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            footprint: true,
            absorption: true,
            polarization: false,
            absorption_mode: AbsorptionMode::ConstValue,
            substrate: Substrate::Glass,
            mu_value: 0.0,
        }
    }
}

/// Curve assembly options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Points closer than this in Q are merged by inverse-variance weighting.
    pub q_merge_tolerance: f64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            q_merge_tolerance: 1e-6,
        }
    }
}

/// Specification-compliance parameters, all Q values in 1/Angstrom.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpecConfig {
    /// Q position of the critical edge of the theoretical curve.
    pub m_ref: f64,
    /// Reflectivity of the plateau below `m_ref`.
    pub r_ref: f64,
    /// Q cutoff beyond which the theoretical curve drops to zero.
    pub m_max: f64,
    /// Falloff exponent of the theoretical curve.
    pub alpha_spec: f64,
    /// Upper bound for the fitted falloff exponent.
    pub alpha_max: f64,
    /// Maximum allowed deviation ratio R_measured / R_theory.
    pub r_div_max: f64,
    /// Fit alpha from the measured curve instead of using `alpha_spec`.
    pub fit_alpha: bool,
    /// Polarization lower bound over [`q_p_start`, `q_p_end`].
    pub p_min: f64,
    pub q_p_start: f64,
    pub q_p_end: f64,
}

impl Default for SpecConfig {
    fn default() -> Self {
        Self {
            m_ref: 0.0218,
            r_ref: 0.6,
            m_max: 0.135,
            alpha_spec: 4.0,
            alpha_max: 4.5,
            r_div_max: 1.05,
            fit_alpha: true,
            p_min: 0.95,
            q_p_start: 0.022,
            q_p_end: 0.135,
        }
    }
}

impl SpecConfig {
    /// Rejects inconsistent parameter combinations before validation runs.
    pub fn validate(&self) -> Result<()> {
        if !(self.m_ref > 0.0) {
            return Err(invalid("m_ref must be positive"));
        }
        if self.m_max <= self.m_ref {
            return Err(invalid("m_max must exceed m_ref"));
        }
        if !(self.r_ref > 0.0) {
            return Err(invalid("r_ref must be positive"));
        }
        if !(self.r_div_max > 0.0) {
            return Err(invalid("r_div_max must be positive"));
        }
        if self.q_p_end <= self.q_p_start {
            return Err(invalid("polarization Q range is empty"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ReductionError {
    ReductionError::ConfigValidation {
        message: message.to_string(),
    }
}

/// Cross-checks the reduction configuration set once at pipeline entry.
pub fn validate_reduction(
    norm: &NormalizationConfig,
    bg: &BackgroundConfig,
    red: &ReductionConfig,
    assembly: &AssemblyConfig,
) -> Result<()> {
    if norm.intensity {
        match norm.intensity_reference {
            IntensityReference::ConstValue => {
                if norm.intensity_value == 0.0 {
                    return Err(invalid("intensity normalization constant is zero"));
                }
            }
            IntensityReference::PsdRegion => {
                if norm.intensity_region.is_none() {
                    return Err(invalid(
                        "psdRegion intensity normalization requires intensity_region",
                    ));
                }
            }
            IntensityReference::MaxValue | IntensityReference::MaxValueGlobal => {}
        }
    }
    if bg.use_correction {
        match bg.mode {
            BackgroundMode::PsdRegion => {
                if bg.region.is_none() {
                    return Err(invalid("psdRegion background requires a background region"));
                }
            }
            BackgroundMode::ExtraFile => {
                let table = bg
                    .table
                    .as_ref()
                    .ok_or_else(|| invalid("extraFile background requires a table"))?;
                if table.q.len() < 2
                    || table.q.len() != table.value.len()
                    || table.q.len() != table.error.len()
                {
                    return Err(invalid("background table columns are misaligned or too short"));
                }
                if !table.q.windows(2).all(|w| w[0] < w[1]) {
                    return Err(invalid("background table Q grid must be strictly increasing"));
                }
            }
            BackgroundMode::ConstValue => {}
        }
    }
    if red.absorption && red.absorption_mode == AbsorptionMode::ConstValue && red.mu_value < 0.0 {
        return Err(invalid("absorption coefficient must be non-negative"));
    }
    if !(assembly.q_merge_tolerance >= 0.0) {
        return Err(invalid("q_merge_tolerance must be non-negative"));
    }
    Ok(())
}
