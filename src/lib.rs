#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod config;
pub mod curve;
pub mod error;
pub mod frame;
pub mod io;
pub mod region;
pub mod spec;

// Lower-level modules, public for tools and advanced users.
pub mod qspace;
pub mod reduce;

// --- High-level re-exports -------------------------------------------------

// Main entry points: reduction pipeline + compliance engine.
pub use crate::error::{ReductionError, Result};
pub use crate::reduce::{polarization_curve, Reducer};
pub use crate::spec::{fit_alpha, validate, AlphaFit, ComplianceReport, SpecificationCurve};

pub use crate::config::{
    AssemblyConfig, BackgroundConfig, NormalizationConfig, ReductionConfig, SpecConfig,
};
pub use crate::curve::{ReflectivityCurve, ReflectivityPoint};
pub use crate::frame::{DetectorFrame, Scan, SpinChannel};
pub use crate::region::{PixelBox, Region};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
pub mod prelude {
    pub use crate::config::{
        AssemblyConfig, BackgroundConfig, NormalizationConfig, ReductionConfig, SpecConfig,
    };
    pub use crate::curve::ReflectivityCurve;
    pub use crate::frame::{DetectorFrame, Scan, SpinChannel};
    pub use crate::region::{PixelBox, Region};
    pub use crate::{fit_alpha, polarization_curve, validate, Reducer};
}
