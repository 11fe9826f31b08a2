//! Error taxonomy shared by the reduction pipeline and the compliance engine.
//!
//! Every failure carries the offending stage or input so a caller can report
//! which frame or option broke a run. Specification violations are not errors;
//! they are fields of [`ComplianceReport`](crate::spec::ComplianceReport).

/// Reasons a reduction or validation run may fail.
#[derive(Clone, Debug, PartialEq)]
pub enum ReductionError {
    /// Region bounds are degenerate or outside the detector frame.
    InvalidRegion {
        y_min: usize,
        y_max: usize,
        x_min: usize,
        x_max: usize,
        frame_w: usize,
        frame_h: usize,
    },
    /// A normalization divisor (time, monitor, intensity reference) is zero.
    DivisionByZero {
        stage: &'static str,
        frame: Option<usize>,
    },
    /// Background-table lookup outside the table's Q range.
    BackgroundRange { q: f64, q_min: f64, q_max: f64 },
    /// Polarization correction requested with spin-state channels missing
    /// or misaligned.
    IncompletePolarizationData { detail: String },
    /// The alpha fit ran out of usable points or iterations.
    FitDidNotConverge { iterations: usize, points: usize },
    /// Inconsistent configuration, rejected before any numeric work.
    ConfigValidation { message: String },
}

impl std::fmt::Display for ReductionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReductionError::InvalidRegion {
                y_min,
                y_max,
                x_min,
                x_max,
                frame_w,
                frame_h,
            } => write!(
                f,
                "invalid region y=[{y_min},{y_max}] x=[{x_min},{x_max}] for {frame_w}x{frame_h} frame"
            ),
            ReductionError::DivisionByZero { stage, frame } => match frame {
                Some(i) => write!(f, "division by zero in {stage} (frame {i})"),
                None => write!(f, "division by zero in {stage}"),
            },
            ReductionError::BackgroundRange { q, q_min, q_max } => write!(
                f,
                "background lookup at q={q:.6} outside table range [{q_min:.6}, {q_max:.6}]"
            ),
            ReductionError::IncompletePolarizationData { detail } => {
                write!(f, "incomplete polarization data: {detail}")
            }
            ReductionError::FitDidNotConverge { iterations, points } => write!(
                f,
                "alpha fit did not converge ({points} points, {iterations} iterations)"
            ),
            ReductionError::ConfigValidation { message } => {
                write!(f, "configuration error: {message}")
            }
        }
    }
}

impl std::error::Error for ReductionError {}

pub type Result<T> = std::result::Result<T, ReductionError>;
