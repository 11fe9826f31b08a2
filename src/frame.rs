//! Owned detector data model: 2D count grids, scan-point frames and scans.
//!
//! A [`CountGrid`] is a row-major f64 buffer (stride == width) suited for
//! summing raw counts. A [`DetectorFrame`] couples one grid with the
//! acquisition metadata of the scan point it belongs to. A [`Scan`] is the
//! ordered frame sequence of one spin channel, sharing instrument settings.

use serde::{Deserialize, Serialize};

/// Owned single-channel count buffer in row-major layout.
#[derive(Clone, Debug)]
pub struct CountGrid {
    /// Grid width in pixels
    pub w: usize,
    /// Grid height in pixels
    pub h: usize,
    /// Number of elements between consecutive rows (equals `w`)
    pub stride: usize,
    /// Backing storage in row-major order
    pub data: Vec<f64>,
}

impl CountGrid {
    /// Construct a zero-initialized grid of size `w × h`.
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            stride: w,
            data: vec![0.0; w * h],
        }
    }

    #[inline]
    /// Convert (x, y) to a linear index into `data`.
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.stride + x
    }

    #[inline]
    /// Get the count value at (x, y).
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[self.idx(x, y)]
    }

    #[inline]
    /// Set the count value at (x, y).
    pub fn set(&mut self, x: usize, y: usize, v: f64) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    #[inline]
    /// Borrow one row of counts.
    pub fn row(&self, y: usize) -> &[f64] {
        let start = y * self.stride;
        &self.data[start..start + self.w]
    }
}

/// One scan point: raw detector counts plus acquisition metadata.
///
/// Immutable once loaded; the pipeline borrows frames read-only.
#[derive(Clone, Debug)]
pub struct DetectorFrame {
    /// Raw detector counts.
    pub counts: CountGrid,
    /// Acquisition time in seconds.
    pub time: f64,
    /// Monitor counts accumulated during the acquisition.
    pub monitor: f64,
    /// Incident angle in degrees.
    pub theta_deg: f64,
}

impl DetectorFrame {
    /// Frame with zeroed counts, useful for synthetic data.
    pub fn new(w: usize, h: usize, time: f64, monitor: f64, theta_deg: f64) -> Self {
        Self {
            counts: CountGrid::new(w, h),
            time,
            monitor,
            theta_deg,
        }
    }
}

/// Measured spin state of one scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpinChannel {
    Unpolarized,
    /// Polarizer arm only, flipper off.
    Up,
    /// Polarizer arm only, flipper on.
    Down,
    /// Polarizer and analyzer arms, both flippers off.
    UpUp,
    /// Polarizer off, analyzer flipper on.
    UpDown,
    /// Polarizer flipper on, analyzer off.
    DownUp,
    /// Both flippers on.
    DownDown,
}

impl SpinChannel {
    /// Short label used in provenance listings and reports.
    pub fn label(&self) -> &'static str {
        match self {
            SpinChannel::Unpolarized => "unpolarized",
            SpinChannel::Up => "up",
            SpinChannel::Down => "down",
            SpinChannel::UpUp => "up-up",
            SpinChannel::UpDown => "up-down",
            SpinChannel::DownUp => "down-up",
            SpinChannel::DownDown => "down-down",
        }
    }
}

/// Two-slit collimation geometry, all lengths in mm.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SlitGeometry {
    pub slit1_width: f64,
    pub slit2_width: f64,
    /// Distance of slit 1 from the sample (sign follows beamline convention).
    pub slit1_position: f64,
    /// Distance of slit 2 from the sample.
    pub slit2_position: f64,
}

/// Sample dimensions relevant to footprint and absorption, in mm.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SampleGeometry {
    pub length: f64,
    pub thickness: f64,
}

/// Polarizer/analyzer arm efficiencies, all in [0, 1] with 1 == ideal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PolarizationEfficiency {
    pub polarizer: f64,
    pub analyzer: f64,
    pub spin_flipper_1: f64,
    pub spin_flipper_2: f64,
}

impl Default for PolarizationEfficiency {
    fn default() -> Self {
        Self {
            polarizer: 1.0,
            analyzer: 1.0,
            spin_flipper_1: 1.0,
            spin_flipper_2: 1.0,
        }
    }
}

/// Instrument settings shared by every frame of a scan.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct InstrumentSettings {
    /// Wavelength in Angstrom.
    pub wavelength: f64,
    /// Relative wavelength spread Δλ/λ.
    pub dlam_rel: f64,
    pub slits: SlitGeometry,
    pub efficiency: PolarizationEfficiency,
}

/// Ordered frame sequence of one spin channel.
#[derive(Clone, Debug)]
pub struct Scan {
    pub channel: SpinChannel,
    pub frames: Vec<DetectorFrame>,
    pub instrument: InstrumentSettings,
    pub sample: SampleGeometry,
}

impl Scan {
    /// Number of scan points.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
