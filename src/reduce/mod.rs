//! The reduction pipeline: region selection, background subtraction,
//! normalization, reduction corrections and curve assembly.
//!
//! [`Reducer`] validates its configuration once at construction and then
//! runs scans through the stage sequence. Every stage is a pure
//! transformation over immutable inputs; the only dataset-wide state, the
//! `maxValueGlobal` intensity maximum, is an explicit pre-pass producing a
//! scalar handed into per-point normalization.

mod assemble;
mod background;
mod corrections;
mod normalize;
mod polarization;

pub use polarization::polarization_curve;

use log::debug;

use crate::config::{
    validate_reduction, AbsorptionMode, AssemblyConfig, BackgroundConfig, BackgroundMode,
    IntensityReference, NormalizationConfig, ReductionConfig,
};
use crate::curve::{CorrectionFlags, ReflectivityCurve, ReflectivityPoint};
use crate::error::{ReductionError, Result};
use crate::frame::{Scan, SpinChannel};
use crate::qspace::q_with_resolution;
use crate::region::{integrate_region, PixelBox, Region};

use normalize::Reference;
use polarization::PolarizationCorrector;

/// A value with its standard uncertainty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Measured {
    pub value: f64,
    pub sigma: f64,
}

impl Measured {
    pub(crate) fn new(value: f64, sigma: f64) -> Self {
        Self { value, sigma }
    }

    /// Multiply value and uncertainty by an exact factor.
    pub(crate) fn scale(self, factor: f64) -> Self {
        Self::new(self.value * factor, self.sigma * factor.abs())
    }

    /// Divide by an exact quantity; uncertainty scales with the value.
    pub(crate) fn div_exact(
        self,
        divisor: f64,
        stage: &'static str,
        frame: Option<usize>,
    ) -> Result<Self> {
        if divisor == 0.0 {
            return Err(ReductionError::DivisionByZero { stage, frame });
        }
        Ok(self.scale(1.0 / divisor))
    }

    /// Divide by a count-derived quantity, folding its relative uncertainty
    /// into the result in quadrature.
    pub(crate) fn div_counted(
        self,
        reference: Measured,
        stage: &'static str,
        frame: Option<usize>,
    ) -> Result<Self> {
        if reference.value == 0.0 {
            return Err(ReductionError::DivisionByZero { stage, frame });
        }
        let value = self.value / reference.value;
        let sigma = ((self.sigma / reference.value).powi(2)
            + (self.value * reference.sigma / reference.value.powi(2)).powi(2))
        .sqrt();
        Ok(Self::new(value, sigma))
    }
}

/// Per-point state threaded through the pipeline before assembly.
#[derive(Clone, Copy, Debug)]
struct WorkingPoint {
    q: f64,
    dq: f64,
    theta_deg: f64,
    value: Measured,
    raw: f64,
    corrected: f64,
    background: f64,
    flags: CorrectionFlags,
}

/// Configured reduction pipeline.
pub struct Reducer {
    region: Region,
    norm: NormalizationConfig,
    bg: BackgroundConfig,
    red: ReductionConfig,
    assembly: AssemblyConfig,
}

impl Reducer {
    /// Builds a reducer, rejecting inconsistent option combinations before
    /// any numeric work.
    pub fn new(
        region: Region,
        norm: NormalizationConfig,
        bg: BackgroundConfig,
        red: ReductionConfig,
        assembly: AssemblyConfig,
    ) -> Result<Self> {
        validate_reduction(&norm, &bg, &red, &assembly)?;
        Ok(Self {
            region,
            norm,
            bg,
            red,
            assembly,
        })
    }

    /// Reduces a single scan into an ordered reflectivity curve.
    ///
    /// Polarization correction needs every spin channel of the dataset and
    /// is only available through [`Reducer::reduce_dataset`].
    pub fn reduce_scan(&self, scan: &Scan) -> Result<ReflectivityCurve> {
        if self.red.polarization {
            return Err(ReductionError::IncompletePolarizationData {
                detail: "polarization correction requires the full spin-channel dataset"
                    .to_string(),
            });
        }
        let mut points = self.reduce_points(scan, None)?;
        self.apply_angle_corrections(scan, &mut points)?;
        Ok(self.finish_curve(scan, points))
    }

    /// Reduces a dataset of scans, running the `maxValueGlobal` pre-pass and
    /// the cross-channel polarization correction when enabled.
    pub fn reduce_dataset(&self, scans: &[Scan]) -> Result<Vec<ReflectivityCurve>> {
        let global = if self.norm.intensity
            && self.norm.intensity_reference == IntensityReference::MaxValueGlobal
        {
            self.dataset_max_intensity(scans)?
        } else {
            None
        };
        if self.red.polarization {
            return self.reduce_polarized(scans, global);
        }
        scans
            .iter()
            .map(|scan| {
                let mut points = self.reduce_points(scan, global)?;
                self.apply_angle_corrections(scan, &mut points)?;
                Ok(self.finish_curve(scan, points))
            })
            .collect()
    }

    /// Dataset-wide maximum of the raw region intensity, the explicit
    /// pre-pass feeding `maxValueGlobal` normalization.
    pub(crate) fn dataset_max_intensity(&self, scans: &[Scan]) -> Result<Option<Measured>> {
        let mut best: Option<Measured> = None;
        for scan in scans {
            if let Some(m) = self.scan_max_intensity(scan)? {
                if best.map_or(true, |b| m.value > b.value) {
                    best = Some(m);
                }
            }
        }
        Ok(best)
    }

    fn scan_max_intensity(&self, scan: &Scan) -> Result<Option<Measured>> {
        let mut best: Option<Measured> = None;
        for frame in &scan.frames {
            let bounds = self.region.resolve(&frame.counts)?;
            let sum = integrate_region(&frame.counts, &bounds, None)?;
            let m = Measured::new(sum.mean(), sum.mean_error());
            if best.map_or(true, |b| m.value > b.value) {
                best = Some(m);
            }
        }
        Ok(best)
    }

    fn resolve_reference(
        &self,
        frame_grid: &crate::frame::CountGrid,
        scan_max: Option<Measured>,
        global_max: Option<Measured>,
    ) -> Result<Option<Reference>> {
        if !self.norm.intensity {
            return Ok(None);
        }
        let reference = match self.norm.intensity_reference {
            IntensityReference::ConstValue => Reference::Constant(self.norm.intensity_value),
            IntensityReference::MaxValue => {
                Reference::Counted(scan_max.expect("scan max for non-empty scan"))
            }
            IntensityReference::MaxValueGlobal => Reference::Counted(
                global_max
                    .or(scan_max)
                    .expect("dataset max for non-empty input"),
            ),
            IntensityReference::PsdRegion => {
                // region presence is checked at config validation
                let region = self.norm.intensity_region.as_ref().expect("validated region");
                let sum = integrate_region(frame_grid, region, None)?;
                Reference::Counted(Measured::new(sum.mean(), sum.mean_error()))
            }
        };
        Ok(Some(reference))
    }

    /// Region selection, background subtraction and normalization for every
    /// frame of a scan. Reduction corrections are applied afterwards so the
    /// polarization stage can operate on multi-channel intensities.
    fn reduce_points(&self, scan: &Scan, global_max: Option<Measured>) -> Result<Vec<WorkingPoint>> {
        if scan.is_empty() {
            return Ok(Vec::new());
        }
        let needs_scan_max = self.norm.intensity
            && match self.norm.intensity_reference {
                IntensityReference::MaxValue => true,
                IntensityReference::MaxValueGlobal => global_max.is_none(),
                _ => false,
            };
        let scan_max = if needs_scan_max {
            self.scan_max_intensity(scan)?
        } else {
            None
        };

        debug!(
            "reduce: {} frames, channel {}",
            scan.len(),
            scan.channel.label()
        );
        let mut points = Vec::with_capacity(scan.len());
        for (i, frame) in scan.frames.iter().enumerate() {
            let bounds = self.region.resolve(&frame.counts)?;
            let (q, dq) = q_with_resolution(
                frame.theta_deg,
                scan.instrument.wavelength,
                &scan.instrument.slits,
                scan.instrument.dlam_rel,
            );
            let signal = integrate_region(&frame.counts, &bounds, None)?;
            let raw = Measured::new(signal.mean(), signal.mean_error());
            let bg = background::estimate_background(&frame.counts, &self.bg, &bounds, q)?;
            let net = Measured::new(
                raw.value - bg.value,
                (raw.sigma.powi(2) + bg.sigma.powi(2)).sqrt(),
            );

            let reference = self.resolve_reference(&frame.counts, scan_max, global_max)?;
            let value = normalize::normalize_point(net, frame, i, &self.norm, reference)?;

            let flags = CorrectionFlags {
                background_subtracted: self.bg.use_correction,
                time_normalized: self.norm.time,
                monitor_normalized: self.norm.monitor,
                intensity_normalized: self.norm.intensity,
                ..Default::default()
            };
            points.push(WorkingPoint {
                q,
                dq,
                theta_deg: frame.theta_deg,
                value,
                raw: raw.value,
                corrected: value.value,
                background: bg.value,
                flags,
            });
        }
        Ok(points)
    }

    /// Footprint and absorption factors, folded into the scalar value after
    /// any polarization unmixing.
    fn apply_angle_corrections(&self, scan: &Scan, points: &mut [WorkingPoint]) -> Result<()> {
        let mu = match self.red.absorption_mode {
            AbsorptionMode::ConstValue => self.red.mu_value,
            AbsorptionMode::Typical => self.red.substrate.mu(),
        };
        for (i, point) in points.iter_mut().enumerate() {
            if self.red.footprint {
                let factor = corrections::footprint_factor(
                    point.theta_deg,
                    &scan.instrument.slits,
                    scan.sample.length,
                    i,
                )?;
                point.value = point.value.scale(factor);
                point.flags.footprint_corrected = true;
            }
            if self.red.absorption {
                let factor = corrections::absorption_factor(
                    point.theta_deg,
                    scan.instrument.wavelength,
                    mu,
                    &scan.sample,
                );
                point.value = point.value.scale(factor);
                point.flags.absorption_corrected = true;
            }
        }
        Ok(())
    }

    fn reduce_polarized(
        &self,
        scans: &[Scan],
        global: Option<Measured>,
    ) -> Result<Vec<ReflectivityCurve>> {
        let find = |channel: SpinChannel| scans.iter().position(|s| s.channel == channel);
        let four = [
            SpinChannel::UpUp,
            SpinChannel::UpDown,
            SpinChannel::DownUp,
            SpinChannel::DownDown,
        ];
        let two = [SpinChannel::Up, SpinChannel::Down];

        let members: Vec<usize> = if four.iter().all(|c| find(*c).is_some()) {
            four.iter().map(|c| find(*c).unwrap()).collect()
        } else if two.iter().all(|c| find(*c).is_some()) {
            two.iter().map(|c| find(*c).unwrap()).collect()
        } else {
            let present: Vec<&str> = scans.iter().map(|s| s.channel.label()).collect();
            return Err(ReductionError::IncompletePolarizationData {
                detail: format!(
                    "need channels up/down or all four analyzed states, found [{}]",
                    present.join(", ")
                ),
            });
        };

        // fails on degenerate efficiencies before any per-point work
        let corrector = PolarizationCorrector::new(&scans[members[0]].instrument.efficiency)?;

        let mut member_points: Vec<Vec<WorkingPoint>> = Vec::with_capacity(members.len());
        for &idx in &members {
            member_points.push(self.reduce_points(&scans[idx], global)?);
        }
        let n = member_points[0].len();
        if member_points.iter().any(|p| p.len() != n) {
            return Err(ReductionError::IncompletePolarizationData {
                detail: "spin channels have different numbers of scan points".to_string(),
            });
        }
        for i in 0..n {
            let q0 = member_points[0][i].q;
            if member_points
                .iter()
                .any(|pts| (pts[i].q - q0).abs() > q0.abs().max(1e-12) * 1e-6)
            {
                return Err(ReductionError::IncompletePolarizationData {
                    detail: format!("spin channels diverge in q at point {i}"),
                });
            }
            if members.len() == 2 {
                let unmixed = corrector.correct_two([
                    member_points[0][i].value,
                    member_points[1][i].value,
                ]);
                for (k, m) in unmixed.into_iter().enumerate() {
                    member_points[k][i].value = m;
                    member_points[k][i].flags.polarization_corrected = true;
                }
            } else {
                let unmixed = corrector.correct_four([
                    member_points[0][i].value,
                    member_points[1][i].value,
                    member_points[2][i].value,
                    member_points[3][i].value,
                ]);
                for (k, m) in unmixed.into_iter().enumerate() {
                    member_points[k][i].value = m;
                    member_points[k][i].flags.polarization_corrected = true;
                }
            }
        }

        let mut curves = Vec::with_capacity(scans.len());
        for (idx, scan) in scans.iter().enumerate() {
            let mut points = match members.iter().position(|&m| m == idx) {
                Some(slot) => std::mem::take(&mut member_points[slot]),
                // channels outside the spin set reduce without unmixing
                None => self.reduce_points(scan, global)?,
            };
            self.apply_angle_corrections(scan, &mut points)?;
            curves.push(self.finish_curve(scan, points));
        }
        Ok(curves)
    }

    fn finish_curve(&self, scan: &Scan, points: Vec<WorkingPoint>) -> ReflectivityCurve {
        let assembled = assemble::assemble(
            points
                .into_iter()
                .map(|p| ReflectivityPoint {
                    q: p.q,
                    dq: p.dq,
                    r: p.value.value,
                    dr: p.value.sigma,
                    intensity_raw: p.raw,
                    intensity_corrected: p.corrected,
                    background: p.background,
                    flags: p.flags,
                })
                .collect(),
            self.assembly.q_merge_tolerance,
        );
        ReflectivityCurve {
            channel: Some(scan.channel),
            points: assembled,
            corrections: self.provenance(scan),
        }
    }

    /// Human-readable correction listing recorded on every reduced curve.
    fn provenance(&self, scan: &Scan) -> Vec<String> {
        let mut list = vec![match &self.region {
            Region::Named(name) => format!("collect intensity from detector '{name}'"),
            Region::Pixels(b) => format!("collect intensity from region {}", fmt_box(b)),
        }];
        if self.red.footprint {
            list.push("footprint correction with trapezoidal beam".to_string());
        }
        if self.red.polarization {
            list.push("polarization correction with efficiency matrix inversion".to_string());
        }
        if self.red.absorption {
            match self.red.absorption_mode {
                AbsorptionMode::ConstValue => {
                    list.push(format!("absorption correction with mu = {}", self.red.mu_value));
                }
                AbsorptionMode::Typical => list.push(format!(
                    "absorption correction with mu({:?}) = {}",
                    self.red.substrate,
                    self.red.substrate.mu()
                )),
            }
        }
        if self.norm.time {
            list.push("time normalization".to_string());
        }
        if self.norm.monitor {
            list.push("monitor counts normalization".to_string());
        }
        if self.norm.intensity {
            let detail = match self.norm.intensity_reference {
                IntensityReference::ConstValue => {
                    format!("constant value {}", self.norm.intensity_value)
                }
                IntensityReference::MaxValue => "maximum intensity of the scan".to_string(),
                IntensityReference::MaxValueGlobal => {
                    "maximum intensity of the dataset".to_string()
                }
                IntensityReference::PsdRegion => format!(
                    "reference region {}",
                    self.norm
                        .intensity_region
                        .as_ref()
                        .map(fmt_box)
                        .unwrap_or_default()
                ),
            };
            list.push(format!("intensity normalization by {detail}"));
        }
        if self.bg.use_correction {
            let detail = match self.bg.mode {
                BackgroundMode::ConstValue => format!("constant value {}", self.bg.value),
                BackgroundMode::PsdRegion => format!(
                    "PSD region {}",
                    self.bg.region.as_ref().map(fmt_box).unwrap_or_default()
                ),
                BackgroundMode::ExtraFile => "per-q background table".to_string(),
            };
            list.push(format!("background correction with {detail}"));
        }
        list.push(format!(
            "q from incident angle and wavelength; dq from slit geometry with dlam/lam = {:.1}%",
            scan.instrument.dlam_rel * 100.0
        ));
        list.push("dr propagated from Poisson counting statistics".to_string());
        list
    }
}

fn fmt_box(b: &PixelBox) -> String {
    format!(
        "y=[{},{}] x=[{},{}]",
        b.y_min, b.y_max, b.x_min, b.x_max
    )
}
