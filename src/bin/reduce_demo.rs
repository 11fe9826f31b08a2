//! Reduces a synthetic scan with a configurable pipeline and dumps the
//! resulting curve as text and/or JSON.

use refl_reducer::config::{AssemblyConfig, BackgroundConfig, NormalizationConfig, ReductionConfig};
use refl_reducer::frame::{
    DetectorFrame, InstrumentSettings, PolarizationEfficiency, SampleGeometry, Scan,
    SlitGeometry, SpinChannel,
};
use refl_reducer::io::{save_curve, write_json_file};
use refl_reducer::qspace::{theta_lambda_to_q, WAVELENGTH_RESOLUTION};
use refl_reducer::region::PixelBox;
use refl_reducer::spec::SpecificationCurve;
use refl_reducer::{Reducer, Region};

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Default, Deserialize)]
struct OutputConfig {
    curve_out: Option<PathBuf>,
    json_out: Option<PathBuf>,
}

#[derive(Clone, Deserialize)]
struct DemoConfig {
    output: OutputConfig,
    region: Region,
    normalization: NormalizationConfig,
    background: BackgroundConfig,
    reduction: ReductionConfig,
    assembly: AssemblyConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            region: Region::Pixels(PixelBox::new(24, 39, 24, 39)),
            normalization: NormalizationConfig::default(),
            background: BackgroundConfig::default(),
            reduction: ReductionConfig::default(),
            assembly: AssemblyConfig::default(),
        }
    }
}

fn load_config(path: &Path) -> Result<DemoConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

/// Scan whose signal region follows an ideal supermirror curve.
fn synthetic_scan() -> Scan {
    let theory = SpecificationCurve {
        m_ref: 0.02,
        r_ref: 1.0,
        m_max: 0.1,
        alpha: 3.0,
    };
    let wavelength = 4.5;
    let monitor = 1e6;
    let frames = (1..=60)
        .map(|i| {
            let theta = 0.05 * i as f64;
            let q = theta_lambda_to_q(theta, wavelength);
            let mut frame = DetectorFrame::new(64, 64, 10.0, monitor, theta);
            let level = theory.evaluate(q) * 100.0;
            for y in 24..40 {
                for x in 24..40 {
                    frame.counts.set(x, y, level);
                }
            }
            frame
        })
        .collect();
    Scan {
        channel: SpinChannel::Unpolarized,
        frames,
        instrument: InstrumentSettings {
            wavelength,
            dlam_rel: WAVELENGTH_RESOLUTION,
            slits: SlitGeometry {
                slit1_width: 1.0,
                slit2_width: 0.5,
                slit1_position: -2000.0,
                slit2_position: -200.0,
            },
            efficiency: PolarizationEfficiency::default(),
        },
        sample: SampleGeometry {
            length: 50.0,
            thickness: 5.0,
        },
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config = match env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => DemoConfig::default(),
    };

    let reducer = Reducer::new(
        config.region.clone(),
        config.normalization.clone(),
        config.background.clone(),
        config.reduction.clone(),
        config.assembly.clone(),
    )
    .map_err(|e| e.to_string())?;

    let scan = synthetic_scan();
    let curve = reducer.reduce_scan(&scan).map_err(|e| e.to_string())?;

    println!("reduced {} points", curve.len());
    for line in &curve.corrections {
        println!("  - {line}");
    }
    if let Some((first, last)) = curve.points.first().zip(curve.points.last()) {
        println!(
            "q range [{:.4}, {:.4}], r range [{:.3e}, {:.3e}]",
            first.q, last.q, last.r, first.r
        );
    }

    if let Some(path) = &config.output.curve_out {
        save_curve(path, &curve)?;
        println!("curve written to {}", path.display());
    }
    if let Some(path) = &config.output.json_out {
        write_json_file(path, &curve)?;
        println!("JSON curve written to {}", path.display());
    }
    Ok(())
}
