//! Validates a reduced curve dump against specification limits and prints
//! the compliance report.

use refl_reducer::config::SpecConfig;
use refl_reducer::io::{load_curve, write_json_file};
use refl_reducer::validate;

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Deserialize)]
struct ReportConfig {
    curve: PathBuf,
    polarization: Option<PathBuf>,
    spec: SpecConfig,
    json_out: Option<PathBuf>,
}

fn load_config(path: &Path) -> Result<ReportConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let program = env::args().next().unwrap_or_else(|| "spec_report".to_string());
    let config_path = env::args()
        .nth(1)
        .ok_or_else(|| format!("usage: {program} <config.json>"))?;
    let config = load_config(Path::new(&config_path))?;

    let curve = load_curve(&config.curve)?;
    let polarization = config
        .polarization
        .as_ref()
        .map(|p| load_curve(p))
        .transpose()?;

    let report =
        validate(&curve, polarization.as_ref(), &config.spec).map_err(|e| e.to_string())?;

    println!(
        "evaluation: {}",
        if report.overall_pass { "Accepted" } else { "Rejected" }
    );
    println!(
        "  reflectivity in spec: {} (max deviation {:?})",
        report.ref_in_spec, report.max_deviation
    );
    println!(
        "  alpha = {:.4}{}",
        report.alpha,
        if report.alpha_fitted { " (fitted)" } else { " (fixed)" }
    );
    if report.use_polarization {
        println!(
            "  polarization in spec: {} (min {:?}, avg {:?})",
            report.pol_in_spec, report.p_min, report.p_avg
        );
    }
    let failing = report.points.iter().filter(|p| !p.pass).count();
    println!("  {} of {} points outside the envelope", failing, report.points.len());

    if let Some(path) = &config.json_out {
        write_json_file(path, &report)?;
        println!("JSON report written to {}", path.display());
    }
    Ok(())
}
