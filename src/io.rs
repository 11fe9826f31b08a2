//! I/O helpers for the demo binaries: JSON reports and a minimal
//! four-column `.ort`-style curve dump.
//!
//! Instrument raw-file parsing and full ORSO serialization live outside the
//! crate; these helpers exist so the pipeline can be exercised end-to-end.

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::curve::{ReflectivityCurve, ReflectivityPoint};

/// Pretty-print a serializable value to disk as JSON.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize JSON: {e}"))?;
    fs::write(path, json).map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

/// Write a curve as `# `-commented header lines followed by
/// `Q dQ R dR` columns.
pub fn save_curve(path: &Path, curve: &ReflectivityCurve) -> Result<(), String> {
    let mut out = String::new();
    for line in &curve.corrections {
        out.push_str("# ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("# Q dQ R dR\n");
    for p in curve.iter() {
        out.push_str(&format!("{:.8e} {:.8e} {:.8e} {:.8e}\n", p.q, p.dq, p.r, p.dr));
    }
    fs::write(path, out).map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

/// Load a four-column curve dump written by [`save_curve`].
pub fn load_curve(path: &Path) -> Result<ReflectivityCurve, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let mut curve = ReflectivityCurve::default();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            curve.corrections.push(comment.trim().to_string());
            continue;
        }
        let cols: Vec<f64> = line
            .split_whitespace()
            .map(|c| c.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("{}:{}: {e}", path.display(), lineno + 1))?;
        if cols.len() != 4 {
            return Err(format!(
                "{}:{}: expected 4 columns, found {}",
                path.display(),
                lineno + 1,
                cols.len()
            ));
        }
        curve.points.push(ReflectivityPoint {
            q: cols[0],
            dq: cols[1],
            r: cols[2],
            dr: cols[3],
            intensity_raw: cols[2],
            intensity_corrected: cols[2],
            background: 0.0,
            flags: Default::default(),
        });
    }
    Ok(curve)
}
