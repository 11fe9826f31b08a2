//! Curve assembly: Q-ordering and duplicate-point merging.

use std::cmp::Ordering;

use crate::curve::ReflectivityPoint;

// Guards 1/dr² weights when a synthetic point carries zero uncertainty;
// equal uncertainties still merge to the arithmetic mean.
const MIN_SIGMA: f64 = 1e-150;

/// Sorts points by Q and merges groups closer than `q_tolerance` by
/// inverse-variance-weighted averaging.
///
/// dQ of a merged point stays resolution-derived (weighted combination of
/// the inputs), never re-derived from the merge scatter. Empty input yields
/// an empty output.
pub(crate) fn assemble(mut points: Vec<ReflectivityPoint>, q_tolerance: f64) -> Vec<ReflectivityPoint> {
    points.sort_by(|a, b| a.q.partial_cmp(&b.q).unwrap_or(Ordering::Equal));

    let mut out: Vec<ReflectivityPoint> = Vec::with_capacity(points.len());
    let mut group: Vec<ReflectivityPoint> = Vec::new();
    for point in points {
        match group.first() {
            Some(first) if (point.q - first.q).abs() <= q_tolerance => group.push(point),
            Some(_) => {
                out.push(merge_group(&group));
                group.clear();
                group.push(point);
            }
            None => group.push(point),
        }
    }
    if !group.is_empty() {
        out.push(merge_group(&group));
    }
    out
}

fn merge_group(group: &[ReflectivityPoint]) -> ReflectivityPoint {
    if group.len() == 1 {
        return group[0];
    }
    let mut weight_sum = 0.0;
    let mut q = 0.0;
    let mut dq = 0.0;
    let mut r = 0.0;
    let mut raw = 0.0;
    let mut corrected = 0.0;
    let mut background = 0.0;
    for p in group {
        let w = 1.0 / p.dr.max(MIN_SIGMA).powi(2);
        weight_sum += w;
        q += w * p.q;
        dq += w * p.dq;
        r += w * p.r;
        raw += w * p.intensity_raw;
        corrected += w * p.intensity_corrected;
        background += w * p.background;
    }
    ReflectivityPoint {
        q: q / weight_sum,
        dq: dq / weight_sum,
        r: r / weight_sum,
        dr: (1.0 / weight_sum).sqrt(),
        intensity_raw: raw / weight_sum,
        intensity_corrected: corrected / weight_sum,
        background: background / weight_sum,
        flags: group[0].flags,
    }
}
