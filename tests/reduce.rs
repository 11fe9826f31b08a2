mod common;

use common::synthetic_scan::{
    default_theory, scan_from_theory, signal_region, thetas, WAVELENGTH,
};
use refl_reducer::config::{
    AssemblyConfig, BackgroundConfig, BackgroundMode, IntensityReference, NormalizationConfig,
    ReductionConfig,
};
use refl_reducer::frame::SpinChannel;
use refl_reducer::qspace::theta_lambda_to_q;
use refl_reducer::region::PixelBox;
use refl_reducer::{polarization_curve, Reducer, ReductionError, Region};

fn passthrough_norm() -> NormalizationConfig {
    NormalizationConfig {
        time: false,
        monitor: false,
        intensity: false,
        ..Default::default()
    }
}

fn no_background() -> BackgroundConfig {
    BackgroundConfig {
        use_correction: false,
        ..Default::default()
    }
}

fn no_corrections() -> ReductionConfig {
    ReductionConfig {
        footprint: false,
        absorption: false,
        polarization: false,
        ..Default::default()
    }
}

fn passthrough_reducer() -> Reducer {
    Reducer::new(
        Region::Pixels(signal_region()),
        passthrough_norm(),
        no_background(),
        no_corrections(),
        AssemblyConfig::default(),
    )
    .unwrap()
}

#[test]
fn passthrough_reduction_reproduces_the_theory_curve() {
    let _ = env_logger::builder().is_test(true).try_init();
    let theory = default_theory();
    let scan = scan_from_theory(&theory, SpinChannel::Unpolarized, 40, 1.0, 0.0);
    let curve = passthrough_reducer().reduce_scan(&scan).unwrap();

    assert_eq!(curve.len(), 40);
    assert!(curve.is_sorted());
    for (point, theta) in curve.iter().zip(thetas(40)) {
        let q = theta_lambda_to_q(theta, WAVELENGTH);
        assert!((point.q - q).abs() < 1e-12);
        assert!(
            (point.r - theory.evaluate(q)).abs() < 1e-9,
            "r mismatch at q={q}: {} vs {}",
            point.r,
            theory.evaluate(q)
        );
        assert!(point.dq > 0.0);
        assert!(!point.flags.time_normalized);
    }
}

#[test]
fn empty_scan_reduces_to_an_empty_curve() {
    let theory = default_theory();
    let mut scan = scan_from_theory(&theory, SpinChannel::Unpolarized, 5, 1.0, 0.0);
    scan.frames.clear();
    let curve = passthrough_reducer().reduce_scan(&scan).unwrap();
    assert!(curve.is_empty());
}

#[test]
fn zero_monitor_frame_aborts_with_division_error() {
    let theory = default_theory();
    let mut scan = scan_from_theory(&theory, SpinChannel::Unpolarized, 10, 1.0, 0.0);
    scan.frames[3].monitor = 0.0;
    let reducer = Reducer::new(
        Region::Pixels(signal_region()),
        NormalizationConfig {
            time: false,
            intensity: false,
            ..Default::default()
        },
        no_background(),
        no_corrections(),
        AssemblyConfig::default(),
    )
    .unwrap();
    assert_eq!(
        reducer.reduce_scan(&scan).unwrap_err(),
        ReductionError::DivisionByZero {
            stage: "monitor normalization",
            frame: Some(3),
        }
    );
}

#[test]
fn psd_background_subtraction_recovers_the_signal() {
    let theory = default_theory();
    let flat = 5.0;
    let scan = scan_from_theory(&theory, SpinChannel::Unpolarized, 30, 1.0, flat);
    let reducer = Reducer::new(
        Region::Pixels(signal_region()),
        passthrough_norm(),
        BackgroundConfig {
            use_correction: true,
            mode: BackgroundMode::PsdRegion,
            region: Some(PixelBox::new(0, 15, 0, 15)),
            ..Default::default()
        },
        no_corrections(),
        AssemblyConfig::default(),
    )
    .unwrap();
    let curve = reducer.reduce_scan(&scan).unwrap();
    for (point, theta) in curve.iter().zip(thetas(30)) {
        let q = theta_lambda_to_q(theta, WAVELENGTH);
        assert!(
            (point.r - theory.evaluate(q)).abs() < 1e-9,
            "background leak at q={q}"
        );
        assert!((point.background - flat).abs() < 1e-9);
        assert!(point.flags.background_subtracted);
    }
}

#[test]
fn zero_background_leaves_the_curve_unchanged() {
    let theory = default_theory();
    let scan = scan_from_theory(&theory, SpinChannel::Unpolarized, 20, 1.0, 0.0);
    let plain = passthrough_reducer().reduce_scan(&scan).unwrap();
    let reducer = Reducer::new(
        Region::Pixels(signal_region()),
        passthrough_norm(),
        BackgroundConfig {
            use_correction: true,
            value: 0.0,
            ..Default::default()
        },
        no_corrections(),
        AssemblyConfig::default(),
    )
    .unwrap();
    let with_zero_bg = reducer.reduce_scan(&scan).unwrap();
    for (a, b) in plain.iter().zip(with_zero_bg.iter()) {
        assert_eq!(a.r, b.r);
        assert_eq!(a.dr, b.dr);
    }
}

#[test]
fn max_value_global_normalizes_by_the_dataset_maximum() {
    let theory = default_theory();
    let dim = scan_from_theory(&theory, SpinChannel::Unpolarized, 30, 100.0, 0.0);
    let bright = scan_from_theory(&theory, SpinChannel::Unpolarized, 30, 200.0, 0.0);
    let reducer = Reducer::new(
        Region::Pixels(signal_region()),
        NormalizationConfig {
            time: false,
            monitor: false,
            intensity: true,
            intensity_reference: IntensityReference::MaxValueGlobal,
            ..Default::default()
        },
        no_background(),
        no_corrections(),
        AssemblyConfig::default(),
    )
    .unwrap();
    let curves = reducer.reduce_dataset(&[dim, bright]).unwrap();
    let max_r = |c: &refl_reducer::ReflectivityCurve| {
        c.iter().map(|p| p.r).fold(f64::NEG_INFINITY, f64::max)
    };
    // both scans share the dataset-wide reference, so the dim scan tops
    // out at half the bright one
    assert!((max_r(&curves[1]) - 1.0).abs() < 1e-6);
    assert!((max_r(&curves[0]) - 0.5).abs() < 1e-6);
}

#[test]
fn polarization_correction_requires_the_spin_channels() {
    let theory = default_theory();
    let scan = scan_from_theory(&theory, SpinChannel::Up, 10, 1.0, 0.0);
    let reducer = Reducer::new(
        Region::Pixels(signal_region()),
        passthrough_norm(),
        no_background(),
        ReductionConfig {
            footprint: false,
            absorption: false,
            polarization: true,
            ..Default::default()
        },
        AssemblyConfig::default(),
    )
    .unwrap();
    assert!(matches!(
        reducer.reduce_scan(&scan),
        Err(ReductionError::IncompletePolarizationData { .. })
    ));
    assert!(matches!(
        reducer.reduce_dataset(std::slice::from_ref(&scan)),
        Err(ReductionError::IncompletePolarizationData { .. })
    ));
}

#[test]
fn polarized_dataset_yields_a_polarization_curve() {
    let _ = env_logger::builder().is_test(true).try_init();
    let theory = default_theory();
    // 35 points keep every q below the cutoff so the ratio stays defined
    let up = scan_from_theory(&theory, SpinChannel::Up, 35, 100.0, 0.0);
    let down = scan_from_theory(&theory, SpinChannel::Down, 35, 2.0, 0.0);
    let reducer = Reducer::new(
        Region::Pixels(signal_region()),
        passthrough_norm(),
        no_background(),
        ReductionConfig {
            footprint: false,
            absorption: false,
            polarization: true,
            ..Default::default()
        },
        AssemblyConfig::default(),
    )
    .unwrap();
    let curves = reducer.reduce_dataset(&[up, down]).unwrap();
    assert!(curves[0].points.iter().all(|p| p.flags.polarization_corrected));

    let pol = polarization_curve(&curves[0], &curves[1]).unwrap();
    let expected = (100.0 - 2.0) / (100.0 + 2.0);
    for p in pol.iter() {
        assert!((p.r - expected).abs() < 1e-9, "P mismatch at q={}", p.q);
    }
}

#[test]
fn provenance_lists_the_applied_corrections() {
    let theory = default_theory();
    let scan = scan_from_theory(&theory, SpinChannel::Unpolarized, 10, 1.0, 0.0);
    let reducer = Reducer::new(
        Region::Pixels(signal_region()),
        NormalizationConfig::default(),
        BackgroundConfig::default(),
        ReductionConfig::default(),
        AssemblyConfig::default(),
    )
    .unwrap();
    let curve = reducer.reduce_scan(&scan).unwrap();
    let text = curve.corrections.join("\n");
    assert!(text.contains("collect intensity from region"));
    assert!(text.contains("footprint"));
    assert!(text.contains("monitor"));
    assert!(text.contains("background"));
}
