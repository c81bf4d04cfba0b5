//! End-to-end spectral learning on a known linear system.

use nalgebra::{DMatrix, DVector};

use engram_core::config::LearnerConfig;
use engram_core::models::{ActivationSnapshot, ActivationTrace};
use engram_core::params::ProcessingParameters;
use engram_core::activation::ConceptActivation;
use engram_spectral::{ModeQuery, SpectralEngine};

/// Drive u_{k+1} = T A T^-1 u_k where A is block-diagonal with
/// eigenvalues {0.9, 0.95 e^{+-i pi/8}, 1.0}; the similarity transform T
/// shifts the trajectory into [0, 1] so it fits activation strengths
/// without touching the eigenvalues. The constant unit component rides
/// along as a |lambda| = 1 bias mode.
fn known_system_trace(steps: usize, sampling_rate_hz: f64) -> ActivationTrace {
    let theta: f64 = std::f64::consts::PI / 8.0;
    let r = 0.95;
    // Augmented A over [x1, x2, x3, bias].
    let a: DMatrix<f64> = DMatrix::from_row_slice(
        4,
        4,
        &[
            0.9, 0.0, 0.0, 0.0,
            0.0, r * theta.cos(), -r * theta.sin(), 0.0,
            0.0, r * theta.sin(), r * theta.cos(), 0.0,
            0.0, 0.0, 0.0, 1.0,
        ],
    );
    // u = 0.25 x + 0.5 bias keeps every component in [0, 1].
    let mut y: DVector<f64> = DVector::from_vec(vec![1.0, 0.8, -0.5, 1.0]);

    let mut snapshots = Vec::new();
    let dt = 1.0 / sampling_rate_hz;
    for k in 0..steps {
        let strengths: Vec<f64> = (0..3)
            .map(|i| (0.25 * y[i] + 0.5).clamp(0.0, 1.0))
            .chain(std::iter::once(y[3].clamp(0.0, 1.0)))
            .collect();
        snapshots.push(ActivationSnapshot {
            relative_time_secs: k as f64 * dt,
            activation: ConceptActivation::SparseIdsWithStrengths {
                active: vec![10, 11, 12, 13],
                strengths,
            },
            transition: false,
            local_lyapunov: 0.0,
        });
        y = &a * &y;
    }
    ActivationTrace {
        snapshots,
        sampling_rate_hz,
        source: "synthetic".into(),
    }
}

#[test]
fn recovers_known_eigenvalues_and_frequencies() {
    let mut engine = SpectralEngine::new(LearnerConfig::default());
    let trace = known_system_trace(60, 2.0);
    let dt = trace.dt();
    engine
        .process(&[trace], &ProcessingParameters::default())
        .unwrap();

    let modes = engine.query_modes(&ModeQuery::default());
    let decay = modes
        .iter()
        .min_by(|a, b| {
            (a.magnitude() - 0.9)
                .abs()
                .partial_cmp(&(b.magnitude() - 0.9).abs())
                .unwrap()
        })
        .unwrap();
    let oscillating = modes
        .iter()
        .min_by(|a, b| {
            (a.magnitude() - 0.95)
                .abs()
                .partial_cmp(&(b.magnitude() - 0.95).abs())
                .unwrap()
        })
        .unwrap();

    assert!((decay.magnitude() - 0.9).abs() < 1e-3);
    assert!((oscillating.magnitude() - 0.95).abs() < 1e-3);

    // Frequencies: 0 for the pure decay, (1/16)/dt for the rotation.
    let expected = (1.0 / 16.0) / dt;
    assert!(decay.frequency_hz.abs() < 0.01 * expected);
    assert!((oscillating.frequency_hz - expected).abs() / expected < 0.01);
}

#[test]
fn one_step_prediction_matches_the_trace() {
    let mut engine = SpectralEngine::new(LearnerConfig::default());
    let trace = known_system_trace(60, 2.0);
    engine
        .process(&[trace.clone()], &ProcessingParameters::default())
        .unwrap();

    let k = 10;
    let x_k = &trace.snapshots[k].activation;
    let x_next = trace.snapshots[k + 1]
        .activation
        .to_dense(engine.basis());
    let prediction = engine
        .predict(x_k, 1, trace.dt(), false, 16)
        .unwrap();
    let err: f64 = prediction.states[0]
        .iter()
        .zip(&x_next)
        .map(|(p, a)| (p - a).abs())
        .sum();
    assert!(err < 1e-3, "one-step prediction error {err}");
}

#[test]
fn exclude_unstable_filters_growing_modes() {
    // A growing system: eigenvalue 1.05 on one concept.
    let mut snapshots = Vec::new();
    let mut value = 0.01f64;
    for k in 0..30 {
        snapshots.push(ActivationSnapshot {
            relative_time_secs: k as f64,
            activation: ConceptActivation::SparseIdsWithStrengths {
                active: vec![1],
                strengths: vec![value.min(1.0)],
            },
            transition: false,
            local_lyapunov: 0.0,
        });
        value *= 1.05;
    }
    let trace = ActivationTrace {
        snapshots,
        sampling_rate_hz: 1.0,
        source: "growing".into(),
    };

    let mut engine = SpectralEngine::new(LearnerConfig::default());
    let report = engine
        .process(&[trace], &ProcessingParameters::default())
        .unwrap();
    assert!(report.stability_index < 1.0);

    let unstable_included = engine.query_modes(&ModeQuery::default());
    assert!(unstable_included.iter().any(|m| !m.is_stable()));
    let stable_only = engine.query_modes(&ModeQuery {
        exclude_unstable: true,
        ..Default::default()
    });
    assert!(stable_only.iter().all(|m| m.is_stable()));
}
