//! Deterministic builders for episodes and traces, shared by the
//! integration tests across crates.

use chrono::{DateTime, TimeZone, Utc};
use nalgebra::{DMatrix, DVector};

use engram_core::activation::ConceptActivation;
use engram_core::episode::Episode;
use engram_core::models::{ActivationSnapshot, ActivationTrace};

/// An episode with an explicit id, timestamp (epoch seconds), tags, and
/// energy, over a small sparse activation.
pub fn episode(id: &str, ts_secs: i64, tags: &[&str], energy: f64) -> Episode {
    episode_with_ids(id, ts_secs, tags, energy, vec![1, 2, 3])
}

/// Same, with explicit active concept ids.
pub fn episode_with_ids(
    id: &str,
    ts_secs: i64,
    tags: &[&str],
    energy: f64,
    active: Vec<u32>,
) -> Episode {
    let mut e = Episode::new(ConceptActivation::SparseIds { active }, energy);
    e.id = id.to_string();
    e.created_at = timestamp(ts_secs);
    e.tags = tags.iter().map(|t| t.to_string()).collect();
    e.source.source_type = "test".to_string();
    e.source.source_id = format!("fixture-{id}");
    e
}

/// Epoch-second timestamp helper.
pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// A trace driven by u_{k+1} = M u_k over the given concepts, strengths
/// clamped into [0, 1]. The caller picks M and u0 so the trajectory stays
/// in range.
pub fn linear_trace(
    concepts: &[u32],
    m: &DMatrix<f64>,
    u0: DVector<f64>,
    steps: usize,
    sampling_rate_hz: f64,
) -> ActivationTrace {
    let dt = if sampling_rate_hz > 0.0 {
        1.0 / sampling_rate_hz
    } else {
        1.0
    };
    let mut state = u0;
    let mut snapshots = Vec::with_capacity(steps);
    for k in 0..steps {
        let strengths: Vec<f64> = state.iter().map(|&v| v.clamp(0.0, 1.0)).collect();
        snapshots.push(ActivationSnapshot {
            relative_time_secs: k as f64 * dt,
            activation: ConceptActivation::SparseIdsWithStrengths {
                active: concepts.to_vec(),
                strengths,
            },
            transition: false,
            local_lyapunov: 0.0,
        });
        state = m * &state;
    }
    ActivationTrace {
        snapshots,
        sampling_rate_hz,
        source: "fixture".to_string(),
    }
}

/// A simple geometric-decay trace on one concept: strength r^k from 1.0.
pub fn decay_trace(concept: u32, r: f64, steps: usize) -> ActivationTrace {
    let m = DMatrix::from_element(1, 1, r);
    linear_trace(&[concept], &m, DVector::from_element(1, 1.0), steps, 1.0)
}
