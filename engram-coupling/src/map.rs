use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use engram_core::activation::ConceptId;
use engram_core::errors::{CouplingError, EngramResult};
use engram_core::models::{OscillatorCoupling, SpectralMode};
use engram_spectral::stability;

/// One spectrum-to-coupling translation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouplingUpdateRequest {
    /// Keep at most this many strongest pairs.
    pub max_pairs: usize,
    /// False returns a dry-run proposal set without mutating the map.
    pub apply_immediately: bool,
    pub gain: f64,
    /// Modes below this eigenvalue magnitude contribute nothing.
    pub min_eigenvalue_magnitude: f64,
    pub enforce_stability: bool,
    pub max_coupling_strength: f64,
    /// Allowed drop of the system index below the held reference.
    pub stability_epsilon: f64,
}

impl Default for CouplingUpdateRequest {
    fn default() -> Self {
        Self {
            max_pairs: 64,
            apply_immediately: true,
            gain: 0.1,
            min_eigenvalue_magnitude: 0.0,
            enforce_stability: true,
            max_coupling_strength: 1.0,
            stability_epsilon: 0.05,
        }
    }
}

/// What an update (or dry run) produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouplingUpdateOutcome {
    pub proposals: Vec<OscillatorCoupling>,
    pub applied: bool,
    pub stability_before: f64,
    pub stability_after: f64,
    /// after - before; negative when the update costs stability.
    pub stability_improvement: f64,
}

/// The coupling map. Written only via `update_from_spectrum`.
#[derive(Debug, Default, Clone)]
pub struct CouplingMap {
    couplings: HashMap<(ConceptId, ConceptId), OscillatorCoupling>,
    /// Held stability reference: the system index captured when couplings
    /// were last applied. Initialised from the pre-update index on first
    /// use.
    reference_stability: Option<f64>,
}

impl CouplingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.couplings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.couplings.is_empty()
    }

    pub fn get(&self, a: ConceptId, b: ConceptId) -> Option<&OscillatorCoupling> {
        self.couplings.get(&OscillatorCoupling::canonical_pair(a, b))
    }

    pub fn iter(&self) -> impl Iterator<Item = &OscillatorCoupling> {
        self.couplings.values()
    }

    /// Flat (a, b, strength) list for stability computations.
    pub fn pairs(&self) -> Vec<(ConceptId, ConceptId, f64)> {
        self.couplings
            .values()
            .map(|c| (c.a, c.b, c.strength))
            .collect()
    }

    pub fn reference_stability(&self) -> Option<f64> {
        self.reference_stability
    }

    /// Drop every coupling and the held reference.
    pub fn clear(&mut self) {
        self.couplings.clear();
        self.reference_stability = None;
    }

    /// Derive couplings from the dominant modes.
    ///
    /// For each pair implied by a mode's dominant concepts the proposal
    /// accumulates gain * w_i * w_j * cos(theta_i - theta_j) * |lambda|
    /// with the phase from the same complex sum. With `enforce_stability`
    /// the whole proposal set is rejected (and nothing mutated) when it
    /// would drop the system index more than epsilon below the held
    /// reference.
    pub fn update_from_spectrum(
        &mut self,
        modes: &[SpectralMode],
        request: &CouplingUpdateRequest,
    ) -> EngramResult<CouplingUpdateOutcome> {
        let contributing: Vec<&SpectralMode> = modes
            .iter()
            .filter(|m| m.magnitude() >= request.min_eigenvalue_magnitude)
            .collect();
        if contributing.is_empty() {
            return Err(CouplingError::NoSourceModes.into());
        }
        if request.max_pairs == 0 {
            return Err(CouplingError::InvalidRequest {
                reason: "max_pairs must be at least 1".to_string(),
            }
            .into());
        }

        // Accumulate the complex pair sums and remember the strongest
        // contributing mode per pair for provenance.
        let mut sums: HashMap<(ConceptId, ConceptId), (f64, f64)> = HashMap::new();
        let mut provenance: HashMap<(ConceptId, ConceptId), (String, f64)> = HashMap::new();
        for mode in &contributing {
            let magnitude = mode.magnitude();
            for (i, di) in mode.dominant_concepts.iter().enumerate() {
                for dj in mode.dominant_concepts.iter().skip(i + 1) {
                    if di.concept == dj.concept {
                        continue;
                    }
                    let key = OscillatorCoupling::canonical_pair(di.concept, dj.concept);
                    let (wi, wj) = if key == (di.concept, dj.concept) {
                        (di, dj)
                    } else {
                        (dj, di)
                    };
                    let angle = wi.phase_shift - wj.phase_shift;
                    let contribution = wi.weight * wj.weight * magnitude;
                    let entry = sums.entry(key).or_insert((0.0, 0.0));
                    entry.0 += contribution * angle.cos();
                    entry.1 += contribution * angle.sin();
                    let strongest = provenance.entry(key).or_insert((mode.id.clone(), 0.0));
                    if contribution > strongest.1 {
                        *strongest = (mode.id.clone(), contribution);
                    }
                }
            }
        }

        let mut proposals: Vec<OscillatorCoupling> = sums
            .into_iter()
            .map(|((a, b), (re, im))| {
                let raw = request.gain * re;
                let strength = raw.clamp(
                    -request.max_coupling_strength,
                    request.max_coupling_strength,
                );
                let phase_shift = im.atan2(re);
                let previous_strength =
                    self.get(a, b).map(|c| c.strength).unwrap_or(0.0);
                let source_mode = provenance
                    .get(&(a, b))
                    .map(|(id, _)| id.clone())
                    .unwrap_or_default();
                OscillatorCoupling {
                    a,
                    b,
                    strength,
                    phase_shift,
                    source_mode,
                    previous_strength,
                }
            })
            .collect();
        proposals.sort_by(|x, y| {
            y.strength
                .abs()
                .partial_cmp(&x.strength.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        proposals.truncate(request.max_pairs);

        // Stability gate against the held reference.
        let current_pairs = self.pairs();
        let stability_before = stability::system_index(modes, &current_pairs);
        let mut proposed_map = self.couplings.clone();
        for p in &proposals {
            proposed_map.insert((p.a, p.b), p.clone());
        }
        let proposed_pairs: Vec<(ConceptId, ConceptId, f64)> = proposed_map
            .values()
            .map(|c| (c.a, c.b, c.strength))
            .collect();
        let stability_after = stability::system_index(modes, &proposed_pairs);
        let reference = self.reference_stability.unwrap_or(stability_before);

        if request.enforce_stability && stability_after < reference - request.stability_epsilon {
            debug!(
                reference,
                stability_after, "coupling update rejected by stability gate"
            );
            return Err(CouplingError::StabilityViolation {
                reference,
                proposed: stability_after,
                epsilon: request.stability_epsilon,
            }
            .into());
        }

        let applied = request.apply_immediately;
        if applied {
            self.couplings = proposed_map;
            self.reference_stability = Some(stability_after);
            info!(
                pairs = proposals.len(),
                stability_after, "couplings updated from spectrum"
            );
        }
        Ok(CouplingUpdateOutcome {
            applied,
            stability_before,
            stability_improvement: stability_after - stability_before,
            stability_after,
            proposals,
        })
    }
}
