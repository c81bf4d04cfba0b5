//! Mode combination: merge near-duplicate modes, magnitude-weighted.

use super::modes::RawMode;
use super::C64;

/// Merge modes whose eigenvalues lie within `threshold` in the complex
/// plane AND whose vectors have cosine similarity above `1 - threshold`.
/// The merge is weighted by dominance; the survivor keeps the summed
/// dominance. Returns (modes, merged_count).
pub fn combine_modes(mut modes: Vec<RawMode>, threshold: f64) -> (Vec<RawMode>, usize) {
    if threshold <= 0.0 || modes.len() < 2 {
        return (modes, 0);
    }
    // Strongest first so survivors absorb weaker duplicates.
    modes.sort_by(|a, b| {
        b.dominance
            .partial_cmp(&a.dominance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<RawMode> = Vec::with_capacity(modes.len());
    let mut merged = 0usize;
    'candidates: for candidate in modes {
        for survivor in kept.iter_mut() {
            let eig_close = (survivor.lambda - candidate.lambda).norm() < threshold;
            let cos = vector_cosine(survivor, &candidate);
            if eig_close && cos > 1.0 - threshold {
                let wa = survivor.dominance;
                let wb = candidate.dominance;
                let total = wa + wb;
                if total > 0.0 {
                    survivor.lambda =
                        (survivor.lambda * wa + candidate.lambda * wb) / C64::new(total, 0.0);
                    let blended = survivor.phi.clone() * C64::new(wa / total, 0.0)
                        + candidate.phi.clone() * C64::new(wb / total, 0.0);
                    let norm = blended.norm();
                    survivor.phi = if norm > 1e-12 {
                        blended / C64::new(norm, 0.0)
                    } else {
                        blended
                    };
                    survivor.dominance = total;
                }
                merged += 1;
                continue 'candidates;
            }
        }
        kept.push(candidate);
    }
    (kept, merged)
}

/// |<phi_a, phi_b>| over the common length (modes from different batches
/// may differ in basis length; the shorter prefix decides).
fn vector_cosine(a: &RawMode, b: &RawMode) -> f64 {
    let len = a.phi.len().min(b.phi.len());
    if len == 0 {
        return 0.0;
    }
    let mut dot = C64::new(0.0, 0.0);
    let mut na = 0.0;
    let mut nb = 0.0;
    for i in 0..len {
        dot += a.phi[i].conj() * b.phi[i];
        na += a.phi[i].norm_sqr();
        nb += b.phi[i].norm_sqr();
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot.norm() / (na.sqrt() * nb.sqrt())
    }
}
