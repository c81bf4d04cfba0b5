//! Deterministic seeding and density-matched negative sampling.

use rand::rngs::StdRng;
use rand::SeedableRng;

use engram_core::activation::ConceptActivation;

/// Derive the per-episode RNG seed from (job id, episode id).
///
/// blake3 keeps the derivation stable across platforms; the same pair
/// always replays identically.
pub fn seed_for(job_id: &str, episode_id: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(job_id.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(episode_id.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Seeded RNG for one (job, episode) pair.
pub fn rng_for(job_id: &str, episode_id: &str) -> StdRng {
    StdRng::seed_from_u64(seed_for(job_id, episode_id))
}

/// Sample one negative pattern: independent random sparse vector with the
/// same density (and strength multiset) as the positive pattern.
pub fn negative_sample(
    rng: &mut StdRng,
    positive: &ConceptActivation,
    width: u32,
) -> ConceptActivation {
    let ids = positive.active_ids();
    let count = ids.len().min(width as usize);
    let strengths: Vec<f64> = ids.iter().map(|&c| positive.strength_of(c)).collect();

    let mut active: Vec<u32> = rand::seq::index::sample(rng, width as usize, count)
        .into_iter()
        .map(|i| i as u32)
        .collect();
    active.sort_unstable();
    ConceptActivation::SparseIdsWithStrengths {
        active,
        strengths: strengths.into_iter().take(count).collect(),
    }
}
