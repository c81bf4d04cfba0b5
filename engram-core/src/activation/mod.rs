//! Concept activations: the shared representation every subsystem speaks.
//!
//! An activation is either a sparse list of active concept ids (optionally
//! with per-concept strengths) or a packed binary vector of fixed width.
//! [`ConceptActivation::canonicalize`] collapses all three forms into the
//! sparse-with-strengths form; consumers require canonical input.

mod space;

pub use space::ConceptSpace;

use serde::{Deserialize, Serialize};

use crate::errors::{EngramResult, VaultError};

/// Process-wide concept identifier.
pub type ConceptId = u32;

/// One concept-activation pattern.
///
/// Serialized as a tagged enum so the representation survives round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ConceptActivation {
    /// Strictly ascending active concept ids; strength 1.0 implied.
    SparseIds { active: Vec<ConceptId> },
    /// Active ids with a parallel strength vector, each strength in [0, 1].
    SparseIdsWithStrengths {
        active: Vec<ConceptId>,
        strengths: Vec<f64>,
    },
    /// Packed binary vector: bit i set means concept i is active.
    BinaryVector { width: u32, bits: Vec<u64> },
}

impl ConceptActivation {
    /// Build the canonical form from parallel id/strength slices.
    pub fn from_strengths(active: Vec<ConceptId>, strengths: Vec<f64>) -> Self {
        Self::SparseIdsWithStrengths { active, strengths }
    }

    /// Build a binary-vector activation from a set of active ids.
    pub fn binary_from_ids(width: u32, ids: &[ConceptId]) -> Self {
        let words = (width as usize + 63) / 64;
        let mut bits = vec![0u64; words];
        for &id in ids {
            if (id as u32) < width {
                bits[id as usize / 64] |= 1u64 << (id % 64);
            }
        }
        Self::BinaryVector { width, bits }
    }

    /// Active concept ids in ascending order, regardless of form.
    pub fn active_ids(&self) -> Vec<ConceptId> {
        match self {
            Self::SparseIds { active } => active.clone(),
            Self::SparseIdsWithStrengths { active, .. } => active.clone(),
            Self::BinaryVector { width, bits } => {
                let mut ids = Vec::new();
                for id in 0..*width {
                    if bits[id as usize / 64] >> (id % 64) & 1 == 1 {
                        ids.push(id);
                    }
                }
                ids
            }
        }
    }

    /// Number of active concepts.
    pub fn active_count(&self) -> usize {
        match self {
            Self::SparseIds { active } => active.len(),
            Self::SparseIdsWithStrengths { active, .. } => active.len(),
            Self::BinaryVector { bits, .. } => {
                bits.iter().map(|w| w.count_ones() as usize).sum()
            }
        }
    }

    /// Fraction of the width that is active.
    pub fn density(&self, width: usize) -> f64 {
        if width == 0 {
            return 0.0;
        }
        self.active_count() as f64 / width as f64
    }

    /// Validate and collapse to the canonical sparse-with-strengths form.
    ///
    /// Rejects: unsorted or duplicate ids, strength/id length mismatch,
    /// strengths outside [0, 1], ids beyond `width`, and binary vectors
    /// whose word count disagrees with their declared width.
    pub fn canonicalize(&self, width: u32) -> EngramResult<ConceptActivation> {
        let check_ids = |active: &[ConceptId]| -> EngramResult<()> {
            if active.len() > crate::constants::MAX_ACTIVE_CONCEPTS {
                return Err(VaultError::InvalidActivation {
                    reason: format!(
                        "{} active concepts exceeds the cap of {}",
                        active.len(),
                        crate::constants::MAX_ACTIVE_CONCEPTS
                    ),
                }
                .into());
            }
            for pair in active.windows(2) {
                if pair[0] >= pair[1] {
                    return Err(VaultError::InvalidActivation {
                        reason: format!(
                            "active ids must be strictly ascending, got {} then {}",
                            pair[0], pair[1]
                        ),
                    }
                    .into());
                }
            }
            if let Some(&last) = active.last() {
                if last >= width {
                    return Err(VaultError::InvalidActivation {
                        reason: format!("concept id {last} outside width {width}"),
                    }
                    .into());
                }
            }
            Ok(())
        };

        match self {
            Self::SparseIds { active } => {
                check_ids(active)?;
                Ok(Self::SparseIdsWithStrengths {
                    active: active.clone(),
                    strengths: vec![1.0; active.len()],
                })
            }
            Self::SparseIdsWithStrengths { active, strengths } => {
                check_ids(active)?;
                if active.len() != strengths.len() {
                    return Err(VaultError::InvalidActivation {
                        reason: format!(
                            "{} active ids but {} strengths",
                            active.len(),
                            strengths.len()
                        ),
                    }
                    .into());
                }
                for &s in strengths {
                    if !(0.0..=1.0).contains(&s) || !s.is_finite() {
                        return Err(VaultError::InvalidActivation {
                            reason: format!("strength {s} outside [0, 1]"),
                        }
                        .into());
                    }
                }
                Ok(self.clone())
            }
            Self::BinaryVector { width: w, bits } => {
                if *w != width {
                    return Err(VaultError::InvalidActivation {
                        reason: format!("binary width {w} disagrees with vault width {width}"),
                    }
                    .into());
                }
                let expected_words = (*w as usize + 63) / 64;
                if bits.len() != expected_words {
                    return Err(VaultError::InvalidActivation {
                        reason: format!(
                            "binary vector has {} words, width {w} needs {expected_words}",
                            bits.len()
                        ),
                    }
                    .into());
                }
                let active = self.active_ids();
                let strengths = vec![1.0; active.len()];
                Ok(Self::SparseIdsWithStrengths { active, strengths })
            }
        }
    }

    /// Strength of a given concept (0.0 when inactive).
    pub fn strength_of(&self, concept: ConceptId) -> f64 {
        match self {
            Self::SparseIds { active } => {
                if active.binary_search(&concept).is_ok() {
                    1.0
                } else {
                    0.0
                }
            }
            Self::SparseIdsWithStrengths { active, strengths } => active
                .binary_search(&concept)
                .map(|i| strengths[i])
                .unwrap_or(0.0),
            Self::BinaryVector { width, bits } => {
                if concept < *width && bits[concept as usize / 64] >> (concept % 64) & 1 == 1 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Project onto a dense vector over an explicit ascending basis.
    pub fn to_dense(&self, basis: &[ConceptId]) -> Vec<f64> {
        basis.iter().map(|&c| self.strength_of(c)).collect()
    }

    /// Cosine similarity between two activations over their joint support.
    pub fn cosine_similarity(&self, other: &ConceptActivation) -> f64 {
        let a = self.active_ids();
        let b = other.active_ids();
        let mut dot = 0.0;
        let mut na = 0.0;
        let mut nb = 0.0;
        for &c in &a {
            let s = self.strength_of(c);
            na += s * s;
            dot += s * other.strength_of(c);
        }
        for &c in &b {
            let s = other.strength_of(c);
            nb += s * s;
        }
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na.sqrt() * nb.sqrt())
        }
    }

    /// Jaccard overlap of the active sets.
    pub fn overlap(&self, other: &ConceptActivation) -> f64 {
        let a = self.active_ids();
        let b = other.active_ids();
        if a.is_empty() && b.is_empty() {
            return 0.0;
        }
        let mut inter = 0usize;
        let mut i = 0;
        let mut j = 0;
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    inter += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        inter as f64 / (a.len() + b.len() - inter) as f64
    }

    /// Strength-weighted merge of two canonical activations.
    ///
    /// `weight` is the share of `self`; the result keeps the union of the
    /// active sets with interpolated strengths.
    pub fn merge(&self, other: &ConceptActivation, weight: f64) -> ConceptActivation {
        let w = weight.clamp(0.0, 1.0);
        let mut ids = self.active_ids();
        ids.extend(other.active_ids());
        ids.sort_unstable();
        ids.dedup();
        let strengths: Vec<f64> = ids
            .iter()
            .map(|&c| (w * self.strength_of(c) + (1.0 - w) * other.strength_of(c)).clamp(0.0, 1.0))
            .collect();
        ConceptActivation::SparseIdsWithStrengths {
            active: ids,
            strengths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_sparse_ids_fills_unit_strengths() {
        let a = ConceptActivation::SparseIds {
            active: vec![1, 5, 9],
        };
        let c = a.canonicalize(16).unwrap();
        match c {
            ConceptActivation::SparseIdsWithStrengths { active, strengths } => {
                assert_eq!(active, vec![1, 5, 9]);
                assert_eq!(strengths, vec![1.0; 3]);
            }
            _ => panic!("expected canonical form"),
        }
    }

    #[test]
    fn canonicalize_rejects_unsorted_ids() {
        let a = ConceptActivation::SparseIds {
            active: vec![5, 1],
        };
        assert!(a.canonicalize(16).is_err());
    }

    #[test]
    fn canonicalize_rejects_out_of_range_strength() {
        let a = ConceptActivation::from_strengths(vec![1, 2], vec![0.5, 1.5]);
        assert!(a.canonicalize(16).is_err());
    }

    #[test]
    fn canonicalize_rejects_id_beyond_width() {
        let a = ConceptActivation::SparseIds { active: vec![20] };
        assert!(a.canonicalize(16).is_err());
    }

    #[test]
    fn binary_round_trips_through_canonical_form() {
        let b = ConceptActivation::binary_from_ids(128, &[0, 63, 64, 127]);
        let c = b.canonicalize(128).unwrap();
        assert_eq!(c.active_ids(), vec![0, 63, 64, 127]);
        assert_eq!(b.active_count(), 4);
    }

    #[test]
    fn binary_width_mismatch_is_rejected() {
        let b = ConceptActivation::binary_from_ids(128, &[1]);
        assert!(b.canonicalize(64).is_err());
    }

    #[test]
    fn cosine_of_identical_patterns_is_one() {
        let a = ConceptActivation::from_strengths(vec![1, 2, 3], vec![0.2, 0.4, 0.8]);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn overlap_counts_shared_support() {
        let a = ConceptActivation::SparseIds {
            active: vec![1, 2, 3],
        };
        let b = ConceptActivation::SparseIds {
            active: vec![2, 3, 4],
        };
        assert!((a.overlap(&b) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn merge_keeps_union_and_interpolates() {
        let a = ConceptActivation::from_strengths(vec![1], vec![1.0]);
        let b = ConceptActivation::from_strengths(vec![2], vec![1.0]);
        let m = a.merge(&b, 0.25);
        assert_eq!(m.active_ids(), vec![1, 2]);
        assert!((m.strength_of(1) - 0.25).abs() < 1e-12);
        assert!((m.strength_of(2) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn to_dense_projects_onto_basis() {
        let a = ConceptActivation::from_strengths(vec![3, 7], vec![0.5, 0.9]);
        assert_eq!(a.to_dense(&[3, 5, 7]), vec![0.5, 0.0, 0.9]);
    }
}
