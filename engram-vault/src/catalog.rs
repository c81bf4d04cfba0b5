//! In-memory episode catalog plus the on-disk secondary index files.
//!
//! The catalog answers every filtered query without touching the log;
//! the `index/*.idx` files persist it across restarts. Both are derived
//! data: a full rebuild from the segments is always possible and is the
//! recovery path for any index corruption.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use engram_core::episode::{Episode, EpisodeFilter};
use engram_core::errors::{EngramError, EngramResult, VaultError};

use crate::segment::SegmentReader;

/// Lightweight per-episode entry; everything filters need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub id: String,
    pub segment: u64,
    pub offset: u64,
    /// Record payload length (without the u32 prefix).
    pub len: u32,
    pub created_at: DateTime<Utc>,
    pub energy: f64,
    pub ref_count: u32,
    pub tags: Vec<String>,
    pub source_type: String,
}

impl EpisodeMeta {
    pub fn from_episode(episode: &Episode, segment: u64, offset: u64, len: u32) -> Self {
        Self {
            id: episode.id.clone(),
            segment,
            offset,
            len,
            created_at: episode.created_at,
            energy: episode.energy,
            ref_count: episode.ref_count,
            tags: episode.tags.clone(),
            source_type: episode.source.source_type.clone(),
        }
    }

    /// Bytes this record occupies in the log, prefix included.
    pub fn stored_bytes(&self) -> u64 {
        4 + self.len as u64
    }

    fn matches(&self, filter: &EpisodeFilter) -> bool {
        if let Some(since) = filter.since {
            if self.created_at < since {
                return false;
            }
        }
        if let Some(until) = filter.until {
            if self.created_at > until {
                return false;
            }
        }
        if let Some(min_energy) = filter.min_energy {
            if self.energy < min_energy {
                return false;
            }
        }
        if let Some(ref st) = filter.source_type {
            if &self.source_type != st {
                return false;
            }
        }
        if !filter.include_tags.is_empty()
            && !filter.include_tags.iter().any(|t| self.tags.contains(t))
        {
            return false;
        }
        if filter.exclude_tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        true
    }
}

/// The whole catalog: newest record per episode id.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    by_id: HashMap<String, EpisodeMeta>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&EpisodeMeta> {
        self.by_id.get(id)
    }

    /// Insert or supersede the entry for this id.
    pub fn upsert(&mut self, meta: EpisodeMeta) {
        self.by_id.insert(meta.id.clone(), meta);
    }

    pub fn remove(&mut self, id: &str) -> Option<EpisodeMeta> {
        self.by_id.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EpisodeMeta> {
        self.by_id.values()
    }

    /// Filtered metas ordered newest first, ties broken by ascending id.
    pub fn filtered_desc(&self, filter: &EpisodeFilter) -> Vec<&EpisodeMeta> {
        let mut metas: Vec<&EpisodeMeta> =
            self.by_id.values().filter(|m| m.matches(filter)).collect();
        metas.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        metas
    }

    /// Offsets of records this catalog references, grouped by segment.
    pub fn offsets_by_segment(&self) -> BTreeMap<u64, Vec<u64>> {
        let mut map: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for meta in self.by_id.values() {
            map.entry(meta.segment).or_default().push(meta.offset);
        }
        map
    }
}

// --- on-disk index files -------------------------------------------------

const TIME_IDX: &str = "time.idx";
const TAG_IDX: &str = "tag.idx";
const SOURCE_IDX: &str = "source.idx";
const ENERGY_IDX: &str = "energy.idx";

/// Primary index: everything the catalog needs, sorted by timestamp.
///
/// `log_end` records where the log ended when the index was written; a
/// mismatch at startup means the index is stale and must be rebuilt.
#[derive(Debug, Serialize, Deserialize)]
struct TimeIndexFile {
    log_end: (u64, u64),
    entries: Vec<EpisodeMeta>,
}

/// Secondary posting file: sorted key -> (segment, offset) list.
#[derive(Debug, Serialize, Deserialize)]
struct PostingFile {
    postings: Vec<(String, Vec<(u64, u64)>)>,
}

/// Energy postings are keyed by 0.1-wide buckets.
#[derive(Debug, Serialize, Deserialize)]
struct EnergyPostingFile {
    postings: Vec<(u32, Vec<(u64, u64)>)>,
}

fn energy_bucket(energy: f64) -> u32 {
    (energy.max(0.0) * 10.0).floor() as u32
}

/// Reads and writes the `index/` directory.
pub struct IndexFiles {
    dir: PathBuf,
}

impl IndexFiles {
    pub fn open(dir: &Path) -> EngramResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Persist every index file from the catalog.
    pub fn write(&self, catalog: &Catalog, log_end: (u64, u64)) -> EngramResult<()> {
        let mut entries: Vec<EpisodeMeta> = catalog.iter().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut tags: BTreeMap<String, Vec<(u64, u64)>> = BTreeMap::new();
        let mut sources: BTreeMap<String, Vec<(u64, u64)>> = BTreeMap::new();
        let mut energies: BTreeMap<u32, Vec<(u64, u64)>> = BTreeMap::new();
        for meta in &entries {
            let at = (meta.segment, meta.offset);
            for tag in &meta.tags {
                tags.entry(tag.clone()).or_default().push(at);
            }
            sources.entry(meta.source_type.clone()).or_default().push(at);
            energies.entry(energy_bucket(meta.energy)).or_default().push(at);
        }

        self.write_file(TIME_IDX, &TimeIndexFile { log_end, entries })?;
        self.write_file(
            TAG_IDX,
            &PostingFile {
                postings: tags.into_iter().collect(),
            },
        )?;
        self.write_file(
            SOURCE_IDX,
            &PostingFile {
                postings: sources.into_iter().collect(),
            },
        )?;
        self.write_file(
            ENERGY_IDX,
            &EnergyPostingFile {
                postings: energies.into_iter().collect(),
            },
        )?;
        Ok(())
    }

    /// Load the catalog and the log end recorded at write time.
    /// `None` when the file is missing; an unreadable file is corruption.
    pub fn load(&self) -> EngramResult<Option<(Catalog, (u64, u64))>> {
        let path = self.dir.join(TIME_IDX);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let file: TimeIndexFile = bincode::deserialize(&bytes).map_err(|_| {
            EngramError::from(VaultError::IndexCorrupt {
                index: TIME_IDX.to_string(),
            })
        })?;
        let mut catalog = Catalog::default();
        for meta in file.entries {
            catalog.upsert(meta);
        }
        Ok(Some((catalog, file.log_end)))
    }

    /// Drop every index file (before a rebuild).
    pub fn clear(&self) -> EngramResult<()> {
        for name in [TIME_IDX, TAG_IDX, SOURCE_IDX, ENERGY_IDX] {
            let path = self.dir.join(name);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn write_file<T: Serialize>(&self, name: &str, value: &T) -> EngramResult<()> {
        let bytes = bincode::serialize(value).map_err(|e| EngramError::Serialization {
            message: e.to_string(),
        })?;
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, self.dir.join(name))?;
        Ok(())
    }
}

/// Rebuild the catalog by scanning every segment. The newest record for an
/// id wins (ref-count bumps append superseding records).
pub fn rebuild_from_log(reader: &SegmentReader) -> EngramResult<Catalog> {
    use rayon::prelude::*;

    let segments = reader.segments()?;
    let scanned: Vec<(u64, Vec<(u64, Vec<u8>)>)> = segments
        .par_iter()
        .map(|&seg| reader.scan(seg).map(|records| (seg, records)))
        .collect::<EngramResult<_>>()?;

    let mut catalog = Catalog::default();
    for (seg, records) in scanned {
        for (offset, bytes) in records {
            let episode: Episode = bincode::deserialize(&bytes).map_err(|_| {
                EngramError::from(VaultError::SegmentCorrupt {
                    segment: seg,
                    offset,
                })
            })?;
            catalog.upsert(EpisodeMeta::from_episode(
                &episode,
                seg,
                offset,
                bytes.len() as u32,
            ));
        }
    }
    tracing::info!(episodes = catalog.len(), "rebuilt catalog from log");
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::activation::ConceptActivation;
    use tempfile::TempDir;

    fn meta(id: &str, energy: f64, tags: &[&str]) -> EpisodeMeta {
        let mut e = Episode::new(ConceptActivation::SparseIds { active: vec![1] }, energy);
        e.id = id.to_string();
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        EpisodeMeta::from_episode(&e, 0, 0, 16)
    }

    #[test]
    fn filtered_desc_orders_and_ties_on_id() {
        let mut catalog = Catalog::default();
        let mut a = meta("a", 0.1, &["x"]);
        let mut b = meta("b", 0.5, &["x", "y"]);
        let now = Utc::now();
        a.created_at = now;
        b.created_at = now;
        catalog.upsert(b);
        catalog.upsert(a);
        let filter = EpisodeFilter::default();
        let metas = catalog.filtered_desc(&filter);
        // Equal timestamps: ascending id.
        assert_eq!(metas[0].id, "a");
        assert_eq!(metas[1].id, "b");
    }

    #[test]
    fn index_files_round_trip_catalog() {
        let dir = TempDir::new().unwrap();
        let files = IndexFiles::open(dir.path()).unwrap();
        let mut catalog = Catalog::default();
        catalog.upsert(meta("a", 0.3, &["x"]));
        catalog.upsert(meta("b", 0.9, &["y"]));
        files.write(&catalog, (0, 64)).unwrap();
        let (loaded, log_end) = files.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(log_end, (0, 64));
        assert_eq!(loaded.get("a").unwrap().tags, vec!["x".to_string()]);
    }

    #[test]
    fn corrupt_index_is_reported() {
        let dir = TempDir::new().unwrap();
        let files = IndexFiles::open(dir.path()).unwrap();
        fs::write(dir.path().join(TIME_IDX), b"not bincode at all \xff").unwrap();
        assert!(files.load().is_err());
    }

    #[test]
    fn upsert_supersedes_by_id() {
        let mut catalog = Catalog::default();
        let mut m = meta("a", 0.3, &[]);
        catalog.upsert(m.clone());
        m.ref_count = 7;
        m.segment = 1;
        catalog.upsert(m);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").unwrap().ref_count, 7);
    }
}
