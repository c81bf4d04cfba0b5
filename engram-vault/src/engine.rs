//! VaultEngine — owns the segment writer, catalog, index files, and read
//! cache. Single writer behind a mutex; readers go through the catalog
//! snapshot and positional segment reads.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use parking_lot::{Mutex, RwLock};

use engram_core::activation::ConceptSpace;
use engram_core::config::VaultConfig;
use engram_core::episode::{Episode, EpisodeFilter};
use engram_core::errors::{EngramError, EngramResult, VaultError};
use engram_core::models::{RecoveryReport, VaultStats};
use engram_core::traits::IEpisodeStore;

use crate::catalog::{self, Catalog, EpisodeMeta, IndexFiles};
use crate::segment::{self, SegmentReader, SegmentWriter};
use crate::stats;

/// Flush index files after this many un-flushed appends.
const INDEX_FLUSH_EVERY: usize = 64;

/// The episodic vault.
pub struct VaultEngine {
    config: VaultConfig,
    segments_dir: PathBuf,
    writer: Mutex<SegmentWriter>,
    catalog: RwLock<Catalog>,
    index_files: IndexFiles,
    reader: SegmentReader,
    cache: Cache<String, Episode>,
    dirty_appends: AtomicUsize,
    recovery: RecoveryReport,
    /// Process-wide append-only concept id space, grown by every stored
    /// activation.
    concepts: ConceptSpace,
}

impl VaultEngine {
    /// Open (and create) a vault under `root`.
    ///
    /// Startup order: truncate any partial trailing record, then load the
    /// index files. A missing, stale, or corrupt index triggers a full
    /// rebuild from the log, as does `index_rebuild_on_start`.
    pub fn open(root: &Path, config: VaultConfig) -> EngramResult<Self> {
        let segments_dir = root.join("segments");
        let index_dir = root.join("index");
        std::fs::create_dir_all(&segments_dir)?;

        let mut recovery = RecoveryReport::default();
        segment::recover(&segments_dir, &mut recovery)?;

        let reader = SegmentReader::new(&segments_dir);
        let index_files = IndexFiles::open(&index_dir)?;
        let writer = SegmentWriter::open(
            &segments_dir,
            config.segment_size_bytes,
            config.fsync_mode,
            config.fsync_interval_secs,
        )?;
        let log_end = (writer.current_segment(), writer.current_offset());

        let catalog = if config.index_rebuild_on_start {
            recovery.indexes_rebuilt = true;
            catalog::rebuild_from_log(&reader)?
        } else {
            match index_files.load() {
                Ok(Some((catalog, indexed_end))) if indexed_end == log_end => catalog,
                Ok(_) => {
                    // Missing or stale (log advanced past the indexed end).
                    recovery.indexes_rebuilt = true;
                    catalog::rebuild_from_log(&reader)?
                }
                Err(e) => {
                    tracing::warn!(error = %e, "index corrupt, rebuilding from log");
                    recovery.indexes_rebuilt = true;
                    index_files.clear()?;
                    catalog::rebuild_from_log(&reader)?
                }
            }
        };
        if recovery.indexes_rebuilt {
            index_files.write(&catalog, log_end)?;
        }

        let concepts = ConceptSpace::new();

        Ok(Self {
            cache: Cache::new(config.cache_capacity),
            config,
            segments_dir,
            writer: Mutex::new(writer),
            catalog: RwLock::new(catalog),
            index_files,
            reader,
            dirty_appends: AtomicUsize::new(0),
            recovery,
            concepts,
        })
    }

    /// High-water mark of the observed concept id space.
    pub fn concept_space(&self) -> &ConceptSpace {
        &self.concepts
    }

    /// What startup recovery found.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Episode count currently live.
    pub fn len(&self) -> usize {
        self.catalog.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.read().is_empty()
    }

    /// Bump (or drop) an episode's reference count.
    ///
    /// Appends a superseding record; the log stays ground truth.
    pub fn add_ref(&self, id: &str, delta: i32) -> EngramResult<u32> {
        let mut episode = self
            .get(id)?
            .ok_or_else(|| VaultError::EpisodeNotFound { id: id.to_string() })?;
        episode.ref_count = if delta >= 0 {
            episode.ref_count.saturating_add(delta as u32)
        } else {
            episode.ref_count.saturating_sub(delta.unsigned_abs())
        };
        let new_count = episode.ref_count;
        self.append_record(episode)?;
        Ok(new_count)
    }

    /// Flush indexes and fsync the active segment.
    pub fn flush(&self) -> EngramResult<()> {
        let mut writer = self.writer.lock();
        writer.sync()?;
        let log_end = (writer.current_segment(), writer.current_offset());
        self.index_files.write(&self.catalog.read(), log_end)?;
        self.dirty_appends.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn append_record(&self, episode: Episode) -> EngramResult<(u64, u64)> {
        let bytes = bincode::serialize(&episode).map_err(|e| EngramError::Serialization {
            message: e.to_string(),
        })?;
        let mut writer = self.writer.lock();
        let (seg, off) = writer.append(&bytes)?;
        let meta = EpisodeMeta::from_episode(&episode, seg, off, bytes.len() as u32);
        let log_end = (writer.current_segment(), writer.current_offset());
        drop(writer);

        self.cache.insert(episode.id.clone(), episode);
        self.catalog.write().upsert(meta);

        if self.dirty_appends.fetch_add(1, Ordering::SeqCst) + 1 >= INDEX_FLUSH_EVERY {
            self.index_files.write(&self.catalog.read(), log_end)?;
            self.dirty_appends.store(0, Ordering::SeqCst);
        }
        Ok((seg, off))
    }

    fn load_episode(&self, meta: &EpisodeMeta) -> EngramResult<Episode> {
        if let Some(hit) = self.cache.get(&meta.id) {
            return Ok(hit);
        }
        let bytes = self.reader.read_at(meta.segment, meta.offset)?;
        let episode: Episode = bincode::deserialize(&bytes).map_err(|_| {
            EngramError::from(VaultError::SegmentCorrupt {
                segment: meta.segment,
                offset: meta.offset,
            })
        })?;
        self.cache.insert(episode.id.clone(), episode.clone());
        Ok(episode)
    }
}

impl IEpisodeStore for VaultEngine {
    fn put(&self, mut episode: Episode) -> EngramResult<String> {
        episode.activation = episode.activation.canonicalize(self.config.binary_width)?;
        if !episode.energy.is_finite() || episode.energy < 0.0 {
            return Err(VaultError::InvalidEnergy {
                value: episode.energy,
            }
            .into());
        }
        if episode.id.is_empty() {
            episode.id = Episode::new_id();
        }
        {
            let catalog = self.catalog.read();
            if catalog.contains(&episode.id) {
                return Err(VaultError::DuplicateId {
                    id: episode.id.clone(),
                }
                .into());
            }
            if catalog.len() >= self.config.max_episodes {
                return Err(VaultError::QuotaExceeded {
                    limit: self.config.max_episodes,
                    suggested_purge: (catalog.len() / 10).max(1),
                }
                .into());
            }
        }
        for concept in episode.activation.active_ids() {
            self.concepts.observe(concept);
        }
        let id = episode.id.clone();
        self.append_record(episode)?;
        tracing::debug!(id = %id, "episode stored");
        Ok(id)
    }

    fn get(&self, id: &str) -> EngramResult<Option<Episode>> {
        if let Some(hit) = self.cache.get(id) {
            return Ok(Some(hit));
        }
        let meta = match self.catalog.read().get(id) {
            Some(meta) => meta.clone(),
            None => return Ok(None),
        };
        Ok(Some(self.load_episode(&meta)?))
    }

    fn list_recent(
        &self,
        filter: &EpisodeFilter,
        limit: usize,
    ) -> EngramResult<(Vec<Episode>, usize, bool)> {
        let metas: Vec<EpisodeMeta> = {
            let catalog = self.catalog.read();
            catalog
                .filtered_desc(filter)
                .into_iter()
                .cloned()
                .collect()
        };
        let total = metas.len();
        let has_more = total > limit;
        let episodes = metas
            .iter()
            .take(limit)
            .map(|m| self.load_episode(m))
            .collect::<EngramResult<Vec<_>>>()?;
        Ok((episodes, total, has_more))
    }

    fn stats(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> EngramResult<VaultStats> {
        let catalog = self.catalog.read();
        Ok(stats::compute(catalog.iter(), since, until, Utc::now()))
    }

    fn purge_ttl(
        &self,
        max_age_hours: u64,
        min_ref_count: u32,
        dry_run: bool,
    ) -> EngramResult<(usize, u64)> {
        let now = Utc::now();
        let victims: Vec<EpisodeMeta> = {
            let catalog = self.catalog.read();
            catalog
                .iter()
                .filter(|m| {
                    (now - m.created_at).num_hours().max(0) as u64 >= max_age_hours
                        && m.ref_count < min_ref_count
                })
                .cloned()
                .collect()
        };
        let purged_count = victims.len();
        let freed_bytes: u64 = victims.iter().map(|m| m.stored_bytes()).sum();
        if dry_run || purged_count == 0 {
            return Ok((purged_count, freed_bytes));
        }

        // Hold the writer across the rewrite so no append races the rename,
        // then reopen it: the renamed file replaced the active inode.
        let mut writer = self.writer.lock();
        let victim_ids: HashSet<&str> = victims.iter().map(|m| m.id.as_str()).collect();
        let keep: Catalog = {
            let catalog = self.catalog.read();
            let mut keep = Catalog::default();
            for meta in catalog.iter().filter(|m| !victim_ids.contains(m.id.as_str())) {
                keep.upsert(meta.clone());
            }
            keep
        };
        eprintln!("DEBUG keep.len()={} victims.len()={}", keep.len(), victims.len());
        for m in keep.iter() { eprintln!("DEBUG keep entry id={} seg={} off={}", m.id, m.segment, m.offset); }
        let keep_offsets = keep.offsets_by_segment();
        for segment in self.reader.segments()? {
            let keep_in_segment: HashSet<u64> = keep_offsets
                .get(&segment)
                .map(|offs| offs.iter().copied().collect())
                .unwrap_or_default();
            let all: HashSet<u64> = self
                .reader
                .scan(segment)?
                .into_iter()
                .map(|(off, _)| off)
                .collect();
            let drop: HashSet<u64> = all.difference(&keep_in_segment).copied().collect();
            eprintln!("DEBUG segment={} all={:?} keep={:?} drop={:?}", segment, all, keep_in_segment, drop);
            if !drop.is_empty() {
                let survivors = self.reader.rewrite_without(segment, &drop)?;
                eprintln!("DEBUG survivors={:?}", survivors.iter().map(|(o,b)| (*o, b.len())).collect::<Vec<_>>());
            }
        }
        *writer = SegmentWriter::open(
            &self.segments_dir,
            self.config.segment_size_bytes,
            self.config.fsync_mode,
            self.config.fsync_interval_secs,
        )?;
        let log_end = (writer.current_segment(), writer.current_offset());

        // Offsets moved: rebuild the catalog from the compacted log.
        let rebuilt = catalog::rebuild_from_log(&self.reader)?;
        self.index_files.write(&rebuilt, log_end)?;
        *self.catalog.write() = rebuilt;
        self.cache.invalidate_all();
        drop(writer);

        tracing::info!(purged_count, freed_bytes, "TTL purge complete");
        Ok((purged_count, freed_bytes))
    }
}

impl Drop for VaultEngine {
    fn drop(&mut self) {
        // Best effort: persist indexes so the next open skips the rebuild.
        let _ = self.flush();
    }
}
