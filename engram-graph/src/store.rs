//! On-disk persistence: `current.graph` base snapshot plus per-job
//! `NNNN.delta` files, replayed in order on load and folded back into the
//! base on compaction.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use engram_core::activation::ConceptId;
use engram_core::errors::{EngramError, EngramResult, GraphError};

use crate::WeightGraph;

const BASE_FILE: &str = "current.graph";
const DELTA_EXT: &str = "delta";

/// Serialized form of a full graph snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    prune_threshold: f64,
    /// Sorted (a, b, w) with a < b; deterministic byte layout.
    edges: Vec<(ConceptId, ConceptId, f64)>,
}

/// One job's worth of edge assignments, applied in order.
#[derive(Debug, Serialize, Deserialize)]
struct DeltaFile {
    job_id: String,
    /// Absolute resulting weights, not increments; replay is idempotent.
    assignments: Vec<(ConceptId, ConceptId, f64)>,
}

/// Directory-backed store for the weight graph.
pub struct GraphStore {
    dir: PathBuf,
}

impl GraphStore {
    /// Open (and create) the weights directory.
    pub fn open(dir: &Path) -> EngramResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Load the base snapshot and replay deltas in file order.
    /// An absent base yields an empty graph at the given threshold.
    pub fn load(&self, default_prune_threshold: f64) -> EngramResult<WeightGraph> {
        let base_path = self.dir.join(BASE_FILE);
        let mut graph = if base_path.exists() {
            let bytes = fs::read(&base_path)?;
            let file: GraphFile = bincode::deserialize(&bytes).map_err(|e| {
                EngramError::from(GraphError::SnapshotLoad {
                    path: base_path.display().to_string(),
                    reason: e.to_string(),
                })
            })?;
            WeightGraph::from_edges(file.prune_threshold, file.edges)?
        } else {
            WeightGraph::new(default_prune_threshold)
        };

        for path in self.delta_paths()? {
            let bytes = fs::read(&path)?;
            let delta: DeltaFile = bincode::deserialize(&bytes).map_err(|e| {
                EngramError::from(GraphError::SnapshotLoad {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            })?;
            for (a, b, w) in delta.assignments {
                graph.set(a, b, w)?;
            }
        }
        Ok(graph)
    }

    /// Write the base snapshot atomically (temp file + rename).
    pub fn save_base(&self, graph: &WeightGraph) -> EngramResult<()> {
        let file = GraphFile {
            prune_threshold: graph.prune_threshold(),
            edges: graph.sorted_edges(),
        };
        let bytes = bincode::serialize(&file).map_err(|e| EngramError::Serialization {
            message: e.to_string(),
        })?;
        let tmp = self.dir.join(format!("{BASE_FILE}.tmp"));
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, self.dir.join(BASE_FILE))?;
        Ok(())
    }

    /// Append one job's delta as the next numbered file.
    pub fn append_delta(
        &self,
        job_id: &str,
        assignments: Vec<(ConceptId, ConceptId, f64)>,
    ) -> EngramResult<PathBuf> {
        let next = self
            .delta_paths()?
            .last()
            .and_then(|p| delta_number(p))
            .map(|n| n + 1)
            .unwrap_or(0);
        let path = self.dir.join(format!("{next:04}.{DELTA_EXT}"));
        let delta = DeltaFile {
            job_id: job_id.to_string(),
            assignments,
        };
        let bytes = bincode::serialize(&delta).map_err(|e| EngramError::Serialization {
            message: e.to_string(),
        })?;
        let mut f = fs::File::create(&path)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
        tracing::debug!(path = %path.display(), job_id, "graph delta persisted");
        Ok(path)
    }

    /// Fold all deltas into a fresh base and remove them.
    pub fn compact(&self, graph: &WeightGraph) -> EngramResult<usize> {
        self.save_base(graph)?;
        let deltas = self.delta_paths()?;
        let removed = deltas.len();
        for path in deltas {
            fs::remove_file(path)?;
        }
        if removed > 0 {
            tracing::info!(removed, "compacted graph deltas into base");
        }
        Ok(removed)
    }

    /// Raw bytes of the current base snapshot (round-trip verification).
    pub fn base_bytes(&self) -> EngramResult<Vec<u8>> {
        Ok(fs::read(self.dir.join(BASE_FILE))?)
    }

    fn delta_paths(&self) -> EngramResult<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == DELTA_EXT).unwrap_or(false))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn delta_number(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}
