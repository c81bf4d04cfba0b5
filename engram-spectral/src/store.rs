//! Spectrum persistence: `modes.bin` (latest mode set) and `history.bin`
//! (append-only prediction-error / stability-index samples).

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use engram_core::errors::{EngramError, EngramResult};

use crate::engine::ModeSetState;

const MODES_FILE: &str = "modes.bin";
const HISTORY_FILE: &str = "history.bin";

/// One appended history sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub timestamp: DateTime<Utc>,
    pub prediction_error: f64,
    pub stability_index: f64,
    pub modes_retained: usize,
}

/// Directory-backed spectrum store.
pub struct SpectrumStore {
    dir: PathBuf,
}

impl SpectrumStore {
    pub fn open(dir: &Path) -> EngramResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Persist the latest mode set atomically.
    pub fn save_modes(&self, state: &ModeSetState) -> EngramResult<()> {
        let bytes = bincode::serialize(state).map_err(|e| EngramError::Serialization {
            message: e.to_string(),
        })?;
        let tmp = self.dir.join(format!("{MODES_FILE}.tmp"));
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, self.dir.join(MODES_FILE))?;
        Ok(())
    }

    /// Load the latest mode set, when one was saved.
    pub fn load_modes(&self) -> EngramResult<Option<ModeSetState>> {
        let path = self.dir.join(MODES_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let state = bincode::deserialize(&bytes).map_err(|e| EngramError::Serialization {
            message: format!("modes.bin unreadable: {e}"),
        })?;
        Ok(Some(state))
    }

    /// Append one history sample (length-prefixed record).
    pub fn append_history(&self, sample: &HistorySample) -> EngramResult<()> {
        let bytes = bincode::serialize(sample).map_err(|e| EngramError::Serialization {
            message: e.to_string(),
        })?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(HISTORY_FILE))?;
        f.write_all(&(bytes.len() as u32).to_le_bytes())?;
        f.write_all(&bytes)?;
        Ok(())
    }

    /// Read the whole history, oldest first. A partial trailing record
    /// (torn append) is ignored.
    pub fn read_history(&self) -> EngramResult<Vec<HistorySample>> {
        let path = self.dir.join(HISTORY_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;
        let mut samples = Vec::new();
        let mut pos = 0usize;
        while pos + 4 <= data.len() {
            let mut prefix = [0u8; 4];
            prefix.copy_from_slice(&data[pos..pos + 4]);
            let len = u32::from_le_bytes(prefix) as usize;
            if pos + 4 + len > data.len() {
                break;
            }
            if let Ok(sample) = bincode::deserialize(&data[pos + 4..pos + 4 + len]) {
                samples.push(sample);
            }
            pos += 4 + len;
        }
        Ok(samples)
    }
}
