//! Segmented log I/O: length-prefixed records, rotation, fsync policy,
//! and startup recovery of partial trailing records.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use engram_core::config::FsyncMode;
use engram_core::errors::{EngramResult, VaultError};
use engram_core::models::RecoveryReport;

/// Length-prefix size: records are `{u32 len}{bytes}`.
const PREFIX: u64 = 4;

fn segment_path(dir: &Path, segment: u64) -> PathBuf {
    dir.join(format!("{segment:05}.log"))
}

/// Appends records to the current segment, rotating at the size limit.
///
/// One writer exists per vault; the engine serialises access.
pub struct SegmentWriter {
    dir: PathBuf,
    segment: u64,
    file: File,
    offset: u64,
    segment_size_bytes: u64,
    fsync_mode: FsyncMode,
    fsync_interval_secs: u64,
    last_sync: Instant,
}

impl SegmentWriter {
    /// Open the writer positioned at the end of the highest segment.
    pub fn open(
        dir: &Path,
        segment_size_bytes: u64,
        fsync_mode: FsyncMode,
        fsync_interval_secs: u64,
    ) -> EngramResult<Self> {
        fs::create_dir_all(dir)?;
        let segment = highest_segment(dir)?.unwrap_or(0);
        let path = segment_path(dir, segment);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let offset = file.metadata()?.len();
        Ok(Self {
            dir: dir.to_path_buf(),
            segment,
            file,
            offset,
            segment_size_bytes,
            fsync_mode,
            fsync_interval_secs,
            last_sync: Instant::now(),
        })
    }

    /// Append one record, returning (segment, offset) of its prefix.
    pub fn append(&mut self, record: &[u8]) -> EngramResult<(u64, u64)> {
        if self.offset > 0 && self.offset + PREFIX + record.len() as u64 > self.segment_size_bytes
        {
            self.rotate()?;
        }
        let at = (self.segment, self.offset);
        self.file.write_all(&(record.len() as u32).to_le_bytes())?;
        self.file.write_all(record)?;
        self.offset += PREFIX + record.len() as u64;
        match self.fsync_mode {
            FsyncMode::Always => self.file.sync_data()?,
            FsyncMode::Interval => {
                if self.last_sync.elapsed().as_secs() >= self.fsync_interval_secs {
                    self.file.sync_data()?;
                    self.last_sync = Instant::now();
                }
            }
            FsyncMode::Off => {}
        }
        Ok(at)
    }

    /// Close the current segment (fsync) and start the next one.
    pub fn rotate(&mut self) -> EngramResult<()> {
        self.file.sync_all()?;
        self.segment += 1;
        let path = segment_path(&self.dir, self.segment);
        self.file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.offset = 0;
        tracing::debug!(segment = self.segment, "rotated vault segment");
        Ok(())
    }

    /// Flush and fsync whatever is buffered.
    pub fn sync(&mut self) -> EngramResult<()> {
        self.file.sync_all()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    pub fn current_segment(&self) -> u64 {
        self.segment
    }

    pub fn current_offset(&self) -> u64 {
        self.offset
    }
}

/// Positional reads over sealed and active segments.
pub struct SegmentReader {
    dir: PathBuf,
}

impl SegmentReader {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Read the record whose prefix starts at (segment, offset).
    pub fn read_at(&self, segment: u64, offset: u64) -> EngramResult<Vec<u8>> {
        let path = segment_path(&self.dir, segment);
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut prefix = [0u8; 4];
        file.read_exact(&mut prefix)
            .map_err(|_| VaultError::SegmentCorrupt { segment, offset })?;
        let len = u32::from_le_bytes(prefix) as usize;
        let mut record = vec![0u8; len];
        file.read_exact(&mut record)
            .map_err(|_| VaultError::SegmentCorrupt { segment, offset })?;
        Ok(record)
    }

    /// All segment numbers present, ascending.
    pub fn segments(&self) -> EngramResult<Vec<u64>> {
        let mut segments: Vec<u64> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| parse_segment(&e.path()))
            .collect();
        segments.sort_unstable();
        Ok(segments)
    }

    /// Scan every whole record in a segment as (offset, bytes).
    ///
    /// Stops cleanly before a partial trailing record; the caller decides
    /// whether to truncate.
    pub fn scan(&self, segment: u64) -> EngramResult<Vec<(u64, Vec<u8>)>> {
        let path = segment_path(&self.dir, segment);
        let data = fs::read(&path)?;
        let mut records = Vec::new();
        let mut pos = 0u64;
        while (pos + PREFIX) <= data.len() as u64 {
            let mut prefix = [0u8; 4];
            prefix.copy_from_slice(&data[pos as usize..pos as usize + 4]);
            let len = u32::from_le_bytes(prefix) as u64;
            if pos + PREFIX + len > data.len() as u64 {
                break;
            }
            let start = (pos + PREFIX) as usize;
            records.push((pos, data[start..start + len as usize].to_vec()));
            pos += PREFIX + len;
        }
        Ok(records)
    }

    /// Byte length at which the segment's last whole record ends.
    pub fn valid_length(&self, segment: u64) -> EngramResult<u64> {
        let records = self.scan(segment)?;
        Ok(records
            .last()
            .map(|(off, bytes)| off + PREFIX + bytes.len() as u64)
            .unwrap_or(0))
    }

    /// File length on disk.
    pub fn file_length(&self, segment: u64) -> EngramResult<u64> {
        Ok(fs::metadata(segment_path(&self.dir, segment))?.len())
    }

    /// Rewrite a segment keeping only the records whose offsets are NOT in
    /// `drop_offsets`. Atomic: writes a temp file, then renames over.
    /// Returns the surviving records as (new_offset, bytes).
    pub fn rewrite_without(
        &self,
        segment: u64,
        drop_offsets: &std::collections::HashSet<u64>,
    ) -> EngramResult<Vec<(u64, Vec<u8>)>> {
        let records = self.scan(segment)?;
        let path = segment_path(&self.dir, segment);
        let tmp = path.with_extension("log.tmp");
        let mut survivors = Vec::new();
        {
            let mut out = File::create(&tmp)?;
            let mut pos = 0u64;
            for (off, bytes) in records {
                if drop_offsets.contains(&off) {
                    continue;
                }
                out.write_all(&(bytes.len() as u32).to_le_bytes())?;
                out.write_all(&bytes)?;
                survivors.push((pos, bytes.clone()));
                pos += PREFIX + bytes.len() as u64;
            }
            out.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(survivors)
    }
}

/// Truncate partial trailing records in the highest segment, reporting
/// what was dropped. Lower segments are sealed and assumed whole.
pub fn recover(dir: &Path, report: &mut RecoveryReport) -> EngramResult<()> {
    let reader = SegmentReader::new(dir);
    let Some(last) = reader.segments()?.into_iter().last() else {
        return Ok(());
    };
    let valid = reader.valid_length(last)?;
    let actual = reader.file_length(last)?;
    if actual > valid {
        let file = OpenOptions::new().write(true).open(segment_path(dir, last))?;
        file.set_len(valid)?;
        file.sync_all()?;
        report.truncated_bytes = actual - valid;
        report.truncated_segment = Some(last);
        tracing::warn!(
            segment = last,
            truncated = actual - valid,
            "truncated partial trailing record"
        );
    }
    Ok(())
}

fn highest_segment(dir: &Path) -> EngramResult<Option<u64>> {
    let mut max = None;
    for entry in fs::read_dir(dir)? {
        if let Some(n) = parse_segment(&entry?.path()) {
            max = Some(max.map_or(n, |m: u64| m.max(n)));
        }
    }
    Ok(max)
}

fn parse_segment(path: &Path) -> Option<u64> {
    if path.extension()? != "log" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}
