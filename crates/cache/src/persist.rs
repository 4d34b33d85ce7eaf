//! JSON-lines snapshots of a cache, so a restarted process can start warm.
//!
//! One entry per line, least recently used first, so replaying the file in
//! order reproduces recency. A line that does not decode is dropped and
//! counted; it never fails the load.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CacheError;
use crate::ttl::{CacheEntry, TtlCache};

#[derive(Debug, Deserialize)]
struct PersistedEntry<V> {
    key: String,
    value: V,
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
    hit_count: u64,
}

#[derive(Serialize)]
struct PersistedEntryRef<'a, V> {
    key: &'a str,
    value: &'a V,
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
    hit_count: u64,
}

/// Outcome of [`TtlCache::load_from_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    /// Entries whose TTL had already elapsed.
    pub expired: usize,
    /// Lines that could not be decoded.
    pub corrupted: usize,
}

impl<V> TtlCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Write every live entry to `path`. Returns the number written.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        let entries = self.live_entries();

        for entry in &entries {
            let record = PersistedEntryRef {
                key: &entry.key,
                value: &entry.value,
                created_at: entry.created_at,
                ttl_seconds: entry.ttl_seconds,
                hit_count: entry.hit_count,
            };
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        info!(path = %path.display(), entries = entries.len(), "cache snapshot saved");
        Ok(entries.len())
    }

    /// Merge a snapshot written by [`save_to_path`](Self::save_to_path).
    pub fn load_from_path(&self, path: impl AsRef<Path>) -> Result<LoadReport, CacheError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let now = self.now();
        let mut report = LoadReport::default();

        // Raw bytes: a line that is not UTF-8 is a corrupt entry, not an IO error.
        for (line_no, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            if line.trim_ascii().is_empty() {
                continue;
            }
            let record: PersistedEntry<V> = match serde_json::from_slice(&line) {
                Ok(record) => record,
                Err(err) => {
                    warn!(path = %path.display(), line = line_no + 1, error = %err, "discarding malformed cache snapshot entry");
                    report.corrupted += 1;
                    continue;
                }
            };
            let entry = CacheEntry {
                key: record.key,
                value: record.value,
                created_at: record.created_at,
                ttl_seconds: record.ttl_seconds,
                hit_count: record.hit_count,
            };
            if entry.is_expired(now) {
                report.expired += 1;
                continue;
            }
            self.restore(entry);
            report.loaded += 1;
        }

        info!(
            path = %path.display(),
            loaded = report.loaded,
            expired = report.expired,
            corrupted = report.corrupted,
            "cache snapshot loaded"
        );
        Ok(report)
    }
}
