//! Bounded reading history kept as a JSON array on disk.
//!
//! The file holds the most recent readings, oldest first:
//!
//! ```json
//! [{"pm25": 25.3, "pm10": 8.7, "time": "17.10.2026 14:02:11"}]
//! ```

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Reading, DEFAULT_HISTORY_CAPACITY, DEFAULT_HISTORY_PATH};

/// Timestamp layout used in the history file.
pub const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One stored reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub pm25: f32,
    pub pm10: f32,
    pub time: String,
}

impl HistoryEntry {
    pub fn new(reading: &Reading, at: DateTime<Local>) -> Self {
        Self {
            pm25: reading.pm2_5,
            pm10: reading.pm10,
            time: at.format(TIME_FORMAT).to_string(),
        }
    }

    /// Stamps a reading with the current local time.
    pub fn now(reading: &Reading) -> Self {
        Self::new(reading, Local::now())
    }
}

/// History file holding at most `capacity` entries.
#[derive(Debug, Clone)]
pub struct ReadingLog {
    path: PathBuf,
    capacity: usize,
}

impl ReadingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored entries. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No history at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Appends an entry, dropping the oldest ones beyond capacity.
    ///
    /// Returns the number of entries now stored.
    pub fn append(&self, entry: HistoryEntry) -> Result<usize, HistoryError> {
        let mut entries = self.load()?;
        entries.push(entry);
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
        self.save(&entries)?;
        Ok(entries.len())
    }

    pub fn save(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        let json = serde_json::to_string(entries)?;
        fs::write(&self.path, json)?;
        debug!(
            "Saved {} history entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl Default for ReadingLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_log(name: &str) -> ReadingLog {
        let path = std::env::temp_dir().join(format!(
            "sds011-history-{}-{}.json",
            std::process::id(),
            name
        ));
        let _ = fs::remove_file(&path);
        ReadingLog::new(path)
    }

    fn entry(n: u16) -> HistoryEntry {
        HistoryEntry {
            pm25: n as f32,
            pm10: n as f32 * 2.0,
            time: format!("01.01.2026 00:00:{:02}", n % 60),
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let log = temp_log("missing");
        assert!(log.load().unwrap().is_empty());
    }

    #[test]
    fn entry_serializes_with_field_names() {
        let at = Local.with_ymd_and_hms(2026, 10, 17, 14, 2, 11).unwrap();
        let entry = HistoryEntry::new(
            &Reading {
                pm2_5: 25.3,
                pm10: 8.7,
            },
            at,
        );
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"pm25":25.3,"pm10":8.7,"time":"17.10.2026 14:02:11"}"#
        );
    }

    #[test]
    fn append_evicts_oldest_beyond_capacity() {
        let log = temp_log("evict").capacity(3);
        for n in 0..5 {
            log.append(entry(n)).unwrap();
        }
        let stored = log.load().unwrap();
        assert_eq!(stored, vec![entry(2), entry(3), entry(4)]);
        fs::remove_file(log.path()).unwrap();
    }

    #[test]
    fn default_capacity_is_one_hundred() {
        let log = temp_log("hundred");
        let full: Vec<HistoryEntry> = (0..100).map(entry).collect();
        log.save(&full).unwrap();
        assert_eq!(log.append(entry(100)).unwrap(), 100);
        let stored = log.load().unwrap();
        assert_eq!(stored.first(), Some(&entry(1)));
        assert_eq!(stored.last(), Some(&entry(100)));
        fs::remove_file(log.path()).unwrap();
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let log = temp_log("corrupt");
        fs::write(log.path(), "not json").unwrap();
        assert!(matches!(log.load(), Err(HistoryError::Json(_))));
        fs::remove_file(log.path()).unwrap();
    }
}
