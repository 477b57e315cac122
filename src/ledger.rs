//! Persisted record of years whose retrieval already finished.
//!
//! The ledger is a small JSON document rewritten after each completed year, so
//! an interrupted batch can be restarted and will skip the years it already has.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub target: String,
    pub size_bytes: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    completed: BTreeMap<i32, LedgerEntry>,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    data: LedgerFile,
}

impl Ledger {
    /// Open the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(s) if s.trim().is_empty() => LedgerFile::default(),
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerFile::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), years = data.completed.len(), "ledger loaded");
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_complete(&self, year: i32) -> bool {
        self.data.completed.contains_key(&year)
    }

    pub fn get(&self, year: i32) -> Option<&LedgerEntry> {
        self.data.completed.get(&year)
    }

    pub fn completed_years(&self) -> impl Iterator<Item = i32> + '_ {
        self.data.completed.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.data.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.completed.is_empty()
    }

    /// Record `year` as done and persist immediately.
    pub fn record(&mut self, year: i32, entry: LedgerEntry) -> Result<()> {
        self.data.completed.insert(year, entry);
        self.save()
    }

    /// Forget `year` (used when a download is forced again).
    pub fn forget(&mut self, year: i32) -> Result<()> {
        if self.data.completed.remove(&year).is_some() {
            self.save()?;
        }
        Ok(())
    }

    /// Write to a sibling temp file, then rename over the ledger.
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let body = serde_json::to_vec_pretty(&self.data)?;
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&body)?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(target: &str) -> LedgerEntry {
        LedgerEntry {
            target: target.to_string(),
            size_bytes: 1024,
            completed_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json")).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.is_complete(1980));
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.record(1980, entry("a.nc")).unwrap();
        ledger.record(1981, entry("b.nc")).unwrap();

        let reopened = Ledger::open(&path).unwrap();
        assert_eq!(reopened.completed_years().collect::<Vec<_>>(), vec![1980, 1981]);
        assert_eq!(reopened.get(1981), Some(&entry("b.nc")));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn forget_removes_year() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = Ledger::open(&path).unwrap();
        ledger.record(1990, entry("x.nc")).unwrap();
        ledger.forget(1990).unwrap();
        assert!(!Ledger::open(&path).unwrap().is_complete(1990));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Ledger::open(&path).is_err());
    }
}
