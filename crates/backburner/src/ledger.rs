//! File-size ledger: records the expected sizes of data files and checks
//! whether they were truncated or corrupted on disk. Independent of the
//! background pool; ships here because the maintenance tasks are its main
//! consumers.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed ledger file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Persisted map of file name to expected size.
///
/// Every `record` call rewrites the backing JSON document, so the ledger on
/// disk always reflects the last recorded state. Files the ledger has never
/// seen pass verification.
pub struct FileSizeLedger {
    path: PathBuf,
    sizes: BTreeMap<String, u64>,
}

impl FileSizeLedger {
    /// Open a ledger backed by `path`, loading the existing document if one
    /// is there.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let sizes = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, sizes })
    }

    /// Point the ledger at a new backing file (used when a table is moved).
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    /// Record the current size of `file` and save the ledger.
    pub fn record(&mut self, file: &Path) -> Result<(), LedgerError> {
        self.record_entry(file)?;
        self.save()
    }

    /// Record the current sizes of several files, saving once at the end.
    pub fn record_many<'a>(
        &mut self,
        files: impl IntoIterator<Item = &'a Path>,
    ) -> Result<(), LedgerError> {
        for file in files {
            self.record_entry(file)?;
        }
        self.save()
    }

    /// Check `file` against its recorded size. Unknown files pass; a
    /// mismatch or an unreadable file is logged and fails.
    pub fn verify(&self, file: &Path) -> bool {
        let Some(&expected) = self.sizes.get(&file_key(file)) else {
            return true;
        };
        match fs::metadata(file) {
            Ok(meta) if meta.len() == expected => true,
            Ok(meta) => {
                error!(
                    "Size of {} is wrong: {} bytes on disk, {} expected",
                    file.display(),
                    meta.len(),
                    expected
                );
                false
            }
            Err(err) => {
                error!("Cannot stat {}: {}", file.display(), err);
                false
            }
        }
    }

    /// Check several files; reports every mismatch, true only if all pass.
    pub fn verify_many<'a>(&self, files: impl IntoIterator<Item = &'a Path>) -> bool {
        let mut correct = true;
        for file in files {
            correct &= self.verify(file);
        }
        correct
    }

    fn record_entry(&mut self, file: &Path) -> Result<(), LedgerError> {
        let size = fs::metadata(file)?.len();
        self.sizes.insert(file_key(file), size);
        Ok(())
    }

    fn save(&self) -> Result<(), LedgerError> {
        fs::write(&self.path, serde_json::to_string_pretty(&self.sizes)?)?;
        Ok(())
    }
}

/// Ledger keys are file names, not full paths; a table's files stay
/// verifiable after the table directory is relocated.
fn file_key(file: &Path) -> String {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
