//! Storage engine configuration (spec.md §6.4).
//!
//! Loaded from a YAML file the way `rust-us-mysql-cdc-rs`'s `connection`
//! crate loads its connection/session config (via `serde` + `serde_yaml`);
//! the file-forensics CLI in [`crate::cli`] keeps using `clap` for its own
//! flags and is unaffected by this module.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::innodb::constants::SIZE_PAGE_DEFAULT;
use crate::IdbError;

/// How aggressively commits are made durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlushAtTrxCommit {
    /// Write and fsync the log once per second; commit does not wait.
    EverySecond = 0,
    /// fsync the log on every commit (full durability, default).
    EveryCommit = 1,
    /// Write the log on every commit, fsync once per second.
    WritePerCommitFlushPerSecond = 2,
}

impl Default for FlushAtTrxCommit {
    fn default() -> Self {
        FlushAtTrxCommit::EveryCommit
    }
}

/// Top-level engine configuration, matching spec.md §6.4 exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Max resident pages (in bytes); divided by `page_size` for a page budget.
    pub buffer_pool_size: u64,
    /// Page size in bytes. Fixed at 16384 for this engine.
    pub page_size: u32,
    /// Durability discipline for transaction commit.
    pub flush_log_at_trx_commit: FlushAtTrxCommit,
    /// Whether user tables each get their own `.ibd` file (vs. living in
    /// the system tablespace).
    pub file_per_table: bool,
    /// Size in bytes of each redo log file.
    pub redo_log_size: u64,
    /// Number of redo log files in the ring.
    pub redo_log_files: u32,
    /// Root directory for tablespace files.
    pub data_dir: PathBuf,
    /// Directory for redo log files.
    pub redo_log_dir: PathBuf,
    /// Directory for undo log segments.
    pub undo_log_dir: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            buffer_pool_size: 128 * 1024 * 1024,
            page_size: SIZE_PAGE_DEFAULT,
            flush_log_at_trx_commit: FlushAtTrxCommit::EveryCommit,
            file_per_table: true,
            redo_log_size: 48 * 1024 * 1024,
            redo_log_files: 2,
            data_dir: PathBuf::from("./data"),
            redo_log_dir: PathBuf::from("./data/redo"),
            undo_log_dir: PathBuf::from("./data/undo"),
        }
    }
}

impl DbConfig {
    /// Load configuration from a YAML file, falling back to [`Default`] for
    /// any field the file omits.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, IdbError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| IdbError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text)
            .map_err(|e| IdbError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// Validate invariants that a YAML file cannot express via the type
    /// system alone (e.g. page size must be one InnoDB supports).
    pub fn validate(&self) -> Result<(), IdbError> {
        if self.page_size != SIZE_PAGE_DEFAULT {
            return Err(IdbError::Config(format!(
                "page_size must be {} for this engine, got {}",
                SIZE_PAGE_DEFAULT, self.page_size
            )));
        }
        if self.buffer_pool_size < self.page_size as u64 * 64 {
            return Err(IdbError::Config(
                "buffer_pool_size must hold at least one extent".into(),
            ));
        }
        if self.redo_log_files == 0 {
            return Err(IdbError::Config("redo_log_files must be >= 1".into()));
        }
        Ok(())
    }

    /// Buffer pool capacity expressed in whole pages.
    pub fn buffer_pool_pages(&self) -> usize {
        (self.buffer_pool_size / self.page_size as u64) as usize
    }

    pub fn ibdata1_path(&self) -> PathBuf {
        self.data_dir.join("ibdata1")
    }

    pub fn table_path(&self, db: &str, table: &str) -> PathBuf {
        self.data_dir.join(db).join(format!("{}.ibd", table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(DbConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_default_page_size() {
        let mut cfg = DbConfig::default();
        cfg.page_size = 8192;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_partial_yaml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yml");
        std::fs::write(&path, "buffer_pool_size: 67108864\nfile_per_table: false\n").unwrap();
        let cfg = DbConfig::from_yaml_file(&path).unwrap();
        assert_eq!(cfg.buffer_pool_size, 67108864);
        assert!(!cfg.file_per_table);
        assert_eq!(cfg.redo_log_files, 2); // default preserved
    }

    #[test]
    fn buffer_pool_pages_divides_by_page_size() {
        let cfg = DbConfig::default();
        assert_eq!(
            cfg.buffer_pool_pages(),
            (cfg.buffer_pool_size / cfg.page_size as u64) as usize
        );
    }
}
