//! System tablespace bootstrap (spec.md §6.2): creates/opens `ibdata1` and
//! enforces the fixed space-id allocation policy from spec.md §3.
//!
//! `ibdata1` is just another [`crate::storage::space::Space`] (space id 0);
//! this module only adds the id-range bookkeeping and the data-dictionary
//! root page spec.md §3 calls out (`DD_ROOT_PAGE_NO`).

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::storage::space::Space;
use crate::storage::{
    DD_ROOT_PAGE_NO, INFORMATION_SCHEMA_SPACE_ID_RANGE, MYSQL_SPACE_ID_RANGE,
    PERFORMANCE_SCHEMA_SPACE_ID_RANGE, SYSTEM_SPACE_ID, USER_SPACE_ID_START,
};
use crate::IdbError;

/// The kind of catalog a table belongs to, matching spec.md §3's four
/// space-id bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Mysql,
    InformationSchema,
    PerformanceSchema,
    User,
}

/// Assigns space ids out of the band spec.md §3 reserves for each catalog,
/// and owns the bootstrap of `ibdata1` itself.
pub struct SystemCatalog {
    pub ibdata1: Arc<Space>,
    next_mysql: AtomicU32,
    next_information_schema: AtomicU32,
    next_performance_schema: AtomicU32,
    next_user: AtomicU32,
}

impl SystemCatalog {
    /// Bootstrap a brand-new data directory: create `ibdata1` with its FSP
    /// header and data-dictionary root page (spec.md §6.2).
    pub fn bootstrap(data_dir: &Path, page_size: u32) -> Result<Self, IdbError> {
        std::fs::create_dir_all(data_dir).map_err(|e| IdbError::Io(e.to_string()))?;
        let path = data_dir.join("ibdata1");
        let ibdata1 = Space::create_space(&path, SYSTEM_SPACE_ID, page_size)?;
        // Reserve pages up to and including the DD root so allocate_page
        // never hands it out to an ordinary segment.
        while ibdata1.size_pages() <= DD_ROOT_PAGE_NO {
            ibdata1.allocate_page(None)?;
        }
        Ok(SystemCatalog {
            ibdata1: Arc::new(ibdata1),
            next_mysql: AtomicU32::new(*MYSQL_SPACE_ID_RANGE.start()),
            next_information_schema: AtomicU32::new(*INFORMATION_SCHEMA_SPACE_ID_RANGE.start()),
            next_performance_schema: AtomicU32::new(*PERFORMANCE_SCHEMA_SPACE_ID_RANGE.start()),
            next_user: AtomicU32::new(USER_SPACE_ID_START),
        })
    }

    /// Reopen an existing data directory's `ibdata1`.
    pub fn open(data_dir: &Path) -> Result<Self, IdbError> {
        let path = data_dir.join("ibdata1");
        let ibdata1 = Space::open_space(&path, SYSTEM_SPACE_ID)?;
        Ok(SystemCatalog {
            ibdata1: Arc::new(ibdata1),
            next_mysql: AtomicU32::new(*MYSQL_SPACE_ID_RANGE.start()),
            next_information_schema: AtomicU32::new(*INFORMATION_SCHEMA_SPACE_ID_RANGE.start()),
            next_performance_schema: AtomicU32::new(*PERFORMANCE_SCHEMA_SPACE_ID_RANGE.start()),
            next_user: AtomicU32::new(USER_SPACE_ID_START),
        })
    }

    /// Allocate the next space id in `catalog`'s reserved band (spec.md §3).
    pub fn allocate_space_id(&self, catalog: Catalog) -> Result<u32, IdbError> {
        let (counter, range_end): (&AtomicU32, Option<u32>) = match catalog {
            Catalog::Mysql => (&self.next_mysql, Some(*MYSQL_SPACE_ID_RANGE.end())),
            Catalog::InformationSchema => (&self.next_information_schema, Some(*INFORMATION_SCHEMA_SPACE_ID_RANGE.end())),
            Catalog::PerformanceSchema => (&self.next_performance_schema, Some(*PERFORMANCE_SCHEMA_SPACE_ID_RANGE.end())),
            Catalog::User => (&self.next_user, None),
        };
        let id = counter.fetch_add(1, Ordering::SeqCst);
        if let Some(end) = range_end {
            if id > end {
                counter.fetch_sub(1, Ordering::SeqCst);
                return Err(IdbError::ResourceExhausted(format!(
                    "space id band for {:?} exhausted at {}",
                    catalog, end
                )));
            }
        }
        Ok(id)
    }
}
