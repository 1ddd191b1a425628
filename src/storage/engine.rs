//! Upward-facing KV/scan/transaction API (spec.md §6.1): the `Database` /
//! `Table` / `Transaction` surface a SQL executor or wire-protocol layer
//! would sit on top of, tying together every lower layer in this module.
//!
//! Grounded the way `rust-us-mysql-cdc-rs`'s top-level client wires a
//! connection, a codec, and an event sink behind one struct: `Database` owns
//! the long-lived handles (buffer pool, WAL, transaction manager, undo log)
//! and hands out `Arc<Table>` for callers to operate on, rather than exposing
//! the lower layers directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::btree::{BTree, IndexSchema};
use crate::storage::buffer_pool::{BufferPool, SpaceRegistry, WorkerHandles};
use crate::storage::config::{DbConfig, FlushAtTrxCommit};
use crate::storage::mvcc::{RowKey, UndoLog};
use crate::storage::record::{self, ColumnDef, Row, Schema};
use crate::storage::recovery;
use crate::storage::segment::SegmentManager;
use crate::storage::space::Space;
use crate::storage::system::{Catalog, SystemCatalog};
use crate::storage::txn::{IsolationLevel, LockMode, Transaction, TransactionManager};
use crate::storage::wal::{RedoRecord, RedoType, WalWriter};
use crate::IdbError;

/// A column's shape as persisted in the table catalog: a DTO around
/// [`ColumnDef`] rather than adding `serde` derives to the InnoDB-forensics
/// `ColumnStorageInfo` type itself, which has its own, narrower, purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnSpec {
    name: String,
    nullable: bool,
    variable: bool,
    fixed_len: usize,
}

impl From<&ColumnDef> for ColumnSpec {
    fn from(c: &ColumnDef) -> Self {
        ColumnSpec {
            name: c.name.clone(),
            nullable: c.is_nullable,
            variable: c.is_variable,
            fixed_len: c.fixed_len,
        }
    }
}

impl ColumnSpec {
    fn to_column_def(&self) -> ColumnDef {
        ColumnDef::user_column(&self.name, self.nullable, self.variable, self.fixed_len)
    }
}

/// One table's durable catalog entry (`<data_dir>/catalog.json`), enough for
/// [`Database::open`] to reconstruct its `Space`, `SegmentManager` and
/// `BTree` without replaying anything beyond the redo log.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableCatalogEntry {
    name: String,
    path: PathBuf,
    space_id: u32,
    index_id: u64,
    root_page: u32,
    leaf_segment: u64,
    internal_segment: u64,
    key_len: usize,
    leaf_columns: Vec<ColumnSpec>,
    internal_columns: Vec<ColumnSpec>,
}

/// Body of a DML redo record: logical before/after row images rather than a
/// physical byte patch, since the B+tree's `insert`/`delete` don't report
/// which physical pages they touch during a split (spec.md §9's redo-format
/// detail is an Open Question; see DESIGN.md for why this shape was chosen).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum DmlBody {
    Insert { row: Row },
    Delete { row: Row },
    Update { old: Row, new: Row },
}

/// A secondary index: leaves hold the indexed columns followed by the
/// clustered primary key (spec.md §4.1 "secondary B+tree: leaves hold
/// indexed columns + clustered PK"), not the full row. Keying the leaf
/// schema on every column rather than just the indexed prefix sidesteps
/// the need for a multi-match range primitive on [`BTree`], which only
/// exposes single-key `search` plus a full `scan`: appending the PK makes
/// every leaf entry unique even for a non-unique index, and `idx_lookup`
/// answers a lookup with a full scan filtered by the indexed columns
/// (see DESIGN.md for why this trades lookup cost for simplicity).
struct SecondaryIndex {
    tree: BTree,
    /// Which columns of the table's own row make up the indexed value, by
    /// position (`storage::record::Schema` has no by-name lookup).
    indexed_columns: std::ops::Range<usize>,
}

/// One open table: a clustered index plus the space/segment state backing
/// it, and any secondary indexes built over it. Handed out by
/// [`Database::create_table`]/[`Database::open_table`].
pub struct Table {
    name: String,
    space: Arc<Space>,
    space_id: u32,
    segments: SegmentManager,
    tree: BTree,
    secondary: RwLock<HashMap<String, SecondaryIndex>>,
    next_index_id: AtomicU64,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space_id(&self) -> u32 {
        self.space_id
    }

    pub(crate) fn key_of(&self, row: &Row) -> Row {
        row[..self.tree.key_len()].to_vec()
    }

    /// Apply a redo-replayed insert directly to the index, bypassing WAL
    /// append and locking (`storage::recovery`, which is itself replaying
    /// the log). Idempotent: a key already present is left untouched, since
    /// the same insert may appear again on a log re-scan.
    pub(crate) fn replay_insert(&self, pool: &BufferPool, row: Row) -> Result<(), IdbError> {
        let key = self.key_of(&row);
        if self.tree.search(pool, self.space_id, &key)?.is_some() {
            return Ok(());
        }
        self.tree.insert(pool, &self.space, &self.segments, self.space_id, row, 0)
    }

    /// Apply a redo-replayed delete directly to the index. Idempotent: a
    /// missing key is left untouched.
    pub(crate) fn replay_delete(&self, pool: &BufferPool, key: &[Option<Vec<u8>>]) -> Result<(), IdbError> {
        self.tree.delete(pool, self.space_id, key, 0)?;
        Ok(())
    }

    /// spec.md §6.1 `insert`: rejects a duplicate primary key, appends redo,
    /// then mutates the index.
    pub fn insert(&self, db: &Database, trx: &Arc<Transaction>, row: Row) -> Result<(), IdbError> {
        db.txn_mgr.register_active(trx);
        let key = self.key_of(&row);
        let row_key = db.row_key_for(self.space_id, &key);
        db.txn_mgr.lock(trx, row_key, LockMode::X)?;
        if self.tree.search(&db.pool, self.space_id, &key)?.is_some() {
            return Err(IdbError::Conflict(format!(
                "duplicate primary key in table '{}'",
                self.name
            )));
        }
        let trx_id = db.txn_mgr.ensure_trx_id(trx);
        let body = encode_body(&DmlBody::Insert { row: row.clone() })?;
        let lsn = db.wal.append(RedoRecord {
            lsn: 0,
            trx_id,
            record_type: RedoType::RecordInsert,
            space_id: self.space_id,
            page_no: 0,
            offset: 0,
            body,
        })?;
        self.tree.insert(&db.pool, &self.space, &self.segments, self.space_id, row.clone(), lsn)?;
        self.insert_into_secondary_indexes(&db.pool, &row)?;
        db.undo.record_insert(trx_id, row_key, key);
        tracing::trace!(table = %self.name, trx_id, "row inserted");
        Ok(())
    }

    /// spec.md §6.1 `update`: read-modify-write against the current version,
    /// not the row a concurrent snapshot would see.
    pub fn update(&self, db: &Database, trx: &Arc<Transaction>, key: &[Option<Vec<u8>>], new_row: Row) -> Result<(), IdbError> {
        db.txn_mgr.register_active(trx);
        let row_key = db.row_key_for(self.space_id, key);
        db.txn_mgr.lock(trx, row_key, LockMode::X)?;
        let old = self
            .tree
            .search(&db.pool, self.space_id, key)?
            .ok_or_else(|| IdbError::NotFound(format!("row not found in table '{}'", self.name)))?;
        let trx_id = db.txn_mgr.ensure_trx_id(trx);
        let body = encode_body(&DmlBody::Update { old: old.clone(), new: new_row.clone() })?;
        let lsn = db.wal.append(RedoRecord {
            lsn: 0,
            trx_id,
            record_type: RedoType::Write,
            space_id: self.space_id,
            page_no: 0,
            offset: 0,
            body,
        })?;
        self.tree.delete(&db.pool, self.space_id, key, lsn)?;
        self.tree.insert(&db.pool, &self.space, &self.segments, self.space_id, new_row.clone(), lsn)?;
        self.delete_from_secondary_indexes(&db.pool, &old)?;
        self.insert_into_secondary_indexes(&db.pool, &new_row)?;
        db.undo.record_update(trx_id, row_key, key.to_vec(), old);
        tracing::trace!(table = %self.name, trx_id, "row updated");
        Ok(())
    }

    /// spec.md §6.1 `delete`. Returns whether a row was actually removed.
    pub fn delete(&self, db: &Database, trx: &Arc<Transaction>, key: &[Option<Vec<u8>>]) -> Result<bool, IdbError> {
        db.txn_mgr.register_active(trx);
        let row_key = db.row_key_for(self.space_id, key);
        db.txn_mgr.lock(trx, row_key, LockMode::X)?;
        let Some(old) = self.tree.search(&db.pool, self.space_id, key)? else {
            return Ok(false);
        };
        let trx_id = db.txn_mgr.ensure_trx_id(trx);
        let body = encode_body(&DmlBody::Delete { row: old.clone() })?;
        let lsn = db.wal.append(RedoRecord {
            lsn: 0,
            trx_id,
            record_type: RedoType::RecordDeleteMark,
            space_id: self.space_id,
            page_no: 0,
            offset: 0,
            body,
        })?;
        let removed = self.tree.delete(&db.pool, self.space_id, key, lsn)?;
        if removed {
            self.delete_from_secondary_indexes(&db.pool, &old)?;
        }
        db.undo.record_update(trx_id, row_key, key.to_vec(), old);
        tracing::trace!(table = %self.name, trx_id, "row deleted");
        Ok(removed)
    }

    /// spec.md §6.1 creates a secondary index over `indexed_columns`, whose
    /// leaves hold those columns followed by the clustered primary key.
    /// `indexed_columns` is a half-open range of positions into the table's
    /// own row schema — not necessarily the leading columns, since those are
    /// always the primary key (see `key_of`) and a secondary index exists
    /// precisely to cover some other column. Shares this table's space and
    /// segment manager (one more INDEX-page segment pair in the same `.ibd`
    /// file), matching how a real InnoDB secondary index co-resides with its
    /// table's clustered index.
    pub fn create_secondary_index(
        &self,
        db: &Database,
        name: &str,
        indexed_columns: std::ops::Range<usize>,
    ) -> Result<(), IdbError> {
        if self.secondary.read().unwrap().contains_key(name) {
            return Err(IdbError::Conflict(format!("secondary index '{}' already exists on '{}'", name, self.name)));
        }
        let row_schema = &self.tree.leaf_schema().columns;
        if indexed_columns.end > row_schema.len() {
            return Err(IdbError::Argument(format!(
                "column range {:?} out of bounds for a {}-column row",
                indexed_columns,
                row_schema.len()
            )));
        }
        let mut all_columns: Vec<ColumnDef> = row_schema[indexed_columns.clone()].to_vec();
        all_columns.extend(row_schema[..self.tree.key_len()].iter().cloned());
        let leaf_schema = Schema::new(all_columns.clone());
        let internal_schema = Schema::new(all_columns);
        let key_len = leaf_schema.columns.len();
        let index_schema = IndexSchema { leaf_schema, internal_schema, key_len };
        let index_id = (self.space_id as u64) << 32 | self.next_index_id.fetch_add(1, Ordering::SeqCst);
        let tree = BTree::create(&db.pool, &self.space, &self.segments, index_id, index_schema)?;
        self.secondary
            .write()
            .unwrap()
            .insert(name.to_string(), SecondaryIndex { tree, indexed_columns });
        tracing::info!(table = %self.name, index = name, "secondary index created");
        Ok(())
    }

    /// spec.md §6.1 `idx.lookup(trx, key) -> iterator<pk>`: every primary
    /// key whose indexed columns equal `key`, filtered to versions visible
    /// under `trx`'s read view (secondary-index entries aren't themselves
    /// versioned, so visibility is re-checked against the clustered row).
    pub fn idx_lookup(&self, db: &Database, trx: &Transaction, name: &str, key: &[Option<Vec<u8>>]) -> Result<Vec<Row>, IdbError> {
        let secondary = self.secondary.read().unwrap();
        let idx = secondary
            .get(name)
            .ok_or_else(|| IdbError::NotFound(format!("secondary index '{}' not found on '{}'", name, self.name)))?;
        let indexed_len = idx.indexed_columns.len();
        let rows = idx.tree.scan(&db.pool, self.space_id)?;
        let view = db.txn_mgr.read_view_for(trx);
        let mut out = Vec::new();
        for row in rows {
            if record::compare_keys(&row[..indexed_len], key) != std::cmp::Ordering::Equal {
                continue;
            }
            let pk = row[indexed_len..].to_vec();
            let row_key = db.row_key_for(self.space_id, &pk);
            let current = self.tree.search(&db.pool, self.space_id, &pk)?;
            if db.undo.visible_version(&view, row_key, current).is_some() {
                out.push(pk);
            }
        }
        Ok(out)
    }

    fn insert_into_secondary_indexes(&self, pool: &BufferPool, row: &Row) -> Result<(), IdbError> {
        let pk = self.key_of(row);
        for idx in self.secondary.read().unwrap().values() {
            let mut entry = row[idx.indexed_columns.clone()].to_vec();
            entry.extend(pk.iter().cloned());
            idx.tree.insert(pool, &self.space, &self.segments, self.space_id, entry, 0)?;
        }
        Ok(())
    }

    fn delete_from_secondary_indexes(&self, pool: &BufferPool, row: &Row) -> Result<(), IdbError> {
        let pk = self.key_of(row);
        for idx in self.secondary.read().unwrap().values() {
            let mut entry = row[idx.indexed_columns.clone()].to_vec();
            entry.extend(pk.iter().cloned());
            idx.tree.delete(pool, self.space_id, &entry, 0)?;
        }
        Ok(())
    }

    /// spec.md §6.1 `get`: MVCC-visible point lookup. Acquires no lock —
    /// reads under MVCC never block a writer (spec.md §5).
    pub fn get(&self, db: &Database, trx: &Transaction, key: &[Option<Vec<u8>>]) -> Result<Option<Row>, IdbError> {
        let current = self.tree.search(&db.pool, self.space_id, key)?;
        let row_key = db.row_key_for(self.space_id, key);
        let view = db.txn_mgr.read_view_for(trx);
        Ok(db.undo.visible_version(&view, row_key, current))
    }

    /// spec.md §6.1 `scan`: full ordered scan, filtered through the same
    /// visibility rule as `get`. A row deleted by a transaction that started
    /// after this view was taken is correctly restored from its undo chain;
    /// a row deleted before the view was taken is simply absent from the
    /// physical scan already, which is also correct.
    pub fn scan(&self, db: &Database, trx: &Transaction) -> Result<Vec<Row>, IdbError> {
        let rows = self.tree.scan(&db.pool, self.space_id)?;
        let view = db.txn_mgr.read_view_for(trx);
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key = self.key_of(&row);
            let row_key = db.row_key_for(self.space_id, &key);
            if let Some(visible) = db.undo.visible_version(&view, row_key, Some(row)) {
                out.push(visible);
            }
        }
        Ok(out)
    }
}

/// Maps a primary-key tuple to the `(space_id, page_no, heap_no)` shape
/// `storage::mvcc`/`storage::txn` address rows by. The B+tree doesn't report
/// the physical page/heap-no a row landed on, so this hashes the encoded key
/// into that shape instead of using the row's real physical location — a
/// stand-in surrogate, not a literal page/heap-no (see DESIGN.md).
fn row_key_for(space_id: u32, key: &[Option<Vec<u8>>]) -> RowKey {
    let mut buf = Vec::new();
    for col in key {
        match col {
            Some(bytes) => buf.extend_from_slice(bytes),
            None => buf.push(0xFF),
        }
    }
    let page_no = crc32c::crc32c(&buf);
    buf.push(0x01);
    let heap_no = (crc32c::crc32c(&buf) & 0xFFFF) as u16;
    (space_id, page_no, heap_no)
}

fn encode_body(body: &DmlBody) -> Result<Vec<u8>, IdbError> {
    serde_json::to_vec(body).map_err(|e| IdbError::Logic(format!("cannot encode redo body: {}", e)))
}

pub(crate) fn decode_body(bytes: &[u8]) -> Result<DmlBody, IdbError> {
    serde_json::from_slice(bytes).map_err(|e| IdbError::Parse(format!("malformed redo body: {}", e)))
}

/// Background worker handles owned by `Database` itself (log flusher,
/// purge), distinct from the buffer pool's own dirty/LRU/prefetch workers
/// (spec.md §5 "dedicated background threads").
struct DatabaseWorkers {
    shutdown: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
    pool_workers: Option<WorkerHandles>,
}

/// The top-level storage engine handle (spec.md §6.1). One instance per open
/// data directory.
pub struct Database {
    config: DbConfig,
    system: SystemCatalog,
    spaces: Arc<SpaceRegistry>,
    pool: BufferPool,
    wal: Arc<WalWriter>,
    txn_mgr: Arc<TransactionManager>,
    undo: Arc<UndoLog>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    next_checkpoint_seq: AtomicU64,
    workers: Mutex<Option<DatabaseWorkers>>,
}

impl Database {
    /// spec.md §6.2 bootstrap: create a brand-new data directory with a
    /// fresh `ibdata1`, redo log, and empty catalog.
    pub fn bootstrap(config: DbConfig) -> Result<Arc<Database>, IdbError> {
        config.validate()?;
        let system = SystemCatalog::bootstrap(&config.data_dir, config.page_size)?;
        let db = Self::assemble(config, system, HashMap::new())?;
        db.save_catalog()?;
        tracing::info!(data_dir = %db.config.data_dir.display(), "bootstrapped new database");
        Ok(db)
    }

    /// spec.md §6.2 `Database::open` / §4.10 recovery: reopen an existing
    /// data directory, reconstruct every cataloged table, then replay redo
    /// and roll back whatever transaction never committed.
    pub fn open(config: DbConfig) -> Result<Arc<Database>, IdbError> {
        config.validate()?;
        let system = SystemCatalog::open(&config.data_dir)?;
        let entries = load_catalog(&config.data_dir)?;

        let mut tables = HashMap::new();
        let mut opened_spaces = Vec::new();
        for entry in &entries {
            let space = Arc::new(Space::open_space(&entry.path, entry.space_id)?);
            opened_spaces.push((entry.space_id, space.clone()));
            let segments = SegmentManager::new(entry.space_id);
            segments.register_existing(entry.leaf_segment, true);
            segments.register_existing(entry.internal_segment, false);
            let leaf_schema = Schema::new(entry.leaf_columns.iter().map(ColumnSpec::to_column_def).collect());
            let internal_schema = Schema::new(entry.internal_columns.iter().map(ColumnSpec::to_column_def).collect());
            let index_schema = IndexSchema {
                leaf_schema,
                internal_schema,
                key_len: entry.key_len,
            };
            let tree = BTree::reopen(entry.index_id, index_schema, entry.leaf_segment, entry.internal_segment, entry.root_page);
            tables.insert(
                entry.name.clone(),
                Arc::new(Table {
                    name: entry.name.clone(),
                    space,
                    space_id: entry.space_id,
                    segments,
                    tree,
                    secondary: RwLock::new(HashMap::new()),
                    next_index_id: AtomicU64::new(2),
                }),
            );
        }

        let db = Self::assemble(config, system, tables)?;
        for (space_id, space) in opened_spaces {
            db.spaces.insert(space_id, space);
        }
        recovery::recover(&db)?;
        tracing::info!(data_dir = %db.config.data_dir.display(), tables = db.tables.read().unwrap().len(), "opened database");
        Ok(db)
    }

    fn assemble(config: DbConfig, system: SystemCatalog, tables: HashMap<String, Arc<Table>>) -> Result<Arc<Database>, IdbError> {
        let spaces: Arc<SpaceRegistry> = Arc::new(dashmap::DashMap::new());
        spaces.insert(crate::storage::SYSTEM_SPACE_ID, system.ibdata1.clone());
        let pool = BufferPool::new(
            config.buffer_pool_pages(),
            spaces.clone(),
            &config.data_dir.join("doublewrite"),
            config.page_size,
        )?;
        let wal = Arc::new(WalWriter::open(
            &config.redo_log_dir,
            config.redo_log_size,
            config.redo_log_files as usize,
            config.flush_log_at_trx_commit as u8,
        )?);
        let txn_mgr = Arc::new(TransactionManager::new());
        let undo = Arc::new(UndoLog::new());

        Ok(Arc::new(Database {
            config,
            system,
            spaces,
            pool,
            wal,
            txn_mgr,
            undo,
            tables: RwLock::new(tables),
            next_checkpoint_seq: AtomicU64::new(0),
            workers: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn wal(&self) -> &Arc<WalWriter> {
        &self.wal
    }

    pub(crate) fn spaces(&self) -> &Arc<SpaceRegistry> {
        &self.spaces
    }

    pub(crate) fn undo(&self) -> &Arc<UndoLog> {
        &self.undo
    }

    pub(crate) fn txn_mgr(&self) -> &Arc<TransactionManager> {
        &self.txn_mgr
    }

    pub(crate) fn tables_by_space(&self) -> HashMap<u32, Arc<Table>> {
        self.tables.read().unwrap().values().map(|t| (t.space_id, t.clone())).collect()
    }

    fn row_key_for(&self, space_id: u32, key: &[Option<Vec<u8>>]) -> RowKey {
        row_key_for(space_id, key)
    }

    /// spec.md §4.9 `begin`.
    pub fn begin(&self, isolation: IsolationLevel) -> Arc<Transaction> {
        self.txn_mgr.begin(isolation)
    }

    /// spec.md §4.9 `commit`: append `TRX_COMMIT` redo, flush per
    /// `flush_log_at_trx_commit`, then release locks and detach undo.
    pub fn commit(&self, trx: &Arc<Transaction>) -> Result<(), IdbError> {
        let trx_id = self.txn_mgr.ensure_trx_id(trx);
        self.wal.append(RedoRecord {
            lsn: 0,
            trx_id,
            record_type: RedoType::TrxCommit,
            space_id: 0,
            page_no: 0,
            offset: 0,
            body: Vec::new(),
        })?;
        match self.config.flush_log_at_trx_commit {
            FlushAtTrxCommit::EveryCommit => self.wal.flush(true)?,
            FlushAtTrxCommit::WritePerCommitFlushPerSecond => {
                self.wal.flush(false)?;
            }
            FlushAtTrxCommit::EverySecond => {
                // Neither written nor fsynced synchronously; the background
                // maintenance thread catches it up within a second.
            }
        }
        self.txn_mgr.mark_committed(trx);
        self.undo.detach(trx_id);
        tracing::debug!(trx_id, "transaction committed");
        Ok(())
    }

    /// spec.md §4.9 `rollback`: undo every write via the in-memory undo
    /// chain, oldest-first reversed, then release locks.
    pub fn rollback(&self, trx: &Arc<Transaction>) -> Result<(), IdbError> {
        let trx_id_opt = *trx.trx_id.lock().unwrap();
        if let Some(trx_id) = trx_id_opt {
            self.wal.append(RedoRecord {
                lsn: 0,
                trx_id,
                record_type: RedoType::TrxRollback,
                space_id: 0,
                page_no: 0,
                offset: 0,
                body: Vec::new(),
            })?;
            let by_space = self.tables_by_space();
            self.undo.rollback(trx_id, |key, pk, before| {
                let (space_id, _, _) = key;
                let Some(table) = by_space.get(&space_id) else { return };
                let lsn = self.wal.current_lsn();
                match before {
                    Some(old_row) => {
                        let _ = table.tree.delete(&self.pool, space_id, &pk, lsn);
                        let _ = table.tree.insert(&self.pool, &table.space, &table.segments, space_id, old_row, lsn);
                    }
                    None => {
                        let _ = table.tree.delete(&self.pool, space_id, &pk, lsn);
                    }
                }
            });
            tracing::debug!(trx_id, "transaction rolled back");
        }
        self.txn_mgr.mark_rolled_back(trx);
        Ok(())
    }

    /// spec.md §6.2 `create_table`: allocates a space id in `catalog`'s
    /// band, creates its file, and a fresh single-key-index clustered
    /// B+tree.
    pub fn create_table(
        self: &Arc<Self>,
        namespace: &str,
        table_name: &str,
        catalog: Catalog,
        leaf_schema: Schema,
        internal_schema: Schema,
        key_len: usize,
    ) -> Result<Arc<Table>, IdbError> {
        let full_name = format!("{}.{}", namespace, table_name);
        if self.tables.read().unwrap().contains_key(&full_name) {
            return Err(IdbError::Conflict(format!("table '{}' already exists", full_name)));
        }
        let space_id = self.system.allocate_space_id(catalog)?;
        let path = self.config.table_path(namespace, table_name);
        let space = Arc::new(Space::create_space(&path, space_id, self.config.page_size)?);
        self.spaces.insert(space_id, space.clone());
        let segments = SegmentManager::new(space_id);
        let index_schema = IndexSchema {
            leaf_schema,
            internal_schema,
            key_len,
        };
        let index_id = space_id as u64;
        let tree = BTree::create(&self.pool, &space, &segments, index_id, index_schema)?;
        let table = Arc::new(Table {
            name: full_name.clone(),
            space,
            space_id,
            segments,
            tree,
            secondary: RwLock::new(HashMap::new()),
            next_index_id: AtomicU64::new(2),
        });
        self.tables.write().unwrap().insert(full_name, table.clone());
        self.save_catalog()?;
        tracing::info!(table = %table.name, space_id, "table created");
        Ok(table)
    }

    /// spec.md §6.1 `open_table`.
    pub fn open_table(&self, full_name: &str) -> Result<Arc<Table>, IdbError> {
        self.tables
            .read()
            .unwrap()
            .get(full_name)
            .cloned()
            .ok_or_else(|| IdbError::NotFound(format!("table '{}' not found", full_name)))
    }

    fn save_catalog(&self) -> Result<(), IdbError> {
        let entries: Vec<TableCatalogEntry> = self
            .tables
            .read()
            .unwrap()
            .values()
            .map(|t| TableCatalogEntry {
                name: t.name.clone(),
                path: t.space.path().to_path_buf(),
                space_id: t.space_id,
                index_id: t.tree.index_id,
                root_page: t.tree.root_page_no(),
                leaf_segment: t.tree.leaf_segment_id(),
                internal_segment: t.tree.internal_segment_id(),
                key_len: t.tree.key_len(),
                leaf_columns: t.tree.leaf_schema().columns.iter().map(ColumnSpec::from).collect(),
                internal_columns: t.tree.internal_schema().columns.iter().map(ColumnSpec::from).collect(),
            })
            .collect();
        let path = self.config.data_dir.join("catalog.json");
        let json = serde_json::to_vec_pretty(&entries).map_err(|e| IdbError::Io(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| IdbError::Io(format!("cannot write {}: {}", path.display(), e)))
    }

    /// spec.md §4.7 `checkpoint`: snapshot the oldest still-dirty LSN, the
    /// active transaction set, and the buffer pool's dirty-page table, then
    /// flush every open space's XDES allocator state alongside it.
    pub fn checkpoint(&self) -> Result<(), IdbError> {
        let checkpoint_lsn = self.pool.min_first_dirty_lsn().unwrap_or_else(|| self.wal.current_lsn());
        let active = self.txn_mgr.active_trx_ids();
        let dirty_pages = self.pool.dirty_page_list();
        let cp = crate::storage::wal::Checkpoint::new(
            checkpoint_lsn,
            active,
            dirty_pages,
            self.pool.resident_pages(),
            self.pool.dirty_pages(),
        );
        let seq = self.next_checkpoint_seq.fetch_add(1, Ordering::SeqCst);
        self.wal.write_checkpoint(&self.config.data_dir.join("checkpoints"), seq, &cp)?;
        for space in self.spaces.iter() {
            space.flush_xdes()?;
        }
        self.wal.rotate_if_needed(checkpoint_lsn)?;
        tracing::debug!(checkpoint_lsn, seq, "checkpoint written");
        Ok(())
    }

    /// Starts the buffer pool's dirty/LRU/prefetch workers plus this
    /// database's own log-flusher and purge threads (spec.md §5).
    pub fn spawn_workers(self: &Arc<Self>) {
        let mut guard = self.workers.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let pool_workers = self.pool.spawn_workers(0.25, 32);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        {
            let db = self.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::spawn(move || {
                let mut tick = 0u64;
                while !shutdown.load(Ordering::SeqCst) {
                    db.wal.flush(true).ok();
                    tick += 1;
                    if tick % 5 == 0 {
                        db.checkpoint().ok();
                    }
                    thread::sleep(Duration::from_secs(1));
                }
            }));
        }

        {
            let db = self.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    let min_active = db.txn_mgr.active_trx_ids().into_iter().min();
                    if let Some(watermark) = min_active {
                        db.undo.purge(watermark);
                    }
                    thread::sleep(Duration::from_secs(1));
                }
            }));
        }

        *guard = Some(DatabaseWorkers { shutdown, handles, pool_workers: Some(pool_workers) });
        tracing::info!("background workers started");
    }

    /// spec.md §9 shutdown: stop background threads, flush the log, then
    /// return (files close on drop).
    pub fn shutdown(&self) {
        let workers = self.workers.lock().unwrap().take();
        if let Some(mut w) = workers {
            w.shutdown.store(true, Ordering::SeqCst);
            for h in w.handles.drain(..) {
                h.join().ok();
            }
            if let Some(pw) = w.pool_workers.take() {
                pw.shutdown();
            }
        }
        self.wal.flush(true).ok();
        tracing::info!("database shut down");
    }
}

fn load_catalog(data_dir: &std::path::Path) -> Result<Vec<TableCatalogEntry>, IdbError> {
    let path = data_dir.join("catalog.json");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(&path).map_err(|e| IdbError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes).map_err(|e| IdbError::Corruption(format!("malformed catalog {}: {}", path.display(), e)))
}
