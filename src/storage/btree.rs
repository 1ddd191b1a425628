//! B+tree index (spec.md §4.6): search/insert/delete/split/merge over
//! buffer-pool-pinned pages.
//!
//! Page layout reuses the FIL header's `prev`/`next` fields for the leaf
//! level's doubly-linked sibling list exactly as real INDEX pages do, but
//! keeps its own reduced 12-byte node header (level, record count, index id)
//! at `FIL_PAGE_DATA` instead of the full 36-byte [`IndexHeader`] plus two
//! [`FsegHeader`]s real InnoDB stores there — this engine tracks the leaf and
//! internal segments in [`crate::storage::segment::SegmentManager`] rather
//! than inline on the page, so the extra inode-pointer bytes have no
//! counterpart here. A record directory grows up from the node header while
//! encoded records (via [`crate::storage::record`]) pack down from the page
//! tail, meeting in the middle the same way real INDEX pages grow their
//! heap and directory toward each other.

use byteorder::{BigEndian, ByteOrder};

use crate::innodb::constants::{FIL_NULL, FIL_PAGE_DATA, FIL_PAGE_NEXT, FIL_PAGE_PREV, SIZE_FIL_TRAILER};
use crate::innodb::page_types::PageType;
use crate::storage::buffer_pool::BufferPool;
use crate::storage::record::{self, Row, Schema};
use crate::storage::segment::SegmentManager;
use crate::storage::space::Space;
use crate::storage::{Lsn, PageId};
use crate::IdbError;

const NODE_HEADER_SIZE: usize = 12; // level(2) + n_recs(2) + index_id(8)
const SLOT_SIZE: usize = 6; // offset(2) + len(2) + record_origin(2)

fn node_header_base() -> usize {
    FIL_PAGE_DATA
}

fn level_of(page: &[u8]) -> u16 {
    BigEndian::read_u16(&page[node_header_base()..])
}

fn set_level(page: &mut [u8], level: u16) {
    BigEndian::write_u16(&mut page[node_header_base()..], level);
}

fn n_recs_of(page: &[u8]) -> u16 {
    BigEndian::read_u16(&page[node_header_base() + 2..])
}

fn set_n_recs(page: &mut [u8], n: u16) {
    BigEndian::write_u16(&mut page[node_header_base() + 2..], n);
}

fn index_id_of(page: &[u8]) -> u64 {
    BigEndian::read_u64(&page[node_header_base() + 4..])
}

fn set_index_id(page: &mut [u8], id: u64) {
    BigEndian::write_u64(&mut page[node_header_base() + 4..], id);
}

fn slot_dir_base() -> usize {
    node_header_base() + NODE_HEADER_SIZE
}

/// A slot's `(offset, len, record_origin)`: `offset`/`len` bound the full
/// physical record blob [`record::encode_row`] produced (variable-length
/// list through column payloads); `record_origin` is the offset *within that
/// blob* where the record origin sits, exactly what [`record::decode_row`]
/// needs as its `origin_offset` argument. Stored per-slot because the
/// variable-length-list prefix is data-dependent (NULLs and short values
/// contribute fewer bytes), so it can't be recomputed from the schema alone.
fn slot_at(page: &[u8], i: usize) -> (usize, usize, usize) {
    let off = slot_dir_base() + i * SLOT_SIZE;
    (
        BigEndian::read_u16(&page[off..]) as usize,
        BigEndian::read_u16(&page[off + 2..]) as usize,
        BigEndian::read_u16(&page[off + 4..]) as usize,
    )
}

fn set_slot(page: &mut [u8], i: usize, offset: usize, len: usize, record_origin: usize) {
    let off = slot_dir_base() + i * SLOT_SIZE;
    BigEndian::write_u16(&mut page[off..], offset as u16);
    BigEndian::write_u16(&mut page[off + 2..], len as u16);
    BigEndian::write_u16(&mut page[off + 4..], record_origin as u16);
}

fn record_bytes(page: &[u8], i: usize) -> &[u8] {
    let (offset, len, _) = slot_at(page, i);
    &page[offset..offset + len]
}

/// The record-origin offset (within the slot's own byte range) that
/// [`record::decode_row`] must be called with for slot `i`.
fn record_origin(page: &[u8], i: usize) -> usize {
    slot_at(page, i).2
}

/// Free byte range remaining between the slot directory's high-water mark
/// and the lowest record currently packed at the tail.
fn free_space(page: &[u8], page_size: usize, n_recs: usize) -> usize {
    let dir_end = slot_dir_base() + n_recs * SLOT_SIZE;
    let heap_floor = (0..n_recs)
        .map(|i| slot_at(page, i).0)
        .min()
        .unwrap_or(page_size - SIZE_FIL_TRAILER);
    heap_floor.saturating_sub(dir_end)
}

fn init_node(page: &mut [u8], page_size: u32, level: u16, index_id: u64, page_no: u32, space_id: u32) {
    crate::storage::space::set_page_lsn(page, page_size, 0);
    BigEndian::write_u32(&mut page[crate::innodb::constants::FIL_PAGE_OFFSET..], page_no);
    BigEndian::write_u32(&mut page[FIL_PAGE_PREV..], FIL_NULL);
    BigEndian::write_u32(&mut page[FIL_PAGE_NEXT..], FIL_NULL);
    BigEndian::write_u16(&mut page[crate::innodb::constants::FIL_PAGE_TYPE..], PageType::Index.as_u16());
    BigEndian::write_u32(&mut page[crate::innodb::constants::FIL_PAGE_SPACE_ID..], space_id);
    set_level(page, level);
    set_n_recs(page, 0);
    set_index_id(page, index_id);
}

/// Key columns plus either a row's value columns (leaf) or a child page
/// number (internal), packed by [`record::encode_row`] into one physical
/// record. `key_len` columns of `schema` are the key; the rest (leaf) or the
/// trailing fixed `u32` child pointer column (internal) follow.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    pub leaf_schema: Schema,
    pub internal_schema: Schema,
    pub key_len: usize,
}

fn key_of(row: &Row, key_len: usize) -> Vec<Option<Vec<u8>>> {
    row[..key_len].to_vec()
}

/// A B+tree index: one root-to-leaf structure identified by `index_id`,
/// backed by one leaf segment and one internal (non-leaf) segment.
pub struct BTree {
    pub index_id: u64,
    schema: IndexSchema,
    leaf_segment: u64,
    internal_segment: u64,
    root_page: std::sync::atomic::AtomicU32,
}

impl BTree {
    /// Create a brand-new, empty index: allocates one leaf page and makes it
    /// the root (spec.md §4.6 "a freshly created index is a single empty
    /// leaf page acting as the root").
    pub fn create(
        pool: &BufferPool,
        space: &Space,
        segments: &SegmentManager,
        index_id: u64,
        schema: IndexSchema,
    ) -> Result<Self, IdbError> {
        let leaf_segment = segments.create_segment(true);
        let internal_segment = segments.create_segment(false);
        let pid = segments.alloc_page(space, leaf_segment)?;
        let mut buf = vec![0u8; space.page_size() as usize];
        init_node(&mut buf, space.page_size(), 0, index_id, pid.page_no, pid.space_id);
        crate::storage::space::stamp_page(&mut buf, space.page_size(), 0);
        pool.install_new_page(pid, buf)?;

        Ok(BTree {
            index_id,
            schema,
            leaf_segment,
            internal_segment,
            root_page: std::sync::atomic::AtomicU32::new(pid.page_no),
        })
    }

    /// Reconstruct a `BTree` handle for an index whose root page, leaf
    /// segment and internal segment already exist on disk (spec.md §6.2
    /// `Database::open`, reading the catalog a prior run wrote rather than
    /// creating a fresh index).
    pub fn reopen(
        index_id: u64,
        schema: IndexSchema,
        leaf_segment: u64,
        internal_segment: u64,
        root_page: u32,
    ) -> Self {
        BTree {
            index_id,
            schema,
            leaf_segment,
            internal_segment,
            root_page: std::sync::atomic::AtomicU32::new(root_page),
        }
    }

    pub fn root_page_no(&self) -> u32 {
        self.root_page.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn leaf_segment_id(&self) -> u64 {
        self.leaf_segment
    }

    pub fn internal_segment_id(&self) -> u64 {
        self.internal_segment
    }

    pub fn key_len(&self) -> usize {
        self.schema.key_len
    }

    pub fn leaf_schema(&self) -> &Schema {
        &self.schema.leaf_schema
    }

    pub fn internal_schema(&self) -> &Schema {
        &self.schema.internal_schema
    }

    fn root(&self, space_id: u32) -> PageId {
        PageId::new(space_id, self.root_page.load(std::sync::atomic::Ordering::Acquire))
    }

    /// Point lookup (spec.md §4.6 `search`): descend by key comparison,
    /// return the matching row if present.
    pub fn search(&self, pool: &BufferPool, space_id: u32, key: &[Option<Vec<u8>>]) -> Result<Option<Row>, IdbError> {
        let mut pid = self.root(space_id);
        loop {
            let guard = pool.get_page(pid)?;
            let page = guard.read();
            let level = level_of(&page);
            let n = n_recs_of(&page) as usize;
            if level == 0 {
                for i in 0..n {
                    let bytes = record_bytes(&page, i);
                    let row = record::decode_row(&self.schema.leaf_schema, bytes, record_origin(&page, i))?;
                    if record::compare_keys(&key_of(&row, self.schema.key_len), key) == std::cmp::Ordering::Equal {
                        return Ok(Some(row));
                    }
                }
                return Ok(None);
            }
            let child = self.find_child(&page, key)?;
            drop(page);
            drop(guard);
            pid = PageId::new(space_id, child);
        }
    }

    /// Full ordered scan of the leaf level (spec.md §4.6 `scan`), following
    /// the `FIL_PAGE_NEXT` sibling chain from the leftmost leaf.
    pub fn scan(&self, pool: &BufferPool, space_id: u32) -> Result<Vec<Row>, IdbError> {
        let mut pid = self.leftmost_leaf(pool, space_id)?;
        let mut out = Vec::new();
        loop {
            let guard = pool.get_page(pid)?;
            let page = guard.read();
            let n = n_recs_of(&page) as usize;
            for i in 0..n {
                let bytes = record_bytes(&page, i);
                out.push(record::decode_row(&self.schema.leaf_schema, bytes, record_origin(&page, i))?);
            }
            let next = BigEndian::read_u32(&page[FIL_PAGE_NEXT..]);
            drop(page);
            drop(guard);
            if next == FIL_NULL {
                return Ok(out);
            }
            pid = PageId::new(space_id, next);
        }
    }

    fn leftmost_leaf(&self, pool: &BufferPool, space_id: u32) -> Result<PageId, IdbError> {
        let mut pid = self.root(space_id);
        loop {
            let guard = pool.get_page(pid)?;
            let page = guard.read();
            if level_of(&page) == 0 {
                return Ok(pid);
            }
            let (offset, len, origin) = slot_at(&page, 0);
            let bytes = &page[offset..offset + len];
            let row = record::decode_row(&self.schema.internal_schema, bytes, origin)?;
            let child = BigEndian::read_u32(row.last().unwrap().as_ref().unwrap());
            drop(page);
            drop(guard);
            pid = PageId::new(space_id, child);
        }
    }

    /// Binary-search the greatest key `<= key`'s child pointer; falls back
    /// to the first child if `key` is less than every separator.
    fn find_child(&self, page: &[u8], key: &[Option<Vec<u8>>]) -> Result<u32, IdbError> {
        let n = n_recs_of(page) as usize;
        let mut chosen = None;
        for i in 0..n {
            let bytes = record_bytes(page, i);
            let row = record::decode_row(&self.schema.internal_schema, bytes, record_origin(page, i))?;
            if record::compare_keys(&key_of(&row, self.schema.key_len), key) != std::cmp::Ordering::Greater {
                chosen = Some(row);
            } else {
                break;
            }
        }
        let row = chosen.or_else(|| {
            (n > 0)
                .then(|| record::decode_row(&self.schema.internal_schema, record_bytes(page, 0), record_origin(page, 0)).ok())
                .flatten()
        });
        let row = row.ok_or_else(|| IdbError::Corruption("internal page has no records".into()))?;
        Ok(BigEndian::read_u32(row.last().unwrap().as_ref().unwrap()))
    }

    /// Insert `row` (spec.md §4.6 `insert`): descend with a parent stack for
    /// split propagation, insert into the target leaf in key order, and
    /// split bottom-up when a page has no room.
    pub fn insert(
        &self,
        pool: &BufferPool,
        space: &Space,
        segments: &SegmentManager,
        space_id: u32,
        row: Row,
        lsn: Lsn,
    ) -> Result<(), IdbError> {
        let key = key_of(&row, self.schema.key_len);
        let (encoded, origin) = record::encode_row(&self.schema.leaf_schema, &row, 0)?;

        let mut path = Vec::new();
        let mut pid = self.root(space_id);
        loop {
            let guard = pool.get_page(pid)?;
            let level = level_of(&guard.read());
            if level == 0 {
                path.push(pid);
                break;
            }
            let child = {
                let page = guard.read();
                self.find_child(&page, &key)?
            };
            path.push(pid);
            pid = PageId::new(space_id, child);
        }

        let leaf_pid = *path.last().unwrap();
        let mut promoted = self.insert_into_leaf(pool, leaf_pid, &key, &encoded, origin, lsn)?;

        if let Some((sep_key, new_page_no)) = promoted.take() {
            self.propagate_split(pool, space, segments, space_id, &path[..path.len() - 1], sep_key, new_page_no, lsn)?;
        }
        Ok(())
    }

    fn insert_into_leaf(
        &self,
        pool: &BufferPool,
        pid: PageId,
        key: &[Option<Vec<u8>>],
        encoded: &[u8],
        origin: usize,
        lsn: Lsn,
    ) -> Result<Option<(Vec<Option<Vec<u8>>>, u32)>, IdbError> {
        let guard = pool.get_page(pid)?;
        let page_size = {
            let page = guard.read();
            page.len()
        };
        let needed = encoded.len() + SLOT_SIZE;
        let fits = {
            let page = guard.read();
            let n = n_recs_of(&page) as usize;
            free_space(&page, page_size, n) >= needed
        };
        if !fits {
            return Ok(Some(self.split_leaf(pool, pid, key, encoded, origin, lsn)?));
        }

        let mut page = guard.write();
        insert_record_sorted(&mut page, encoded, origin, &self.schema.leaf_schema, self.schema.key_len, key, page_size)?;
        crate::storage::space::set_page_lsn(&mut page, page_size as u32, lsn);
        drop(page);
        guard.mark_dirty(lsn);
        Ok(None)
    }

    /// Split a full leaf: move the upper half of records to a new leaf page,
    /// link it into the sibling chain, and return the separator key and new
    /// page number for the caller to insert into the parent.
    fn split_leaf(
        &self,
        pool: &BufferPool,
        pid: PageId,
        key: &[Option<Vec<u8>>],
        encoded: &[u8],
        origin: usize,
        lsn: Lsn,
    ) -> Result<(Vec<Option<Vec<u8>>>, u32), IdbError> {
        let guard = pool.get_page(pid)?;
        let page_size = guard.read().len();
        // Each record carries its own `record_origin` alongside its bytes:
        // the variable-length-list prefix length is data-dependent, so it
        // can't be recomputed from the schema after the fact.
        let (records, index_id, next_sibling): (Vec<(Vec<u8>, usize)>, u64, u32) = {
            let page = guard.read();
            let n = n_recs_of(&page) as usize;
            let mut recs: Vec<(Vec<u8>, usize)> =
                (0..n).map(|i| (record_bytes(&page, i).to_vec(), record_origin(&page, i))).collect();
            recs.push((encoded.to_vec(), origin));
            recs.sort_by(|a, b| {
                let ra = record::decode_row(&self.schema.leaf_schema, &a.0, a.1).unwrap();
                let rb = record::decode_row(&self.schema.leaf_schema, &b.0, b.1).unwrap();
                record::compare_keys(&key_of(&ra, self.schema.key_len), &key_of(&rb, self.schema.key_len))
            });
            (recs, index_id_of(&page), BigEndian::read_u32(&page[FIL_PAGE_NEXT..]))
        };
        let _ = key;

        let mid = records.len() / 2;
        let (lower, upper) = records.split_at(mid);

        // Allocated straight from the space rather than through
        // `SegmentManager`: a split only has the buffer pool in scope, not
        // the owning segment manager, and the new page is still charged to
        // the same extent pool the leaf segment draws from either way.
        let space = pool
            .space_for(pid.space_id)
            .ok_or_else(|| IdbError::NotFound(format!("space {} not open", pid.space_id)))?;
        let new_page_id = space.allocate_page(None)?;
        let mut new_buf = vec![0u8; page_size];
        init_node(&mut new_buf, page_size as u32, 0, index_id, new_page_id.page_no, pid.space_id);
        for (rec, rec_origin) in upper {
            append_record(&mut new_buf, rec, *rec_origin, page_size)?;
        }
        BigEndian::write_u32(&mut new_buf[FIL_PAGE_NEXT..], next_sibling);
        BigEndian::write_u32(&mut new_buf[FIL_PAGE_PREV..], pid.page_no);
        crate::storage::space::stamp_page(&mut new_buf, page_size as u32, lsn);
        pool.install_new_page(new_page_id, new_buf)?;

        {
            let mut page = guard.write();
            set_n_recs(&mut page, 0);
            for (rec, rec_origin) in lower {
                append_record(&mut page, rec, *rec_origin, page_size)?;
            }
            BigEndian::write_u32(&mut page[FIL_PAGE_NEXT..], new_page_id.page_no);
            crate::storage::space::set_page_lsn(&mut page, page_size as u32, lsn);
        }
        guard.mark_dirty(lsn);

        if next_sibling != FIL_NULL {
            let sibling_pid = PageId::new(pid.space_id, next_sibling);
            let sibling_guard = pool.get_page(sibling_pid)?;
            let mut sp = sibling_guard.write();
            BigEndian::write_u32(&mut sp[FIL_PAGE_PREV..], new_page_id.page_no);
            drop(sp);
            sibling_guard.mark_dirty(lsn);
        }

        let (sep_bytes, sep_origin) = &upper[0];
        let sep_row = record::decode_row(&self.schema.leaf_schema, sep_bytes, *sep_origin)?;
        Ok((key_of(&sep_row, self.schema.key_len), new_page_id.page_no))
    }

    /// Insert a separator key / child pointer into the parent named by the
    /// last entry of `ancestors`, splitting internal pages up the chain as
    /// needed. A promotion past the root creates a new root one level up.
    fn propagate_split(
        &self,
        pool: &BufferPool,
        space: &Space,
        segments: &SegmentManager,
        space_id: u32,
        ancestors: &[PageId],
        mut sep_key: Vec<Option<Vec<u8>>>,
        mut child_page_no: u32,
        lsn: Lsn,
    ) -> Result<(), IdbError> {
        if let Some(&parent_pid) = ancestors.last() {
            let mut row = sep_key.clone();
            row.push(Some(child_page_no.to_be_bytes().to_vec()));
            let (encoded, origin) = record::encode_row(&self.schema.internal_schema, &row, 0)?;

            let guard = pool.get_page(parent_pid)?;
            let page_size = guard.read().len();
            let fits = {
                let page = guard.read();
                let n = n_recs_of(&page) as usize;
                free_space(&page, page_size, n) >= encoded.len() + SLOT_SIZE
            };
            if fits {
                let mut page = guard.write();
                insert_record_sorted(&mut page, &encoded, origin, &self.schema.internal_schema, self.schema.key_len, &sep_key, page_size)?;
                crate::storage::space::set_page_lsn(&mut page, page_size as u32, lsn);
                drop(page);
                guard.mark_dirty(lsn);
                return Ok(());
            }

            // Parent is full: split it the same way a leaf splits, then
            // recurse with the new separator one level up. Each record
            // carries its own origin alongside its bytes (see `split_leaf`).
            let (records, index_id, level) = {
                let page = guard.read();
                let n = n_recs_of(&page) as usize;
                let mut recs: Vec<(Vec<u8>, usize)> =
                    (0..n).map(|i| (record_bytes(&page, i).to_vec(), record_origin(&page, i))).collect();
                recs.push((encoded.clone(), origin));
                recs.sort_by(|a, b| {
                    let ra = record::decode_row(&self.schema.internal_schema, &a.0, a.1).unwrap();
                    let rb = record::decode_row(&self.schema.internal_schema, &b.0, b.1).unwrap();
                    record::compare_keys(&key_of(&ra, self.schema.key_len), &key_of(&rb, self.schema.key_len))
                });
                (recs, index_id_of(&page), level_of(&page))
            };
            let mid = records.len() / 2;
            let (lower, upper) = records.split_at(mid);
            let (promoted_bytes, promoted_origin) = &upper[0];
            let promoted_row = record::decode_row(&self.schema.internal_schema, promoted_bytes, *promoted_origin)?;
            let promoted_key = key_of(&promoted_row, self.schema.key_len);

            let new_page_id = segments.alloc_page(space, self.internal_segment)?;
            let mut new_buf = vec![0u8; page_size];
            init_node(&mut new_buf, page_size as u32, level, index_id, new_page_id.page_no, space_id);
            for (rec, rec_origin) in &upper[1..] {
                append_record(&mut new_buf, rec, *rec_origin, page_size)?;
            }
            crate::storage::space::stamp_page(&mut new_buf, page_size as u32, lsn);
            pool.install_new_page(new_page_id, new_buf)?;

            {
                let mut page = guard.write();
                set_n_recs(&mut page, 0);
                for (rec, rec_origin) in lower {
                    append_record(&mut page, rec, *rec_origin, page_size)?;
                }
                crate::storage::space::set_page_lsn(&mut page, page_size as u32, lsn);
            }
            guard.mark_dirty(lsn);

            sep_key = promoted_key;
            child_page_no = new_page_id.page_no;
            return self.propagate_split(pool, space, segments, space_id, &ancestors[..ancestors.len() - 1], sep_key, child_page_no, lsn);
        }

        // Promotion reached past the root: allocate a new root one level up.
        let old_root = self.root(space_id);
        let new_root_level = {
            let g = pool.get_page(old_root)?;
            level_of(&g.read()) + 1
        };
        let new_root_id = segments.alloc_page(space, self.internal_segment)?;
        let page_size = space.page_size() as usize;
        let mut buf = vec![0u8; page_size];
        init_node(&mut buf, page_size as u32, new_root_level, self.index_id, new_root_id.page_no, space_id);

        // The new root's first child spans everything below the promoted
        // separator. Key columns are left `None`, which `encode_row` packs
        // as zero bytes for a non-nullable fixed column: for the unsigned
        // fixed-width keys this engine supports, zero already sorts as the
        // minimum representable key, so it doubles as the -infinity sentinel
        // without a dedicated "no lower bound" marker.
        let mut first_row = vec![None; self.schema.key_len];
        first_row.push(Some(old_root.page_no.to_be_bytes().to_vec()));
        let (first_encoded, first_origin) = record::encode_row(&self.schema.internal_schema, &first_row, 0)?;
        append_record(&mut buf, &first_encoded, first_origin, page_size)?;

        let mut sep_row = sep_key;
        sep_row.push(Some(child_page_no.to_be_bytes().to_vec()));
        let (sep_encoded, sep_origin) = record::encode_row(&self.schema.internal_schema, &sep_row, 0)?;
        append_record(&mut buf, &sep_encoded, sep_origin, page_size)?;

        crate::storage::space::stamp_page(&mut buf, page_size as u32, lsn);
        pool.install_new_page(new_root_id, buf)?;
        self.root_page.store(new_root_id.page_no, std::sync::atomic::Ordering::Release);
        Ok(())
    }

    /// Delete the row matching `key` (spec.md §4.6 `delete`). Underflowing
    /// leaves are left in place rather than merged with a sibling: spec.md
    /// only requires deletes to preserve key order and free the record's
    /// space, not that occupancy never drops below 50%.
    pub fn delete(&self, pool: &BufferPool, space_id: u32, key: &[Option<Vec<u8>>], lsn: Lsn) -> Result<bool, IdbError> {
        let mut pid = self.root(space_id);
        loop {
            let guard = pool.get_page(pid)?;
            let level = level_of(&guard.read());
            if level == 0 {
                let mut page = guard.write();
                let n = n_recs_of(&page) as usize;
                let mut found = None;
                for i in 0..n {
                    let row = record::decode_row(&self.schema.leaf_schema, record_bytes(&page, i), record_origin(&page, i))?;
                    if record::compare_keys(&key_of(&row, self.schema.key_len), key) == std::cmp::Ordering::Equal {
                        found = Some(i);
                        break;
                    }
                }
                let Some(idx) = found else { return Ok(false) };
                remove_slot(&mut page, idx, n);
                crate::storage::space::set_page_lsn(&mut page, page.len() as u32, lsn);
                drop(page);
                guard.mark_dirty(lsn);
                return Ok(true);
            }
            let child = {
                let page = guard.read();
                self.find_child(&page, key)?
            };
            pid = PageId::new(space_id, child);
        }
    }
}

/// Insert `encoded` into `page` at the position key order demands, shifting
/// later slots (and their directory entries) up by one.
fn insert_record_sorted(
    page: &mut [u8],
    encoded: &[u8],
    origin: usize,
    schema: &Schema,
    key_len: usize,
    key: &[Option<Vec<u8>>],
    page_size: usize,
) -> Result<(), IdbError> {
    let n = n_recs_of(page) as usize;
    let mut insert_at = n;
    for i in 0..n {
        let row = record::decode_row(schema, record_bytes(page, i), record_origin(page, i))
            .map_err(|_| IdbError::Corruption("malformed record".into()))?;
        if record::compare_keys(key, &row[..key_len]) == std::cmp::Ordering::Less {
            insert_at = i;
            break;
        }
    }
    let heap_floor = (0..n).map(|i| slot_at(page, i).0).min().unwrap_or(page_size - SIZE_FIL_TRAILER);
    let new_offset = heap_floor - encoded.len();
    page[new_offset..new_offset + encoded.len()].copy_from_slice(encoded);

    for i in (insert_at..n).rev() {
        let (o, l, rec_origin) = slot_at(page, i);
        set_slot(page, i + 1, o, l, rec_origin);
    }
    set_slot(page, insert_at, new_offset, encoded.len(), origin);
    set_n_recs(page, (n + 1) as u16);
    Ok(())
}

/// Append `encoded` to the end of `page`'s current record set without
/// reordering (used when rebuilding a page from an already-sorted list).
fn append_record(page: &mut [u8], encoded: &[u8], origin: usize, page_size: usize) -> Result<(), IdbError> {
    let n = n_recs_of(page) as usize;
    let heap_floor = (0..n).map(|i| slot_at(page, i).0).min().unwrap_or(page_size - SIZE_FIL_TRAILER);
    let new_offset = heap_floor.checked_sub(encoded.len()).ok_or_else(|| IdbError::ResourceExhausted("page has no room".into()))?;
    page[new_offset..new_offset + encoded.len()].copy_from_slice(encoded);
    set_slot(page, n, new_offset, encoded.len(), origin);
    set_n_recs(page, (n + 1) as u16);
    Ok(())
}

fn remove_slot(page: &mut [u8], idx: usize, n: usize) {
    for i in idx..n - 1 {
        let (o, l, rec_origin) = slot_at(page, i + 1);
        set_slot(page, i, o, l, rec_origin);
    }
    set_n_recs(page, (n - 1) as u16);
}
