//! Space manager (spec.md §4.2): owns one open file per tablespace, creates
//! and extends `.ibd`/`ibdata1` files, and allocates/frees pages and extents
//! tracked by XDES bitmaps.
//!
//! Builds directly on the read-only [`crate::innodb::tablespace::Tablespace`]
//! (used here for the initial open + FSP header parse) and
//! [`crate::innodb::write`] (used for the page writes). The XDES extent
//! descriptor and its 128-bit free/clean bitmap are new: the teacher crate
//! only ever read these bitmaps for display, it never maintained the
//! allocator state they back.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use byteorder::{BigEndian, ByteOrder};

use crate::innodb::constants::*;
use crate::innodb::page::{FilHeader, FspHeader};
use crate::innodb::page_types::PageType;
use crate::storage::{Lsn, PageId, PAGES_PER_EXTENT};
use crate::IdbError;

/// Extent allocation state, tracked per-extent in the XDES bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentState {
    Free,
    FreeFrag,
    FullFrag,
    Fseg,
}

impl ExtentState {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => ExtentState::FreeFrag,
            2 => ExtentState::FullFrag,
            3 => ExtentState::Fseg,
            _ => ExtentState::Free,
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            ExtentState::Free => 0,
            ExtentState::FreeFrag => 1,
            ExtentState::FullFrag => 2,
            ExtentState::Fseg => 3,
        }
    }
}

/// One XDES entry: the allocation state of a single 64-page extent plus a
/// 128-bit (2 bits/page) free/clean bitmap. 32 bytes on disk.
#[derive(Debug, Clone)]
pub struct XdesEntry {
    /// Id of the owning segment, 0 if not FSEG-owned.
    pub segment_id: u64,
    pub state: ExtentState,
    /// 2 bits per page: bit 0 = free, bit 1 = clean (initialized).
    bitmap: [u8; 16],
}

pub const XDES_ENTRY_SIZE: usize = 32;

impl XdesEntry {
    fn new_free() -> Self {
        XdesEntry {
            segment_id: 0,
            state: ExtentState::Free,
            bitmap: [0xFF; 16], // all pages start free
        }
    }

    pub fn is_page_free(&self, idx_in_extent: u32) -> bool {
        let bit = (idx_in_extent * 2) as usize;
        (self.bitmap[bit / 8] >> (bit % 8)) & 1 != 0
    }

    fn set_page_free(&mut self, idx_in_extent: u32, free: bool) {
        let bit = (idx_in_extent * 2) as usize;
        if free {
            self.bitmap[bit / 8] |= 1 << (bit % 8);
        } else {
            self.bitmap[bit / 8] &= !(1 << (bit % 8));
        }
    }

    /// Number of still-free pages in this extent.
    pub fn n_free(&self) -> u32 {
        (0..PAGES_PER_EXTENT)
            .filter(|&i| self.is_page_free(i))
            .count() as u32
    }

    fn encode(&self, buf: &mut [u8]) {
        BigEndian::write_u64(&mut buf[0..8], self.segment_id);
        BigEndian::write_u32(&mut buf[8..12], self.state.to_u32());
        buf[12..16].copy_from_slice(&[0; 4]);
        buf[16..32].copy_from_slice(&self.bitmap);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut bitmap = [0u8; 16];
        bitmap.copy_from_slice(&buf[16..32]);
        XdesEntry {
            segment_id: BigEndian::read_u64(&buf[0..8]),
            state: ExtentState::from_u32(BigEndian::read_u32(&buf[8..12])),
            bitmap,
        }
    }
}

struct SpaceInner {
    file: File,
    page_size: u32,
    /// Total pages currently allocated to the file (FSP_SIZE).
    size_pages: u32,
    /// One entry per extent that currently exists in the file.
    extents: Vec<XdesEntry>,
}

/// An open tablespace, writable side. Each instance owns one `File` handle
/// guarded by a single mutex (spec.md §5: "Space free-extent list — per-space
/// mutex").
pub struct Space {
    pub space_id: u32,
    path: PathBuf,
    inner: Mutex<SpaceInner>,
}

impl Space {
    /// Create a brand-new `.ibd`/`ibdata1` file: a zeroed page 0 with an
    /// FSP_HDR, one XDES page, and an INODE page at page 2 (spec.md §4.2).
    pub fn create_space<P: AsRef<Path>>(
        path: P,
        space_id: u32,
        page_size: u32,
    ) -> Result<Self, IdbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IdbError::Io(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| IdbError::Io(format!("cannot create {}: {}", path.display(), e)))?;

        // Pages 0 (FSP_HDR), 1 (XDES), 2 (INODE) exist from the start.
        let initial_pages = 3u32;
        let mut fsp_page = vec![0u8; page_size as usize];
        write_fil_header(&mut fsp_page, 0, space_id, PageType::FspHdr.as_u16(), 0);
        write_fsp_header(&mut fsp_page, space_id, initial_pages, 0);
        finalize_page(&mut fsp_page, page_size);

        let mut xdes_page = vec![0u8; page_size as usize];
        write_fil_header(&mut xdes_page, 1, space_id, PageType::Xdes.as_u16(), 0);
        // Extent 0 (pages 0..64) is already partially used by the 3 header
        // pages; mark them non-free in the XDES entry before it is written.
        let mut extent0 = XdesEntry::new_free();
        extent0.state = ExtentState::FreeFrag;
        for p in 0..initial_pages {
            extent0.set_page_free(p, false);
        }
        let mut entry_buf = [0u8; XDES_ENTRY_SIZE];
        extent0.encode(&mut entry_buf);
        xdes_page[FIL_PAGE_DATA..FIL_PAGE_DATA + XDES_ENTRY_SIZE].copy_from_slice(&entry_buf);
        finalize_page(&mut xdes_page, page_size);

        let mut inode_page = vec![0u8; page_size as usize];
        write_fil_header(&mut inode_page, 2, space_id, PageType::Inode.as_u16(), 0);
        finalize_page(&mut inode_page, page_size);

        file.write_all(&fsp_page)
            .and_then(|_| file.write_all(&xdes_page))
            .and_then(|_| file.write_all(&inode_page))
            .map_err(|e| IdbError::Io(format!("cannot initialize {}: {}", path.display(), e)))?;
        file.flush().ok();

        Ok(Space {
            space_id,
            path: path.to_path_buf(),
            inner: Mutex::new(SpaceInner {
                file,
                page_size,
                size_pages: initial_pages,
                extents: vec![extent0],
            }),
        })
    }

    /// Open an existing tablespace file, reconstructing allocator state from
    /// its XDES pages.
    pub fn open_space<P: AsRef<Path>>(path: P, space_id: u32) -> Result<Self, IdbError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| IdbError::Io(format!("cannot open {}: {}", path.display(), e)))?;

        let file_len = file
            .metadata()
            .map_err(|e| IdbError::Io(e.to_string()))?
            .len();
        let mut page0 = vec![0u8; SIZE_PAGE_DEFAULT as usize];
        file.read_exact(&mut page0)
            .map_err(|e| IdbError::Io(format!("cannot read page 0: {}", e)))?;
        let fsp = FspHeader::parse(&page0)
            .ok_or_else(|| IdbError::Corruption("page 0 has no FSP header".into()))?;
        let page_size = fsp.page_size_from_flags();
        let size_pages = (file_len / page_size as u64) as u32;

        let n_extents = size_pages.div_ceil(PAGES_PER_EXTENT).max(1);
        let mut extents = Vec::with_capacity(n_extents as usize);
        file.seek(SeekFrom::Start(page_size as u64))
            .map_err(|e| IdbError::Io(e.to_string()))?;
        let mut xdes_page = vec![0u8; page_size as usize];
        file.read_exact(&mut xdes_page)
            .map_err(|e| IdbError::Io(format!("cannot read XDES page: {}", e)))?;
        let capacity_per_page =
            (page_size as usize - FIL_PAGE_DATA - SIZE_FIL_TRAILER) / XDES_ENTRY_SIZE;
        for i in 0..n_extents as usize {
            if i >= capacity_per_page {
                // Additional XDES pages not modeled in this reduced layout;
                // treat overflow extents as fully allocated fragments so
                // free-page accounting stays conservative.
                let mut e = XdesEntry::new_free();
                e.state = ExtentState::Fseg;
                for p in 0..PAGES_PER_EXTENT {
                    e.set_page_free(p, false);
                }
                extents.push(e);
                continue;
            }
            let off = FIL_PAGE_DATA + i * XDES_ENTRY_SIZE;
            extents.push(XdesEntry::decode(&xdes_page[off..off + XDES_ENTRY_SIZE]));
        }

        Ok(Space {
            space_id,
            path: path.to_path_buf(),
            inner: Mutex::new(SpaceInner {
                file,
                page_size,
                size_pages,
                extents,
            }),
        })
    }

    pub fn page_size(&self) -> u32 {
        self.inner.lock().unwrap().page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_pages(&self) -> u32 {
        self.inner.lock().unwrap().size_pages
    }

    /// Total free pages across every tracked extent (testable property #10).
    pub fn free_page_count(&self) -> u32 {
        self.inner.lock().unwrap().extents.iter().map(|e| e.n_free()).sum()
    }

    /// Grow the file by at least one extent (spec.md §4.2 `extend`).
    pub fn extend(&self, n_pages: u32) -> Result<(), IdbError> {
        let mut inner = self.inner.lock().unwrap();
        let n_extents = n_pages.div_ceil(PAGES_PER_EXTENT).max(1);
        let add_pages = n_extents * PAGES_PER_EXTENT;
        let page_size = inner.page_size;
        let new_size = inner.size_pages + add_pages;
        inner
            .file
            .set_len(new_size as u64 * page_size as u64)
            .map_err(|e| IdbError::Io(format!("cannot extend: {}", e)))?;
        for _ in 0..n_extents {
            inner.extents.push(XdesEntry::new_free());
        }
        inner.size_pages = new_size;
        Ok(())
    }

    /// Allocate a single free page inside extent `preferred_extent` if given
    /// (segment fragment-array use), else from any free/free-frag extent.
    /// Marks the owning extent `FSEG` for `segment_id` when `segment_id` is
    /// `Some`, matching "an extent belongs to at most one segment" (spec.md
    /// §3 invariants).
    pub fn allocate_page(&self, segment_id: Option<u64>) -> Result<PageId, IdbError> {
        let mut inner = self.inner.lock().unwrap();
        let space_id = self.space_id;
        loop {
            if let Some(found) = find_free_page_in_extents(&mut inner.extents, segment_id) {
                let page_no = found;
                inner.size_pages = inner.size_pages.max(page_no + 1);
                return Ok(PageId::new(space_id, page_no));
            }
            // No free page anywhere: extend by one extent and retry.
            let page_size = inner.page_size;
            let new_size = inner.size_pages + PAGES_PER_EXTENT;
            inner
                .file
                .set_len(new_size as u64 * page_size as u64)
                .map_err(|e| IdbError::Io(format!("cannot extend: {}", e)))?;
            inner.extents.push(XdesEntry::new_free());
        }
    }

    /// Clear the bit for `page_no`; if the owning extent becomes entirely
    /// free, it returns to the space free list (implicitly, by its state).
    pub fn free_page(&self, page_no: u32) -> Result<(), IdbError> {
        let mut inner = self.inner.lock().unwrap();
        let extent_idx = (page_no / PAGES_PER_EXTENT) as usize;
        let idx_in_extent = page_no % PAGES_PER_EXTENT;
        let entry = inner
            .extents
            .get_mut(extent_idx)
            .ok_or_else(|| IdbError::Logic(format!("page {} has no XDES entry", page_no)))?;
        entry.set_page_free(idx_in_extent, true);
        if entry.n_free() == PAGES_PER_EXTENT {
            entry.state = ExtentState::Free;
            entry.segment_id = 0;
        }
        Ok(())
    }

    /// Read a page through the space manager (used by the buffer pool on a
    /// miss). The space manager never writes a data page on its own outside
    /// of `create_space`/`extend` bookkeeping pages — steady-state page
    /// writes go through the buffer pool's doublewrite-backed flush.
    pub fn read_page(&self, page_no: u32) -> Result<Vec<u8>, IdbError> {
        let mut inner = self.inner.lock().unwrap();
        let page_size = inner.page_size as u64;
        let mut buf = vec![0u8; page_size as usize];
        inner
            .file
            .seek(SeekFrom::Start(page_no as u64 * page_size))
            .map_err(|e| IdbError::Io(e.to_string()))?;
        inner
            .file
            .read_exact(&mut buf)
            .map_err(|e| IdbError::Io(format!("cannot read page {}: {}", page_no, e)))?;
        Ok(buf)
    }

    pub fn write_page(&self, page_no: u32, data: &[u8]) -> Result<(), IdbError> {
        let mut inner = self.inner.lock().unwrap();
        let page_size = inner.page_size as u64;
        if data.len() as u64 != page_size {
            return Err(IdbError::Argument("page buffer size mismatch".into()));
        }
        inner
            .file
            .seek(SeekFrom::Start(page_no as u64 * page_size))
            .map_err(|e| IdbError::Io(e.to_string()))?;
        inner
            .file
            .write_all(data)
            .map_err(|e| IdbError::Io(format!("cannot write page {}: {}", page_no, e)))?;
        Ok(())
    }

    /// Persist the current XDES bitmap state to the space's XDES page(s).
    /// Called by the checkpoint path so allocator state survives restart.
    pub fn flush_xdes(&self) -> Result<(), IdbError> {
        let mut inner = self.inner.lock().unwrap();
        let page_size = inner.page_size as usize;
        let capacity_per_page = (page_size - FIL_PAGE_DATA - SIZE_FIL_TRAILER) / XDES_ENTRY_SIZE;
        let mut xdes_page = vec![0u8; page_size];
        write_fil_header(&mut xdes_page, 1, self.space_id, PageType::Xdes.as_u16(), 0);
        for (i, entry) in inner.extents.iter().enumerate().take(capacity_per_page) {
            let off = FIL_PAGE_DATA + i * XDES_ENTRY_SIZE;
            let mut buf = [0u8; XDES_ENTRY_SIZE];
            entry.encode(&mut buf);
            xdes_page[off..off + XDES_ENTRY_SIZE].copy_from_slice(&buf);
        }
        finalize_page(&mut xdes_page, page_size as u32);
        let page_size_u64 = page_size as u64;
        inner
            .file
            .seek(SeekFrom::Start(page_size_u64))
            .map_err(|e| IdbError::Io(e.to_string()))?;
        inner
            .file
            .write_all(&xdes_page)
            .map_err(|e| IdbError::Io(e.to_string()))?;
        inner.file.sync_data().map_err(|e| IdbError::Io(e.to_string()))
    }
}

fn find_free_page_in_extents(extents: &mut [XdesEntry], segment_id: Option<u64>) -> Option<u32> {
    // Prefer an extent already owned by this segment.
    if let Some(seg) = segment_id {
        for (i, e) in extents.iter_mut().enumerate() {
            if e.state == ExtentState::Fseg && e.segment_id == seg {
                if let Some(p) = (0..PAGES_PER_EXTENT).find(|&p| e.is_page_free(p)) {
                    e.set_page_free(p, false);
                    return Some(i as u32 * PAGES_PER_EXTENT + p);
                }
            }
        }
    }
    // Else any free or free-frag extent.
    for (i, e) in extents.iter_mut().enumerate() {
        if matches!(e.state, ExtentState::Free | ExtentState::FreeFrag) {
            if let Some(p) = (0..PAGES_PER_EXTENT).find(|&p| e.is_page_free(p)) {
                e.set_page_free(p, false);
                if let Some(seg) = segment_id {
                    e.segment_id = seg;
                    e.state = ExtentState::Fseg;
                } else {
                    e.state = ExtentState::FreeFrag;
                }
                return Some(i as u32 * PAGES_PER_EXTENT + p);
            }
        }
    }
    None
}

fn write_fil_header(buf: &mut [u8], page_no: u32, space_id: u32, page_type: u16, lsn: u64) {
    BigEndian::write_u32(&mut buf[FIL_PAGE_OFFSET..], page_no);
    BigEndian::write_u32(&mut buf[FIL_PAGE_PREV..], FIL_NULL);
    BigEndian::write_u32(&mut buf[FIL_PAGE_NEXT..], FIL_NULL);
    BigEndian::write_u64(&mut buf[FIL_PAGE_LSN..], lsn);
    BigEndian::write_u16(&mut buf[FIL_PAGE_TYPE..], page_type);
    BigEndian::write_u32(&mut buf[FIL_PAGE_SPACE_ID..], space_id);
}

fn write_fsp_header(buf: &mut [u8], space_id: u32, size: u32, free_limit: u32) {
    let base = FIL_PAGE_DATA;
    BigEndian::write_u32(&mut buf[base + FSP_SPACE_ID..], space_id);
    BigEndian::write_u32(&mut buf[base + FSP_SIZE..], size);
    BigEndian::write_u32(&mut buf[base + FSP_FREE_LIMIT..], free_limit);
    BigEndian::write_u32(&mut buf[base + FSP_SPACE_FLAGS..], 5 << FSP_FLAGS_POS_PAGE_SSIZE);
    BigEndian::write_u32(&mut buf[base + FSP_FRAG_N_USED..], 0);
}

/// Stamp the trailer LSN and recompute the checksum using the engine's
/// default algorithm (CRC-32C, MySQL 8.0+'s default). Shared by the buffer
/// pool's flush path so every page this engine writes is stamped identically
/// whether it came from the allocator or from a dirty-page flush.
pub fn stamp_page(buf: &mut [u8], page_size: u32, lsn: Lsn) {
    set_page_lsn(buf, page_size, lsn);
    crate::innodb::checksum::recalculate_checksum(
        buf,
        page_size,
        crate::innodb::checksum::ChecksumAlgorithm::Crc32c,
    );
}

/// Stamp the trailer and recompute the checksum (used for pages the space
/// manager writes directly, outside of the buffer pool's own flush path).
pub fn finalize_page(buf: &mut [u8], page_size: u32) {
    stamp_page(buf, page_size, 0);
}

/// Verify that a freshly read page belongs to the space/page we asked for
/// and passes its checksum (spec.md §3 invariant: "every page read from disk
/// verifies header and trailer checksum").
pub fn verify_page(buf: &[u8], page_size: u32, space_id: u32, page_no: u32) -> Result<(), IdbError> {
    let result = crate::innodb::checksum::validate_checksum(buf, page_size, None);
    if !result.valid {
        return Err(IdbError::Corruption(format!(
            "checksum mismatch on page {}:{}",
            space_id, page_no
        )));
    }
    let hdr = FilHeader::parse(buf)
        .ok_or_else(|| IdbError::Corruption("page too short for FIL header".into()))?;
    if hdr.page_number != page_no || hdr.space_id != space_id {
        return Err(IdbError::Corruption(format!(
            "page identity mismatch: expected {}:{}, found {}:{}",
            space_id, page_no, hdr.space_id, hdr.page_number
        )));
    }
    Ok(())
}

pub fn set_page_lsn(buf: &mut [u8], page_size: u32, lsn: Lsn) {
    BigEndian::write_u64(&mut buf[FIL_PAGE_LSN..], lsn);
    let trailer = page_size as usize - SIZE_FIL_TRAILER;
    BigEndian::write_u32(&mut buf[trailer + 4..], (lsn & 0xFFFF_FFFF) as u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_space_has_three_header_pages_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.ibd");
        let space = Space::create_space(&path, 1000, SIZE_PAGE_DEFAULT).unwrap();
        assert_eq!(space.size_pages(), 3);
        // 64 - 3 pages free in extent 0.
        assert_eq!(space.free_page_count(), 61);
    }

    #[test]
    fn allocate_and_free_page_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2.ibd");
        let space = Space::create_space(&path, 1000, SIZE_PAGE_DEFAULT).unwrap();
        let before = space.free_page_count();
        let pid = space.allocate_page(Some(42)).unwrap();
        assert_eq!(space.free_page_count(), before - 1);
        space.free_page(pid.page_no).unwrap();
        assert_eq!(space.free_page_count(), before);
    }

    #[test]
    fn allocate_extends_when_extent_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t3.ibd");
        let space = Space::create_space(&path, 1000, SIZE_PAGE_DEFAULT).unwrap();
        let mut allocated = Vec::new();
        for _ in 0..70 {
            allocated.push(space.allocate_page(Some(1)).unwrap());
        }
        assert!(space.size_pages() >= 70);
        let unique: std::collections::HashSet<_> = allocated.iter().map(|p| p.page_no).collect();
        assert_eq!(unique.len(), allocated.len());
    }

    #[test]
    fn open_space_reconstructs_allocator_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t4.ibd");
        {
            let space = Space::create_space(&path, 1000, SIZE_PAGE_DEFAULT).unwrap();
            space.allocate_page(Some(7)).unwrap();
            space.flush_xdes().unwrap();
        }
        let reopened = Space::open_space(&path, 1000).unwrap();
        assert_eq!(reopened.free_page_count(), 60);
    }

    #[test]
    fn extent_ownership_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t5.ibd");
        let space = Space::create_space(&path, 1000, SIZE_PAGE_DEFAULT).unwrap();
        let p1 = space.allocate_page(Some(1)).unwrap();
        let p2 = space.allocate_page(Some(2)).unwrap();
        // Segment 2 gets a fresh extent rather than sharing segment 1's.
        assert_ne!(p1.page_no / PAGES_PER_EXTENT, p2.page_no / PAGES_PER_EXTENT);
    }
}
