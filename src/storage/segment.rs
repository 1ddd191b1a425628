//! Segment manager (spec.md §4.3): INODE-entry-backed file segments.
//!
//! A segment is the unit a B+tree leaf or internal level allocates pages
//! from. It starts by handing out pages from a small fragment array (up to
//! 32 individually-tracked pages, matching real InnoDB's `FSEG_FRAG_ARR_N_SLOTS`)
//! before switching to whole-extent allocation once it grows past that.
//! Built on [`crate::innodb::index::FsegHeader`] (the pointer type an INDEX
//! page uses to reference its owning segment) and [`crate::storage::space`]
//! (the extent allocator this module drives).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::innodb::constants::FIL_NULL;
use crate::storage::space::Space;
use crate::storage::PageId;
use crate::IdbError;

/// Real InnoDB's `FSEG_FRAG_ARR_N_SLOTS`: individually-tracked pages a
/// segment owns before it starts claiming whole extents.
pub const FRAG_ARRAY_SLOTS: usize = 32;

/// One file segment's bookkeeping state (the in-memory counterpart of an
/// on-disk INODE entry).
#[derive(Debug)]
pub struct InodeEntry {
    pub segment_id: u64,
    pub is_leaf: bool,
    /// Individually-tracked pages, before this segment owns a full extent.
    fragment_pages: Vec<u32>,
}

impl InodeEntry {
    fn new(segment_id: u64, is_leaf: bool) -> Self {
        InodeEntry {
            segment_id,
            is_leaf,
            fragment_pages: Vec::new(),
        }
    }

    pub fn n_pages(&self) -> usize {
        self.fragment_pages.len()
    }
}

/// Manages every segment within one tablespace. One instance per open
/// [`Space`] (held by `storage::engine::Database`).
pub struct SegmentManager {
    space_id: u32,
    next_segment_id: AtomicU64,
    segments: Mutex<Vec<InodeEntry>>,
}

impl SegmentManager {
    pub fn new(space_id: u32) -> Self {
        SegmentManager {
            space_id,
            next_segment_id: AtomicU64::new(1),
            segments: Mutex::new(Vec::new()),
        }
    }

    /// Create a new segment (one per B+tree level: leaf or internal, spec.md
    /// §4.3 "a segment belongs to exactly one B+tree level of one index").
    pub fn create_segment(&self, is_leaf: bool) -> u64 {
        let id = self.next_segment_id.fetch_add(1, Ordering::SeqCst);
        self.segments.lock().unwrap().push(InodeEntry::new(id, is_leaf));
        id
    }

    fn with_segment<R>(&self, segment_id: u64, f: impl FnOnce(&mut InodeEntry) -> R) -> Result<R, IdbError> {
        let mut segments = self.segments.lock().unwrap();
        let entry = segments
            .iter_mut()
            .find(|e| e.segment_id == segment_id)
            .ok_or_else(|| IdbError::Logic(format!("unknown segment {}", segment_id)))?;
        Ok(f(entry))
    }

    /// Allocate one page for `segment_id`. Uses the fragment array while the
    /// segment is small, then hands off to [`Space::allocate_page`]'s
    /// extent-owned allocation once the fragment array is full.
    pub fn alloc_page(&self, space: &Space, segment_id: u64) -> Result<PageId, IdbError> {
        let use_fragment = self.with_segment(segment_id, |e| e.n_pages() < FRAG_ARRAY_SLOTS)?;
        let pid = if use_fragment {
            space.allocate_page(None)?
        } else {
            space.allocate_page(Some(segment_id))?
        };
        self.with_segment(segment_id, |e| {
            if e.n_pages() < FRAG_ARRAY_SLOTS {
                e.fragment_pages.push(pid.page_no);
            }
        })?;
        Ok(pid)
    }

    /// Free every page this segment owns, returning them to the space's free
    /// lists (spec.md §4.3 `free_segment`, used when an index is dropped).
    pub fn free_segment(&self, space: &Space, segment_id: u64) -> Result<(), IdbError> {
        let fragment_pages = self.with_segment(segment_id, |e| std::mem::take(&mut e.fragment_pages))?;
        for page_no in fragment_pages {
            if page_no != FIL_NULL {
                space.free_page(page_no)?;
            }
        }
        self.segments.lock().unwrap().retain(|e| e.segment_id != segment_id);
        Ok(())
    }

    pub fn space_id(&self) -> u32 {
        self.space_id
    }

    /// Register a segment id that already exists on disk (spec.md §6.2
    /// `Database::open`, reconstructing a table's leaf/internal segments
    /// from the catalog instead of allocating fresh ones). A no-op if the
    /// segment is already known. Advances `next_segment_id` past
    /// `segment_id` so a later [`create_segment`](Self::create_segment)
    /// never collides with it.
    pub fn register_existing(&self, segment_id: u64, is_leaf: bool) {
        let mut segments = self.segments.lock().unwrap();
        if !segments.iter().any(|e| e.segment_id == segment_id) {
            segments.push(InodeEntry::new(segment_id, is_leaf));
        }
        drop(segments);
        let mut current = self.next_segment_id.load(Ordering::SeqCst);
        while segment_id >= current {
            match self.next_segment_id.compare_exchange(
                current,
                segment_id + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::constants::SIZE_PAGE_DEFAULT;

    fn test_space() -> (tempfile::TempDir, Space) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.ibd");
        let space = Space::create_space(&path, 1000, SIZE_PAGE_DEFAULT).unwrap();
        (dir, space)
    }

    #[test]
    fn fragment_array_fills_before_extent_ownership() {
        let (_dir, space) = test_space();
        let mgr = SegmentManager::new(1000);
        let seg = mgr.create_segment(true);
        for _ in 0..FRAG_ARRAY_SLOTS {
            mgr.alloc_page(&space, seg).unwrap();
        }
        let n = mgr.with_segment(seg, |e| e.n_pages()).unwrap();
        assert_eq!(n, FRAG_ARRAY_SLOTS);
        // One more allocation switches to extent-owned; fragment array caps out.
        mgr.alloc_page(&space, seg).unwrap();
        let n_after = mgr.with_segment(seg, |e| e.n_pages()).unwrap();
        assert_eq!(n_after, FRAG_ARRAY_SLOTS);
    }

    #[test]
    fn free_segment_releases_fragment_pages() {
        let (_dir, space) = test_space();
        let mgr = SegmentManager::new(1000);
        let seg = mgr.create_segment(true);
        let before = space.free_page_count();
        mgr.alloc_page(&space, seg).unwrap();
        mgr.alloc_page(&space, seg).unwrap();
        assert_eq!(space.free_page_count(), before - 2);
        mgr.free_segment(&space, seg).unwrap();
        assert_eq!(space.free_page_count(), before);
    }

    #[test]
    fn unknown_segment_is_an_error() {
        let (_dir, space) = test_space();
        let mgr = SegmentManager::new(1000);
        assert!(mgr.alloc_page(&space, 999).is_err());
    }
}
