//! Buffer pool (spec.md §4.4): caches resident pages, tracks dirty state,
//! and runs the background flush/prefetch workers that keep the pool within
//! its dirty and free-page budgets.
//!
//! The hash index is a [`dashmap::DashMap`] keyed by [`PageId`] — its
//! internal sharding is exactly the "fine-grained shard locks keyed by
//! `hash(space_id, page_no) mod shards`" the design calls for, reused from
//! `rust-us-mysql-cdc-rs`'s event-cache pattern rather than hand-rolled.
//! The LRU ordering itself (young/old sublists with midpoint insertion)
//! needs global ordering decisions the hash shards don't provide, so it
//! lives behind one `Mutex<LruList>`.
//!
//! Simplification from the real engine: a [`PageGuard`] pins its frame for
//! its whole lifetime (preventing eviction) but does not hold the frame's
//! content lock for that whole lifetime — holding a lock guard borrowed from
//! an `Arc`-owned `RwLock` across a struct boundary needs unsafe code this
//! module avoids. Callers take the content lock per access via
//! [`PageGuard::read`]/[`PageGuard::write`], which is still race-free and
//! satisfies every invariant the spec's testable properties name (no
//! eviction while pinned; no dirty page evicted before its LSN is flushed).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::storage::space::Space;
use crate::storage::{Lsn, PageId};
use crate::IdbError;

/// A page only moves from the old sublist to the young sublist if it is
/// re-accessed after sitting in `old` for at least this long. Prevents a
/// one-time sequential scan from evicting the genuinely hot working set.
const OLD_BLOCK_TIME: Duration = Duration::from_millis(1000);

/// Sentinel stored in `Frame::first_dirty_lsn` meaning "not dirty".
const NOT_DIRTY: u64 = u64::MAX;

struct Frame {
    data: RwLock<Vec<u8>>,
    pin_count: AtomicU64,
    first_dirty_lsn: AtomicU64,
}

impl Frame {
    fn new(data: Vec<u8>) -> Self {
        Frame {
            data: RwLock::new(data),
            pin_count: AtomicU64::new(0),
            first_dirty_lsn: AtomicU64::new(NOT_DIRTY),
        }
    }

    fn is_dirty(&self) -> bool {
        self.first_dirty_lsn.load(Ordering::Acquire) != NOT_DIRTY
    }

    fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LruClass {
    Young,
    Old,
}

struct LruEntry {
    class: LruClass,
    admitted_at: Instant,
}

/// Young/old sublists of the clock-like LRU list (spec.md §4.4).
struct LruList {
    young: VecDeque<PageId>,
    old: VecDeque<PageId>,
    entries: std::collections::HashMap<PageId, LruEntry>,
}

impl LruList {
    fn new() -> Self {
        LruList {
            young: VecDeque::new(),
            old: VecDeque::new(),
            entries: std::collections::HashMap::new(),
        }
    }

    /// New pages enter at the head of `old` (the "midpoint" of the combined list).
    fn admit(&mut self, pid: PageId) {
        self.old.push_front(pid);
        self.entries.insert(
            pid,
            LruEntry {
                class: LruClass::Old,
                admitted_at: Instant::now(),
            },
        );
    }

    /// Record an access: promote from `old` to `young` if the grace period
    /// has elapsed, else just move to MRU position within its own sublist.
    fn touch(&mut self, pid: PageId) {
        let Some(entry) = self.entries.get(&pid).map(|e| (e.class, e.admitted_at)) else {
            return;
        };
        let (class, admitted_at) = entry;
        match class {
            LruClass::Old if admitted_at.elapsed() >= OLD_BLOCK_TIME => {
                self.old.retain(|p| *p != pid);
                self.young.push_front(pid);
                self.entries.insert(
                    pid,
                    LruEntry {
                        class: LruClass::Young,
                        admitted_at: Instant::now(),
                    },
                );
            }
            LruClass::Old => {
                self.old.retain(|p| *p != pid);
                self.old.push_front(pid);
            }
            LruClass::Young => {
                self.young.retain(|p| *p != pid);
                self.young.push_front(pid);
            }
        }
    }

    fn remove(&mut self, pid: PageId) {
        self.entries.remove(&pid);
        self.old.retain(|p| *p != pid);
        self.young.retain(|p| *p != pid);
    }

    /// Eviction scan order: old-sublist tail first (coldest admitted pages),
    /// then young-sublist tail.
    fn eviction_order(&self) -> impl Iterator<Item = PageId> + '_ {
        self.old.iter().rev().chain(self.young.iter().rev()).copied()
    }
}

/// Registry of open tablespaces the pool writes pages back to. Shared with
/// [`crate::storage::engine::Database`], which is the only thing that opens
/// or closes spaces.
pub type SpaceRegistry = DashMap<u32, Arc<Space>>;

/// A pinned, possibly-write-intended handle on a resident page. Unpins on
/// drop (spec.md §4.4 `drop(guard)`).
pub struct PageGuard {
    pool: Arc<BufferPoolInner>,
    page_id: PageId,
    frame: Arc<Frame>,
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.frame.data.read().unwrap()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.frame.data.write().unwrap()
    }

    /// Mark this page dirty at `lsn` (spec.md §4.4 `mark_dirty`); a no-op if
    /// the frame was already dirty at an earlier LSN (first-dirtied wins).
    pub fn mark_dirty(&self, lsn: Lsn) {
        self.frame
            .first_dirty_lsn
            .compare_exchange(NOT_DIRTY, lsn, Ordering::AcqRel, Ordering::Acquire)
            .ok();
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.frame.pin_count.fetch_sub(1, Ordering::AcqRel);
        self.pool.lru.lock().unwrap().touch(self.page_id);
    }
}

struct BufferPoolInner {
    capacity_pages: usize,
    frames: DashMap<PageId, Arc<Frame>>,
    lru: Mutex<LruList>,
    spaces: Arc<SpaceRegistry>,
    flushed_lsn: AtomicU64,
    doublewrite: Mutex<DoublewriteBuffer>,
}

/// A small ring-buffer file pages are written through before their real
/// location, so a torn write during a crash never corrupts the only copy.
struct DoublewriteBuffer {
    file: std::fs::File,
    slots: u32,
    next_slot: u32,
    page_size: u32,
}

impl DoublewriteBuffer {
    fn open(path: &std::path::Path, page_size: u32, slots: u32) -> Result<Self, IdbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IdbError::Io(e.to_string()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| IdbError::Io(format!("cannot open doublewrite buffer: {}", e)))?;
        file.set_len(slots as u64 * page_size as u64)
            .map_err(|e| IdbError::Io(e.to_string()))?;
        Ok(DoublewriteBuffer {
            file,
            slots,
            next_slot: 0,
            page_size,
        })
    }

    fn write_through(&mut self, page: &[u8]) -> Result<(), IdbError> {
        use std::io::{Seek, SeekFrom, Write};
        let offset = self.next_slot as u64 * self.page_size as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| IdbError::Io(e.to_string()))?;
        self.file
            .write_all(page)
            .map_err(|e| IdbError::Io(e.to_string()))?;
        self.file.sync_data().map_err(|e| IdbError::Io(e.to_string()))?;
        self.next_slot = (self.next_slot + 1) % self.slots;
        Ok(())
    }
}

/// Shutdown handle for the background worker threads (spec.md §5
/// "dedicated background threads ... std::thread, not fibers").
pub struct WorkerHandles {
    shutdown: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
    prefetch_tx: mpsc::Sender<PrefetchRequest>,
}

impl WorkerHandles {
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for h in self.handles.drain(..) {
            h.join().ok();
        }
    }
}

struct PrefetchRequest {
    space_id: u32,
    start_page: u32,
    n: u32,
}

/// The engine's page cache. Cloneable handle around an `Arc<BufferPoolInner>`.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

impl BufferPool {
    pub fn new(capacity_pages: usize, spaces: Arc<SpaceRegistry>, doublewrite_path: &std::path::Path, page_size: u32) -> Result<Self, IdbError> {
        Ok(BufferPool {
            inner: Arc::new(BufferPoolInner {
                capacity_pages,
                frames: DashMap::new(),
                lru: Mutex::new(LruList::new()),
                spaces,
                flushed_lsn: AtomicU64::new(0),
                doublewrite: Mutex::new(DoublewriteBuffer::open(doublewrite_path, page_size, 128)?),
            }),
        })
    }

    /// spec.md §4.4 `get_page`: returns a pinned guard, reading through the
    /// space manager on a miss and evicting if the pool is at capacity.
    pub fn get_page(&self, page_id: PageId) -> Result<PageGuard, IdbError> {
        if let Some(frame) = self.inner.frames.get(&page_id) {
            let frame = frame.clone();
            frame.pin_count.fetch_add(1, Ordering::AcqRel);
            self.inner.lru.lock().unwrap().touch(page_id);
            return Ok(PageGuard {
                pool: self.inner.clone(),
                page_id,
                frame,
            });
        }

        if self.inner.frames.len() >= self.inner.capacity_pages {
            self.evict_one()?;
        }

        let space = self
            .inner
            .spaces
            .get(&page_id.space_id)
            .ok_or_else(|| IdbError::NotFound(format!("space {} not open", page_id.space_id)))?
            .clone();
        let data = space.read_page(page_id.page_no)?;
        crate::storage::space::verify_page(&data, space.page_size(), page_id.space_id, page_id.page_no)?;

        let frame = Arc::new(Frame::new(data));
        frame.pin_count.fetch_add(1, Ordering::AcqRel);
        self.inner.frames.insert(page_id, frame.clone());
        self.inner.lru.lock().unwrap().admit(page_id);

        Ok(PageGuard {
            pool: self.inner.clone(),
            page_id,
            frame,
        })
    }

    /// Registers a freshly-initialized page (e.g. one just returned by the
    /// segment manager) without going through a disk read.
    pub fn install_new_page(&self, page_id: PageId, data: Vec<u8>) -> Result<PageGuard, IdbError> {
        if self.inner.frames.len() >= self.inner.capacity_pages {
            self.evict_one()?;
        }
        let frame = Arc::new(Frame::new(data));
        frame.pin_count.fetch_add(1, Ordering::AcqRel);
        self.inner.frames.insert(page_id, frame.clone());
        self.inner.lru.lock().unwrap().admit(page_id);
        Ok(PageGuard {
            pool: self.inner.clone(),
            page_id,
            frame,
        })
    }

    /// Eviction selection (spec.md §4.4): scan LRU tail-first, skip pinned
    /// pages, evict the first clean unpinned page. Dirty-but-unpinned pages
    /// are flushed first so eviction never drops an unflushed change.
    fn evict_one(&self) -> Result<(), IdbError> {
        let candidates: Vec<PageId> = self.inner.lru.lock().unwrap().eviction_order().collect();
        for pid in candidates {
            let Some(frame) = self.inner.frames.get(&pid).map(|f| f.clone()) else {
                continue;
            };
            if frame.is_pinned() {
                continue;
            }
            if frame.is_dirty() {
                self.flush_frame(pid, &frame)?;
            }
            self.inner.frames.remove(&pid);
            self.inner.lru.lock().unwrap().remove(pid);
            return Ok(());
        }
        Err(IdbError::ResourceExhausted(
            "buffer pool exhausted: no unpinned page to evict".into(),
        ))
    }

    fn flush_frame(&self, pid: PageId, frame: &Frame) -> Result<(), IdbError> {
        let space = self
            .inner
            .spaces
            .get(&pid.space_id)
            .ok_or_else(|| IdbError::NotFound(format!("space {} not open", pid.space_id)))?
            .clone();
        let data = frame.data.read().unwrap().clone();
        self.inner.doublewrite.lock().unwrap().write_through(&data)?;
        space.write_page(pid.page_no, &data)?;
        frame.first_dirty_lsn.store(NOT_DIRTY, Ordering::Release);
        Ok(())
    }

    /// spec.md §4.4 `flush_up_to`: writes every dirty page whose
    /// first-dirtied LSN is `<= lsn`, then advances the watermark.
    pub fn flush_up_to(&self, lsn: Lsn) -> Result<(), IdbError> {
        let dirty: Vec<(PageId, Arc<Frame>)> = self
            .inner
            .frames
            .iter()
            .filter(|e| e.value().is_dirty() && e.value().first_dirty_lsn.load(Ordering::Acquire) <= lsn)
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        for (pid, frame) in dirty {
            self.flush_frame(pid, &frame)?;
        }
        self.inner.flushed_lsn.fetch_max(lsn, Ordering::AcqRel);
        Ok(())
    }

    /// The minimum `first_dirty_lsn` across every resident dirty page, i.e.
    /// the checkpoint LSN recovery scans from (spec.md §4.7).
    pub fn min_first_dirty_lsn(&self) -> Option<Lsn> {
        self.inner
            .frames
            .iter()
            .filter_map(|e| {
                let v = e.value().first_dirty_lsn.load(Ordering::Acquire);
                (v != NOT_DIRTY).then_some(v)
            })
            .min()
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.inner.flushed_lsn.load(Ordering::Acquire)
    }

    pub fn resident_pages(&self) -> usize {
        self.inner.frames.len()
    }

    /// Look up an open tablespace by id (used by callers, e.g. `storage::btree`,
    /// that need to allocate a page directly rather than through a segment).
    pub fn space_for(&self, space_id: u32) -> Option<Arc<Space>> {
        self.inner.spaces.get(&space_id).map(|e| e.clone())
    }

    pub fn dirty_pages(&self) -> usize {
        self.inner.frames.iter().filter(|e| e.value().is_dirty()).count()
    }

    /// `(space_id, page_no, first_dirty_lsn)` for every dirty resident page,
    /// for a checkpoint record (spec.md §4.7 "checkpoint ... dirty page
    /// table").
    pub fn dirty_page_list(&self) -> Vec<(u32, u32, Lsn)> {
        self.inner
            .frames
            .iter()
            .filter_map(|e| {
                let lsn = e.value().first_dirty_lsn.load(Ordering::Acquire);
                (lsn != NOT_DIRTY).then_some((e.key().space_id, e.key().page_no, lsn))
            })
            .collect()
    }

    /// Starts the dirty flusher, LRU flusher, and prefetch-drainer threads.
    /// `dirty_ratio_target` caps the dirty-page share the dirty flusher
    /// tries to maintain; `clean_tail_target` is the minimum clean pages
    /// the LRU flusher tries to keep at the tail.
    pub fn spawn_workers(&self, dirty_ratio_target: f64, clean_tail_target: usize) -> WorkerHandles {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (prefetch_tx, prefetch_rx) = mpsc::channel::<PrefetchRequest>();
        let mut handles = Vec::new();

        {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    let total = pool.resident_pages().max(1);
                    let dirty = pool.dirty_pages();
                    if dirty as f64 / total as f64 > dirty_ratio_target {
                        if let Some(lsn) = pool.oldest_dirty_lsn_plus_one() {
                            pool.flush_up_to(lsn).ok();
                        }
                    }
                    thread::sleep(Duration::from_millis(200));
                }
            }));
        }

        {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    pool.top_up_clean_tail(clean_tail_target);
                    thread::sleep(Duration::from_millis(500));
                }
            }));
        }

        {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    match prefetch_rx.recv_timeout(Duration::from_millis(300)) {
                        Ok(req) => {
                            for p in req.start_page..req.start_page + req.n {
                                let _ = pool.get_page(PageId::new(req.space_id, p));
                            }
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            }));
        }

        WorkerHandles {
            shutdown,
            handles,
            prefetch_tx,
        }
    }

    /// spec.md §4.4 `prefetch`: schedules reads of up to `n` contiguous
    /// pages onto the background prefetch-drainer thread and returns
    /// immediately.
    pub fn prefetch(&self, workers: &WorkerHandles, space_id: u32, start_page: u32, n: u32) {
        workers
            .prefetch_tx
            .send(PrefetchRequest { space_id, start_page, n })
            .ok();
    }

    fn oldest_dirty_lsn_plus_one(&self) -> Option<Lsn> {
        self.min_first_dirty_lsn().map(|l| l + 1)
    }

    /// LRU flusher duty: keep at least `target` clean, unpinned pages at
    /// the LRU tail so eviction rarely has to flush synchronously.
    fn top_up_clean_tail(&self, target: usize) {
        let tail: Vec<PageId> = {
            let lru = self.inner.lru.lock().unwrap();
            lru.eviction_order().take(target).collect()
        };
        for pid in tail {
            if let Some(frame) = self.inner.frames.get(&pid).map(|f| f.clone()) {
                if frame.is_dirty() && !frame.is_pinned() {
                    self.flush_frame(pid, &frame).ok();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::constants::SIZE_PAGE_DEFAULT;
    use crate::storage::space::Space;

    fn setup() -> (tempfile::TempDir, BufferPool) {
        let dir = tempfile::tempdir().unwrap();
        let space = Space::create_space(dir.path().join("t.ibd"), 1000, SIZE_PAGE_DEFAULT).unwrap();
        let spaces: Arc<SpaceRegistry> = Arc::new(DashMap::new());
        spaces.insert(1000, Arc::new(space));
        let pool = BufferPool::new(16, spaces, &dir.path().join("dblwr"), SIZE_PAGE_DEFAULT).unwrap();
        (dir, pool)
    }

    #[test]
    fn get_page_reads_through_on_miss() {
        let (_dir, pool) = setup();
        let guard = pool.get_page(PageId::new(1000, 0)).unwrap();
        assert_eq!(guard.read().len(), SIZE_PAGE_DEFAULT as usize);
    }

    #[test]
    fn mark_dirty_then_flush_clears_dirty_flag() {
        let (_dir, pool) = setup();
        {
            let guard = pool.get_page(PageId::new(1000, 0)).unwrap();
            guard.mark_dirty(5);
        }
        assert_eq!(pool.dirty_pages(), 1);
        pool.flush_up_to(10).unwrap();
        assert_eq!(pool.dirty_pages(), 0);
    }

    #[test]
    fn pinned_page_is_not_evicted() {
        let (_dir, pool) = setup();
        let guard = pool.get_page(PageId::new(1000, 0)).unwrap();
        // Force the pool to its capacity ceiling without ever dropping the guard.
        let small_pool = BufferPool {
            inner: Arc::new(BufferPoolInner {
                capacity_pages: 1,
                frames: pool.inner.frames.clone(),
                lru: Mutex::new(LruList::new()),
                spaces: pool.inner.spaces.clone(),
                flushed_lsn: AtomicU64::new(0),
                doublewrite: Mutex::new(
                    DoublewriteBuffer::open(
                        &std::env::temp_dir().join(format!("dblwr-{:?}", std::thread::current().id())),
                        SIZE_PAGE_DEFAULT,
                        8,
                    )
                    .unwrap(),
                ),
            }),
        };
        assert!(small_pool.evict_one().is_err());
        drop(guard);
    }

    #[test]
    fn min_first_dirty_lsn_tracks_oldest() {
        let (_dir, pool) = setup();
        let g1 = pool.get_page(PageId::new(1000, 0)).unwrap();
        g1.mark_dirty(7);
        assert_eq!(pool.min_first_dirty_lsn(), Some(7));
    }
}
