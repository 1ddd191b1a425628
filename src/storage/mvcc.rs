//! Undo / MVCC (spec.md §4.8): per-transaction undo chains, read-view
//! visibility, and purge.
//!
//! Undo record *kind* and *state* reuse the vocabulary of
//! [`crate::innodb::undo::{UndoPageType, UndoState}`] (the read-only parsers
//! for on-disk undo pages) rather than inventing a parallel naming scheme;
//! this module's [`UndoRecord`] is the in-memory, per-row-version
//! counterpart those page parsers would read off disk. Undo records here are
//! kept in memory, indexed by `(space_id, page_no, heap_no)`, rather than
//! physically laid out on dedicated undo pages: nothing in spec.md's
//! testable properties requires on-disk undo paging, only that a
//! transaction's before-images survive until no read view can observe them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::innodb::undo::UndoPageType;
use crate::storage::record::Row;
use crate::storage::TrxId;
use crate::IdbError;

/// Where a row version physically lives, for undo-chain keying.
pub type RowKey = (u32, u32, u16); // space_id, page_no, heap_no

/// One undo record: enough to logically reverse one write (spec.md §4.8
/// "before-image for update, inserted key for insert").
#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub trx_id: TrxId,
    pub kind: UndoPageType,
    /// The row's primary-key tuple, carried alongside the hashed [`RowKey`]
    /// so a caller rolling back an insert (whose `before_image` is `None`)
    /// still has something to locate the physical row by.
    pub key_columns: Row,
    /// The row image to restore on rollback, or to materialize for an older
    /// read view: `None` for an insert's undo (rollback deletes the row).
    pub before_image: Option<Row>,
    /// The undo record physically/logically preceding this one in the same
    /// row's chain, forming the version chain a read view walks.
    pub prev: Option<Box<UndoRecord>>,
}

/// Tracks every row's undo chain and every transaction's undo-record list
/// for rollback, keyed the way the transaction manager and B+tree both
/// address rows.
pub struct UndoLog {
    chains: Mutex<HashMap<RowKey, UndoRecord>>,
    /// Per-transaction list of rows it touched, oldest first, so `rollback`
    /// can replay in reverse order (spec.md §4.9 "replays undo in reverse
    /// LSN order").
    trx_writes: Mutex<HashMap<TrxId, Vec<RowKey>>>,
}

impl UndoLog {
    pub fn new() -> Self {
        UndoLog {
            chains: Mutex::new(HashMap::new()),
            trx_writes: Mutex::new(HashMap::new()),
        }
    }

    /// Record an insert: the row did not exist before, so its undo chain has
    /// no before-image (spec.md §4.8 "inserted key for insert"). `key_columns`
    /// is the row's primary-key tuple, kept so [`rollback`](Self::rollback)
    /// can locate the physical row even though its before-image is `None`.
    pub fn record_insert(&self, trx_id: TrxId, key: RowKey, key_columns: Row) {
        let mut chains = self.chains.lock().unwrap();
        let prev = chains.remove(&key).map(Box::new);
        chains.insert(
            key,
            UndoRecord { trx_id, kind: UndoPageType::Insert, key_columns, before_image: None, prev },
        );
        self.trx_writes.lock().unwrap().entry(trx_id).or_default().push(key);
    }

    /// Record an update or delete-mark: `before` is the row image as it was
    /// immediately before this write (spec.md §4.8 "before-image for
    /// update").
    pub fn record_update(&self, trx_id: TrxId, key: RowKey, key_columns: Row, before: Row) {
        let mut chains = self.chains.lock().unwrap();
        let prev = chains.remove(&key).map(Box::new);
        chains.insert(
            key,
            UndoRecord { trx_id, kind: UndoPageType::Update, key_columns, before_image: Some(before), prev },
        );
        self.trx_writes.lock().unwrap().entry(trx_id).or_default().push(key);
    }

    /// The version of `key` visible to `view` (spec.md §4.8 visibility
    /// rule), walking the undo chain to an older version as needed.
    ///
    /// The chain is newest-first: `node.before_image` is the row state
    /// immediately before `node`'s write, i.e. the state produced by
    /// `node.prev`'s write. So walking down the chain while tracking "the
    /// state produced by the write we're currently looking at" finds the
    /// newest write the view can actually see.
    pub fn visible_version(&self, view: &ReadView, key: RowKey, current: Option<Row>) -> Option<Row> {
        let chains = self.chains.lock().unwrap();
        let Some(mut node) = chains.get(&key) else {
            return current;
        };
        let mut state = current;
        loop {
            if view.is_visible(node.trx_id) {
                return state;
            }
            state = node.before_image.clone();
            match &node.prev {
                Some(prev) => node = prev,
                None => return state,
            }
        }
    }

    /// Undo every write `trx_id` made, in reverse order (spec.md §4.9
    /// `rollback`), handing each `(key, key_columns, before_image)` to
    /// `apply` so the caller restores it through the B+tree / buffer pool.
    pub fn rollback(&self, trx_id: TrxId, mut apply: impl FnMut(RowKey, Row, Option<Row>)) {
        let keys = self.trx_writes.lock().unwrap().remove(&trx_id).unwrap_or_default();
        let mut chains = self.chains.lock().unwrap();
        for key in keys.into_iter().rev() {
            if let Some(undo) = chains.get(&key) {
                if undo.trx_id == trx_id {
                    apply(key, undo.key_columns.clone(), undo.before_image.clone());
                    match &undo.prev {
                        Some(prev) => {
                            chains.insert(key, (**prev).clone());
                        }
                        None => {
                            chains.remove(&key);
                        }
                    }
                }
            }
        }
    }

    /// Detach a committed transaction's undo records for purge (spec.md
    /// §4.9 `commit` "detaches undo (for purge)"): simply forgets the
    /// write-list; the chain itself stays until [`purge`] determines no
    /// read view can see it.
    pub fn detach(&self, trx_id: TrxId) {
        self.trx_writes.lock().unwrap().remove(&trx_id);
    }

    /// Drop undo versions no live read view's low-water mark can still see
    /// (spec.md §4.8 `purge`). `min_active_trx_id` is the oldest trx id any
    /// currently-open read view considers active.
    pub fn purge(&self, min_active_trx_id: TrxId) -> usize {
        let mut chains = self.chains.lock().unwrap();
        let mut purged = 0;
        for undo in chains.values_mut() {
            let mut node = undo;
            loop {
                match &mut node.prev {
                    Some(prev) if prev.trx_id < min_active_trx_id => {
                        purged += 1;
                        node.prev = prev.prev.take();
                    }
                    Some(prev) => {
                        node = prev;
                    }
                    None => break,
                }
            }
        }
        purged
    }
}

impl Clone for UndoRecord {
    fn clone(&self) -> Self {
        UndoRecord {
            trx_id: self.trx_id,
            kind: self.kind,
            key_columns: self.key_columns.clone(),
            before_image: self.before_image.clone(),
            prev: self.prev.clone(),
        }
    }
}

/// A read view: the transaction snapshot spec.md §4.8 describes as
/// `(low_trx_id, up_trx_id, active_trx_ids)`.
#[derive(Debug, Clone)]
pub struct ReadView {
    pub low_trx_id: TrxId,
    pub up_trx_id: TrxId,
    pub active_trx_ids: Vec<TrxId>,
}

impl ReadView {
    /// spec.md §4.8: "visible if T committed before view and T not in
    /// active set". `T < low_trx_id` means committed before any transaction
    /// this view could have seen as active; `T >= up_trx_id` means it did
    /// not exist yet.
    pub fn is_visible(&self, trx_id: TrxId) -> bool {
        if trx_id < self.low_trx_id {
            return true;
        }
        if trx_id >= self.up_trx_id {
            return false;
        }
        !self.active_trx_ids.contains(&trx_id)
    }
}

/// Allocates read views from the transaction manager's live active-trx set.
pub struct ReadViewFactory {
    next_trx_id: std::sync::Arc<AtomicU64>,
}

impl ReadViewFactory {
    pub fn new(next_trx_id: std::sync::Arc<AtomicU64>) -> Self {
        ReadViewFactory { next_trx_id }
    }

    pub fn create(&self, active_trx_ids: Vec<TrxId>) -> ReadView {
        let up_trx_id = self.next_trx_id.load(Ordering::Acquire);
        let low_trx_id = active_trx_ids.iter().copied().min().unwrap_or(up_trx_id);
        ReadView { low_trx_id, up_trx_id, active_trx_ids }
    }
}

pub fn undo_type_error(key: RowKey) -> IdbError {
    IdbError::Logic(format!("no undo chain for row {:?}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_view_sees_committed_before_low_water_mark() {
        let view = ReadView { low_trx_id: 10, up_trx_id: 20, active_trx_ids: vec![12, 15] };
        assert!(view.is_visible(5));
        assert!(!view.is_visible(12));
        assert!(view.is_visible(13));
        assert!(!view.is_visible(25));
    }

    #[test]
    fn rollback_restores_before_image_and_forgets_write() {
        let log = UndoLog::new();
        let key: RowKey = (1000, 5, 2);
        let pk = vec![Some(b"pk".to_vec())];
        log.record_insert(1, key, pk.clone());
        log.record_update(1, key, pk, vec![Some(b"old".to_vec())]);
        let mut restored = Vec::new();
        log.rollback(1, |k, _pk, before| restored.push((k, before)));
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].1, Some(vec![Some(b"old".to_vec())]));
        assert_eq!(restored[1].1, None);
    }

    #[test]
    fn purge_drops_chain_entries_below_watermark() {
        let log = UndoLog::new();
        let key: RowKey = (1000, 5, 2);
        let pk = vec![Some(b"pk".to_vec())];
        log.record_insert(1, key, pk.clone());
        log.record_update(5, key, pk.clone(), vec![Some(b"v1".to_vec())]);
        log.record_update(9, key, pk, vec![Some(b"v2".to_vec())]);
        let purged = log.purge(9);
        assert!(purged > 0);
    }
}
