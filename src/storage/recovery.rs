//! Crash recovery (spec.md §4.10): reconstruct the logical redo byte stream
//! from `ib_logfile0`'s on-disk blocks, replay every committed transaction's
//! writes idempotently, then roll back whatever transaction never reached a
//! `TRX_COMMIT` marker.
//!
//! Grounded on `storage::wal`'s own writer (this module is its reader half,
//! reusing its block-layout constants rather than re-deriving them) and on
//! `storage::mvcc`'s rollback shape, which this module's undo pass mirrors —
//! but against the WAL's before/after images directly, since `UndoLog`
//! itself is in-memory only and does not survive a process restart.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use crate::innodb::log::{LOG_BLOCK_CHECKSUM_OFFSET, LOG_BLOCK_HDR_SIZE, LOG_BLOCK_SIZE, LOG_BLOCK_TRL_SIZE, LOG_FILE_HDR_BLOCKS};
use crate::storage::engine::{decode_body, DmlBody, Database};
use crate::storage::wal::{RedoRecord, RedoType};
use crate::storage::{Lsn, TrxId};
use crate::IdbError;

const BLOCK_PAYLOAD: usize = LOG_BLOCK_SIZE - LOG_BLOCK_HDR_SIZE - LOG_BLOCK_TRL_SIZE;

/// Result of scanning `ib_logfile0`: the flattened record byte stream, the
/// LSN its first byte corresponds to, and where the writer should resume
/// appending from.
struct LogScan {
    logical: Vec<u8>,
    initial_lsn: Lsn,
    resume_write_offset: u64,
}

fn scan_log_file(path: &Path) -> Result<LogScan, IdbError> {
    let initial_lsn = LOG_FILE_HDR_BLOCKS * LOG_BLOCK_SIZE as u64;
    let mut file = File::open(path).map_err(|e| IdbError::Io(format!("cannot open {}: {}", path.display(), e)))?;
    let header_bytes = LOG_FILE_HDR_BLOCKS * LOG_BLOCK_SIZE as u64;
    let mut skip = vec![0u8; header_bytes as usize];
    if file.read_exact(&mut skip).is_err() {
        // Header blocks don't exist yet; nothing has ever been written.
        return Ok(LogScan { logical: Vec::new(), initial_lsn, resume_write_offset: 0 });
    }

    let mut logical = Vec::new();
    let mut write_offset = 0u64;
    let mut block = vec![0u8; LOG_BLOCK_SIZE];

    loop {
        match file.read_exact(&mut block) {
            Ok(()) => {}
            Err(_) => break,
        }
        let used = BigEndian::read_u16(&block[4..6]) as usize;
        if used < LOG_BLOCK_HDR_SIZE {
            break;
        }
        let data_len = used - LOG_BLOCK_HDR_SIZE;
        if data_len == 0 {
            break;
        }
        let stored_crc = BigEndian::read_u32(&block[LOG_BLOCK_CHECKSUM_OFFSET..]);
        let computed_crc = crc32c::crc32c(&block[..LOG_BLOCK_CHECKSUM_OFFSET]);
        if stored_crc != computed_crc {
            // Torn write: this block was never fully fsynced. Everything up
            // to here is durable; stop and let the writer overwrite it.
            break;
        }
        logical.extend_from_slice(&block[LOG_BLOCK_HDR_SIZE..LOG_BLOCK_HDR_SIZE + data_len]);
        if data_len < BLOCK_PAYLOAD {
            // Partial trailing block: captured into the logical stream
            // already, but the writer should start a fresh block after it
            // rather than appending into the middle of this one.
            write_offset += LOG_BLOCK_SIZE as u64;
            break;
        }
        write_offset += LOG_BLOCK_SIZE as u64;
    }

    Ok(LogScan { logical, initial_lsn, resume_write_offset: write_offset })
}

struct TrxHistory {
    /// Every DML record this transaction wrote, in log order.
    records: Vec<(RedoType, u32, DmlBody)>,
    committed: bool,
    rolled_back: bool,
}

/// Decode the flattened byte stream into per-transaction histories plus the
/// final LSN it represents.
fn decode_records(logical: &[u8], initial_lsn: Lsn) -> (HashMap<TrxId, TrxHistory>, Vec<(TrxId, RedoType, u32, DmlBody)>, Lsn) {
    let mut by_trx: HashMap<TrxId, TrxHistory> = HashMap::new();
    let mut ordered = Vec::new();
    let mut cursor = logical;

    while let Some((record, consumed)) = RedoRecord::decode(cursor) {
        cursor = &cursor[consumed..];
        match record.record_type {
            RedoType::TrxCommit => {
                by_trx
                    .entry(record.trx_id)
                    .or_insert_with(|| TrxHistory { records: Vec::new(), committed: false, rolled_back: false })
                    .committed = true;
            }
            RedoType::TrxRollback => {
                by_trx
                    .entry(record.trx_id)
                    .or_insert_with(|| TrxHistory { records: Vec::new(), committed: false, rolled_back: false })
                    .rolled_back = true;
            }
            RedoType::RecordInsert | RedoType::RecordDeleteMark | RedoType::Write => {
                let Ok(body) = decode_body(&record.body) else { continue };
                let entry = by_trx
                    .entry(record.trx_id)
                    .or_insert_with(|| TrxHistory { records: Vec::new(), committed: false, rolled_back: false });
                entry.records.push((record.record_type, record.space_id, body.clone()));
                ordered.push((record.trx_id, record.record_type, record.space_id, body));
            }
            RedoType::PageAllocate | RedoType::PageInit | RedoType::UndoInsert => {}
        }
    }

    let final_lsn = initial_lsn + logical.len() as u64;
    (by_trx, ordered, final_lsn)
}

/// Replay crash recovery against an already-opened `Database` (spec.md
/// §4.10: invoked by `Database::open` before the engine accepts new
/// traffic). A database with no redo log yet (fresh bootstrap) is a no-op.
pub(crate) fn recover(db: &Database) -> Result<(), IdbError> {
    let log_path = db.config().redo_log_dir.join("ib_logfile0");
    if !log_path.exists() {
        return Ok(());
    }
    let scan = scan_log_file(&log_path)?;
    if scan.logical.is_empty() {
        return Ok(());
    }

    let (by_trx, ordered, final_lsn) = decode_records(&scan.logical, scan.initial_lsn);
    let tables = db.tables_by_space();
    let pool = db.buffer_pool();

    let needs_undo: HashSet<TrxId> = by_trx
        .iter()
        .filter(|(_, h)| !h.committed)
        .map(|(id, _)| *id)
        .collect();

    let mut forward = 0usize;
    for (trx_id, record_type, space_id, body) in &ordered {
        if needs_undo.contains(trx_id) {
            continue;
        }
        let Some(table) = tables.get(space_id) else { continue };
        apply_forward(table, pool, *record_type, body)?;
        forward += 1;
    }

    let mut undone = 0usize;
    for trx_id in &needs_undo {
        let Some(history) = by_trx.get(trx_id) else { continue };
        for (record_type, space_id, body) in history.records.iter().rev() {
            let Some(table) = tables.get(space_id) else { continue };
            apply_inverse(table, pool, *record_type, body)?;
            undone += 1;
        }
    }

    tracing::info!(
        replayed = forward,
        undone,
        incomplete_trx = needs_undo.len(),
        final_lsn,
        "recovery replay complete"
    );

    db.wal().resume_at(final_lsn, scan.resume_write_offset);
    Ok(())
}

fn apply_forward(
    table: &std::sync::Arc<crate::storage::engine::Table>,
    pool: &crate::storage::buffer_pool::BufferPool,
    record_type: RedoType,
    body: &DmlBody,
) -> Result<(), IdbError> {
    match (record_type, body) {
        (RedoType::RecordInsert, DmlBody::Insert { row }) => table.replay_insert(pool, row.clone()),
        (RedoType::RecordDeleteMark, DmlBody::Delete { row }) => {
            let key = table.key_of(row);
            table.replay_delete(pool, &key)
        }
        (RedoType::Write, DmlBody::Update { new, .. }) => {
            let key = table.key_of(new);
            table.replay_delete(pool, &key)?;
            table.replay_insert(pool, new.clone())
        }
        _ => Ok(()),
    }
}

fn apply_inverse(
    table: &std::sync::Arc<crate::storage::engine::Table>,
    pool: &crate::storage::buffer_pool::BufferPool,
    record_type: RedoType,
    body: &DmlBody,
) -> Result<(), IdbError> {
    match (record_type, body) {
        (RedoType::RecordInsert, DmlBody::Insert { row }) => {
            let key = table.key_of(row);
            table.replay_delete(pool, &key)
        }
        (RedoType::RecordDeleteMark, DmlBody::Delete { row }) => table.replay_insert(pool, row.clone()),
        (RedoType::Write, DmlBody::Update { old, new }) => {
            let key = table.key_of(new);
            table.replay_delete(pool, &key)?;
            table.replay_insert(pool, old.clone())
        }
        _ => Ok(()),
    }
}
