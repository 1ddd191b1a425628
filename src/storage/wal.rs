//! Write-ahead redo log (spec.md §4.7): LSN reservation, redo append, group
//! commit, fsync discipline, and checkpoint writing.
//!
//! Reuses [`crate::innodb::log`]'s on-disk block layout constants
//! (`LOG_BLOCK_SIZE`, `LOG_BLOCK_HDR_SIZE`, `LOG_BLOCK_CHECKSUM_OFFSET`) so
//! the files this module writes parse with that module's existing
//! `LogBlockHeader`/`LogBlockTrailer` readers; it adds the writer half those
//! read-only parsers never needed. Checkpoints are a new on-disk format
//! (spec.md §6.2 `<datadir>/checkpoints/checkpoint_<n>`, JSON with a
//! checksum) written with `serde_json`, since nothing upstream already reads
//! that file format.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::innodb::log::{LOG_BLOCK_CHECKSUM_OFFSET, LOG_BLOCK_HDR_SIZE, LOG_BLOCK_SIZE, LOG_BLOCK_TRL_SIZE, LOG_FILE_HDR_BLOCKS};
use crate::storage::{Lsn, TrxId};
use crate::IdbError;

pub(crate) const BLOCK_PAYLOAD: usize = LOG_BLOCK_SIZE - LOG_BLOCK_HDR_SIZE - LOG_BLOCK_TRL_SIZE;

/// Redo record kind (spec.md §4.7: "BYTE/SHORT/LONG writes, page-allocate,
/// page-init, record-insert, record-delete-mark, undo-insert"), plus the
/// transaction boundary markers `commit`/`rollback` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RedoType {
    Write = 1,
    PageAllocate = 2,
    PageInit = 3,
    RecordInsert = 4,
    RecordDeleteMark = 5,
    UndoInsert = 6,
    TrxCommit = 7,
    TrxRollback = 8,
}

impl RedoType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => RedoType::Write,
            2 => RedoType::PageAllocate,
            3 => RedoType::PageInit,
            4 => RedoType::RecordInsert,
            5 => RedoType::RecordDeleteMark,
            6 => RedoType::UndoInsert,
            7 => RedoType::TrxCommit,
            8 => RedoType::TrxRollback,
            _ => return None,
        })
    }
}

/// One logical redo record: `(type, space_id, page_no, offset, body, lsn)`
/// per spec.md §4.7.
#[derive(Debug, Clone)]
pub struct RedoRecord {
    pub lsn: Lsn,
    pub trx_id: TrxId,
    pub record_type: RedoType,
    pub space_id: u32,
    pub page_no: u32,
    pub offset: u32,
    pub body: Vec<u8>,
}

impl RedoRecord {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(29 + self.body.len());
        buf.push(self.record_type as u8);
        let mut scratch = [0u8; 8];
        BigEndian::write_u64(&mut scratch, self.trx_id);
        buf.extend_from_slice(&scratch);
        BigEndian::write_u64(&mut scratch, self.lsn);
        buf.extend_from_slice(&scratch);
        let mut scratch4 = [0u8; 4];
        BigEndian::write_u32(&mut scratch4, self.space_id);
        buf.extend_from_slice(&scratch4);
        BigEndian::write_u32(&mut scratch4, self.page_no);
        buf.extend_from_slice(&scratch4);
        BigEndian::write_u32(&mut scratch4, self.offset);
        buf.extend_from_slice(&scratch4);
        BigEndian::write_u32(&mut scratch4, self.body.len() as u32);
        buf.extend_from_slice(&scratch4);
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Parse one encoded record from the front of `buf`, returning it and the
    /// number of bytes it consumed. Used by `storage::recovery` to replay the
    /// logical byte stream reconstructed from on-disk log blocks.
    pub(crate) fn decode(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < 33 {
            return None;
        }
        let record_type = RedoType::from_u8(buf[0])?;
        let trx_id = BigEndian::read_u64(&buf[1..9]);
        let lsn = BigEndian::read_u64(&buf[9..17]);
        let space_id = BigEndian::read_u32(&buf[17..21]);
        let page_no = BigEndian::read_u32(&buf[21..25]);
        let offset = BigEndian::read_u32(&buf[25..29]);
        let body_len = BigEndian::read_u32(&buf[29..33]) as usize;
        if buf.len() < 33 + body_len {
            return None;
        }
        let body = buf[33..33 + body_len].to_vec();
        Some((
            RedoRecord { lsn, trx_id, record_type, space_id, page_no, offset, body },
            33 + body_len,
        ))
    }
}

/// One checkpoint (spec.md §4.7 "write a checkpoint record ... to a
/// dedicated checkpoint file").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_lsn: Lsn,
    pub active_trx_ids: Vec<TrxId>,
    pub dirty_pages: Vec<(u32, u32, Lsn)>,
    pub buffer_pool_resident: usize,
    pub buffer_pool_dirty: usize,
    checksum: u32,
}

impl Checkpoint {
    pub fn new(checkpoint_lsn: Lsn, active_trx_ids: Vec<TrxId>, dirty_pages: Vec<(u32, u32, Lsn)>, resident: usize, dirty: usize) -> Self {
        let mut cp = Checkpoint {
            checkpoint_lsn,
            active_trx_ids,
            dirty_pages,
            buffer_pool_resident: resident,
            buffer_pool_dirty: dirty,
            checksum: 0,
        };
        cp.checksum = cp.compute_checksum();
        cp
    }

    fn compute_checksum(&self) -> u32 {
        let mut hasher_input = Vec::new();
        hasher_input.extend_from_slice(&self.checkpoint_lsn.to_be_bytes());
        for id in &self.active_trx_ids {
            hasher_input.extend_from_slice(&id.to_be_bytes());
        }
        for (s, p, l) in &self.dirty_pages {
            hasher_input.extend_from_slice(&s.to_be_bytes());
            hasher_input.extend_from_slice(&p.to_be_bytes());
            hasher_input.extend_from_slice(&l.to_be_bytes());
        }
        crc32c::crc32c(&hasher_input)
    }

    pub fn is_valid(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

struct WalState {
    file: File,
    /// Offset within the current file of the next byte to write, not
    /// counting the `LOG_FILE_HDR_BLOCKS` reserved header blocks.
    write_offset: u64,
    file_capacity: u64,
    next_lsn: Lsn,
    /// Bytes of the in-progress block not yet flushed to `file`.
    block_buf: Vec<u8>,
}

/// The redo log writer: one ring of fixed-size files, a single mutex
/// guarding LSN reservation and append (spec.md §5 "Log buffer tail — single
/// append mutex").
pub struct WalWriter {
    dir: PathBuf,
    n_files: usize,
    state: Mutex<WalState>,
    flush_log_at_trx_commit: u8,
}

impl WalWriter {
    pub fn open(dir: &Path, file_size: u64, n_files: usize, flush_log_at_trx_commit: u8) -> Result<Self, IdbError> {
        std::fs::create_dir_all(dir).map_err(|e| IdbError::Io(e.to_string()))?;
        let path = dir.join("ib_logfile0");
        let file = open_or_create_log_file(&path, file_size)?;
        Ok(WalWriter {
            dir: dir.to_path_buf(),
            n_files: n_files.max(1),
            state: Mutex::new(WalState {
                file,
                write_offset: 0,
                file_capacity: file_size,
                next_lsn: LOG_FILE_HDR_BLOCKS * LOG_BLOCK_SIZE as u64,
                block_buf: Vec::with_capacity(BLOCK_PAYLOAD),
            }),
            flush_log_at_trx_commit,
        })
    }

    /// Append one redo record (spec.md §4.7 step 2: "append redo record(s)
    /// atomically with LSN assignment under the log mutex"). Returns the LSN
    /// assigned to the record's start.
    pub fn append(&self, mut record: RedoRecord) -> Result<Lsn, IdbError> {
        let mut state = self.state.lock().unwrap();
        let lsn = state.next_lsn;
        record.lsn = lsn;
        let encoded = record.encode();
        state.next_lsn += encoded.len() as u64;
        write_into_blocks(&mut state, &encoded)?;
        Ok(lsn)
    }

    /// Write every buffered block to the file and, if warranted, fsync it
    /// (spec.md §4.7 "group commit": multiple appenders share one fsync).
    /// `flush_log_at_trx_commit == 1` always fsyncs; `force` additionally
    /// fsyncs regardless of mode, used by the periodic background flush that
    /// stands in for modes `0`/`2`'s "once per second" fsync under an
    /// explicit commit never forcing one itself.
    pub fn flush(&self, force: bool) -> Result<(), IdbError> {
        let mut state = self.state.lock().unwrap();
        flush_partial_block(&mut state)?;
        if force || self.flush_log_at_trx_commit == 1 {
            state.file.sync_data().map_err(|e| IdbError::Io(e.to_string()))?;
        }
        Ok(())
    }

    /// Re-point LSN assignment and the write cursor after a recovery replay
    /// has determined where the log's valid content ends (spec.md §4.10:
    /// appends after restart must continue the log, not overwrite it).
    /// `write_offset` should land on a block boundary; the replay scan pads
    /// to one rather than tracking a partial block's exact byte count.
    pub(crate) fn resume_at(&self, next_lsn: Lsn, write_offset: u64) {
        let mut state = self.state.lock().unwrap();
        state.next_lsn = next_lsn;
        state.write_offset = write_offset;
    }

    /// spec.md §4.7 "rotation is only permitted if all pages dirtied at LSNs
    /// covered by the about-to-be-overwritten region have been flushed
    /// (checkpoint watermark >= reuse boundary); else commits block."
    pub fn rotate_if_needed(&self, checkpoint_lsn: Lsn) -> Result<(), IdbError> {
        let mut state = self.state.lock().unwrap();
        if state.write_offset + LOG_FILE_HDR_BLOCKS * LOG_BLOCK_SIZE as u64 < state.file_capacity {
            return Ok(());
        }
        let reuse_boundary = state.next_lsn.saturating_sub(state.file_capacity);
        if checkpoint_lsn < reuse_boundary {
            return Err(IdbError::ResourceExhausted(
                "redo log ring exhausted: checkpoint lags behind reuse boundary".into(),
            ));
        }
        flush_partial_block(&mut state)?;
        state.file.sync_data().map_err(|e| IdbError::Io(e.to_string()))?;
        let next_index = (next_rotation_index(&self.dir) + 1) % self.n_files.max(1);
        let path = self.dir.join(format!("ib_logfile{}", next_index));
        state.file = open_or_create_log_file(&path, state.file_capacity)?;
        state.write_offset = 0;
        Ok(())
    }

    pub fn current_lsn(&self) -> Lsn {
        self.state.lock().unwrap().next_lsn
    }

    /// Write a checkpoint file (spec.md §4.7 `checkpoint`), named by its
    /// sequence number so the recovery scan (spec.md §4.10 step 1) can pick
    /// the highest-numbered valid one.
    pub fn write_checkpoint(&self, checkpoints_dir: &Path, seq: u64, checkpoint: &Checkpoint) -> Result<(), IdbError> {
        std::fs::create_dir_all(checkpoints_dir).map_err(|e| IdbError::Io(e.to_string()))?;
        let path = checkpoints_dir.join(format!("checkpoint_{}", seq));
        let json = serde_json::to_vec(checkpoint).map_err(|e| IdbError::Io(e.to_string()))?;
        let mut f = File::create(&path).map_err(|e| IdbError::Io(e.to_string()))?;
        f.write_all(&json).map_err(|e| IdbError::Io(e.to_string()))?;
        f.sync_data().map_err(|e| IdbError::Io(e.to_string()))
    }
}

fn next_rotation_index(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .ok()
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().and_then(|n| n.strip_prefix("ib_logfile")?.parse::<usize>().ok()))
        .max()
        .unwrap_or(0)
}

fn open_or_create_log_file(path: &Path, size: u64) -> Result<File, IdbError> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| IdbError::Io(format!("cannot open {}: {}", path.display(), e)))?;
    file.set_len(size).map_err(|e| IdbError::Io(e.to_string()))?;
    Ok(file)
}

/// Pack `bytes` into the in-progress block, flushing full blocks to disk as
/// they fill (matches [`crate::innodb::log::LogBlockHeader`]'s 12-byte
/// header / [`LOG_BLOCK_CHECKSUM_OFFSET`]-positioned trailer layout).
fn write_into_blocks(state: &mut WalState, bytes: &[u8]) -> Result<(), IdbError> {
    let mut remaining = bytes;
    while !remaining.is_empty() {
        let space_left = BLOCK_PAYLOAD - state.block_buf.len();
        let take = space_left.min(remaining.len());
        state.block_buf.extend_from_slice(&remaining[..take]);
        remaining = &remaining[take..];
        if state.block_buf.len() == BLOCK_PAYLOAD {
            flush_full_block(state)?;
        }
    }
    Ok(())
}

fn flush_full_block(state: &mut WalState) -> Result<(), IdbError> {
    let block = build_block(state, BLOCK_PAYLOAD)?;
    write_block_at_offset(state, &block)?;
    state.block_buf.clear();
    Ok(())
}

/// Flush whatever is currently buffered as a (possibly short) block, for
/// `flush()`/rotation; the block is re-written in place on the next append
/// so a short flush never loses data, it just pads with unused trailing
/// bytes until more data arrives.
fn flush_partial_block(state: &mut WalState) -> Result<(), IdbError> {
    if state.block_buf.is_empty() {
        return Ok(());
    }
    let data_len = state.block_buf.len();
    let block = build_block(state, data_len)?;
    write_block_at_offset(state, &block)?;
    Ok(())
}

fn build_block(state: &WalState, data_len: usize) -> Result<Vec<u8>, IdbError> {
    let mut block = vec![0u8; LOG_BLOCK_SIZE];
    let block_no = state.write_offset / LOG_BLOCK_SIZE as u64;
    BigEndian::write_u32(&mut block[0..], block_no as u32);
    BigEndian::write_u16(&mut block[4..], (LOG_BLOCK_HDR_SIZE + data_len) as u16);
    BigEndian::write_u16(&mut block[6..], LOG_BLOCK_HDR_SIZE as u16);
    BigEndian::write_u32(&mut block[8..], 0);
    block[LOG_BLOCK_HDR_SIZE..LOG_BLOCK_HDR_SIZE + data_len].copy_from_slice(&state.block_buf[..data_len]);
    let crc = crc32c::crc32c(&block[..LOG_BLOCK_CHECKSUM_OFFSET]);
    BigEndian::write_u32(&mut block[LOG_BLOCK_CHECKSUM_OFFSET..], crc);
    Ok(block)
}

fn write_block_at_offset(state: &mut WalState, block: &[u8]) -> Result<(), IdbError> {
    let abs_offset = LOG_FILE_HDR_BLOCKS * LOG_BLOCK_SIZE as u64 + state.write_offset;
    state.file.seek(SeekFrom::Start(abs_offset)).map_err(|e| IdbError::Io(e.to_string()))?;
    state.file.write_all(block).map_err(|e| IdbError::Io(e.to_string()))?;
    if state.block_buf.len() == BLOCK_PAYLOAD {
        state.write_offset += LOG_BLOCK_SIZE as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(lsn_hint: Lsn, body: &[u8]) -> RedoRecord {
        RedoRecord {
            lsn: lsn_hint,
            trx_id: 1,
            record_type: RedoType::Write,
            space_id: 1000,
            page_no: 5,
            offset: 100,
            body: body.to_vec(),
        }
    }

    #[test]
    fn append_assigns_increasing_lsns() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WalWriter::open(dir.path(), 1 << 20, 2, 1).unwrap();
        let lsn1 = wal.append(sample_record(0, b"abc")).unwrap();
        let lsn2 = wal.append(sample_record(0, b"defgh")).unwrap();
        assert!(lsn2 > lsn1);
    }

    #[test]
    fn flush_does_not_error_on_partial_block() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WalWriter::open(dir.path(), 1 << 20, 2, 1).unwrap();
        wal.append(sample_record(0, b"short")).unwrap();
        wal.flush(true).unwrap();
    }

    #[test]
    fn checkpoint_roundtrips_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WalWriter::open(dir.path(), 1 << 20, 2, 1).unwrap();
        let cp = Checkpoint::new(42, vec![1, 2], vec![(1000, 5, 10)], 3, 1);
        wal.write_checkpoint(&dir.path().join("checkpoints"), 0, &cp).unwrap();
        let raw = std::fs::read(dir.path().join("checkpoints").join("checkpoint_0")).unwrap();
        let loaded: Checkpoint = serde_json::from_slice(&raw).unwrap();
        assert!(loaded.is_valid());
        assert_eq!(loaded.checkpoint_lsn, 42);
    }

    #[test]
    fn tampered_checkpoint_fails_validation() {
        let mut cp = Checkpoint::new(1, vec![], vec![], 0, 0);
        cp.checkpoint_lsn = 999;
        assert!(!cp.is_valid());
    }
}
