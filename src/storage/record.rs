//! Record codec (spec.md §4.5): encodes/decodes rows into InnoDB compact
//! record format.
//!
//! Column layout reuses [`crate::innodb::field_decode::ColumnStorageInfo`]
//! (built here via [`ColumnStorageInfo::user_column`] rather than from SDI);
//! the 5-byte record header reuses
//! [`crate::innodb::record::CompactRecordHeader`] for parsing what this
//! module writes.

use byteorder::{BigEndian, ByteOrder};

use crate::innodb::constants::REC_N_NEW_EXTRA_BYTES;
use crate::innodb::field_decode::ColumnStorageInfo;
use crate::innodb::record::{CompactRecordHeader, RecordType};
use crate::IdbError;

/// One column's declared shape, in schema (logical) order.
pub type ColumnDef = ColumnStorageInfo;

/// The column layout for one table or index, in schema order.
#[derive(Debug, Clone)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Schema { columns }
    }

    fn nullable_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_nullable)
            .map(|(i, _)| i)
            .collect()
    }

    fn variable_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_variable)
            .map(|(i, _)| i)
            .collect()
    }
}

/// A decoded row value: `None` for SQL NULL, `Some(bytes)` otherwise. Typed
/// interpretation of the bytes is the caller's job (this module only
/// round-trips physical storage).
pub type Row = Vec<Option<Vec<u8>>>;

/// Encode `row` into its physical record bytes (spec.md §4.5 `encode_row`).
///
/// Layout, back to front: variable-length lengths (reverse column order),
/// NULL bitmap (reverse column order), 5-byte record header, then column
/// payloads in schema order:
/// `[var_lengths_rev][null_bitmap_rev][5-byte header][payloads]`.
///
/// Returns `(bytes, record_origin)`: the prefix varies per row (1 vs. 2
/// byte variable-length encoding, NULLs contributing no length byte at
/// all), so the origin — where [`decode_row`] and [`CompactRecordHeader`]
/// expect to start — is returned alongside the bytes rather than
/// recomputed from the schema alone.
pub fn encode_row(schema: &Schema, row: &Row, heap_no: u16) -> Result<(Vec<u8>, usize), IdbError> {
    if row.len() != schema.columns.len() {
        return Err(IdbError::Argument(format!(
            "row has {} columns, schema declares {}",
            row.len(),
            schema.columns.len()
        )));
    }

    let nullable = schema.nullable_indices();
    let variable = schema.variable_indices();

    // Null bitmap: 1 bit per nullable column, written reverse-order.
    let mut null_bits = vec![false; nullable.len()];
    for (bit_idx, &col_idx) in nullable.iter().enumerate() {
        if row[col_idx].is_none() {
            null_bits[bit_idx] = true;
        } else if schema.columns[col_idx].is_nullable {
            // not null, bit stays false
        }
    }
    let null_bitmap_bytes = nullable.len().div_ceil(8);
    let mut null_bitmap = vec![0u8; null_bitmap_bytes];
    for (bit_idx, is_null) in null_bits.iter().enumerate() {
        if *is_null {
            null_bitmap[bit_idx / 8] |= 1 << (bit_idx % 8);
        }
    }

    // Variable-length field lengths, reverse column order, 1 or 2 bytes each.
    let mut var_len_bytes = Vec::new();
    for &col_idx in variable.iter().rev() {
        if row[col_idx].is_none() {
            continue; // NULL variable columns store no length byte
        }
        let len = row[col_idx].as_ref().unwrap().len();
        if len > 0x3FFF {
            return Err(IdbError::Argument(format!(
                "column '{}' value too large ({} bytes)",
                schema.columns[col_idx].name, len
            )));
        }
        if len <= 127 {
            var_len_bytes.push(len as u8);
        } else {
            var_len_bytes.push(0x80 | ((len >> 8) as u8 & 0x3F));
            var_len_bytes.push((len & 0xFF) as u8);
        }
    }

    // 5-byte record header: info_bits=0, n_owned=0, CONVENTIONAL type, heap_no
    // as allocated, next_record left at 0 (the page/list layer patches it in).
    let mut header = [0u8; REC_N_NEW_EXTRA_BYTES];
    let type_and_heap = (heap_no << 3) | RecordType::Ordinary as u16 & 0x07;
    BigEndian::write_u16(&mut header[1..3], type_and_heap);

    // Column payloads in schema order; fixed-length columns pad to declared length.
    let mut payloads = Vec::new();
    for (col_idx, col) in schema.columns.iter().enumerate() {
        match &row[col_idx] {
            None => {
                if !col.is_variable {
                    payloads.extend(std::iter::repeat_n(0u8, col.fixed_len));
                }
                // variable-length NULLs contribute no payload bytes.
            }
            Some(bytes) => {
                if col.is_variable {
                    payloads.extend_from_slice(bytes);
                } else {
                    if bytes.len() > col.fixed_len {
                        return Err(IdbError::Argument(format!(
                            "column '{}' value {} bytes exceeds fixed length {}",
                            col.name,
                            bytes.len(),
                            col.fixed_len
                        )));
                    }
                    payloads.extend_from_slice(bytes);
                    payloads.extend(std::iter::repeat_n(0u8, col.fixed_len - bytes.len()));
                }
            }
        }
    }

    let mut buf = Vec::with_capacity(var_len_bytes.len() + null_bitmap.len() + header.len() + payloads.len());
    buf.extend_from_slice(&var_len_bytes);
    buf.extend_from_slice(&null_bitmap);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&payloads);
    let record_origin = var_len_bytes.len() + null_bitmap.len() + header.len();
    Ok((buf, record_origin))
}

/// Decode a record previously produced by [`encode_row`].
///
/// `record_bytes` must start at the same offset [`encode_row`]'s output
/// does (i.e. at the start of the variable-length list), and `origin_offset`
/// is the offset of the record origin (the 5-byte header's end) within that
/// slice — exactly what [`CompactRecordHeader::parse`] expects immediately
/// before it.
pub fn decode_row(schema: &Schema, record_bytes: &[u8], origin_offset: usize) -> Result<Row, IdbError> {
    let nullable = schema.nullable_indices();
    let variable = schema.variable_indices();

    let header_start = origin_offset - REC_N_NEW_EXTRA_BYTES;
    CompactRecordHeader::parse(&record_bytes[header_start..])
        .ok_or_else(|| IdbError::Parse("truncated record header".into()))?;

    let null_bitmap_bytes = nullable.len().div_ceil(8);
    if header_start < null_bitmap_bytes {
        return Err(IdbError::Parse("truncated NULL bitmap".into()));
    }
    let null_bitmap_start = header_start - null_bitmap_bytes;
    let mut is_null = vec![false; schema.columns.len()];
    for (bit_idx, &col_idx) in nullable.iter().enumerate() {
        let byte = record_bytes
            .get(null_bitmap_start + bit_idx / 8)
            .ok_or_else(|| IdbError::Parse("NULL bitmap out of range".into()))?;
        is_null[col_idx] = (byte >> (bit_idx % 8)) & 1 != 0;
    }

    // Variable-length lengths were written reverse-column-order ending right
    // before the NULL bitmap; walk backwards from there to recover them in
    // forward column order. NULL variable columns wrote no length byte.
    let mut pos = null_bitmap_start;
    let mut var_lengths = vec![0usize; schema.columns.len()];
    for &col_idx in variable.iter().rev() {
        if is_null[col_idx] {
            continue;
        }
        if pos == 0 {
            return Err(IdbError::Parse("truncated variable-length list".into()));
        }
        pos -= 1;
        let len_byte = record_bytes[pos] as usize;
        let len = if len_byte & 0x80 != 0 {
            if pos == 0 {
                return Err(IdbError::Parse("truncated variable-length list".into()));
            }
            pos -= 1;
            let low = record_bytes[pos] as usize;
            ((len_byte & 0x3F) << 8) | low
        } else {
            len_byte
        };
        var_lengths[col_idx] = len;
    }

    let mut row = Vec::with_capacity(schema.columns.len());
    let mut payload_pos = origin_offset;
    for (col_idx, col) in schema.columns.iter().enumerate() {
        if is_null[col_idx] {
            row.push(None);
            continue;
        }
        let len = if col.is_variable {
            var_lengths[col_idx]
        } else {
            col.fixed_len
        };
        let end = payload_pos + len;
        if end > record_bytes.len() {
            return Err(IdbError::Parse(format!(
                "column '{}' payload out of range",
                col.name
            )));
        }
        row.push(Some(record_bytes[payload_pos..end].to_vec()));
        payload_pos = end;
    }

    Ok(row)
}

/// Total ordering over key tuples (spec.md §4.5 "key compare"). Binary
/// byte-wise comparison per column, `NULL` sorting before any value —
/// matches InnoDB's default behavior for a binary-collation column.
pub fn compare_keys(a: &[Option<Vec<u8>>], b: &[Option<Vec<u8>>]) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    for (av, bv) in a.iter().zip(b.iter()) {
        let ord = match (av, bv) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
