//! Write utilities for InnoDB page-level operations.
//!
//! Provides reusable functions for creating backups, reading/writing individual
//! pages, constructing valid FSP_HDR pages, detecting checksum algorithms, and
//! fixing page checksums. These are the building blocks for the `repair`,
//! `defrag`, `transplant`, and `recover --rebuild` subcommands.
//!
//! This module is not available on WASM targets since file I/O is not supported.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};

use crate::innodb::checksum::{
    recalculate_checksum, validate_checksum, ChecksumAlgorithm,
};
use crate::innodb::constants::*;
use crate::innodb::vendor::VendorInfo;
use crate::IdbError;

/// Create a backup of a file by copying it to `<path>.bak`.
///
/// If `<path>.bak` already exists, tries `.bak.1`, `.bak.2`, etc.
/// Returns the path of the created backup file.
pub fn create_backup(path: &str) -> Result<PathBuf, IdbError> {
    let src = Path::new(path);
    if !src.exists() {
        return Err(IdbError::Io(format!("File not found: {}", path)));
    }

    let mut backup_path = PathBuf::from(format!("{}.bak", path));
    let mut counter = 1u32;
    while backup_path.exists() {
        backup_path = PathBuf::from(format!("{}.bak.{}", path, counter));
        counter += 1;
        if counter > 999 {
            return Err(IdbError::Io(format!(
                "Too many backup files for {}",
                path
            )));
        }
    }

    fs::copy(src, &backup_path)
        .map_err(|e| IdbError::Io(format!("Cannot create backup {}: {}", backup_path.display(), e)))?;

    Ok(backup_path)
}

/// Read a single page from a tablespace file.
///
/// Returns a `Vec<u8>` of exactly `page_size` bytes.
pub fn read_page_raw(path: &str, page_num: u64, page_size: u32) -> Result<Vec<u8>, IdbError> {
    let offset = page_num * page_size as u64;
    let mut f = File::open(path)
        .map_err(|e| IdbError::Io(format!("Cannot open {}: {}", path, e)))?;
    f.seek(SeekFrom::Start(offset))
        .map_err(|e| IdbError::Io(format!("Cannot seek to offset {}: {}", offset, e)))?;
    let mut buf = vec![0u8; page_size as usize];
    f.read_exact(&mut buf)
        .map_err(|e| IdbError::Io(format!("Cannot read page {}: {}", page_num, e)))?;
    Ok(buf)
}

/// Write a single page to a tablespace file at the correct offset.
///
/// The `data` slice must be exactly `page_size` bytes.
pub fn write_page(path: &str, page_num: u64, page_size: u32, data: &[u8]) -> Result<(), IdbError> {
    if data.len() != page_size as usize {
        return Err(IdbError::Argument(format!(
            "Page data is {} bytes, expected {}",
            data.len(),
            page_size
        )));
    }
    let offset = page_num * page_size as u64;
    let mut f = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| IdbError::Io(format!("Cannot open {} for writing: {}", path, e)))?;
    f.seek(SeekFrom::Start(offset))
        .map_err(|e| IdbError::Io(format!("Cannot seek to offset {}: {}", offset, e)))?;
    f.write_all(data)
        .map_err(|e| IdbError::Io(format!("Cannot write page {}: {}", page_num, e)))?;
    Ok(())
}

/// Write all pages sequentially to a new file.
///
/// Creates (or truncates) the file at `path` and writes each page in order.
pub fn write_tablespace(path: &str, pages: &[Vec<u8>]) -> Result<(), IdbError> {
    let mut f = File::create(path)
        .map_err(|e| IdbError::Io(format!("Cannot create {}: {}", path, e)))?;
    for (i, page) in pages.iter().enumerate() {
        f.write_all(page)
            .map_err(|e| IdbError::Io(format!("Cannot write page {}: {}", i, e)))?;
    }
    f.flush()
        .map_err(|e| IdbError::Io(format!("Cannot flush {}: {}", path, e)))?;
    Ok(())
}

/// Build a minimal valid FSP_HDR page (page 0) with correct FIL header,
/// FSP header fields, FIL trailer, and checksum.
pub fn build_fsp_page(
    space_id: u32,
    total_pages: u32,
    flags: u32,
    lsn: u64,
    page_size: u32,
    algorithm: ChecksumAlgorithm,
) -> Vec<u8> {
    let ps = page_size as usize;
    let mut page = vec![0u8; ps];

    // FIL header
    BigEndian::write_u32(&mut page[FIL_PAGE_OFFSET..], 0); // page 0
    BigEndian::write_u32(&mut page[FIL_PAGE_PREV..], FIL_NULL);
    BigEndian::write_u32(&mut page[FIL_PAGE_NEXT..], FIL_NULL);
    BigEndian::write_u64(&mut page[FIL_PAGE_LSN..], lsn);
    BigEndian::write_u16(&mut page[FIL_PAGE_TYPE..], 8); // FSP_HDR
    BigEndian::write_u64(&mut page[FIL_PAGE_FILE_FLUSH_LSN..], lsn);
    BigEndian::write_u32(&mut page[FIL_PAGE_SPACE_ID..], space_id);

    // FSP header at FIL_PAGE_DATA (offset 38)
    let fsp = FIL_PAGE_DATA;
    BigEndian::write_u32(&mut page[fsp + FSP_SPACE_ID..], space_id);
    BigEndian::write_u32(&mut page[fsp + FSP_SIZE..], total_pages);
    BigEndian::write_u32(&mut page[fsp + FSP_FREE_LIMIT..], total_pages);
    BigEndian::write_u32(&mut page[fsp + FSP_SPACE_FLAGS..], flags);

    // FIL trailer: low 32 bits of LSN
    let trailer = ps - SIZE_FIL_TRAILER;
    BigEndian::write_u32(&mut page[trailer + 4..], (lsn & 0xFFFFFFFF) as u32);

    // Calculate and write checksum
    recalculate_checksum(&mut page, page_size, algorithm);

    page
}

/// Detect the checksum algorithm in use for a page.
///
/// Mirrors the logic of `validate_checksum()` but returns the detected
/// algorithm instead of a full validation result. Returns `None` for
/// empty/zero pages and `BUF_NO_CHECKSUM_MAGIC` pages.
pub fn detect_algorithm(
    page_data: &[u8],
    page_size: u32,
    vendor_info: Option<&VendorInfo>,
) -> ChecksumAlgorithm {
    let result = validate_checksum(page_data, page_size, vendor_info);
    result.algorithm
}

/// Fix the checksum and trailer LSN consistency for a page.
///
/// 1. Ensures the trailer LSN low-32 matches the header LSN low-32.
/// 2. Recalculates the checksum using the given algorithm.
///
/// Returns `(old_checksum, new_checksum)`.
pub fn fix_page_checksum(
    page_data: &mut [u8],
    page_size: u32,
    algorithm: ChecksumAlgorithm,
) -> (u32, u32) {
    let ps = page_size as usize;
    if page_data.len() < ps {
        return (0, 0);
    }

    // Read old checksum
    let old_checksum = match algorithm {
        ChecksumAlgorithm::MariaDbFullCrc32 => {
            BigEndian::read_u32(&page_data[ps - 4..])
        }
        _ => BigEndian::read_u32(&page_data[FIL_PAGE_SPACE_OR_CHKSUM..]),
    };

    // Fix trailer LSN consistency: low 32 bits of header LSN â†’ trailer
    let header_lsn = BigEndian::read_u64(&page_data[FIL_PAGE_LSN..]);
    let trailer_offset = ps - SIZE_FIL_TRAILER;
    BigEndian::write_u32(
        &mut page_data[trailer_offset + 4..],
        (header_lsn & 0xFFFFFFFF) as u32,
    );

    // Recalculate checksum
    recalculate_checksum(page_data, page_size, algorithm);

    // Read new checksum
    let new_checksum = match algorithm {
        ChecksumAlgorithm::MariaDbFullCrc32 => {
            BigEndian::read_u32(&page_data[ps - 4..])
        }
        _ => BigEndian::read_u32(&page_data[FIL_PAGE_SPACE_OR_CHKSUM..]),
    };

    (old_checksum, new_checksum)
}
