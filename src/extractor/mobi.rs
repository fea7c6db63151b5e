//! MOBI image extraction.
//!
//! A MOBI file is a Palm database: a 78-byte header, a table of record
//! offsets, then the records. Record 0 holds the PalmDOC and MOBI headers; the
//! MOBI header names the first record that stores an image. From there on,
//! records are raw image files interleaved with other resources (fonts, FLIS,
//! FCIS, end-of-file markers), so each record is identified by its magic bytes.
//!
//! Text records are never decompressed; only image-bearing records are read.

use std::fs::{self, File};
use std::io::Cursor;
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::extractor::ArchiveReader;

/// Size of the Palm database header, up to the record count.
const PDB_HEADER_LEN: usize = 78;
/// Size of one entry in the record table.
const RECORD_INFO_LEN: usize = 8;
/// Offset of the type/creator pair inside the Palm database header.
const TYPE_CREATOR_OFFSET: usize = 60;
/// Offset of the record count inside the Palm database header.
const RECORD_COUNT_OFFSET: usize = 76;
/// The MOBI header starts after the 16-byte PalmDOC header in record 0.
const MOBI_HEADER_OFFSET: usize = 16;
/// Offset of "first image index" relative to the start of the MOBI header.
const FIRST_IMAGE_FIELD: usize = 0x5C;

/// Reader for MOBI e-books.
pub struct MobiReader;

impl ArchiveReader for MobiReader {
    fn name(&self) -> &'static str {
        "mobi"
    }

    fn unpack(&self, archive_path: &Path, scratch: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::corrupt(archive_path, "empty file"));
        }
        // SAFETY: the map is read-only and dropped before this function returns
        let data = unsafe { Mmap::map(&file)? };

        let images = image_records(&data).map_err(|reason| Error::corrupt(archive_path, reason))?;
        for (number, extension, bytes) in images {
            let destination = scratch.join(format!("image_{:05}.{}", number, extension));
            fs::write(&destination, bytes)?;
        }
        Ok(())
    }
}

/// Finds image records and returns `(1-based image number, extension, bytes)`.
fn image_records(data: &[u8]) -> std::result::Result<Vec<(usize, &'static str, &[u8])>, String> {
    if data.len() < PDB_HEADER_LEN {
        return Err("file is shorter than a Palm database header".to_string());
    }
    if &data[TYPE_CREATOR_OFFSET..TYPE_CREATOR_OFFSET + 8] != b"BOOKMOBI" {
        return Err("not a MOBI book (missing BOOKMOBI signature)".to_string());
    }

    let record_count = read_u16(data, RECORD_COUNT_OFFSET)? as usize;
    let table_end = PDB_HEADER_LEN + record_count * RECORD_INFO_LEN;
    if record_count == 0 || data.len() < table_end {
        return Err("record table is truncated".to_string());
    }

    let mut offsets = Vec::with_capacity(record_count + 1);
    for index in 0..record_count {
        let offset = read_u32(data, PDB_HEADER_LEN + index * RECORD_INFO_LEN)? as usize;
        if offset > data.len() || offsets.last().is_some_and(|&previous| offset < previous) {
            return Err(format!("record {} has an invalid offset", index));
        }
        offsets.push(offset);
    }
    offsets.push(data.len());

    let record0 = offsets[0];
    if data.get(record0 + MOBI_HEADER_OFFSET..record0 + MOBI_HEADER_OFFSET + 4) != Some(b"MOBI") {
        return Err("record 0 has no MOBI header".to_string());
    }
    let first_image = read_u32(data, record0 + MOBI_HEADER_OFFSET + FIRST_IMAGE_FIELD)?;
    if first_image == u32::MAX || first_image as usize >= record_count {
        log::debug!("MOBI book declares no image records");
        return Ok(Vec::new());
    }
    let first_image = first_image as usize;

    let mut images = Vec::new();
    for index in first_image..record_count {
        let record = &data[offsets[index]..offsets[index + 1]];
        if let Some(extension) = sniff_image(record) {
            images.push((index - first_image + 1, extension, record));
        }
    }
    Ok(images)
}

/// Identifies an image record by its leading bytes.
fn sniff_image(record: &[u8]) -> Option<&'static str> {
    match record {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpg"),
        [0x89, b'P', b'N', b'G', ..] => Some("png"),
        [b'G', b'I', b'F', b'8', ..] => Some("gif"),
        [b'B', b'M', ..] if record.len() > 14 => Some("bmp"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        _ => None,
    }
}

fn read_u16(data: &[u8], offset: usize) -> std::result::Result<u16, String> {
    let mut cursor = Cursor::new(data.get(offset..).unwrap_or_default());
    cursor
        .read_u16::<BigEndian>()
        .map_err(|_| format!("unexpected end of data at offset {}", offset))
}

fn read_u32(data: &[u8], offset: usize) -> std::result::Result<u32, String> {
    let mut cursor = Cursor::new(data.get(offset..).unwrap_or_default());
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| format!("unexpected end of data at offset {}", offset))
}

/// Builds a minimal MOBI file holding the given records after record 0.
#[cfg(test)]
pub(crate) fn build_test_mobi(first_image: u32, records: &[&[u8]]) -> Vec<u8> {
    use byteorder::WriteBytesExt;

    let mut record0 = vec![0u8; MOBI_HEADER_OFFSET];
    record0.extend_from_slice(b"MOBI");
    record0.resize(MOBI_HEADER_OFFSET + FIRST_IMAGE_FIELD, 0);
    record0.write_u32::<BigEndian>(first_image).unwrap();
    record0.resize(record0.len() + 32, 0);

    let mut all_records: Vec<&[u8]> = vec![&record0];
    all_records.extend_from_slice(records);

    let mut data = vec![0u8; TYPE_CREATOR_OFFSET];
    data.extend_from_slice(b"BOOKMOBI");
    data.resize(RECORD_COUNT_OFFSET, 0);
    data.write_u16::<BigEndian>(all_records.len() as u16).unwrap();

    let mut offset = PDB_HEADER_LEN + all_records.len() * RECORD_INFO_LEN + 2;
    for (uid, record) in all_records.iter().enumerate() {
        data.write_u32::<BigEndian>(offset as u32).unwrap();
        data.write_u32::<BigEndian>(uid as u32).unwrap();
        offset += record.len();
    }
    data.extend_from_slice(&[0, 0]);
    for record in all_records {
        data.extend_from_slice(record);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3];
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn finds_images_and_skips_other_records() {
        let text: &[u8] = b"some compressed text";
        let data = build_test_mobi(2, &[text, JPEG, b"FLIS\0\0\0\x08", PNG, b"\xe9\x8e\r\n"]);

        let images = image_records(&data).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0], (1, "jpg", JPEG));
        assert_eq!(images[1], (3, "png", PNG));
    }

    #[test]
    fn no_image_index_means_no_images() {
        let data = build_test_mobi(u32::MAX, &[b"text only"]);
        assert!(image_records(&data).unwrap().is_empty());
    }

    #[test]
    fn rejects_other_palm_databases() {
        let mut data = build_test_mobi(1, &[JPEG]);
        data[TYPE_CREATOR_OFFSET..TYPE_CREATOR_OFFSET + 8].copy_from_slice(b"TEXtREAd");
        assert!(image_records(&data).is_err());
    }

    #[test]
    fn rejects_truncated_tables() {
        let data = build_test_mobi(1, &[JPEG]);
        assert!(image_records(&data[..PDB_HEADER_LEN + 4]).is_err());
    }

    #[test]
    fn unpack_writes_numbered_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let book = dir.path().join("book.mobi");
        fs::write(&book, build_test_mobi(1, &[JPEG, PNG]))?;
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&scratch)?;

        MobiReader.unpack(&book, &scratch)?;
        assert_eq!(fs::read(scratch.join("image_00001.jpg"))?, JPEG);
        assert_eq!(fs::read(scratch.join("image_00002.png"))?, PNG);
        Ok(())
    }
}
