//! Streaming ZIP reader - reads an archive's central directory and entry payloads
//!
//! Only the central directory is held in memory. Entry data is read on demand,
//! either fully or through a decompressing `Read`.

use crate::error::{DirZipError, Result};
use crate::writer::METHOD_DEFLATE;
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// ZIP local file header signature
const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP central directory signature
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// ZIP64 end of central directory record signature
const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;

/// EOCD is 22 bytes plus a comment of at most 65535 bytes
const EOCD_SEARCH_WINDOW: u64 = 65557;

const METHOD_STORED: u16 = 0;

/// Entry in the ZIP central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub offset: u64,
}

impl ZipEntry {
    /// Directory entries end with a slash
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Streaming ZIP archive reader
pub struct StreamingZipReader {
    file: BufReader<File>,
    entries: Vec<ZipEntry>,
}

impl StreamingZipReader {
    /// Open a ZIP file and read its central directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let entries = read_central_directory(&mut file)?;
        Ok(StreamingZipReader { file, entries })
    }

    /// Get list of all entries in the ZIP
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Read an entry's decompressed data into a vector
    pub fn read_entry(&mut self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.uncompressed_size.min(1 << 24) as usize);
        self.read_entry_streaming(entry)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Read an entry by name
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| DirZipError::EntryNotFound(name.to_string()))?
            .clone();

        self.read_entry(&entry)
    }

    /// Get a reader that decompresses an entry on-the-fly
    pub fn read_entry_streaming(&mut self, entry: &ZipEntry) -> Result<Box<dyn Read + '_>> {
        if entry.compression_method != METHOD_DEFLATE && entry.compression_method != METHOD_STORED
        {
            return Err(DirZipError::UnsupportedCompression(entry.compression_method));
        }

        self.seek_to_data(entry)?;
        let limited_reader = (&mut self.file).take(entry.compressed_size);

        if entry.compression_method == METHOD_DEFLATE {
            Ok(Box::new(DeflateDecoder::new(limited_reader)))
        } else {
            Ok(Box::new(limited_reader))
        }
    }

    /// Position the file at the first byte of the entry's payload
    fn seek_to_data(&mut self, entry: &ZipEntry) -> Result<()> {
        self.file.seek(SeekFrom::Start(entry.offset))?;

        let signature = read_u32_le(&mut self.file)?;
        if signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(DirZipError::InvalidFormat(
                "Invalid local file header signature".to_string(),
            ));
        }

        // version, flags, method, time, date, crc, sizes
        self.file.seek(SeekFrom::Current(22))?;

        let filename_len = read_u16_le(&mut self.file)? as i64;
        let extra_len = read_u16_le(&mut self.file)? as i64;
        self.file
            .seek(SeekFrom::Current(filename_len + extra_len))?;
        Ok(())
    }
}

/// Read the central directory from the ZIP file
fn read_central_directory<R: Read + Seek>(file: &mut R) -> Result<Vec<ZipEntry>> {
    let eocd_offset = find_eocd(file)?;
    file.seek(SeekFrom::Start(eocd_offset))?;

    let signature = read_u32_le(file)?;
    if signature != END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(DirZipError::InvalidFormat(format!(
            "Invalid end of central directory signature: 0x{:08x}",
            signature
        )));
    }

    // disk number fields, entries on this disk
    file.seek(SeekFrom::Current(6))?;

    // These may be 0xFFFF/0xFFFFFFFF placeholders when ZIP64 is used
    let total_entries_16 = read_u16_le(file)?;
    let cd_size_32 = read_u32_le(file)?;
    let cd_offset_32 = read_u32_le(file)?;

    let (total_entries, cd_offset) =
        if total_entries_16 == 0xFFFF || cd_size_32 == 0xFFFFFFFF || cd_offset_32 == 0xFFFFFFFF {
            read_zip64_eocd(file, eocd_offset)?
        } else {
            (total_entries_16 as u64, cd_offset_32 as u64)
        };

    file.seek(SeekFrom::Start(cd_offset))?;

    let mut entries = Vec::with_capacity(total_entries.min(u16::MAX as u64) as usize);
    for _ in 0..total_entries {
        let signature = read_u32_le(file)?;
        if signature != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(DirZipError::InvalidFormat(format!(
                "Invalid central directory signature: 0x{:08x}",
                signature
            )));
        }

        // version made by, version needed, flags
        file.seek(SeekFrom::Current(6))?;

        let compression_method = read_u16_le(file)?;
        let last_mod_time = read_u16_le(file)?;
        let last_mod_date = read_u16_le(file)?;
        let crc32 = read_u32_le(file)?;
        let compressed_size_32 = read_u32_le(file)?;
        let uncompressed_size_32 = read_u32_le(file)?;
        let filename_len = read_u16_le(file)? as usize;
        let extra_len = read_u16_le(file)? as usize;
        let comment_len = read_u16_le(file)? as usize;

        // disk number, internal attributes, external attributes
        file.seek(SeekFrom::Current(8))?;

        let offset_32 = read_u32_le(file)?;

        let mut filename_buf = vec![0u8; filename_len];
        file.read_exact(&mut filename_buf)?;
        let name = String::from_utf8_lossy(&filename_buf).to_string();

        let mut extra_buf = vec![0u8; extra_len];
        file.read_exact(&mut extra_buf)?;

        let mut compressed_size = compressed_size_32 as u64;
        let mut uncompressed_size = uncompressed_size_32 as u64;
        let mut offset = offset_32 as u64;

        if let Some(zip64) = find_extra_field(&extra_buf, 0x0001) {
            // Values appear only for the fields that hold placeholders, in this order
            let mut values = zip64
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]));
            if uncompressed_size_32 == 0xFFFFFFFF {
                uncompressed_size = values.next().unwrap_or(uncompressed_size);
            }
            if compressed_size_32 == 0xFFFFFFFF {
                compressed_size = values.next().unwrap_or(compressed_size);
            }
            if offset_32 == 0xFFFFFFFF {
                offset = values.next().unwrap_or(offset);
            }
        }

        file.seek(SeekFrom::Current(comment_len as i64))?;

        entries.push(ZipEntry {
            name,
            compressed_size,
            uncompressed_size,
            compression_method,
            crc32,
            last_mod_time,
            last_mod_date,
            offset,
        });
    }

    Ok(entries)
}

/// Locate an extra field by header id and return its data
fn find_extra_field(extra: &[u8], id: u16) -> Option<&[u8]> {
    let mut i = 0usize;
    while i + 4 <= extra.len() {
        let field_id = u16::from_le_bytes([extra[i], extra[i + 1]]);
        let data_len = u16::from_le_bytes([extra[i + 2], extra[i + 3]]) as usize;
        i += 4;
        if i + data_len > extra.len() {
            return None;
        }
        if field_id == id {
            return Some(&extra[i..i + data_len]);
        }
        i += data_len;
    }
    None
}

/// Read the ZIP64 EOCD locator and record preceding the classic EOCD.
///
/// Returns `(total_entries, central_directory_offset)`.
fn read_zip64_eocd<R: Read + Seek>(file: &mut R, eocd_offset: u64) -> Result<(u64, u64)> {
    let search_start = eocd_offset.saturating_sub(EOCD_SEARCH_WINDOW);
    file.seek(SeekFrom::Start(search_start))?;
    let mut buffer = vec![0u8; (eocd_offset - search_start) as usize];
    file.read_exact(&mut buffer)?;

    let locator_pos = rfind_signature(&buffer, [0x50, 0x4b, 0x06, 0x07])
        .ok_or_else(|| DirZipError::InvalidFormat("ZIP64 EOCD locator not found".to_string()))?;

    // signature(4), disk with ZIP64 EOCD(4), relative offset of ZIP64 EOCD(8), total disks(4)
    if locator_pos + 16 > buffer.len() {
        return Err(DirZipError::InvalidFormat(
            "Truncated ZIP64 EOCD locator".to_string(),
        ));
    }
    let mut offset_bytes = [0u8; 8];
    offset_bytes.copy_from_slice(&buffer[locator_pos + 8..locator_pos + 16]);
    let zip64_eocd_offset = u64::from_le_bytes(offset_bytes);

    file.seek(SeekFrom::Start(zip64_eocd_offset))?;

    let sig = read_u32_le(file)?;
    if sig != ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(DirZipError::InvalidFormat(format!(
            "Invalid ZIP64 EOCD signature: 0x{:08x}",
            sig
        )));
    }

    // record size(8), version made by(2), version needed(2), disk number(4),
    // disk with central dir(4), entries on this disk(8)
    file.seek(SeekFrom::Current(28))?;

    let total_entries = read_u64_le(file)?;
    let _cd_size = read_u64_le(file)?;
    let cd_offset = read_u64_le(file)?;

    Ok((total_entries, cd_offset))
}

/// Find the end of central directory record by scanning from the end of the file
fn find_eocd<R: Read + Seek>(file: &mut R) -> Result<u64> {
    let file_size = file.seek(SeekFrom::End(0))?;

    let search_start = file_size.saturating_sub(EOCD_SEARCH_WINDOW);
    file.seek(SeekFrom::Start(search_start))?;

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    rfind_signature(&buffer, [0x50, 0x4b, 0x05, 0x06])
        .map(|i| search_start + i as u64)
        .ok_or_else(|| DirZipError::InvalidFormat("End of central directory not found".to_string()))
}

fn rfind_signature(buffer: &[u8], signature: [u8; 4]) -> Option<usize> {
    buffer.windows(4).rposition(|w| w == signature)
}

fn read_u16_le<R: Read>(file: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    file.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(file: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read>(file: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::StreamingZipWriter;
    use std::io::Cursor;

    #[test]
    fn central_directory_lists_written_entries() {
        let mut writer = StreamingZipWriter::from_writer(Cursor::new(Vec::new())).unwrap();
        writer.start_entry("a.txt").unwrap();
        writer.write_data(b"hello").unwrap();
        writer.start_entry("sub/b.txt").unwrap();
        writer.write_data(b"world").unwrap();
        let mut cursor = writer.finish().unwrap();

        let entries = read_central_directory(&mut cursor).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "sub/b.txt"]);
        assert_eq!(entries[0].crc32, crc32fast::hash(b"hello"));
        assert_eq!(entries[1].uncompressed_size, 5);
        assert!(entries.iter().all(|e| e.compression_method == METHOD_DEFLATE));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        assert!(matches!(
            read_central_directory(&mut cursor),
            Err(DirZipError::InvalidFormat(_))
        ));
    }

    #[test]
    fn extra_field_lookup_skips_other_ids() {
        let extra = [
            0x55, 0x54, 0x01, 0x00, 0xAA, // extended timestamp, 1 byte
            0x01, 0x00, 0x08, 0x00, 1, 2, 3, 4, 5, 6, 7, 8, // ZIP64
        ];
        assert_eq!(
            find_extra_field(&extra, 0x0001),
            Some(&[1u8, 2, 3, 4, 5, 6, 7, 8][..])
        );
        assert_eq!(find_extra_field(&extra, 0x7875), None);
    }
}
