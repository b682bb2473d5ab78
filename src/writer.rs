//! Streaming ZIP writer that compresses data on-the-fly without temp files
//!
//! Every entry is DEFLATE-compressed into a bounded buffer that is flushed to
//! the output once it grows past a threshold, so memory use stays flat no
//! matter how large the entries are. Sizes and CRCs are written in a data
//! descriptor after each entry, which means the output never has to seek back.
//!
//! Works with any `Write + Seek` sink (File, `Cursor<Vec<u8>>`, ...).

use crate::error::{DirZipError, Result};
use chrono::{DateTime, Datelike, Local, Timelike};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;

/// ZIP compression method id for DEFLATE
pub const METHOD_DEFLATE: u16 = 8;

/// Default DEFLATE level
const COMPRESSION_LEVEL: u32 = 6;

/// General purpose flag: sizes and CRC follow the data in a descriptor
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// General purpose flag: file name is UTF-8
const FLAG_UTF8: u16 = 1 << 11;

const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;

/// "Made by" host byte for Unix, so external attributes carry permission bits
const HOST_UNIX: u16 = 3 << 8;

/// Chunk size used when streaming a reader into an entry
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Compressed bytes are kept in memory until this many have accumulated
const FLUSH_THRESHOLD: usize = 1024 * 1024;

/// Header id of the ZIP64 extended information extra field
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Files at least this large get ZIP64 sizes reserved in their local header.
/// Kept below 4 GiB so incompressible data that grows under deflate still fits.
pub const LARGE_FILE_THRESHOLD: u64 = 0xF000_0000;

/// Modification timestamp in MS-DOS format, as stored in ZIP headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest DOS timestamp
    pub const MIN: DosDateTime = DosDateTime {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// Build a timestamp from calendar fields.
    ///
    /// Returns `None` outside the representable range (1980..=2107).
    pub fn from_parts(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Option<Self> {
        if !(1980..=2107).contains(&year)
            || !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }
        Some(Self {
            date: ((year - 1980) << 9) | ((month as u16) << 5) | day as u16,
            time: ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2),
        })
    }

    /// Convert a filesystem timestamp using the local time zone.
    ///
    /// Times that cannot be represented clamp to [`DosDateTime::MIN`].
    pub fn from_system_time(time: SystemTime) -> Self {
        let local: DateTime<Local> = time.into();
        Self::from_parts(
            local.year().clamp(0, u16::MAX as i32) as u16,
            local.month() as u8,
            local.day() as u8,
            local.hour() as u8,
            local.minute() as u8,
            local.second().min(59) as u8,
        )
        .unwrap_or(Self::MIN)
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::MIN
    }
}

/// Per-entry metadata recorded in the local and central headers
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryOptions {
    /// Last modification time
    pub modified: DosDateTime,
    /// Unix permission bits (e.g. `0o644`), stored in the external attributes
    pub unix_mode: Option<u32>,
    /// Reserve ZIP64 sizes in the local header and write 64-bit sizes in the
    /// data descriptor. Required for entries of 4 GiB or more.
    pub large_file: bool,
}

impl EntryOptions {
    /// Take modification time and permissions from filesystem metadata
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .map(DosDateTime::from_system_time)
            .unwrap_or_default();

        #[cfg(unix)]
        let unix_mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };
        #[cfg(not(unix))]
        let unix_mode = None;

        Self {
            modified,
            unix_mode,
            large_file: metadata.len() >= LARGE_FILE_THRESHOLD,
        }
    }
}

/// Entry already written, kept for the central directory
struct ZipEntry {
    name: String,
    flags: u16,
    modified: DosDateTime,
    unix_mode: Option<u32>,
    large_file: bool,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
}

impl ZipEntry {
    fn needs_zip64(&self) -> bool {
        self.uncompressed_size > u32::MAX as u64
            || self.compressed_size > u32::MAX as u64
            || self.local_header_offset > u32::MAX as u64
    }
}

/// Streaming ZIP writer that compresses data on-the-fly
pub struct StreamingZipWriter<W: Write + Seek> {
    output: W,
    entries: Vec<ZipEntry>,
    current_entry: Option<CurrentEntry>,
}

struct CurrentEntry {
    name: String,
    flags: u16,
    options: EntryOptions,
    local_header_offset: u64,
    encoder: DeflateEncoder<CompressedBuffer>,
    counter: CrcCounter,
}

/// Metadata tracker for CRC and byte counts
struct CrcCounter {
    crc: Crc32,
    uncompressed_count: u64,
    compressed_count: u64,
}

impl CrcCounter {
    fn new() -> Self {
        Self {
            crc: Crc32::new(),
            uncompressed_count: 0,
            compressed_count: 0,
        }
    }

    fn update_uncompressed(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.uncompressed_count += data.len() as u64;
    }

    fn add_compressed(&mut self, count: u64) {
        self.compressed_count += count;
    }

    fn finalize(&self) -> u32 {
        self.crc.clone().finalize()
    }
}

/// In-memory sink for the encoder's output, drained into the archive in chunks
struct CompressedBuffer {
    buffer: Vec<u8>,
}

impl CompressedBuffer {
    fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= FLUSH_THRESHOLD
    }
}

impl Write for CompressedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StreamingZipWriter<File> {
    /// Create (or truncate) a ZIP file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let output = File::create(path)?;
        Self::from_writer(output)
    }
}

impl<W: Write + Seek> StreamingZipWriter<W> {
    /// Create a new ZIP writer from an arbitrary writer
    pub fn from_writer(writer: W) -> Result<Self> {
        Ok(Self {
            output: writer,
            entries: Vec::new(),
            current_entry: None,
        })
    }

    /// Number of entries started so far
    pub fn entry_count(&self) -> usize {
        self.entries.len() + usize::from(self.current_entry.is_some())
    }

    /// Start a new entry (file) in the ZIP with default metadata
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.start_entry_with_options(name, EntryOptions::default())
    }

    /// Start a new entry with a modification time and optional permissions
    ///
    /// The previous entry, if any, is finished first.
    pub fn start_entry_with_options(&mut self, name: &str, options: EntryOptions) -> Result<()> {
        self.finish_current_entry()?;

        if name.len() > u16::MAX as usize {
            return Err(DirZipError::InvalidFormat(format!(
                "entry name is too long ({} bytes)",
                name.len()
            )));
        }

        let local_header_offset = self.output.stream_position()?;
        let flags = if name.is_ascii() {
            FLAG_DATA_DESCRIPTOR
        } else {
            FLAG_DATA_DESCRIPTOR | FLAG_UTF8
        };

        // ZIP64 extra with zeroed sizes; the real ones go in the data descriptor
        let mut extra_field: Vec<u8> = Vec::new();
        if options.large_file {
            extra_field.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
            extra_field.extend_from_slice(&16u16.to_le_bytes());
            extra_field.extend_from_slice(&0u64.to_le_bytes()); // uncompressed
            extra_field.extend_from_slice(&0u64.to_le_bytes()); // compressed
        }
        let (version, size_marker) = if options.large_file {
            (VERSION_ZIP64, u32::MAX)
        } else {
            (VERSION_DEFAULT, 0)
        };

        // Local file header; CRC and sizes come later in the data descriptor
        self.output.write_all(&[0x50, 0x4b, 0x03, 0x04])?; // signature
        self.output.write_all(&version.to_le_bytes())?; // version needed
        self.output.write_all(&flags.to_le_bytes())?;
        self.output.write_all(&METHOD_DEFLATE.to_le_bytes())?;
        self.output.write_all(&options.modified.time.to_le_bytes())?;
        self.output.write_all(&options.modified.date.to_le_bytes())?;
        self.output.write_all(&0u32.to_le_bytes())?; // crc32 placeholder
        self.output.write_all(&size_marker.to_le_bytes())?; // compressed size
        self.output.write_all(&size_marker.to_le_bytes())?; // uncompressed size
        self.output.write_all(&(name.len() as u16).to_le_bytes())?;
        self.output
            .write_all(&(extra_field.len() as u16).to_le_bytes())?;
        self.output.write_all(name.as_bytes())?;
        self.output.write_all(&extra_field)?;

        self.current_entry = Some(CurrentEntry {
            name: name.to_string(),
            flags,
            options,
            local_header_offset,
            encoder: DeflateEncoder::new(
                CompressedBuffer::new(),
                Compression::new(COMPRESSION_LEVEL),
            ),
            counter: CrcCounter::new(),
        });

        Ok(())
    }

    /// Write uncompressed data to current entry (compressed on-the-fly)
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current_entry
            .as_mut()
            .ok_or_else(|| DirZipError::InvalidFormat("No entry started".to_string()))?;

        entry.counter.update_uncompressed(data);
        entry.encoder.write_all(data)?;

        let buffer = entry.encoder.get_mut();
        if buffer.should_flush() {
            let compressed_data = buffer.take();
            self.output.write_all(&compressed_data)?;
            entry.counter.add_compressed(compressed_data.len() as u64);
        }

        Ok(())
    }

    /// Stream everything from `reader` into the current entry.
    ///
    /// Returns the number of uncompressed bytes copied.
    pub fn write_from_reader<R: Read>(&mut self, reader: &mut R) -> Result<u64> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.write_data(&buf[..n])?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Finish current entry and write data descriptor
    fn finish_current_entry(&mut self) -> Result<()> {
        if let Some(mut entry) = self.current_entry.take() {
            let mut buffer = entry.encoder.finish()?;

            let remaining_data = buffer.take();
            if !remaining_data.is_empty() {
                self.output.write_all(&remaining_data)?;
                entry.counter.add_compressed(remaining_data.len() as u64);
            }

            let crc = entry.counter.finalize();
            let compressed_size = entry.counter.compressed_count;
            let uncompressed_size = entry.counter.uncompressed_count;

            // Descriptor size width must agree with the local header
            let overflow =
                compressed_size >= u32::MAX as u64 || uncompressed_size >= u32::MAX as u64;
            if overflow && !entry.options.large_file {
                return Err(DirZipError::InvalidFormat(format!(
                    "entry '{}' reached 4 GiB without ZIP64 sizes reserved",
                    entry.name
                )));
            }

            self.output.write_all(&[0x50, 0x4b, 0x07, 0x08])?;
            self.output.write_all(&crc.to_le_bytes())?;
            if entry.options.large_file {
                self.output.write_all(&compressed_size.to_le_bytes())?;
                self.output.write_all(&uncompressed_size.to_le_bytes())?;
            } else {
                self.output
                    .write_all(&(compressed_size as u32).to_le_bytes())?;
                self.output
                    .write_all(&(uncompressed_size as u32).to_le_bytes())?;
            }

            self.entries.push(ZipEntry {
                name: entry.name,
                flags: entry.flags,
                modified: entry.options.modified,
                unix_mode: entry.options.unix_mode,
                large_file: entry.options.large_file,
                local_header_offset: entry.local_header_offset,
                crc32: crc,
                compressed_size,
                uncompressed_size,
            });
        }
        Ok(())
    }

    /// Finish ZIP file (write central directory and return the writer)
    pub fn finish(mut self) -> Result<W> {
        self.finish_current_entry()?;

        let central_dir_offset = self.output.stream_position()?;

        for entry in &self.entries {
            let zip64 = entry.needs_zip64();
            let version = if zip64 || entry.large_file {
                VERSION_ZIP64
            } else {
                VERSION_DEFAULT
            };
            let made_by = if entry.unix_mode.is_some() {
                HOST_UNIX | version
            } else {
                version
            };

            self.output.write_all(&[0x50, 0x4b, 0x01, 0x02])?; // central dir sig
            self.output.write_all(&made_by.to_le_bytes())?;
            self.output.write_all(&version.to_le_bytes())?; // version needed
            self.output.write_all(&entry.flags.to_le_bytes())?;
            self.output.write_all(&METHOD_DEFLATE.to_le_bytes())?;
            self.output.write_all(&entry.modified.time.to_le_bytes())?;
            self.output.write_all(&entry.modified.date.to_le_bytes())?;
            self.output.write_all(&entry.crc32.to_le_bytes())?;
            self.output
                .write_all(&clamp_u32(entry.compressed_size).to_le_bytes())?;
            self.output
                .write_all(&clamp_u32(entry.uncompressed_size).to_le_bytes())?;
            self.output
                .write_all(&(entry.name.len() as u16).to_le_bytes())?;

            // ZIP64 extended information (0x0001), only the overflowing fields, in spec order
            let mut extra_field: Vec<u8> = Vec::new();
            if zip64 {
                let mut data: Vec<u8> = Vec::new();
                if entry.uncompressed_size > u32::MAX as u64 {
                    data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
                }
                if entry.compressed_size > u32::MAX as u64 {
                    data.extend_from_slice(&entry.compressed_size.to_le_bytes());
                }
                if entry.local_header_offset > u32::MAX as u64 {
                    data.extend_from_slice(&entry.local_header_offset.to_le_bytes());
                }
                extra_field.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
                extra_field.extend_from_slice(&(data.len() as u16).to_le_bytes());
                extra_field.extend_from_slice(&data);
            }

            let external_attrs = entry.unix_mode.map(|mode| mode << 16).unwrap_or(0);

            self.output
                .write_all(&(extra_field.len() as u16).to_le_bytes())?;
            self.output.write_all(&0u16.to_le_bytes())?; // file comment len
            self.output.write_all(&0u16.to_le_bytes())?; // disk number start
            self.output.write_all(&0u16.to_le_bytes())?; // internal attrs
            self.output.write_all(&external_attrs.to_le_bytes())?;
            self.output
                .write_all(&clamp_u32(entry.local_header_offset).to_le_bytes())?;
            self.output.write_all(entry.name.as_bytes())?;
            self.output.write_all(&extra_field)?;
        }

        let central_dir_size = self.output.stream_position()? - central_dir_offset;

        let need_zip64 = self.entries.len() >= u16::MAX as usize
            || central_dir_size > u32::MAX as u64
            || central_dir_offset > u32::MAX as u64;

        if need_zip64 {
            let zip64_eocd_pos = self.output.stream_position()?;

            // ZIP64 end of central directory record
            self.output.write_all(&[0x50, 0x4b, 0x06, 0x06])?;
            // size of the remaining fixed fields
            self.output.write_all(&44u64.to_le_bytes())?;
            self.output.write_all(&VERSION_ZIP64.to_le_bytes())?; // version made by
            self.output.write_all(&VERSION_ZIP64.to_le_bytes())?; // version needed
            self.output.write_all(&0u32.to_le_bytes())?; // disk number
            self.output.write_all(&0u32.to_le_bytes())?; // disk with central dir
            self.output
                .write_all(&(self.entries.len() as u64).to_le_bytes())?;
            self.output
                .write_all(&(self.entries.len() as u64).to_le_bytes())?;
            self.output.write_all(&central_dir_size.to_le_bytes())?;
            self.output.write_all(&central_dir_offset.to_le_bytes())?;

            // ZIP64 end of central directory locator
            self.output.write_all(&[0x50, 0x4b, 0x06, 0x07])?;
            self.output.write_all(&0u32.to_le_bytes())?; // disk with ZIP64 EOCD
            self.output.write_all(&zip64_eocd_pos.to_le_bytes())?;
            self.output.write_all(&1u32.to_le_bytes())?; // total number of disks
        }

        // End of central directory (classic)
        self.output.write_all(&[0x50, 0x4b, 0x05, 0x06])?;
        self.output.write_all(&0u16.to_le_bytes())?; // disk number
        self.output.write_all(&0u16.to_le_bytes())?; // disk with central dir

        let entry_count = if need_zip64 {
            0xFFFF
        } else {
            self.entries.len() as u16
        };
        self.output.write_all(&entry_count.to_le_bytes())?;
        self.output.write_all(&entry_count.to_le_bytes())?;
        self.output
            .write_all(&clamp_u32(central_dir_size).to_le_bytes())?;
        self.output
            .write_all(&clamp_u32(central_dir_offset).to_le_bytes())?;
        self.output.write_all(&0u16.to_le_bytes())?; // comment len

        self.output.flush()?;
        Ok(self.output)
    }
}

/// 32-bit header value, or the ZIP64 marker when it does not fit
fn clamp_u32(value: u64) -> u32 {
    if value > u32::MAX as u64 {
        0xFFFFFFFF
    } else {
        value as u32
    }
}
