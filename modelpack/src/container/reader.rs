/*!
 Contains logic to read records out of a ZIP-based model container.

 Model containers are ordinary ZIP archives with every record stored
 uncompressed under a single top-level directory named after the archive.
 This reader indexes the central directory once at open time and serves
 records by their logical name, with the directory prefix stripped.

 Logic referenced from the format specification at:
   - [`APPNOTE.TXT`](https://pkware.cachefly.net/webdocs/casestudies/APPNOTE.TXT)
*/

use std::{
    cell::RefCell,
    collections::HashMap,
    io::{Read, Seek, SeekFrom},
};

use crate::{container::RecordStore, error::container::ContainerError};

/// Marks the end-of-central-directory record
const EOCD_SIGNATURE: u32 = 0x0605_4b50;
/// Marks one entry in the central directory
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
/// Marks the local header in front of each record's data
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;
/// The fixed portion of the end-of-central-directory record
const EOCD_SIZE: usize = 22;
/// An archive comment can push the end-of-central-directory record this far
/// from the end of the file
const MAX_COMMENT: usize = 65_535;
/// The only compression method model containers use
const METHOD_STORE: u16 = 0;
/// Entry flag bit indicating encrypted data
const FLAG_ENCRYPTED: u16 = 0x0001;

/// Where one record's bytes live in the archive
#[derive(Debug, Clone)]
struct RecordEntry {
    header_offset: u64,
    size: u64,
    crc32: u32,
}

/// Reads named records out of a ZIP-based model container
pub struct ArchiveReader<R: Read + Seek> {
    source: RefCell<R>,
    entries: HashMap<String, RecordEntry>,
    archive_name: String,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Open a container and index its records
    pub fn open(mut source: R) -> Result<Self, ContainerError> {
        let file_len = source.seek(SeekFrom::End(0)).map_err(ContainerError::Io)?;
        let tail_len = file_len.min((EOCD_SIZE + MAX_COMMENT) as u64);
        source
            .seek(SeekFrom::Start(file_len - tail_len))
            .map_err(ContainerError::Io)?;
        let mut tail = vec![0u8; tail_len as usize];
        source.read_exact(&mut tail).map_err(map_io)?;

        let eocd = find_eocd(&tail).ok_or_else(|| {
            ContainerError::Malformed("no end-of-central-directory record".to_string())
        })?;
        let disk = u16::from_le_bytes([tail[eocd + 4], tail[eocd + 5]]);
        let central_disk = u16::from_le_bytes([tail[eocd + 6], tail[eocd + 7]]);
        if disk != 0 || central_disk != 0 {
            return Err(ContainerError::Malformed(
                "multi-disk archives are not supported".to_string(),
            ));
        }
        let entry_count = u16::from_le_bytes([tail[eocd + 10], tail[eocd + 11]]);
        let central_offset = u32::from_le_bytes([
            tail[eocd + 16],
            tail[eocd + 17],
            tail[eocd + 18],
            tail[eocd + 19],
        ]);
        if entry_count == u16::MAX || central_offset == u32::MAX {
            return Err(ContainerError::Malformed(
                "zip64 archives are not supported".to_string(),
            ));
        }

        source
            .seek(SeekFrom::Start(central_offset as u64))
            .map_err(ContainerError::Io)?;
        let mut named = vec![];
        for _ in 0..entry_count {
            if let Some(entry) = read_central_entry(&mut source)? {
                named.push(entry);
            }
        }

        let archive_name = shared_prefix(&named).unwrap_or_else(|| "archive".to_string());
        let mut entries = HashMap::with_capacity(named.len());
        for (name, entry) in named {
            let logical = name
                .strip_prefix(&archive_name)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(&name)
                .to_string();
            entries.insert(logical, entry);
        }

        Ok(Self {
            source: RefCell::new(source),
            entries,
            archive_name,
        })
    }

    /// The top-level directory name the records were stored under
    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    /// The logical names of every record, sorted
    pub fn record_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The stored size of a record, in bytes
    pub fn record_size(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|entry| entry.size)
    }
}

impl<R: Read + Seek> RecordStore for ArchiveReader<R> {
    fn record(&self, name: &str) -> Result<Vec<u8>, ContainerError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ContainerError::RecordNotFound(name.to_string()))?;
        let mut source = self.source.borrow_mut();

        source
            .seek(SeekFrom::Start(entry.header_offset))
            .map_err(ContainerError::Io)?;
        if read_u32(&mut *source)? != LOCAL_SIGNATURE {
            return Err(ContainerError::Malformed(format!(
                "record {name} does not start with a local header"
            )));
        }
        // Skip to the name and extra lengths; the local extra field can
        // differ from the central directory's copy
        source
            .seek(SeekFrom::Current(22))
            .map_err(ContainerError::Io)?;
        let name_len = read_u16(&mut *source)?;
        let extra_len = read_u16(&mut *source)?;
        source
            .seek(SeekFrom::Current(name_len as i64 + extra_len as i64))
            .map_err(ContainerError::Io)?;

        let mut data = vec![0u8; entry.size as usize];
        source.read_exact(&mut data).map_err(map_io)?;

        let checksum = crc32fast::hash(&data);
        if checksum != entry.crc32 {
            return Err(ContainerError::ChecksumMismatch(
                name.to_string(),
                entry.crc32,
                checksum,
            ));
        }
        Ok(data)
    }

    fn has_record(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Parse one central directory entry; directories yield `None`
fn read_central_entry<R: Read>(
    source: &mut R,
) -> Result<Option<(String, RecordEntry)>, ContainerError> {
    if read_u32(source)? != CENTRAL_SIGNATURE {
        return Err(ContainerError::Malformed(
            "central directory entry has a bad signature".to_string(),
        ));
    }
    let _version_made = read_u16(source)?;
    let _version_needed = read_u16(source)?;
    let flags = read_u16(source)?;
    let method = read_u16(source)?;
    let _mtime = read_u16(source)?;
    let _mdate = read_u16(source)?;
    let crc32 = read_u32(source)?;
    let compressed_size = read_u32(source)?;
    let size = read_u32(source)?;
    let name_len = read_u16(source)?;
    let extra_len = read_u16(source)?;
    let comment_len = read_u16(source)?;
    let _disk_start = read_u16(source)?;
    let _internal_attributes = read_u16(source)?;
    let _external_attributes = read_u32(source)?;
    let header_offset = read_u32(source)?;

    let mut name_bytes = vec![0u8; name_len as usize];
    source.read_exact(&mut name_bytes).map_err(map_io)?;
    let name = String::from_utf8(name_bytes).map_err(|_| {
        ContainerError::Malformed("record name is not valid UTF-8".to_string())
    })?;
    skip(source, extra_len as u64 + comment_len as u64)?;

    if name.ends_with('/') {
        return Ok(None);
    }
    if flags & FLAG_ENCRYPTED != 0 {
        return Err(ContainerError::Malformed(format!(
            "record {name} is encrypted"
        )));
    }
    if method != METHOD_STORE {
        return Err(ContainerError::Compressed(name));
    }
    if compressed_size != size {
        return Err(ContainerError::Malformed(format!(
            "stored record {name} declares mismatched sizes"
        )));
    }

    Ok(Some((
        name,
        RecordEntry {
            header_offset: header_offset as u64,
            size: size as u64,
            crc32,
        },
    )))
}

/// Locate the end-of-central-directory record in the file's tail
fn find_eocd(tail: &[u8]) -> Option<usize> {
    let mut idx = tail.len().checked_sub(EOCD_SIZE)?;
    loop {
        let signature = u32::from_le_bytes([tail[idx], tail[idx + 1], tail[idx + 2], tail[idx + 3]]);
        if signature == EOCD_SIGNATURE {
            let comment_len =
                u16::from_le_bytes([tail[idx + 20], tail[idx + 21]]) as usize;
            if idx + EOCD_SIZE + comment_len == tail.len() {
                return Some(idx);
            }
        }
        if idx == 0 {
            return None;
        }
        idx -= 1;
    }
}

/// The common top-level directory across every record name, if there is one
fn shared_prefix(named: &[(String, RecordEntry)]) -> Option<String> {
    let (first, _) = named.first()?;
    let prefix = first.split('/').next()?;
    if prefix.is_empty() {
        return None;
    }
    for (name, _) in named {
        match name.split_once('/') {
            Some((root, rest)) if root == prefix && !rest.is_empty() => {}
            _ => return None,
        }
    }
    Some(prefix.to_string())
}

fn read_u16<R: Read>(source: &mut R) -> Result<u16, ContainerError> {
    let mut buf = [0u8; 2];
    source.read_exact(&mut buf).map_err(map_io)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(source: &mut R) -> Result<u32, ContainerError> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf).map_err(map_io)?;
    Ok(u32::from_le_bytes(buf))
}

fn skip<R: Read>(source: &mut R, len: u64) -> Result<(), ContainerError> {
    let copied = std::io::copy(&mut source.take(len), &mut std::io::sink())
        .map_err(ContainerError::Io)?;
    if copied != len {
        return Err(ContainerError::Malformed(
            "archive ends mid-structure".to_string(),
        ));
    }
    Ok(())
}

fn map_io(why: std::io::Error) -> ContainerError {
    if why.kind() == std::io::ErrorKind::UnexpectedEof {
        return ContainerError::Malformed("archive ends mid-structure".to_string());
    }
    ContainerError::Io(why)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::{
        container::{reader::ArchiveReader, RecordStore},
        error::container::ContainerError,
    };

    /// Assemble a store-only archive from (name, data) pairs
    fn build_archive(records: &[(&str, &[u8])]) -> Vec<u8> {
        build_archive_with_method(records, 0)
    }

    fn build_archive_with_method(records: &[(&str, &[u8])], method: u16) -> Vec<u8> {
        let mut out: Vec<u8> = vec![];
        let mut central: Vec<u8> = vec![];
        for (name, data) in records {
            let offset = out.len() as u32;
            let crc = crc32fast::hash(data);
            out.extend(0x0403_4b50u32.to_le_bytes());
            out.extend(20u16.to_le_bytes()); // version needed
            out.extend(0u16.to_le_bytes()); // flags
            out.extend(method.to_le_bytes());
            out.extend(0u16.to_le_bytes()); // time
            out.extend(0u16.to_le_bytes()); // date
            out.extend(crc.to_le_bytes());
            out.extend((data.len() as u32).to_le_bytes());
            out.extend((data.len() as u32).to_le_bytes());
            out.extend((name.len() as u16).to_le_bytes());
            out.extend(0u16.to_le_bytes()); // extra
            out.extend(name.as_bytes());
            out.extend(*data);

            central.extend(0x0201_4b50u32.to_le_bytes());
            central.extend(20u16.to_le_bytes()); // version made by
            central.extend(20u16.to_le_bytes()); // version needed
            central.extend(0u16.to_le_bytes()); // flags
            central.extend(method.to_le_bytes());
            central.extend(0u16.to_le_bytes()); // time
            central.extend(0u16.to_le_bytes()); // date
            central.extend(crc.to_le_bytes());
            central.extend((data.len() as u32).to_le_bytes());
            central.extend((data.len() as u32).to_le_bytes());
            central.extend((name.len() as u16).to_le_bytes());
            central.extend(0u16.to_le_bytes()); // extra
            central.extend(0u16.to_le_bytes()); // comment
            central.extend(0u16.to_le_bytes()); // disk start
            central.extend(0u16.to_le_bytes()); // internal attributes
            central.extend(0u32.to_le_bytes()); // external attributes
            central.extend(offset.to_le_bytes());
            central.extend(name.as_bytes());
        }
        let central_offset = out.len() as u32;
        let central_size = central.len() as u32;
        out.extend(central);
        out.extend(0x0605_4b50u32.to_le_bytes());
        out.extend(0u16.to_le_bytes()); // disk
        out.extend(0u16.to_le_bytes()); // central directory disk
        out.extend((records.len() as u16).to_le_bytes());
        out.extend((records.len() as u16).to_le_bytes());
        out.extend(central_size.to_le_bytes());
        out.extend(central_offset.to_le_bytes());
        out.extend(0u16.to_le_bytes()); // comment
        out
    }

    #[test]
    fn can_read_records_by_logical_name() {
        let archive = build_archive(&[
            ("model/data.pkl", b"pickled"),
            ("model/data/0", b"tensor bytes"),
        ]);

        let reader = ArchiveReader::open(Cursor::new(archive)).unwrap();

        assert_eq!(reader.archive_name(), "model");
        assert_eq!(reader.record("data.pkl").unwrap(), b"pickled");
        assert_eq!(reader.record("data/0").unwrap(), b"tensor bytes");
        assert_eq!(reader.record_size("data/0"), Some(12));
    }

    #[test]
    fn repeated_reads_return_the_same_bytes() {
        let archive = build_archive(&[("model/data.pkl", b"pickled")]);
        let reader = ArchiveReader::open(Cursor::new(archive)).unwrap();

        let first = reader.record("data.pkl").unwrap();
        let second = reader.record("data.pkl").unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn names_without_a_shared_prefix_are_kept_as_is() {
        let archive = build_archive(&[("data.pkl", b"pickled"), ("version", b"3")]);

        let reader = ArchiveReader::open(Cursor::new(archive)).unwrap();

        assert_eq!(reader.archive_name(), "archive");
        assert_eq!(reader.record("data.pkl").unwrap(), b"pickled");
        assert_eq!(reader.record_names(), vec!["data.pkl", "version"]);
    }

    #[test]
    fn missing_record_is_not_found() {
        let archive = build_archive(&[("model/data.pkl", b"pickled")]);
        let reader = ArchiveReader::open(Cursor::new(archive)).unwrap();

        assert!(!reader.has_record("data/0"));
        assert!(matches!(
            reader.record("data/0"),
            Err(ContainerError::RecordNotFound(_))
        ));
    }

    #[test]
    fn compressed_records_are_rejected() {
        let archive = build_archive_with_method(&[("model/data.pkl", b"pickled")], 8);

        let result = ArchiveReader::open(Cursor::new(archive));

        assert!(matches!(result, Err(ContainerError::Compressed(_))));
    }

    #[test]
    fn corrupt_record_fails_its_checksum() {
        let mut archive = build_archive(&[("model/data.pkl", b"pickled")]);
        // Flip a byte inside the record's data region
        let data_start = 30 + "model/data.pkl".len();
        archive[data_start] ^= 0xff;

        let reader = ArchiveReader::open(Cursor::new(archive)).unwrap();
        let result = reader.record("data.pkl");

        assert!(matches!(
            result,
            Err(ContainerError::ChecksumMismatch(_, _, _))
        ));
    }

    #[test]
    fn truncated_archive_is_malformed() {
        let archive = build_archive(&[("model/data.pkl", b"pickled")]);
        let truncated = &archive[..archive.len() - 10];

        let result = ArchiveReader::open(Cursor::new(truncated.to_vec()));

        assert!(matches!(result, Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn empty_input_is_malformed() {
        let result = ArchiveReader::open(Cursor::new(vec![]));

        assert!(matches!(result, Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn directory_entries_are_skipped() {
        let archive = build_archive(&[
            ("model/", b""),
            ("model/data.pkl", b"pickled"),
            ("model/data/", b""),
            ("model/data/0", b"t"),
        ]);

        let reader = ArchiveReader::open(Cursor::new(archive)).unwrap();

        assert_eq!(reader.record_names(), vec!["data.pkl", "data/0"]);
    }
}
