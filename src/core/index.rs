// Append-only row id -> data offset index, mirrored in memory for binary search.
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::error::{Error, ErrorKind};

pub const INDEX_ENTRY_LEN: usize = 16;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    pub row_id: i64,
    pub offset: i64,
}

impl IndexEntry {
    pub fn encode(&self) -> [u8; INDEX_ENTRY_LEN] {
        let mut buf = [0u8; INDEX_ENTRY_LEN];
        buf[..8].copy_from_slice(&self.row_id.to_ne_bytes());
        buf[8..].copy_from_slice(&self.offset.to_ne_bytes());
        buf
    }

    pub fn decode(buf: &[u8; INDEX_ENTRY_LEN]) -> Self {
        let mut row_id = [0u8; 8];
        let mut offset = [0u8; 8];
        row_id.copy_from_slice(&buf[..8]);
        offset.copy_from_slice(&buf[8..]);
        Self {
            row_id: i64::from_ne_bytes(row_id),
            offset: i64::from_ne_bytes(offset),
        }
    }
}

#[derive(Debug)]
pub struct IndexFile {
    path: PathBuf,
    entries: Vec<IndexEntry>,
}

impl IndexFile {
    /// Loads every whole entry from `path`; a missing file is an empty index.
    /// A torn trailing entry is dropped and the file trimmed to the last whole one.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let bytes = match read_all(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(Error::io(err, &path).with_message("failed to read index file")),
        };

        let whole = bytes.len() - bytes.len() % INDEX_ENTRY_LEN;
        if whole != bytes.len() {
            warn!(
                path = %path.display(),
                torn_bytes = bytes.len() - whole,
                "discarding partial trailing index entry"
            );
            truncate(&path, whole as u64)?;
        }

        let mut entries = Vec::with_capacity(whole / INDEX_ENTRY_LEN);
        for (position, chunk) in bytes[..whole].chunks_exact(INDEX_ENTRY_LEN).enumerate() {
            let mut buf = [0u8; INDEX_ENTRY_LEN];
            buf.copy_from_slice(chunk);
            let entry = IndexEntry::decode(&buf);
            if entry.row_id != position as i64 {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("index entry {position} holds id {}", entry.row_id))
                    .with_path(&path)
                    .with_row_id(entry.row_id));
            }
            if entry.offset < 0 {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("index entry has a negative offset")
                    .with_path(&path)
                    .with_row_id(entry.row_id)
                    .with_offset(entry.offset));
            }
            entries.push(entry);
        }

        Ok(Self { path, entries })
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_row_id(&self) -> i64 {
        self.entries.len() as i64
    }

    pub fn get(&self, position: usize) -> Option<IndexEntry> {
        self.entries.get(position).copied()
    }

    /// Lower-bound binary search: first position whose id is `>= row_id`.
    pub fn lower_bound(&self, row_id: i64) -> usize {
        self.entries.partition_point(|entry| entry.row_id < row_id)
    }

    pub fn find(&self, row_id: i64) -> Option<IndexEntry> {
        self.get(self.lower_bound(row_id))
            .filter(|entry| entry.row_id == row_id)
    }

    /// Persists `entry` and then records it in memory.
    /// Bytes past the last known entry are trimmed first, and a failed write is rolled back.
    pub fn append(&mut self, entry: IndexEntry) -> Result<(), Error> {
        if entry.row_id != self.next_row_id() {
            return Err(Error::new(ErrorKind::Internal)
                .with_message(format!(
                    "index append out of order: got {}, expected {}",
                    entry.row_id,
                    self.next_row_id()
                ))
                .with_path(&self.path));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| Error::io(err, &self.path).with_message("failed to open index file"))?;
        let end = (self.entries.len() * INDEX_ENTRY_LEN) as u64;
        let len = file
            .metadata()
            .map_err(|err| Error::io(err, &self.path))?
            .len();
        if len < end {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("index file is {len} bytes, expected {end}"))
                .with_path(&self.path));
        }
        if len > end {
            warn!(
                path = %self.path.display(),
                stale_bytes = len - end,
                "trimming bytes past the last indexed entry"
            );
            file.set_len(end)
                .map_err(|err| Error::io(err, &self.path).with_message("failed to trim index file"))?;
        }

        if let Err(err) = file.write_all(&entry.encode()) {
            if let Err(trim_err) = file.set_len(end) {
                warn!(path = %self.path.display(), error = %trim_err, "failed to trim partial index entry");
            }
            return Err(Error::io(err, &self.path)
                .with_message("failed to write index entry")
                .with_row_id(entry.row_id));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn read_all(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn truncate(path: &Path, len: u64) -> Result<(), Error> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|err| Error::io(err, path).with_message("failed to open index file"))?;
    file.set_len(len)
        .map_err(|err| Error::io(err, path).with_message("failed to trim index file"))
}

#[cfg(test)]
mod tests {
    use super::{INDEX_ENTRY_LEN, IndexEntry, IndexFile};
    use crate::core::error::ErrorKind;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn entry(row_id: i64, offset: i64) -> IndexEntry {
        IndexEntry { row_id, offset }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = IndexFile::load(dir.path().join("t_h.dat")).expect("load");
        assert!(index.is_empty());
        assert_eq!(index.next_row_id(), 0);
    }

    #[test]
    fn appended_entries_survive_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t_h.dat");
        let mut index = IndexFile::load(&path).expect("load");
        index.append(entry(0, 0)).expect("append 0");
        index.append(entry(1, 291)).expect("append 1");

        let reloaded = IndexFile::load(&path).expect("reload");
        assert_eq!(reloaded.entries(), &[entry(0, 0), entry(1, 291)]);
        assert_eq!(
            std::fs::metadata(&path).expect("meta").len(),
            2 * INDEX_ENTRY_LEN as u64
        );
    }

    #[test]
    fn torn_tail_is_discarded_and_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t_h.dat");
        let mut index = IndexFile::load(&path).expect("load");
        index.append(entry(0, 0)).expect("append");
        {
            let mut file = OpenOptions::new().append(true).open(&path).expect("open");
            file.write_all(&[1, 2, 3, 4, 5]).expect("torn write");
        }

        let mut reloaded = IndexFile::load(&path).expect("reload");
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            std::fs::metadata(&path).expect("meta").len(),
            INDEX_ENTRY_LEN as u64
        );

        reloaded.append(entry(1, 300)).expect("append after trim");
        let again = IndexFile::load(&path).expect("reload again");
        assert_eq!(again.get(1), Some(entry(1, 300)));
    }

    #[test]
    fn stale_tail_within_a_session_is_trimmed_before_append() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t_h.dat");
        let mut index = IndexFile::load(&path).expect("load");
        index.append(entry(0, 0)).expect("append 0");
        {
            let mut file = OpenOptions::new().append(true).open(&path).expect("open");
            file.write_all(&[9; 8]).expect("partial entry");
        }

        index.append(entry(1, 291)).expect("append 1");
        assert_eq!(
            std::fs::metadata(&path).expect("meta").len(),
            2 * INDEX_ENTRY_LEN as u64
        );
        let reloaded = IndexFile::load(&path).expect("reload");
        assert_eq!(reloaded.entries(), &[entry(0, 0), entry(1, 291)]);
    }

    #[test]
    fn append_onto_a_shrunken_file_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t_h.dat");
        let mut index = IndexFile::load(&path).expect("load");
        index.append(entry(0, 0)).expect("append 0");
        std::fs::write(&path, [0u8; 4]).expect("shrink");

        let err = index.append(entry(1, 291)).expect_err("shrunken");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn out_of_sequence_ids_are_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t_h.dat");
        let mut bytes = entry(0, 0).encode().to_vec();
        bytes.extend_from_slice(&entry(5, 10).encode());
        std::fs::write(&path, bytes).expect("write");

        let err = IndexFile::load(&path).expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.row_id(), Some(5));
    }

    #[test]
    fn append_rejects_gaps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut index = IndexFile::load(dir.path().join("t_h.dat")).expect("load");
        let err = index.append(entry(3, 0)).expect_err("gap");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(index.is_empty());
    }

    #[test]
    fn binary_search_finds_exact_ids_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut index = IndexFile::load(dir.path().join("t_h.dat")).expect("load");
        for id in 0..5 {
            index.append(entry(id, id * 100)).expect("append");
        }
        assert_eq!(index.lower_bound(-3), 0);
        assert_eq!(index.lower_bound(3), 3);
        assert_eq!(index.lower_bound(9), 5);
        assert_eq!(index.find(4), Some(entry(4, 400)));
        assert_eq!(index.find(-1), None);
        assert_eq!(index.find(5), None);
    }
}
