// Record store: owns a table's data file and index file; insert, read, scan, drop.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use libc::{EACCES, EPERM};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::core::codec::{self, Value};
use crate::core::cursor::{Cursor, Row};
use crate::core::error::{Error, ErrorKind};
use crate::core::index::{IndexEntry, IndexFile};
use crate::core::layout::{RECORD_HEADER_LEN, RecordHeader, RecordLayout};
use crate::core::schema::Schema;

pub const DATA_SUFFIX: &str = ".dat";
pub const INDEX_SUFFIX: &str = "_h.dat";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StorePaths {
    pub data: PathBuf,
    pub index: PathBuf,
}

impl StorePaths {
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            data: dir.join(format!("{name}{DATA_SUFFIX}")),
            index: dir.join(format!("{name}{INDEX_SUFFIX}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Durability {
    #[default]
    Fast,
    Flush,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StoreOptions {
    pub durability: Durability,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreState {
    Open,
    Dropped,
}

#[derive(Clone, Debug)]
pub struct StoreInfo {
    pub name: String,
    pub data_path: PathBuf,
    pub index_path: PathBuf,
    pub row_count: u64,
    pub record_size: usize,
    pub data_len: u64,
}

pub struct Store {
    name: String,
    schema: Schema,
    layout: RecordLayout,
    paths: StorePaths,
    index: IndexFile,
    options: StoreOptions,
    state: StoreState,
}

impl Store {
    pub fn open(dir: impl AsRef<Path>, name: &str, schema: Schema) -> Result<Self, Error> {
        Self::open_with_options(dir, name, schema, StoreOptions::default())
    }

    pub fn open_with_options(
        dir: impl AsRef<Path>,
        name: &str,
        schema: Schema,
        options: StoreOptions,
    ) -> Result<Self, Error> {
        validate_name(name)?;
        let paths = StorePaths::new(dir, name);
        let index = IndexFile::load(&paths.index)?;
        let layout = RecordLayout::new(&schema);
        debug!(
            table = name,
            rows = index.len(),
            record_size = layout.record_size(),
            "opened store"
        );
        Ok(Self {
            name: name.to_string(),
            schema,
            layout,
            paths,
            index,
            options,
            state: StoreState::Open,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn row_count(&self) -> u64 {
        self.index.len() as u64
    }

    pub fn entries(&self) -> &[IndexEntry] {
        self.index.entries()
    }

    /// Index entry at `position` in insertion order (not looked up by id).
    pub fn entry_at(&self, position: usize) -> Option<IndexEntry> {
        self.index.get(position)
    }

    pub fn offset_of(&self, row_id: i64) -> Option<i64> {
        self.index.find(row_id).map(|entry| entry.offset)
    }

    /// Appends one row. `values` follow the schema order, without the `_id` column.
    /// Every value is encoded before the data file is touched.
    pub fn insert<S: AsRef<str>>(&mut self, values: &[S]) -> Result<i64, Error> {
        self.ensure_open()?;
        let expected = self.schema.user_columns().len();
        if values.len() != expected {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "expected {expected} values for table {}, got {}",
                self.name,
                values.len()
            )));
        }

        let row_id = self.index.next_row_id();
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let record = self.encode_record(row_id, values, timestamp)?;
        let offset = self.append_record(&record, row_id)?;

        if let Err(err) = self.index.append(IndexEntry { row_id, offset }) {
            self.rollback_data(offset);
            return Err(err);
        }
        debug!(table = %self.name, row_id, offset, "inserted row");
        Ok(row_id)
    }

    pub fn read_at(&self, offset: i64) -> Result<Row, Error> {
        self.ensure_open()?;
        self.reader()?.read_row(offset)
    }

    /// Looks `row_id` up by binary search; `Ok(None)` when no such row exists.
    pub fn read_by_id(&self, row_id: i64) -> Result<Option<Row>, Error> {
        self.ensure_open()?;
        match self.index.find(row_id) {
            Some(entry) => self
                .read_at(entry.offset)
                .map(Some)
                .map_err(|err| err.with_row_id(row_id)),
            None => Ok(None),
        }
    }

    /// Every row in index order, read through a single data file handle.
    pub fn scan(&self) -> Result<Cursor, Error> {
        self.ensure_open()?;
        if self.index.is_empty() {
            return Ok(Cursor::new(self.schema.clone(), Vec::new()));
        }
        let mut reader = self.reader()?;
        let rows = self
            .index
            .entries()
            .iter()
            .map(|entry| reader.read_row(entry.offset))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Cursor::new(self.schema.clone(), rows))
    }

    /// Deletes both backing files and empties the index. The store is unusable afterwards.
    pub fn drop(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        remove_if_exists(&self.paths.data)?;
        remove_if_exists(&self.paths.index)?;
        self.index.clear();
        self.state = StoreState::Dropped;
        debug!(table = %self.name, "dropped store");
        Ok(())
    }

    pub fn info(&self) -> Result<StoreInfo, Error> {
        self.ensure_open()?;
        let data_len = match fs::metadata(&self.paths.data) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => 0,
            Err(err) => return Err(Error::io(err, &self.paths.data)),
        };
        Ok(StoreInfo {
            name: self.name.clone(),
            data_path: self.paths.data.clone(),
            index_path: self.paths.index.clone(),
            row_count: self.row_count(),
            record_size: self.layout.record_size(),
            data_len,
        })
    }

    pub(crate) fn ensure_open(&self) -> Result<(), Error> {
        match self.state {
            StoreState::Open => Ok(()),
            StoreState::Dropped => Err(Error::new(ErrorKind::InvalidState)
                .with_message(format!("table {} has been dropped", self.name))),
        }
    }

    pub(crate) fn reader(&self) -> Result<RecordReader<'_>, Error> {
        RecordReader::open(self)
    }

    fn encode_record<S: AsRef<str>>(
        &self,
        row_id: i64,
        values: &[S],
        timestamp: i64,
    ) -> Result<Vec<u8>, Error> {
        let header = RecordHeader::new(&self.name, self.layout.payload_width(), timestamp)?;
        let mut record = vec![0u8; self.layout.record_size()];
        record[..RECORD_HEADER_LEN].copy_from_slice(&header.encode());

        let id_text = row_id.to_string();
        let payload = &mut record[RECORD_HEADER_LEN..];
        for (position, column) in self.schema.columns().iter().enumerate() {
            let text = match position {
                0 => id_text.as_str(),
                _ => values[position - 1].as_ref(),
            };
            let range = self.layout.column_range(position).ok_or_else(|| {
                Error::new(ErrorKind::Internal).with_message("column outside record layout")
            })?;
            codec::encode_into(text, column, &mut payload[range])?;
        }
        Ok(record)
    }

    fn append_record(&self, record: &[u8], row_id: i64) -> Result<i64, Error> {
        let path = &self.paths.data;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| Error::io(err, path).with_message("failed to open data file"))?;
        let _lock = DataLock::acquire(&file, path)?;

        let end = file
            .metadata()
            .map_err(|err| Error::io(err, path))?
            .len();
        let offset = i64::try_from(end).map_err(|_| {
            Error::new(ErrorKind::Corrupt)
                .with_message("data file exceeds addressable size")
                .with_path(path)
        })?;

        let written = (&file).write_all(record).and_then(|()| match self.options.durability {
            Durability::Fast => Ok(()),
            Durability::Flush => file.sync_data(),
        });
        if let Err(err) = written {
            if let Err(trim_err) = file.set_len(end) {
                warn!(path = %path.display(), error = %trim_err, "failed to trim partial record");
            }
            return Err(Error::io(err, path)
                .with_message("failed to write record")
                .with_row_id(row_id)
                .with_offset(offset));
        }
        Ok(offset)
    }

    fn rollback_data(&self, offset: i64) {
        let trimmed = OpenOptions::new()
            .write(true)
            .open(&self.paths.data)
            .and_then(|file| file.set_len(offset as u64));
        if let Err(err) = trimmed {
            warn!(
                path = %self.paths.data.display(),
                offset,
                error = %err,
                "record left without an index entry"
            );
        }
    }
}

/// Read handle scoped to one operation; closed when dropped.
pub(crate) struct RecordReader<'a> {
    store: &'a Store,
    file: File,
    len: u64,
}

impl<'a> RecordReader<'a> {
    fn open(store: &'a Store) -> Result<Self, Error> {
        let path = &store.paths.data;
        let file = File::open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::new(ErrorKind::Read)
                .with_message("data file does not exist")
                .with_path(path)
                .with_source(err),
            _ => Error::io(err, path).with_message("failed to open data file"),
        })?;
        let len = file.metadata().map_err(|err| Error::io(err, path))?.len();
        Ok(Self { store, file, len })
    }

    fn read_record(&mut self, offset: i64) -> Result<Vec<u8>, Error> {
        let store = self.store;
        let path = &store.paths.data;
        let size = store.layout.record_size();
        let in_range = u64::try_from(offset)
            .ok()
            .and_then(|start| start.checked_add(size as u64))
            .is_some_and(|end| end <= self.len);
        if !in_range {
            return Err(Error::new(ErrorKind::Read)
                .with_message(format!(
                    "record of {size} bytes does not fit in data file of {} bytes",
                    self.len
                ))
                .with_path(path)
                .with_offset(offset));
        }

        let mut record = vec![0u8; size];
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| self.file.read_exact(&mut record))
            .map_err(|err| {
                Error::new(ErrorKind::Read)
                    .with_path(path)
                    .with_offset(offset)
                    .with_source(err)
            })?;

        RecordHeader::decode(&record[..RECORD_HEADER_LEN])
            .and_then(|header| header.validate(size))
            .map_err(|err| err.with_path(path).with_offset(offset))?;
        Ok(record)
    }

    pub(crate) fn read_row(&mut self, offset: i64) -> Result<Row, Error> {
        let record = self.read_record(offset)?;
        let payload = &record[RECORD_HEADER_LEN..];
        self.store
            .schema
            .columns()
            .iter()
            .enumerate()
            .map(|(position, column)| {
                let range = self.field_range(position)?;
                codec::decode(&payload[range], column).map_err(|err| err.with_offset(offset))
            })
            .collect()
    }

    pub(crate) fn read_value(&mut self, offset: i64, position: usize) -> Result<Value, Error> {
        let record = self.read_record(offset)?;
        let column = self.store.schema.column(position).ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message(format!("no column at position {position}"))
        })?;
        let range = self.field_range(position)?;
        codec::decode_value(&record[RECORD_HEADER_LEN..][range], column)
            .map_err(|err| err.with_offset(offset))
    }

    fn field_range(&self, position: usize) -> Result<std::ops::Range<usize>, Error> {
        self.store.layout.column_range(position).ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("column outside record layout")
        })
    }
}

struct DataLock<'a> {
    file: &'a File,
}

impl<'a> DataLock<'a> {
    fn acquire(file: &'a File, path: &Path) -> Result<Self, Error> {
        file.lock_exclusive().map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_message("failed to lock data file")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Self { file })
    }
}

impl Drop for DataLock<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("table name is empty"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("table name `{name}` contains a path separator")));
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io(err, path).with_message("failed to remove table file")),
    }
}

#[cfg(test)]
mod tests {
    use super::{Store, StorePaths, lock_error_kind};
    use crate::core::error::ErrorKind;
    use crate::core::layout::RECORD_HEADER_LEN;
    use crate::core::schema::{Column, ColumnType, Schema};
    use std::fs::OpenOptions;
    use std::io::Write;

    fn person() -> Schema {
        Schema::new(vec![
            Column::new("dre", ColumnType::Int32),
            Column::new("name", ColumnType::FixedText(12)),
            Column::new("score", ColumnType::Float64),
        ])
        .expect("schema")
    }

    #[test]
    fn paths_follow_table_name() {
        let paths = StorePaths::new("/tmp/db", "Person");
        assert!(paths.data.ends_with("Person.dat"));
        assert!(paths.index.ends_with("Person_h.dat"));
    }

    #[test]
    fn insert_assigns_sequential_ids_and_offsets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open(dir.path(), "Person", person()).expect("open");
        let record_size = store.layout().record_size() as i64;

        assert_eq!(store.insert(&["9", "Jhoe", "1.5"]).expect("insert"), 0);
        assert_eq!(store.insert(&["10", "Marta", "2"]).expect("insert"), 1);
        assert_eq!(store.row_count(), 2);
        assert_eq!(store.offset_of(0), Some(0));
        assert_eq!(store.offset_of(1), Some(record_size));

        let row = store.read_at(record_size).expect("read");
        assert_eq!(row, vec!["1", "10", "Marta", "2"]);
    }

    #[test]
    fn encoding_failure_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open(dir.path(), "Person", person()).expect("open");
        let err = store.insert(&["nine", "Jhoe", "1"]).expect_err("bad int");
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert_eq!(err.column(), Some("dre"));
        assert_eq!(store.row_count(), 0);
        assert!(!store.paths().data.exists());
        assert!(!store.paths().index.exists());
    }

    #[test]
    fn wrong_arity_is_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open(dir.path(), "Person", person()).expect("open");
        let err = store.insert(&["9", "Jhoe"]).expect_err("arity");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn read_past_end_is_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open(dir.path(), "Person", person()).expect("open");
        store.insert(&["9", "Jhoe", "1"]).expect("insert");

        let err = store.read_at(1).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Read);
        assert_eq!(err.offset(), Some(1));
        let err = store.read_at(-8).expect_err("negative");
        assert_eq!(err.kind(), ErrorKind::Read);

        assert_eq!(store.read_at(0).expect("still readable")[2], "Jhoe");
    }

    #[test]
    fn damaged_header_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open(dir.path(), "Person", person()).expect("open");
        store.insert(&["9", "Jhoe", "1"]).expect("insert");
        store.insert(&["10", "Marta", "2"]).expect("insert");

        let mut bytes = std::fs::read(&store.paths().data).expect("read");
        bytes[255..259].copy_from_slice(&7u32.to_ne_bytes());
        std::fs::write(&store.paths().data, bytes).expect("write");

        let err = store.read_by_id(0).expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.row_id(), Some(0));
        assert!(store.read_by_id(1).expect("other row").is_some());
    }

    #[test]
    fn reads_from_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path(), "Person", person()).expect("open");
        assert_eq!(store.read_by_id(0).expect("lookup"), None);
        assert!(store.scan().expect("scan").is_empty());
        let err = store.read_at(0).expect_err("no data file");
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[test]
    fn orphaned_record_is_skipped_by_next_insert() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open(dir.path(), "Person", person()).expect("open");
        store.insert(&["9", "Jhoe", "1"]).expect("insert");
        let record_size = store.layout().record_size();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(&store.paths().data)
                .expect("open data");
            file.write_all(&vec![0u8; record_size]).expect("orphan");
        }
        drop(store);

        let mut store = Store::open(dir.path(), "Person", person()).expect("reopen");
        assert_eq!(store.insert(&["10", "Marta", "2"]).expect("insert"), 1);
        assert_eq!(store.offset_of(1), Some(2 * record_size as i64));
        assert_eq!(store.read_by_id(1).expect("read").expect("row")[2], "Marta");
    }

    #[test]
    fn dropped_store_rejects_operations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open(dir.path(), "Person", person()).expect("open");
        store.insert(&["9", "Jhoe", "1"]).expect("insert");
        store.drop().expect("drop");

        assert_eq!(store.row_count(), 0);
        assert!(!store.paths().data.exists());
        assert!(!store.paths().index.exists());
        for err in [
            store.insert(&["1", "a", "1"]).expect_err("insert"),
            store.read_at(0).expect_err("read_at"),
            store.read_by_id(0).expect_err("read_by_id"),
            store.drop().expect_err("drop"),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidState);
        }
    }

    #[test]
    fn names_with_separators_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["", "a/b", "a\\b"] {
            let err = Store::open(dir.path(), name, person()).err().expect("invalid name");
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }

    #[test]
    fn info_reports_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open(dir.path(), "Person", person()).expect("open");
        store.insert(&["9", "Jhoe", "1"]).expect("insert");
        let info = store.info().expect("info");
        assert_eq!(info.row_count, 1);
        assert_eq!(info.record_size, RECORD_HEADER_LEN + 8 + 4 + 12 + 8);
        assert_eq!(info.data_len, info.record_size as u64);
    }

    #[test]
    fn lock_errors_map_to_expected_kinds() {
        let err = std::io::Error::from_raw_os_error(libc::EWOULDBLOCK);
        assert_eq!(lock_error_kind(&err), ErrorKind::Busy);

        let err = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(lock_error_kind(&err), ErrorKind::Permission);

        let err = std::io::Error::from_raw_os_error(libc::EBADF);
        assert_eq!(lock_error_kind(&err), ErrorKind::Io);
    }
}
