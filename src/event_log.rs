use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{Codec, JsonCodec};
use crate::error::{BoxError, StoreError};
use crate::store::EventStore;

/// How the log file is protected against concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Hold an exclusive advisory lock for the lifetime of the log.
    #[default]
    Exclusive,
    /// No locking. The caller guarantees a single writer.
    None,
}

/// What happens after each record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// `fdatasync` after every record. A committed command survives a crash.
    #[default]
    Data,
    /// Hand the record to the OS only. Survives a process crash, not a
    /// power loss.
    Flush,
}

/// Configures and opens an [`EventLog`].
///
/// # Examples
///
/// ```
/// use memimg::{EventLog, JsonCodec, LockMode, SyncPolicy};
///
/// let dir = tempfile::tempdir().unwrap();
/// let log = EventLog::<u32, _>::builder(dir.path().join("commands.jsonl"), JsonCodec::new())
///     .lock_mode(LockMode::None)
///     .sync_policy(SyncPolicy::Flush)
///     .open()
///     .unwrap();
/// assert_eq!(log.records(), 0);
/// ```
pub struct EventLogBuilder<C, K> {
    path: PathBuf,
    codec: K,
    lock: LockMode,
    sync: SyncPolicy,
    _command: PhantomData<fn(C) -> C>,
}

impl<C, K: Codec<C>> EventLogBuilder<C, K> {
    pub fn lock_mode(mut self, lock: LockMode) -> Self {
        self.lock = lock;
        self
    }

    pub fn sync_policy(mut self, sync: SyncPolicy) -> Self {
        self.sync = sync;
        self
    }

    /// Open or create the log file.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Inaccessible`] if the file exists but cannot be both
    ///   read and written, or does not exist and cannot be created.
    /// - [`StoreError::Locked`] if another writer holds the lock.
    pub fn open(self) -> Result<EventLog<C, K>, StoreError> {
        let path = self.path;
        let file = open_accessible(&path).map_err(|source| StoreError::Inaccessible {
            path: path.clone(),
            source,
        })?;

        if self.lock == LockMode::Exclusive && file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked { path });
        }

        log::info!("opened event log {}", path.display());
        Ok(EventLog {
            path,
            file,
            codec: self.codec,
            sync: self.sync,
            replayed: false,
            unterminated: false,
            closed: false,
            records: 0,
            _command: PhantomData,
        })
    }
}

/// Append-only command log stored as one text line per command.
///
/// Each record is the codec's encoding of a command with any line breaks
/// replaced by spaces, so one line is always exactly one record. There is no
/// header, checksum or length prefix.
///
/// Every line is decoded and replayed, including a last line whose newline
/// is missing; the next append terminates it first. A line that fails to
/// decode is fatal and the file is left as found. Replay never modifies the
/// file.
pub struct EventLog<C, K> {
    path: PathBuf,
    file: File,
    codec: K,
    sync: SyncPolicy,
    replayed: bool,
    unterminated: bool,
    closed: bool,
    records: u64,
    _command: PhantomData<fn(C) -> C>,
}

impl<C, K> fmt::Debug for EventLog<C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .field("replayed", &self.replayed)
            .field("records", &self.records)
            .finish()
    }
}

impl<C, K: Codec<C>> EventLog<C, K> {
    pub fn builder(path: impl AsRef<Path>, codec: K) -> EventLogBuilder<C, K> {
        EventLogBuilder {
            path: path.as_ref().to_path_buf(),
            codec,
            lock: LockMode::default(),
            sync: SyncPolicy::default(),
            _command: PhantomData,
        }
    }

    /// Open with an exclusive lock and per-record `fdatasync`.
    pub fn open(path: impl AsRef<Path>, codec: K) -> Result<Self, StoreError> {
        Self::builder(path, codec).open()
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records replayed plus records appended since opening.
    pub fn records(&self) -> u64 {
        self.records
    }
}

impl<C> EventLog<C, JsonCodec<C>>
where
    C: Serialize + DeserializeOwned,
{
    /// Open a log of JSON-encoded commands.
    pub fn open_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(path, JsonCodec::new())
    }
}

impl<C, K: Codec<C>> EventStore<C> for EventLog<C, K> {
    fn replay(
        &mut self,
        apply: &mut dyn FnMut(C) -> Result<(), BoxError>,
    ) -> Result<u64, StoreError> {
        if self.replayed {
            return Err(StoreError::AlreadyReplayed);
        }
        self.replayed = true;

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut line = String::new();
        let mut line_no = 0u64;
        let mut count = 0u64;

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            line_no += 1;
            self.unterminated = !line.ends_with('\n');
            if self.unterminated {
                log::warn!(
                    "event log {}: line {line_no} has no trailing newline",
                    self.path.display()
                );
            }

            let record = line.trim_end_matches(['\n', '\r']);
            if record.is_empty() {
                continue;
            }

            let command = self
                .codec
                .decode(record)
                .map_err(|source| StoreError::Decode {
                    line: line_no,
                    source,
                })?;
            apply(command).map_err(|source| StoreError::Replay {
                line: line_no,
                source,
            })?;
            count += 1;
        }

        self.records = count;
        log::info!("replayed {count} command(s) from {}", self.path.display());
        Ok(count)
    }

    fn append(&mut self, command: &C) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.replayed {
            return Err(StoreError::NotReplayed);
        }
        let encoded = self.codec.encode(command).map_err(StoreError::Encode)?;
        let mut record = String::with_capacity(encoded.len() + 2);
        if self.unterminated {
            record.push('\n');
        }
        record.push_str(&encoded.replace(['\n', '\r'], " "));
        record.push('\n');

        let sync = self.sync;
        self.write_or_rewind(record.as_bytes(), |file, bytes| {
            file.write_all(bytes)?;
            match sync {
                SyncPolicy::Data => file.sync_data(),
                SyncPolicy::Flush => file.flush(),
            }
        })?;
        self.unterminated = false;
        self.records += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.file.flush()?;
        self.file.sync_all()?;
        self.closed = true;
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("event log {}: failed to release lock: {e}", self.path.display());
        }
        log::info!("closed event log {}", self.path.display());
        Ok(())
    }
}

impl<C, K> EventLog<C, K> {
    /// Run `write` and, if it fails, cut the file back to its prior length so
    /// no partial record survives.
    fn write_or_rewind(
        &mut self,
        bytes: &[u8],
        write: impl FnOnce(&mut File, &[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if let Err(e) = write(&mut self.file, bytes) {
            if let Err(truncate) = self.file.set_len(len) {
                log::error!(
                    "event log {}: failed to truncate partial record: {truncate}",
                    self.path.display()
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Open `path` for reading and appending, creating it and its parent
/// directories if needed. Fails if the result would not be both readable and
/// writable.
fn open_accessible(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
    }
    Ok(file)
}
