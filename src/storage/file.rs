use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{check_contiguous, PersistentState, Storage};
use crate::error::StorageError;
use crate::raft::{LogEntry, NodeId};

const STATE_FILE: &str = "state.json";
const LOG_FILE: &str = "log.jsonl";

/// Persisted term and vote.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedVote {
    term: u64,
    voted_for: Option<NodeId>,
}

/// File-based storage.
///
/// Stores node state in a directory with:
/// - `state.json`: term and vote, replaced atomically (temp file, fsync,
///   rename, directory fsync)
/// - `log.jsonl`: one JSON log entry per line, fsynced after every append
///
/// A record torn by a crash mid-append is discarded on open.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    log_writer: BufWriter<File>,
    last_index: u64,
}

impl FileStorage {
    /// Open (or create) storage in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let (entries, needs_repair) = read_log(&dir.join(LOG_FILE))?;
        if needs_repair {
            tracing::warn!(
                dir = %dir.display(),
                recovered = entries.len(),
                "Discarding torn record at the end of the log"
            );
            write_log_file(&dir, &entries)?;
        }

        let last_index = entries.last().map(|e| e.index).unwrap_or(0);
        let log_writer = BufWriter::new(open_append(&dir.join(LOG_FILE))?);

        Ok(Self {
            dir,
            log_writer,
            last_index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    fn read_vote(&self) -> Result<PersistedVote, StorageError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(PersistedVote::default());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn rewrite_log(&mut self, entries: &[LogEntry]) -> Result<(), StorageError> {
        self.log_writer.flush()?;
        write_log_file(&self.dir, entries)?;
        self.log_writer = BufWriter::new(open_append(&self.log_path())?);
        self.last_index = entries.last().map(|e| e.index).unwrap_or(0);
        Ok(())
    }
}

impl Storage for FileStorage {
    fn load_state(&mut self) -> Result<PersistentState, StorageError> {
        let vote = self.read_vote()?;
        let (log, _) = read_log(&self.log_path())?;
        Ok(PersistentState {
            current_term: vote.term,
            voted_for: vote.voted_for,
            log,
        })
    }

    fn persist_state(&mut self, term: u64, voted_for: Option<NodeId>) -> Result<(), StorageError> {
        let persisted = PersistedVote { term, voted_for };
        let temp_path = self.dir.join(format!("{}.tmp", STATE_FILE));

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &persisted)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        fs::rename(&temp_path, self.state_path())?;
        sync_dir(&self.dir)
    }

    fn append_log(&mut self, entries: &[LogEntry]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }
        check_contiguous(self.last_index, entries)?;

        for entry in entries {
            serde_json::to_writer(&mut self.log_writer, entry)?;
            self.log_writer.write_all(b"\n")?;
        }
        self.log_writer.flush()?;
        self.log_writer.get_ref().sync_data()?;

        self.last_index += entries.len() as u64;
        Ok(())
    }

    fn truncate_log_from(&mut self, index: u64) -> Result<(), StorageError> {
        if index > self.last_index {
            return Ok(());
        }
        let (mut entries, _) = read_log(&self.log_path())?;
        entries.retain(|e| e.index < index);
        self.rewrite_log(&entries)
    }
}

fn open_append(path: &Path) -> Result<File, StorageError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Read every complete record. The flag is set when the file does not end on
/// a record boundary and must be rewritten before further appends.
fn read_log(path: &Path) -> Result<(Vec<LogEntry>, bool), StorageError> {
    if !path.exists() {
        return Ok((Vec::new(), false));
    }

    let contents = fs::read_to_string(path)?;
    let complete = contents.is_empty() || contents.ends_with('\n');
    let mut entries = Vec::new();

    let mut lines = contents.split_terminator('\n').peekable();
    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(_) if lines.peek().is_none() && !complete => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok((entries, !complete))
}

fn write_log_file(dir: &Path, entries: &[LogEntry]) -> Result<(), StorageError> {
    let temp_path = dir.join(format!("{}.tmp", LOG_FILE));
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    let mut writer = BufWriter::new(file);
    for entry in entries {
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;

    fs::rename(&temp_path, dir.join(LOG_FILE))?;
    sync_dir(dir)
}

/// Make a rename inside `dir` durable.
fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::Command;

    fn entry(term: u64, index: u64, data: &[u8]) -> LogEntry {
        LogEntry {
            term,
            index,
            command: Command::Client(data.to_vec()),
        }
    }

    #[test]
    fn fresh_directory_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        let state = storage.load_state().unwrap();
        assert_eq!(state, PersistentState::default());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut storage = FileStorage::open(dir.path()).unwrap();
            storage.persist_state(7, Some(3)).unwrap();
            storage
                .append_log(&[entry(1, 1, b"a"), entry(7, 2, b"b")])
                .unwrap();
        }

        let mut storage = FileStorage::open(dir.path()).unwrap();
        let state = storage.load_state().unwrap();
        assert_eq!(state.current_term, 7);
        assert_eq!(state.voted_for, Some(3));
        assert_eq!(state.log, vec![entry(1, 1, b"a"), entry(7, 2, b"b")]);
    }

    #[test]
    fn truncate_then_append_replaces_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage
            .append_log(&[entry(1, 1, b"a"), entry(1, 2, b"b"), entry(1, 3, b"c")])
            .unwrap();
        storage.truncate_log_from(2).unwrap();
        storage.append_log(&[entry(2, 2, b"x")]).unwrap();

        let mut reopened = FileStorage::open(dir.path()).unwrap();
        let log = reopened.load_state().unwrap().log;
        assert_eq!(log, vec![entry(1, 1, b"a"), entry(2, 2, b"x")]);
    }

    #[test]
    fn replaced_files_leave_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.persist_state(2, Some(1)).unwrap();
        storage.persist_state(3, None).unwrap();
        storage
            .append_log(&[entry(1, 1, b"a"), entry(3, 2, b"b")])
            .unwrap();
        storage.truncate_log_from(2).unwrap();
        sync_dir(dir.path()).unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec![LOG_FILE.to_string(), STATE_FILE.to_string()]);

        let mut reopened = FileStorage::open(dir.path()).unwrap();
        let state = reopened.load_state().unwrap();
        assert_eq!(state.current_term, 3);
        assert_eq!(state.voted_for, None);
        assert_eq!(state.log, vec![entry(1, 1, b"a")]);
    }

    #[test]
    fn rejects_gap_in_append() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.append_log(&[entry(1, 1, b"a")]).unwrap();
        assert!(matches!(
            storage.append_log(&[entry(1, 5, b"z")]),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn torn_tail_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut storage = FileStorage::open(dir.path()).unwrap();
            storage
                .append_log(&[entry(1, 1, b"a"), entry(1, 2, b"b")])
                .unwrap();
        }
        // Simulate a crash halfway through writing the third record
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(LOG_FILE))
            .unwrap();
        file.write_all(br#"{"term":1,"index":3,"comm"#).unwrap();
        drop(file);

        let mut storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.load_state().unwrap().log.len(), 2);

        storage.append_log(&[entry(1, 3, b"c")]).unwrap();
        let mut reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.load_state().unwrap().log.len(), 3);
    }

    #[test]
    fn corrupt_record_in_the_middle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(LOG_FILE),
            "not json\n{\"term\":1,\"index\":1,\"command\":\"Noop\"}\n",
        )
        .unwrap();
        assert!(FileStorage::open(dir.path()).is_err());
    }
}
