use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use custody_types::Block;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{StoreError, StoreResult};
use crate::traits::{decode_line, encode_line, BlockStore};

/// Flush/sync strategy for the block log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fdatasync` after every appended block. A persisted block survives
    /// power loss.
    #[default]
    EveryWrite,
    /// Rely on OS page-cache buffering. A persisted block survives a
    /// process crash but not power loss.
    OsDefault,
}

/// NDJSON block log on the local filesystem.
///
/// The file is opened in append mode, so every write lands after the last
/// complete line regardless of the cursor. `len` tracks the byte length of
/// the committed prefix and is the point a failed write is trimmed back to.
///
/// One writer per log: `open` takes an exclusive advisory lock on a
/// `<log>.lock` file next to the log and holds it until the store drops.
/// If a torn write cannot be trimmed the store is poisoned and refuses
/// further writes, since the next append would land after the torn bytes.
pub struct FileBlockStore {
    path: PathBuf,
    file: File,
    len: u64,
    sync_mode: SyncMode,
    poisoned: bool,
    _lock: File,
    #[cfg(test)]
    faults: Faults,
}

/// Write failures injected by tests.
#[cfg(test)]
#[derive(Default)]
struct Faults {
    /// Writes that stop halfway through the line and then fail.
    torn_writes: usize,
    /// Make the trim after a torn write fail too.
    fail_trim: bool,
}

impl FileBlockStore {
    /// Open (or create) the block log at `path`, creating parent directories.
    ///
    /// Fails with [`StoreError::Locked`] while another store holds the log.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_path = lock_path_for(path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if let Err(e) = lock.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(StoreError::Locked { path: lock_path });
            }
            return Err(e.into());
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let len = file.metadata()?.len();

        debug!(path = %path.display(), len, "opened block log");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            sync_mode,
            poisoned: false,
            _lock: lock,
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if self.faults.torn_writes > 0 {
            self.faults.torn_writes -= 1;
            self.file.write_all(&line[..line.len() / 2])?;
            return Err(io::Error::new(io::ErrorKind::Interrupted, "injected torn write"));
        }

        self.file.write_all(line)?;
        self.file.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Cut the file back to the committed prefix.
    fn trim(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if self.faults.fail_trim {
            return Err(io::Error::other("injected trim failure"));
        }

        self.file.set_len(self.len)
    }
}

fn lock_path_for(log: &Path) -> PathBuf {
    let mut name = log.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    log.with_file_name(name)
}

impl BlockStore for FileBlockStore {
    fn load(&mut self) -> StoreResult<Vec<Block>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut blocks = Vec::new();
        let mut buf = String::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            let read = reader.read_line(&mut buf).map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => StoreError::CorruptLine {
                    line: line_no + 1,
                    reason: "line is not valid UTF-8".into(),
                },
                _ => StoreError::Io(e),
            })?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let Some(line) = buf.strip_suffix('\n') else {
                return Err(StoreError::CorruptLine {
                    line: line_no,
                    reason: "missing line terminator (torn write)".into(),
                });
            };
            blocks.push(decode_line(line, line_no)?);
        }

        debug!(path = %self.path.display(), blocks = blocks.len(), "replayed block log");
        Ok(blocks)
    }

    fn persist_block(&mut self, block: &Block) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::Poisoned {
                path: self.path.clone(),
            });
        }
        let line = encode_line(block)?;

        if let Err(e) = self.write_line(&line) {
            // Drop whatever part of this line reached the file.
            if let Err(trim) = self.trim() {
                error!(
                    path = %self.path.display(),
                    len = self.len,
                    write_error = %e,
                    error = %trim,
                    "failed to trim partial block write; refusing further writes"
                );
                self.poisoned = true;
                return Err(StoreError::Poisoned {
                    path: self.path.clone(),
                });
            }
            return Err(e.into());
        }

        self.len += line.len() as u64;
        debug!(index = block.index, bytes = line.len(), "block persisted");
        Ok(())
    }

    fn storage_bytes(&self) -> StoreResult<u64> {
        Ok(self.len)
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
