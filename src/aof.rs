//! Append-only file
//!
//! Every accepted mutation is written as a RESP request frame and synced
//! before the client is answered. On startup the file is decoded frame by
//! frame and fed back into an empty store.

use crate::error::{Error, Result};
use crate::protocol::resp::{parse_request, write_resp_value};
use crate::protocol::Command;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Outcome of a replay pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records the handler applied
    pub applied: usize,
    /// Well-formed records the handler rejected
    pub skipped: usize,
    /// Bytes cut from a truncated or corrupt tail
    pub discarded_bytes: u64,
}

/// Exclusive handle on the append-only file
pub struct AppendLog {
    file: File,
    path: PathBuf,
    /// Length of the durable, well-formed prefix
    len: u64,
    scratch: Vec<u8>,
}

impl AppendLog {
    /// Open or create the log; failure here is fatal at startup
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(Error::Aof)?;
        let len = file.metadata().map_err(Error::Aof)?.len();

        debug!("Opened append-only file {} ({} bytes)", path.display(), len);

        Ok(Self {
            file,
            path,
            len,
            scratch: Vec::with_capacity(256),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the log in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one command and force it to stable storage
    ///
    /// On failure the file is cut back to its previous length so a
    /// half-written record never precedes later appends.
    pub fn append(&mut self, command: &Command) -> Result<()> {
        self.scratch.clear();
        write_resp_value(&mut self.scratch, &command.to_resp());

        let written = self
            .file
            .write_all(&self.scratch)
            .and_then(|_| self.file.sync_all());

        if let Err(e) = written {
            if let Err(trunc) = self.file.set_len(self.len) {
                warn!(
                    "Could not cut partial record from {}: {}",
                    self.path.display(),
                    trunc
                );
            }
            return Err(Error::Aof(e));
        }

        self.len += self.scratch.len() as u64;
        Ok(())
    }

    /// Flush file contents and metadata
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all().map_err(Error::Aof)
    }

    /// Decode every record from the start of the file, in order
    ///
    /// `apply` receives each record's arguments and returns whether it was
    /// applied. A truncated or malformed tail ends the replay: it is logged,
    /// cut from the file, and everything before it is kept. A malformed
    /// record with complete records behind it is an error and the file is
    /// left untouched.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<ReplayStats>
    where
        F: FnMut(Vec<Bytes>) -> bool,
    {
        let mut data = Vec::new();
        self.file.seek(SeekFrom::Start(0)).map_err(Error::Aof)?;
        self.file.read_to_end(&mut data).map_err(Error::Aof)?;

        let mut stats = ReplayStats::default();
        let mut pos = 0;

        while pos < data.len() {
            match parse_request(&data[pos..]) {
                Ok(Some((args, consumed))) => {
                    if apply(args) {
                        stats.applied += 1;
                    } else {
                        stats.skipped += 1;
                    }
                    pos += consumed;
                }
                Ok(None) => {
                    warn!(
                        "Append-only file {} ends with an incomplete record at offset {}",
                        self.path.display(),
                        pos
                    );
                    break;
                }
                Err(e) => {
                    // Acknowledged records past the damage must never be cut
                    if has_record_after(&data[pos..]) {
                        error!(
                            "Append-only file {} is corrupt at offset {}: {}",
                            self.path.display(),
                            pos,
                            e
                        );
                        return Err(Error::Aof(io::Error::new(
                            ErrorKind::InvalidData,
                            format!("corrupt record at offset {} followed by valid records", pos),
                        )));
                    }
                    warn!(
                        "Append-only file {} has a malformed record at offset {}: {}",
                        self.path.display(),
                        pos,
                        e
                    );
                    break;
                }
            }
        }

        if pos < data.len() {
            stats.discarded_bytes = (data.len() - pos) as u64;
            self.file.set_len(pos as u64).map_err(Error::Aof)?;
            self.file.sync_all().map_err(Error::Aof)?;
            warn!(
                "Discarded {} trailing bytes from {}",
                stats.discarded_bytes,
                self.path.display()
            );
        }
        self.len = pos as u64;

        info!(
            "Replayed {} records from {} ({} skipped)",
            stats.applied,
            self.path.display(),
            stats.skipped
        );

        Ok(stats)
    }
}

/// Whether a complete record starts anywhere past the first byte
fn has_record_after(data: &[u8]) -> bool {
    data.iter()
        .enumerate()
        .skip(1)
        .filter(|&(_, &b)| b == b'*')
        .any(|(i, _)| matches!(parse_request(&data[i..]), Ok(Some(_))))
}
