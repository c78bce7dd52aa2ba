use super::Command;
use crate::aof::{AppendLog, ReplayStats};
use crate::error::Result;
use crate::protocol::resp::RespValue;
use crate::store::Store;
use bytes::Bytes;
use std::path::Path;
use tracing::{error, info, warn};

const PONG: &[u8] = b"PONG";

/// Executes parsed commands against the store
///
/// Mutations are written to the append-only file before they touch the
/// store, so a client only sees `+OK` or `:1` for changes that are durable.
pub struct CommandExecutor {
    store: Store,
    aof: AppendLog,
    commands_processed: u64,
}

impl CommandExecutor {
    pub fn new(store: Store, aof: AppendLog) -> Self {
        Self {
            store,
            aof,
            commands_processed: 0,
        }
    }

    /// Open the append-only file and rebuild the store from it
    pub fn open<P: AsRef<Path>>(aof_path: P) -> Result<Self> {
        let mut aof = AppendLog::open(aof_path)?;
        let mut store = Store::new();

        let stats = replay_into(&mut aof, &mut store)?;
        info!(
            "Restored {} keys from {} ({} records, {} bytes discarded)",
            store.len(),
            aof.path().display(),
            stats.applied,
            stats.discarded_bytes
        );

        Ok(Self::new(store, aof))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn aof(&self) -> &AppendLog {
        &self.aof
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands_processed
    }

    /// Parse and execute one decoded request
    pub fn dispatch(&mut self, args: Vec<Bytes>) -> RespValue {
        match Command::from_args(args) {
            Ok(cmd) => self.execute(cmd),
            Err(e) => RespValue::Error(e.reply_text()),
        }
    }

    /// Execute a command and return RESP response
    pub fn execute(&mut self, cmd: Command) -> RespValue {
        self.commands_processed += 1;

        if cmd.is_write() {
            // A DEL that removes nothing is answered without logging
            if let Command::Del(key) = &cmd {
                if !self.store.contains_key(key) {
                    return RespValue::Integer(0);
                }
            }

            if let Err(e) = self.aof.append(&cmd) {
                error!("Failed to log {}: {}", cmd.name(), e);
                return RespValue::Error(e.reply_text());
            }
        }

        apply(&mut self.store, cmd)
    }

    /// Force the append-only file to disk
    pub fn sync(&mut self) -> Result<()> {
        self.aof.sync()
    }
}

/// Apply a command's effect to the store without logging
pub fn apply(store: &mut Store, cmd: Command) -> RespValue {
    match cmd {
        Command::Get(key) => RespValue::BulkString(store.get(&key).cloned()),

        Command::Set { key, value } => {
            store.set(key, value);
            RespValue::ok()
        }

        Command::Del(key) => RespValue::Integer(i64::from(store.delete(&key))),

        Command::Ping => RespValue::SimpleString(Bytes::from_static(PONG)),
    }
}

/// Replay handler: only SET and DEL records change state
fn replay_into(aof: &mut AppendLog, store: &mut Store) -> Result<ReplayStats> {
    aof.replay(|args| match Command::from_args(args) {
        Ok(cmd) if cmd.is_write() => {
            apply(store, cmd);
            true
        }
        Ok(cmd) => {
            warn!("Ignoring non-mutating {} record in append-only file", cmd.name());
            false
        }
        Err(e) => {
            warn!("Ignoring invalid record in append-only file: {}", e);
            false
        }
    })
}
