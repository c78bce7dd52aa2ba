use crate::protocol::resp::RespValue;
use bytes::Bytes;

mod executor;
mod parser;

pub use executor::{apply, CommandExecutor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(Bytes),
    Set { key: Bytes, value: Bytes },
    Del(Bytes),
    Ping,
}

impl Command {
    /// Parse command from the decoded request arguments
    #[inline(always)]
    pub fn from_args(args: Vec<Bytes>) -> crate::error::Result<Self> {
        parser::parse_command(args)
    }

    /// Upper-case command name
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get(_) => "GET",
            Command::Set { .. } => "SET",
            Command::Del(_) => "DEL",
            Command::Ping => "PING",
        }
    }

    /// Check if this command mutates the store and must be logged
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Set { .. } | Command::Del(_))
    }

    /// Canonical request encoding, also used for log records
    pub fn to_resp(&self) -> RespValue {
        let name = Bytes::from_static(self.name().as_bytes());
        match self {
            Command::Get(key) | Command::Del(key) => RespValue::request([name, key.clone()]),
            Command::Set { key, value } => {
                RespValue::request([name, key.clone(), value.clone()])
            }
            Command::Ping => RespValue::request([name]),
        }
    }
}
