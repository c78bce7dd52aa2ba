use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("append-only file error: {0}")]
    Aof(#[source] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("empty command")]
    EmptyCommand,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Convert error to Redis error response
    pub fn to_resp(&self) -> Vec<u8> {
        format!("-{}\r\n", self.reply_text()).into_bytes()
    }

    /// Error reply text without the leading `-` and trailing CRLF
    pub fn reply_text(&self) -> String {
        match self {
            Error::WrongArity(cmd) => {
                format!("ERR wrong number of arguments for '{}' command", cmd)
            }
            Error::InvalidCommand(cmd) => format!("ERR unknown command '{}'", cmd),
            Error::EmptyCommand => "ERR empty command".to_string(),
            _ => format!("ERR {}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_error_names_the_command() {
        let err = Error::WrongArity("set".to_string());
        assert_eq!(
            err.to_resp(),
            b"-ERR wrong number of arguments for 'set' command\r\n".to_vec()
        );
    }

    #[test]
    fn unknown_command_reply() {
        let err = Error::InvalidCommand("foo".to_string());
        assert_eq!(err.to_resp(), b"-ERR unknown command 'foo'\r\n".to_vec());
    }

    #[test]
    fn protocol_error_reply_carries_the_detail() {
        let err = Error::Protocol("expected '*', got 'X'".to_string());
        assert_eq!(
            err.reply_text(),
            "ERR Protocol error: expected '*', got 'X'"
        );
    }
}
