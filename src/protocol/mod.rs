//! RESP framing and command dispatch

pub mod command;
pub mod resp;

pub use command::{Command, CommandExecutor};
pub use resp::{RespParser, RespValue};
