use super::Command;
use crate::error::{Error, Result};
use bytes::Bytes;

/// Parse command from request arguments, `args[0]` being the name
#[inline(always)]
pub fn parse_command(mut args: Vec<Bytes>) -> Result<Command> {
    if args.is_empty() {
        return Err(Error::EmptyCommand);
    }

    let cmd_name = args.remove(0);

    // Convert to uppercase for case-insensitive matching
    let cmd_upper = cmd_name.to_ascii_uppercase();

    match &cmd_upper[..] {
        b"GET" => {
            let [key] = expect_args::<1>(&cmd_name, args)?;
            Ok(Command::Get(key))
        }

        b"SET" => {
            let [key, value] = expect_args::<2>(&cmd_name, args)?;
            Ok(Command::Set { key, value })
        }

        b"DEL" => {
            let [key] = expect_args::<1>(&cmd_name, args)?;
            Ok(Command::Del(key))
        }

        b"PING" => {
            expect_args::<0>(&cmd_name, args)?;
            Ok(Command::Ping)
        }

        _ => Err(Error::InvalidCommand(
            String::from_utf8_lossy(&cmd_name).to_string(),
        )),
    }
}

/// Check the arity (excluding the name) and destructure the arguments
fn expect_args<const N: usize>(cmd_name: &[u8], args: Vec<Bytes>) -> Result<[Bytes; N]> {
    args.try_into()
        .map_err(|_| Error::WrongArity(String::from_utf8_lossy(cmd_name).to_lowercase()))
}
