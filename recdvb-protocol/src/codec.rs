//! Encoding and decoding of control command lines.
//!
//! ```text
//! <command> SP <integer> LF
//! ```
//!
//! Only the first two whitespace-delimited tokens are significant; anything
//! after the argument is ignored.

use crate::error::ProtocolError;

/// Maximum number of bytes the server reads from one connection.
pub const MAX_COMMAND_SIZE: usize = 256;

const TUNE: &str = "tune";
const EXTEND: &str = "extend";

/// A command sent to a running recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Retune the session to another channel.
    Tune { channel: i32 },
    /// Move the session deadline by the given number of seconds.
    Extend { seconds: i64 },
}

impl ControlCommand {
    /// Command keyword as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Tune { .. } => TUNE,
            ControlCommand::Extend { .. } => EXTEND,
        }
    }

    /// Encode into a newline-terminated line.
    pub fn encode(&self) -> String {
        match self {
            ControlCommand::Tune { channel } => format!("{} {}\n", TUNE, channel),
            ControlCommand::Extend { seconds } => format!("{} {}\n", EXTEND, seconds),
        }
    }

    /// Decode a command from the bytes received on a connection.
    pub fn decode(input: &[u8]) -> Result<Self, ProtocolError> {
        if input.len() > MAX_COMMAND_SIZE {
            return Err(ProtocolError::TooLarge(input.len(), MAX_COMMAND_SIZE));
        }

        let text = String::from_utf8_lossy(input);
        let mut tokens = text.split_whitespace();
        let command = tokens.next().ok_or(ProtocolError::Empty)?;
        let argument = tokens.next();

        match command {
            TUNE => {
                let channel = parse_argument(TUNE, argument)?;
                Ok(ControlCommand::Tune { channel })
            }
            EXTEND => {
                let seconds = parse_argument(EXTEND, argument)?;
                Ok(ControlCommand::Extend { seconds })
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_argument<T: std::str::FromStr>(
    command: &'static str,
    argument: Option<&str>,
) -> Result<T, ProtocolError> {
    let value = argument.ok_or(ProtocolError::MissingArgument(command))?;
    value.parse().map_err(|_| ProtocolError::InvalidArgument {
        command,
        value: value.to_string(),
    })
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlCommand::Tune { channel } => write!(f, "{} {}", TUNE, channel),
            ControlCommand::Extend { seconds } => write!(f, "{} {}", EXTEND, seconds),
        }
    }
}
