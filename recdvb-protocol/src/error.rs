//! Error types for the recdvb control protocol.

use thiserror::Error;

/// Errors raised while decoding a control command line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The connection carried no command token at all.
    #[error("Empty command")]
    Empty,

    /// The first token is not a known command.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The command requires an argument that was not given.
    #[error("Command '{0}' requires an argument")]
    MissingArgument(&'static str),

    /// The argument could not be parsed as an integer.
    #[error("Invalid argument for '{command}': {value}")]
    InvalidArgument { command: &'static str, value: String },

    /// The command line exceeds the receive buffer.
    #[error("Command too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),
}

/// Client-side errors that can occur while delivering a command.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The control socket could not be reached.
    #[error("Connection to {path} failed: {source}")]
    ConnectionFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The command line could not be written.
    #[error("Failed to send command: {0}")]
    SendFailed(#[source] std::io::Error),
}
