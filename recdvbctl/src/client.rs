use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;

use log::debug;
use recdvb_protocol::{ClientError, ControlCommand};

/// Deliver one command to the session listening on `path`.
///
/// The session never answers, so success only means the line was written.
pub fn send_command(path: &Path, command: &ControlCommand) -> Result<(), ClientError> {
    let mut stream = UnixStream::connect(path).map_err(|source| ClientError::ConnectionFailed {
        path: path.display().to_string(),
        source,
    })?;
    debug!("Connected to {}", path.display());

    stream
        .write_all(command.encode().as_bytes())
        .map_err(ClientError::SendFailed)?;
    stream.flush().map_err(ClientError::SendFailed)?;
    Ok(())
}
