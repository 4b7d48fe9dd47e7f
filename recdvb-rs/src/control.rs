//! Unix socket listener accepting control commands for a running session.

use std::fs;
use std::io::{self, Read};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use recdvb_protocol::{control_socket_path, ControlCommand, MAX_COMMAND_SIZE};

use crate::timer::DeadlineTimer;
use crate::tuner::{DvbBackend, SharedTuner};

/// Pause between two accept attempts while nobody is connecting.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a connected client may stay silent.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Listener for `tune` and `extend` commands.
///
/// Connections are served one at a time on the thread calling
/// [`ControlServer::run`]. The socket file is removed when the server is
/// dropped.
pub struct ControlServer<B: DvbBackend> {
    listener: UnixListener,
    path: PathBuf,
    tuner: SharedTuner<B>,
    timer: Arc<DeadlineTimer>,
    running: AtomicBool,
}

impl<B: DvbBackend> ControlServer<B> {
    /// Bind at `path`, replacing a stale socket file left by a previous run.
    pub fn bind<P: Into<PathBuf>>(
        path: P,
        tuner: SharedTuner<B>,
        timer: Arc<DeadlineTimer>,
    ) -> io::Result<Self> {
        let path = path.into();
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;
        info!("Control socket listening on {}", path.display());

        Ok(Self {
            listener,
            path,
            tuner,
            timer,
            running: AtomicBool::new(true),
        })
    }

    /// Bind at the path derived from the adapter the tuner is using.
    pub fn bind_for_adapter(tuner: SharedTuner<B>, timer: Arc<DeadlineTimer>) -> io::Result<Self> {
        let path = {
            let guard = tuner.lock();
            let adapter = guard.current_adapter_path().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "tuner has not been tuned")
            })?;
            control_socket_path(adapter)
        };
        Self::bind(path, tuner, timer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ask [`ControlServer::run`] to return.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Serve connections until [`ControlServer::stop`] is called.
    pub fn run(&self) {
        let mut connection_count = 0u64;

        while self.running.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    connection_count += 1;
                    debug!("[Control {}] Connection accepted", connection_count);
                    if let Err(e) = self.handle_connection(stream) {
                        warn!("[Control {}] {}", connection_count, e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("Failed to accept control connection: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        debug!("Control listener stopped");
    }

    fn handle_connection(&self, mut stream: UnixStream) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let line = read_command(&mut stream)?;
        match ControlCommand::decode(&line) {
            Ok(command) => self.dispatch(command),
            Err(e) => warn!("Ignoring control command {:?}: {}", String::from_utf8_lossy(&line), e),
        }
        Ok(())
    }

    /// Apply one command to the session.
    pub fn dispatch(&self, command: ControlCommand) {
        info!("Control command: {}", command);
        match command {
            ControlCommand::Tune { channel } => {
                let retuned = {
                    let mut tuner = self.tuner.lock();
                    tuner.tune(channel) && tuner.start_capture()
                };
                if !retuned {
                    error!("Retune to channel {} failed, ending the session", channel);
                    self.timer.expire_now();
                }
            }
            ControlCommand::Extend { seconds } => {
                if !self.timer.extend(seconds) {
                    warn!("Could not extend the deadline by {}s", seconds);
                }
            }
        }
    }
}

impl<B: DvbBackend> Drop for ControlServer<B> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("remove({}): {}", self.path.display(), e);
        }
    }
}

/// Read until a newline, end of stream, timeout or the size limit.
fn read_command(stream: &mut UnixStream) -> io::Result<Vec<u8>> {
    let mut buf = [0u8; MAX_COMMAND_SIZE];
    let mut len = 0;

    while len < buf.len() {
        match stream.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => {
                len += n;
                if buf[..len].contains(&b'\n') {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e)
                if len > 0
                    && matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                break
            }
            Err(e) => return Err(e),
        }
    }

    Ok(buf[..len].to_vec())
}
