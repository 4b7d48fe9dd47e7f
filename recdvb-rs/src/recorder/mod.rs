//! Poll-driven capture from the DVR device to the output sink.
//!
//! The calling thread waits for readiness of the capture source and the
//! deadline timer, turning each readable event into one [`Chunk`]. A scoped
//! writer thread drains the [`ChunkQueue`] into the sink independently, so a
//! slow sink never delays reads. When the deadline fires the source is
//! closed and the writer flushes whatever is still queued before returning.

mod chunk;
mod source;

use std::fmt;
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::timer::DeadlineTimer;

pub use self::chunk::{Chunk, ChunkQueue};
pub use self::source::{CaptureSource, DvrSource};

/// Largest single read from the DVR device.
pub const CHUNK_SIZE: usize = 131_072;

/// Upper bound of one readiness wait.
///
/// The capture source is refreshed between waits, so this also bounds how
/// late a retune to another adapter is picked up.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Writer pause when the queue is empty.
pub const WRITER_BACKOFF: Duration = Duration::from_millis(100);

/// Counters of one recording session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordingStats {
    pub bytes_read: u64,
    pub chunks_read: u64,
    pub read_errors: u64,
    pub bytes_written: u64,
    /// Chunks discarded after a write error.
    pub dropped_chunks: u64,
    pub peak_queue_depth: usize,
}

impl fmt::Display for RecordingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read {} bytes in {} chunks ({} errors), wrote {} bytes, dropped {} chunks, peak queue {}",
            self.bytes_read,
            self.chunks_read,
            self.read_errors,
            self.bytes_written,
            self.dropped_chunks,
            self.peak_queue_depth
        )
    }
}

#[derive(Debug, Default)]
struct WriterStats {
    bytes_written: u64,
    dropped_chunks: u64,
}

/// One capture session.
pub struct Recorder<S, W> {
    source: S,
    sink: W,
    timer: Arc<DeadlineTimer>,
    chunk_size: usize,
    poll_timeout: Duration,
    writer_backoff: Duration,
}

impl<S, W> Recorder<S, W>
where
    S: CaptureSource,
    W: Write + Send,
{
    pub fn new(source: S, sink: W, timer: Arc<DeadlineTimer>) -> Self {
        Self {
            source,
            sink,
            timer,
            chunk_size: CHUNK_SIZE,
            poll_timeout: POLL_TIMEOUT,
            writer_backoff: WRITER_BACKOFF,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_writer_backoff(mut self, backoff: Duration) -> Self {
        self.writer_backoff = backoff;
        self
    }

    /// Record until the deadline fires.
    ///
    /// Read and write failures are absorbed and counted. The only error
    /// returned is a failure to flush the sink at the very end.
    pub fn run(self) -> io::Result<RecordingStats> {
        let Recorder {
            mut source,
            sink,
            timer,
            chunk_size,
            poll_timeout,
            writer_backoff,
        } = self;

        let queue = ChunkQueue::new();
        let active = AtomicBool::new(true);
        let mut stats = RecordingStats::default();

        info!("Recording started");
        let (writer_stats, flushed) = thread::scope(|s| {
            let writer = s.spawn(|| write_loop(&queue, &active, sink, writer_backoff));

            read_loop(
                &mut source,
                &timer,
                &queue,
                chunk_size,
                poll_timeout,
                &mut stats,
            );
            drop(source);
            debug!("Capture source closed, draining {} chunk(s)", queue.len());
            active.store(false, Ordering::Release);

            writer.join().unwrap_or_else(|_| {
                (
                    WriterStats::default(),
                    Err(io::Error::new(io::ErrorKind::Other, "writer thread panicked")),
                )
            })
        });

        stats.bytes_written = writer_stats.bytes_written;
        stats.dropped_chunks = writer_stats.dropped_chunks;
        stats.peak_queue_depth = queue.peak_depth();
        info!("Recording finished: {}", stats);

        flushed.map(|_| stats)
    }
}

fn to_poll_timeout(timeout: Duration) -> PollTimeout {
    let millis = timeout.as_millis().min(u128::from(u16::MAX)) as u16;
    PollTimeout::from(millis)
}

fn read_loop<S: CaptureSource>(
    source: &mut S,
    timer: &DeadlineTimer,
    queue: &ChunkQueue,
    chunk_size: usize,
    timeout: Duration,
    stats: &mut RecordingStats,
) {
    let timeout = to_poll_timeout(timeout);
    let readable = PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP;
    // Set when the source hung up with nothing left to read. Only the timer
    // is polled until a refresh hands over another descriptor.
    let mut hung_up = false;

    loop {
        match source.refresh() {
            Ok(true) => hung_up = false,
            Ok(false) => {}
            Err(e) => {
                warn!("Capture source unavailable: {}", e);
                stats.read_errors += 1;
            }
        }

        let (timer_fired, source_events) = {
            let mut fds = vec![PollFd::new(timer.as_fd(), PollFlags::POLLIN)];
            if !hung_up {
                fds.push(PollFd::new(source.as_fd(), PollFlags::POLLIN));
            }
            match poll(&mut fds, timeout) {
                Ok(0) => {
                    trace!("No data from the capture source");
                    continue;
                }
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!("poll: {}", e);
                    continue;
                }
            }
            (
                fds[0]
                    .revents()
                    .map_or(false, |r| r.contains(PollFlags::POLLIN)),
                fds.get(1)
                    .and_then(|fd| fd.revents())
                    .unwrap_or_else(PollFlags::empty),
            )
        };

        if source_events.intersects(readable) {
            let n = read_chunk(source, queue, chunk_size, stats);
            if n == 0 && !source_events.contains(PollFlags::POLLIN) {
                info!("Capture source hung up");
                hung_up = true;
            }
        }

        if timer_fired {
            debug!("Deadline reached");
            return;
        }
    }
}

/// One read into a fresh chunk. Returns the number of bytes queued.
fn read_chunk<S: CaptureSource>(
    source: &mut S,
    queue: &ChunkQueue,
    chunk_size: usize,
    stats: &mut RecordingStats,
) -> usize {
    let mut buf = BytesMut::zeroed(chunk_size);
    match source.read(&mut buf) {
        Ok(0) => {
            trace!("Empty read");
            0
        }
        Ok(n) => {
            buf.truncate(n);
            queue.push(Chunk::new(buf.freeze()));
            stats.bytes_read += n as u64;
            stats.chunks_read += 1;
            trace!("Queued {} bytes", n);
            n
        }
        Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
        Err(e) => {
            warn!("read(dvr): {}", e);
            stats.read_errors += 1;
            0
        }
    }
}

/// Drain the queue into `sink` until the reader is done and nothing is left.
fn write_loop<W: Write>(
    queue: &ChunkQueue,
    active: &AtomicBool,
    mut sink: W,
    backoff: Duration,
) -> (WriterStats, io::Result<()>) {
    let mut stats = WriterStats::default();

    loop {
        // Read before popping so a chunk pushed just before shutdown is seen.
        let running = active.load(Ordering::Acquire);
        if !write_front(queue, &mut sink, &mut stats) {
            if !running {
                break;
            }
            thread::sleep(backoff);
        }
    }

    let flushed = sink.flush();
    if let Err(e) = &flushed {
        warn!("flush(output): {}", e);
    }
    (stats, flushed)
}

/// Write once from the head chunk. Returns `false` if the queue was empty.
fn write_front<W: Write>(queue: &ChunkQueue, sink: &mut W, stats: &mut WriterStats) -> bool {
    let mut chunk = match queue.pop() {
        Some(chunk) => chunk,
        None => return false,
    };

    match sink.write(chunk.unwritten()) {
        Ok(0) => {
            warn!("write(output): {}", io::Error::from(io::ErrorKind::WriteZero));
            stats.dropped_chunks += 1;
        }
        Ok(n) => {
            chunk.advance(n);
            stats.bytes_written += n as u64;
            if !chunk.is_written() {
                queue.requeue(chunk);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::Interrupted => queue.requeue(chunk),
        Err(e) => {
            warn!("write(output): {}", e);
            stats.dropped_chunks += 1;
        }
    }
    true
}
