//! Extendable one-shot deadline backed by a timerfd.
//!
//! The timer is armed on an absolute `CLOCK_MONOTONIC` time, so every
//! extension moves the deadline relative to the previously armed one rather
//! than to the moment the extension arrives. The descriptor becomes readable
//! once the deadline passes and can be polled alongside device handles.

use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::time::{TimeSpec, TimeValLike};
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use parking_lot::Mutex;
use thiserror::Error;

/// Errors raised while creating the timer.
#[derive(Error, Debug)]
pub enum TimerError {
    #[error("clock_gettime failed: {0}")]
    Clock(#[source] Errno),

    #[error("timerfd_create failed: {0}")]
    Create(#[source] Errno),

    #[error("timerfd_settime failed: {0}")]
    Arm(#[source] Errno),

    #[error("deadline {0:?} from now is out of range")]
    OutOfRange(Duration),
}

/// Latest representable deadline, in seconds of `CLOCK_MONOTONIC`.
///
/// `TimeSpec` arithmetic goes through an `i64` nanosecond count, so
/// anything past this would overflow.
const MAX_DEADLINE_SECS: u64 = (i64::MAX / 1_000_000_000 - 1) as u64;

/// One recording session's deadline.
///
/// Shared between the recording loop, which polls [`AsFd::as_fd`], and the
/// control listener, which calls [`DeadlineTimer::extend`].
pub struct DeadlineTimer {
    fd: TimerFd,
    /// Absolute monotonic expiration currently armed.
    expires_at: Mutex<TimeSpec>,
}

impl DeadlineTimer {
    /// Arm a deadline `duration` from now.
    pub fn new(duration: Duration) -> Result<Self, TimerError> {
        let now = monotonic_now().map_err(TimerError::Clock)?;
        let expires_at = to_duration(now)
            .checked_add(duration)
            .and_then(to_timespec)
            .ok_or(TimerError::OutOfRange(duration))?;

        let fd = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::empty())
            .map_err(TimerError::Create)?;
        fd.set(
            Expiration::OneShot(expires_at),
            TimerSetTimeFlags::TFD_TIMER_ABSTIME,
        )
        .map_err(TimerError::Arm)?;

        debug!("Deadline armed {}s from now", duration.as_secs());
        Ok(Self {
            fd,
            expires_at: Mutex::new(expires_at),
        })
    }

    /// Absolute monotonic time of the armed deadline.
    pub fn expires_at(&self) -> Duration {
        to_duration(*self.expires_at.lock())
    }

    /// Time left before the deadline, or `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        let now = monotonic_now().ok()?;
        let expires_at = *self.expires_at.lock();
        if expires_at > now {
            Some(to_duration(expires_at - now))
        } else {
            None
        }
    }

    /// Move the deadline by `delta_secs` (negative values bring it forward).
    ///
    /// Returns `false` and leaves the deadline untouched when the timer
    /// cannot be queried or re-armed, or when the moved deadline would fall
    /// before the clock's epoch or past [`MAX_DEADLINE_SECS`].
    pub fn extend(&self, delta_secs: i64) -> bool {
        let mut expires_at = self.expires_at.lock();

        if let Err(e) = self.fd.get() {
            warn!("timerfd_gettime failed: {}", e);
            return false;
        }

        let next = match shift(*expires_at, delta_secs) {
            Some(next) => next,
            None => {
                warn!("Deadline cannot be moved by {}s", delta_secs);
                return false;
            }
        };
        if let Err(e) = self
            .fd
            .set(Expiration::OneShot(next), TimerSetTimeFlags::TFD_TIMER_ABSTIME)
        {
            warn!("timerfd_settime failed: {}", e);
            return false;
        }

        *expires_at = next;
        info!(
            "Deadline extended by {}s ({}s remaining)",
            delta_secs,
            self.remaining_at(next).as_secs()
        );
        true
    }

    /// Fire the deadline immediately, ending the session.
    pub fn expire_now(&self) -> bool {
        let mut expires_at = self.expires_at.lock();
        let now = match monotonic_now() {
            Ok(now) => now,
            Err(e) => {
                warn!("clock_gettime failed: {}", e);
                return false;
            }
        };

        // A zero it_value would disarm the timer instead of firing it.
        if let Err(e) = self.fd.set(
            Expiration::OneShot(TimeSpec::nanoseconds(1)),
            TimerSetTimeFlags::empty(),
        ) {
            warn!("timerfd_settime failed: {}", e);
            return false;
        }

        *expires_at = now;
        true
    }

    /// Whether the deadline has fired. Never blocks.
    pub fn has_fired(&self) -> bool {
        let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(n) if n > 0 => fds[0]
                .revents()
                .map_or(false, |r| r.contains(PollFlags::POLLIN)),
            _ => false,
        }
    }

    fn remaining_at(&self, expires_at: TimeSpec) -> Duration {
        match monotonic_now() {
            Ok(now) if expires_at > now => to_duration(expires_at - now),
            _ => Duration::ZERO,
        }
    }
}

impl AsFd for DeadlineTimer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl std::fmt::Debug for DeadlineTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineTimer")
            .field("expires_at", &self.expires_at())
            .finish_non_exhaustive()
    }
}

fn monotonic_now() -> Result<TimeSpec, Errno> {
    nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC)
}

fn to_duration(ts: TimeSpec) -> Duration {
    Duration::new(ts.tv_sec().max(0) as u64, ts.tv_nsec().max(0) as u32)
}

fn to_timespec(d: Duration) -> Option<TimeSpec> {
    if d.as_secs() > MAX_DEADLINE_SECS {
        return None;
    }
    let secs = nix::libc::time_t::try_from(d.as_secs()).ok()?;
    Some(TimeSpec::new(secs, d.subsec_nanos() as _))
}

fn shift(expires_at: TimeSpec, delta_secs: i64) -> Option<TimeSpec> {
    let current = to_duration(expires_at);
    let delta = Duration::from_secs(delta_secs.unsigned_abs());
    let next = if delta_secs < 0 {
        current.checked_sub(delta)?
    } else {
        current.checked_add(delta)?
    };
    to_timespec(next)
}
