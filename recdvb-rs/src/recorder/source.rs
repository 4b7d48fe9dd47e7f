use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};

use log::info;

use crate::tuner::{DvbBackend, SharedTuner};

/// Where captured bytes come from.
pub trait CaptureSource {
    /// Descriptor polled for readability.
    fn as_fd(&self) -> BorrowedFd<'_>;

    /// One read of at most `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Swap in a new descriptor if the underlying device changed.
    ///
    /// Called before every readiness wait. Returns `true` when
    /// [`CaptureSource::as_fd`] now refers to a different descriptor.
    fn refresh(&mut self) -> io::Result<bool> {
        Ok(false)
    }
}

impl CaptureSource for File {
    fn as_fd(&self) -> BorrowedFd<'_> {
        AsFd::as_fd(self)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }
}

/// DVR device of the tuner's current adapter.
///
/// The tuner is locked only to compare adapters and reopen the DVR, never
/// across a device read. When a retune moved capture to another adapter,
/// [`CaptureSource::refresh`] opens that adapter's DVR in place of the old
/// one.
pub struct DvrSource<B: DvbBackend> {
    tuner: SharedTuner<B>,
    adapter: Option<usize>,
    dvr: B::Dvr,
}

impl<B: DvbBackend> DvrSource<B> {
    pub fn open(tuner: SharedTuner<B>) -> io::Result<Self> {
        let (adapter, dvr) = {
            let guard = tuner.lock();
            (guard.current_adapter(), guard.open_dvr()?)
        };
        Ok(Self {
            tuner,
            adapter,
            dvr,
        })
    }

    pub fn adapter(&self) -> Option<usize> {
        self.adapter
    }
}

impl<B: DvbBackend> CaptureSource for DvrSource<B> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.dvr.as_fd()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.dvr.read(buf)
    }

    fn refresh(&mut self) -> io::Result<bool> {
        let tuner = self.tuner.lock();
        let current = tuner.current_adapter();
        if current.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "tuner lost its adapter",
            ));
        }
        if current == self.adapter {
            return Ok(false);
        }

        self.dvr = tuner.open_dvr()?;
        self.adapter = current;
        info!(
            "Capture moved to {}",
            tuner.current_adapter_path().unwrap_or_default()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Channel, ChannelTable};
    use crate::tuner::fake::{FakeAdapter, FakeBackend};
    use crate::tuner::DeviceTuner;
    use std::io::Write;
    use std::time::Duration;

    fn shared_tuner(backend: FakeBackend) -> SharedTuner<FakeBackend> {
        let adapters = vec!["/dev/dvb/adapter0", "/dev/dvb/adapter1"]
            .into_iter()
            .collect();
        let channels: ChannelTable = vec![
            Channel { id: 1, frequency: 100, transport_stream_id: 0 },
            Channel { id: 2, frequency: 200, transport_stream_id: 0 },
        ]
        .into_iter()
        .collect();
        DeviceTuner::new(backend, adapters, channels)
            .with_lock_polling(1, Duration::ZERO)
            .into_shared()
    }

    #[test]
    fn test_open_requires_tuned_adapter() {
        let tuner = shared_tuner(FakeBackend::new(vec![FakeAdapter::default()]));
        assert!(DvrSource::open(tuner).is_err());
    }

    fn pipe() -> (File, File) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        (File::from(read_end), File::from(write_end))
    }

    #[test]
    fn test_follows_retune_to_other_adapter() {
        let (dvr0, mut feed0) = pipe();
        let (dvr1, mut feed1) = pipe();
        let backend = FakeBackend::new(vec![
            FakeAdapter::default().with_dvr(dvr0),
            FakeAdapter::default().with_dvr(dvr1),
        ]);
        let handles = backend.handles();
        let tuner = shared_tuner(backend);
        assert!(tuner.lock().tune(1));

        let mut source = DvrSource::open(tuner.clone()).unwrap();
        assert_eq!(source.adapter(), Some(0));
        assert!(!source.refresh().unwrap());

        let mut buf = [0u8; 16];
        feed0.write_all(b"first").unwrap();
        assert_eq!(source.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"first");

        handles.break_adapter(0);
        assert!(tuner.lock().tune(2));
        assert!(tuner.lock().start_capture());

        // Nothing arrives on the old adapter any more.
        feed1.write_all(b"second").unwrap();
        assert!(source.refresh().unwrap());
        assert_eq!(source.adapter(), Some(1));
        assert_eq!(source.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"second");
        assert!(!source.refresh().unwrap());
    }

    #[test]
    fn test_refresh_fails_after_tuner_closed() {
        let backend = FakeBackend::new(vec![FakeAdapter::default()]);
        let handles = backend.handles();
        let tuner = shared_tuner(backend);
        assert!(tuner.lock().tune(1));
        let mut source = DvrSource::open(tuner.clone()).unwrap();

        handles.break_adapter(0);
        assert!(!tuner.lock().tune(2));

        let err = source.refresh().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
