//! In-memory DVB backend for tests.
//!
//! Adapters are addressed as `/dev/dvb/adapter<N>`, `N` being the index in
//! the list given to [`FakeBackend::new`]. Every handle is counted so tests
//! can check that nothing leaks across retries.

use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DvbBackend, Frontend, FrontendStatus, FrontendType};

const ADAPTER_PREFIX: &str = "/dev/dvb/adapter";

#[derive(Debug, Clone)]
pub(crate) struct FakeAdapter {
    openable: bool,
    frontend_type: FrontendType,
    /// Status poll (1-based) from which the lock bit is reported.
    locks_after: Option<u32>,
    demux_ok: bool,
    /// Read end handed out (duplicated) as the DVR; `/dev/null` otherwise.
    dvr: Option<Arc<File>>,
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self {
            openable: true,
            frontend_type: FrontendType::Ofdm,
            locks_after: Some(1),
            demux_ok: true,
            dvr: None,
        }
    }
}

impl FakeAdapter {
    pub(crate) fn missing() -> Self {
        Self {
            openable: false,
            ..Self::default()
        }
    }

    pub(crate) fn never_locks(mut self) -> Self {
        self.locks_after = None;
        self
    }

    pub(crate) fn locks_after(mut self, polls: u32) -> Self {
        self.locks_after = Some(polls);
        self
    }

    pub(crate) fn with_type(mut self, frontend_type: FrontendType) -> Self {
        self.frontend_type = frontend_type;
        self
    }

    pub(crate) fn without_demux(mut self) -> Self {
        self.demux_ok = false;
        self
    }

    pub(crate) fn with_dvr(mut self, dvr: File) -> Self {
        self.dvr = Some(Arc::new(dvr));
        self
    }
}

#[derive(Debug, Default)]
struct State {
    adapters: Vec<FakeAdapter>,
    frontends_opened: usize,
    open_frontends: usize,
    open_demuxes: usize,
    status_reads: usize,
    last_tuning: Option<(u32, u32)>,
}

/// Observes and manipulates a [`FakeBackend`] after it moved into a tuner.
#[derive(Debug, Clone)]
pub(crate) struct FakeHandles(Arc<Mutex<State>>);

impl FakeHandles {
    pub(crate) fn frontends_opened(&self) -> usize {
        self.0.lock().frontends_opened
    }

    pub(crate) fn open_frontends(&self) -> usize {
        self.0.lock().open_frontends
    }

    pub(crate) fn open_demuxes(&self) -> usize {
        self.0.lock().open_demuxes
    }

    pub(crate) fn status_reads(&self) -> usize {
        self.0.lock().status_reads
    }

    pub(crate) fn last_tuning(&self) -> Option<(u32, u32)> {
        self.0.lock().last_tuning
    }

    /// Make an adapter lose its ability to lock.
    pub(crate) fn break_adapter(&self, index: usize) {
        self.0.lock().adapters[index].locks_after = None;
    }
}

#[derive(Debug)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub(crate) fn new(adapters: Vec<FakeAdapter>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                adapters,
                ..State::default()
            })),
        }
    }

    pub(crate) fn handles(&self) -> FakeHandles {
        FakeHandles(Arc::clone(&self.state))
    }

    fn adapter(&self, path: &str) -> io::Result<(usize, FakeAdapter)> {
        let index = path
            .strip_prefix(ADAPTER_PREFIX)
            .and_then(|n| n.parse::<usize>().ok());
        let state = self.state.lock();
        match index.and_then(|i| state.adapters.get(i).map(|a| (i, a.clone()))) {
            Some((i, adapter)) if adapter.openable => Ok((i, adapter)),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "No such device")),
        }
    }
}

pub(crate) struct FakeFrontend {
    index: usize,
    state: Arc<Mutex<State>>,
    polls: AtomicU32,
}

impl Frontend for FakeFrontend {
    fn frontend_type(&self) -> io::Result<FrontendType> {
        Ok(self.state.lock().adapters[self.index].frontend_type)
    }

    fn set_channel(&self, frequency: u32, stream_id: u32) -> io::Result<()> {
        self.polls.store(0, Ordering::SeqCst);
        self.state.lock().last_tuning = Some((frequency, stream_id));
        Ok(())
    }

    fn read_status(&self) -> io::Result<FrontendStatus> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        state.status_reads += 1;
        let locked = state.adapters[self.index]
            .locks_after
            .map_or(false, |n| polls >= n);
        Ok(FrontendStatus(if locked {
            FrontendStatus::HAS_SIGNAL | FrontendStatus::HAS_LOCK
        } else {
            FrontendStatus::HAS_SIGNAL
        }))
    }
}

impl Drop for FakeFrontend {
    fn drop(&mut self) {
        self.state.lock().open_frontends -= 1;
    }
}

pub(crate) struct FakeDemux {
    state: Arc<Mutex<State>>,
}

impl Drop for FakeDemux {
    fn drop(&mut self) {
        self.state.lock().open_demuxes -= 1;
    }
}

impl DvbBackend for FakeBackend {
    type Frontend = FakeFrontend;
    type Demux = FakeDemux;
    type Dvr = File;

    fn open_frontend(&self, adapter: &str) -> io::Result<FakeFrontend> {
        let (index, _) = self.adapter(adapter)?;
        let mut state = self.state.lock();
        state.frontends_opened += 1;
        state.open_frontends += 1;
        Ok(FakeFrontend {
            index,
            state: Arc::clone(&self.state),
            polls: AtomicU32::new(0),
        })
    }

    fn open_demux(&self, adapter: &str) -> io::Result<FakeDemux> {
        let (_, config) = self.adapter(adapter)?;
        if !config.demux_ok {
            return Err(io::Error::new(io::ErrorKind::Other, "DMX_SET_PES_FILTER rejected"));
        }
        self.state.lock().open_demuxes += 1;
        Ok(FakeDemux {
            state: Arc::clone(&self.state),
        })
    }

    fn open_dvr(&self, adapter: &str) -> io::Result<File> {
        match self.adapter(adapter)?.1.dvr {
            Some(dvr) => dvr.try_clone(),
            None => File::open("/dev/null"),
        }
    }
}
