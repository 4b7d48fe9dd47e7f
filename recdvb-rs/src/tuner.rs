use std::io;
use std::io::Read;
use std::os::fd::AsFd;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::channels::ChannelTable;
use crate::config::AdapterList;

#[cfg(target_os = "linux")]
pub use self::linux::LinuxDvb;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(test)]
pub(crate) mod fake;

/// Number of lock status polls after a tuning request.
pub const LOCK_POLL_ATTEMPTS: u32 = 4;

/// Pause between two lock status polls.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Demodulator family reported by a frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendType {
    Qpsk,
    Qam,
    /// Terrestrial (ISDB-T / DVB-T).
    Ofdm,
    Atsc,
    Unknown(u32),
}

impl From<u32> for FrontendType {
    fn from(value: u32) -> Self {
        match value {
            0 => FrontendType::Qpsk,
            1 => FrontendType::Qam,
            2 => FrontendType::Ofdm,
            3 => FrontendType::Atsc,
            other => FrontendType::Unknown(other),
        }
    }
}

/// Frontend status bits (`fe_status_t`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontendStatus(pub u32);

impl FrontendStatus {
    pub const HAS_SIGNAL: u32 = 0x01;
    pub const HAS_CARRIER: u32 = 0x02;
    pub const HAS_VITERBI: u32 = 0x04;
    pub const HAS_SYNC: u32 = 0x08;
    pub const HAS_LOCK: u32 = 0x10;

    pub fn has_lock(self) -> bool {
        self.0 & Self::HAS_LOCK != 0
    }
}

/// An open frontend device.
pub trait Frontend: Send {
    fn frontend_type(&self) -> io::Result<FrontendType>;

    /// Program frequency and stream id, then commit the tuning request.
    fn set_channel(&self, frequency: u32, stream_id: u32) -> io::Result<()>;

    fn read_status(&self) -> io::Result<FrontendStatus>;
}

/// Access to the devices of DVB adapters.
///
/// Every handle closes its device when dropped.
pub trait DvbBackend: Send {
    type Frontend: Frontend;
    /// A demux with a running full transport stream filter.
    type Demux: Send;
    type Dvr: Read + AsFd + Send;

    fn open_frontend(&self, adapter: &str) -> io::Result<Self::Frontend>;

    /// Open the demux and start passing the whole multiplex to the DVR.
    fn open_demux(&self, adapter: &str) -> io::Result<Self::Demux>;

    fn open_dvr(&self, adapter: &str) -> io::Result<Self::Dvr>;
}

/// Tuner shared between the recording loop and the control listener.
pub type SharedTuner<B> = Arc<Mutex<DeviceTuner<B>>>;

enum TuneOutcome {
    Locked,
    Failed,
    UnknownChannel,
}

/// Adapter selection and tuning state machine.
///
/// Invariant: `demux` is only open while `frontend` is open and locked.
pub struct DeviceTuner<B: DvbBackend> {
    backend: B,
    adapters: AdapterList,
    channels: ChannelTable,
    current_adapter: Option<usize>,
    frontend: Option<B::Frontend>,
    demux: Option<B::Demux>,
    lock_attempts: u32,
    lock_interval: Duration,
}

impl<B: DvbBackend> DeviceTuner<B> {
    pub fn new(backend: B, adapters: AdapterList, channels: ChannelTable) -> Self {
        Self {
            backend,
            adapters,
            channels,
            current_adapter: None,
            frontend: None,
            demux: None,
            lock_attempts: LOCK_POLL_ATTEMPTS,
            lock_interval: LOCK_POLL_INTERVAL,
        }
    }

    /// Override the lock polling budget.
    pub fn with_lock_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.lock_attempts = attempts.max(1);
        self.lock_interval = interval;
        self
    }

    pub fn into_shared(self) -> SharedTuner<B> {
        Arc::new(Mutex::new(self))
    }

    /// Tune to `channel_id`.
    ///
    /// The adapter already in use is retried first. When it fails, its
    /// handles are closed and the adapters are scanned in configured order.
    /// A channel id missing from the table ends the attempt at once.
    pub fn tune(&mut self, channel_id: i32) -> bool {
        if let Some(frontend) = self.frontend.as_ref() {
            match self.tune_frontend(frontend, channel_id) {
                TuneOutcome::Locked => return true,
                TuneOutcome::UnknownChannel => return false,
                TuneOutcome::Failed => {}
            }
            self.close();
        }

        for index in 0..self.adapters.len() {
            let adapter = match self.adapters.get(index) {
                Some(adapter) => adapter,
                None => break,
            };

            let frontend = match self.backend.open_frontend(adapter) {
                Ok(frontend) => frontend,
                Err(e) => {
                    warn!("open({}/frontend0): {}", adapter, e);
                    continue;
                }
            };

            match self.tune_frontend(&frontend, channel_id) {
                TuneOutcome::Locked => {
                    info!("Tuned to channel {} on {}", channel_id, adapter);
                    self.frontend = Some(frontend);
                    self.current_adapter = Some(index);
                    return true;
                }
                TuneOutcome::UnknownChannel => return false,
                TuneOutcome::Failed => {
                    debug!("Giving up on {}", adapter);
                }
            }
        }

        false
    }

    fn tune_frontend(&self, frontend: &B::Frontend, channel_id: i32) -> TuneOutcome {
        match frontend.frontend_type() {
            Ok(FrontendType::Ofdm) => {}
            Ok(other) => {
                warn!("Frontend type {:?} is not a terrestrial demodulator", other);
                return TuneOutcome::Failed;
            }
            Err(e) => {
                warn!("{}", e);
                return TuneOutcome::Failed;
            }
        }

        let channel = match self.channels.get(channel_id) {
            Some(channel) => *channel,
            None => {
                error!("Channel {} is not in the channel table", channel_id);
                return TuneOutcome::UnknownChannel;
            }
        };

        if let Err(e) = frontend.set_channel(channel.frequency, channel.transport_stream_id) {
            warn!("{}", e);
            return TuneOutcome::Failed;
        }

        let mut status = FrontendStatus::default();
        for attempt in 0..self.lock_attempts {
            match frontend.read_status() {
                Ok(s) => status = s,
                Err(e) => warn!("{}", e),
            }
            if status.has_lock() {
                return TuneOutcome::Locked;
            }
            if attempt + 1 < self.lock_attempts {
                std::thread::sleep(self.lock_interval);
            }
        }

        error!(
            "Failed to tune to {} (status {:#04x})",
            channel_id, status.0
        );
        TuneOutcome::Failed
    }

    /// Install the full transport stream filter on the tuned adapter.
    pub fn start_capture(&mut self) -> bool {
        let adapter = match (self.frontend.as_ref(), self.current_adapter_path()) {
            (Some(_), Some(adapter)) => adapter,
            _ => {
                error!("start_capture called before a successful tune");
                return false;
            }
        };

        match self.backend.open_demux(adapter) {
            Ok(demux) => {
                debug!("Capture filter running on {}", adapter);
                self.demux = Some(demux);
                true
            }
            Err(e) => {
                error!("{}/demux0: {}", adapter, e);
                false
            }
        }
    }

    /// Open the DVR device of the tuned adapter.
    pub fn open_dvr(&self) -> io::Result<B::Dvr> {
        let adapter = self.current_adapter_path().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "tuner has not been tuned")
        })?;
        self.backend.open_dvr(adapter)
    }

    pub fn current_adapter(&self) -> Option<usize> {
        self.current_adapter
    }

    /// Path prefix of the adapter last tuned successfully.
    pub fn current_adapter_path(&self) -> Option<&str> {
        self.current_adapter.and_then(|i| self.adapters.get(i))
    }

    pub fn is_capturing(&self) -> bool {
        self.demux.is_some()
    }

    fn close(&mut self) {
        self.demux = None;
        self.frontend = None;
        self.current_adapter = None;
    }
}

impl<B: DvbBackend> std::fmt::Debug for DeviceTuner<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTuner")
            .field("adapters", &self.adapters)
            .field("current_adapter", &self.current_adapter)
            .field("frontend_open", &self.frontend.is_some())
            .field("demux_open", &self.demux.is_some())
            .finish()
    }
}
