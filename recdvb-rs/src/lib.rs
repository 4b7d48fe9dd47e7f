//! recdvb library - ISDB-T recording from Linux DVB adapters
//!
//! A session tunes one adapter, captures the whole transport stream into a
//! file until a deadline, and listens on a control socket through which the
//! deadline can be extended or the channel changed.

pub mod channels;
pub mod config;
pub mod control;
pub mod recorder;
pub mod timer;
pub mod tuner;

// Re-export commonly used types
pub use channels::{Channel, ChannelTable};
pub use config::AdapterList;
pub use control::ControlServer;
pub use recorder::{Recorder, RecordingStats};
pub use timer::DeadlineTimer;
pub use tuner::{DeviceTuner, DvbBackend, SharedTuner};
