use std::path::PathBuf;

use clap::Parser;

use recdvb::config::{DEFAULT_ADAPTERS_CONFIG, DEFAULT_CHANNELS_CONFIG};

#[derive(Debug, Parser)]
#[clap(name = "recdvb")]
#[clap(about = "recdvb records an ISDB-T transport stream from a Linux DVB adapter.", long_about = None)]
#[clap(version)]
pub(crate) struct Cli {
    /// The channel id.{n}
    /// The id is looked up in the channel table.
    #[clap(allow_negative_numbers = true)]
    pub(crate) channel: i32,

    /// The duration of the recording in seconds.{n}
    /// It can be extended while recording with `recdvbctl extend`.
    #[clap(value_name = "SECONDS")]
    pub(crate) duration: u64,

    /// The location of the output.{n}
    /// If '-' is specified, the recording will be redirected to
    /// stdout.
    pub(crate) output: String,

    /// The adapter list.
    #[clap(long, value_name = "PATH", default_value = DEFAULT_ADAPTERS_CONFIG)]
    pub(crate) adapters_config: PathBuf,

    /// The channel table.
    #[clap(long, value_name = "PATH", default_value = DEFAULT_CHANNELS_CONFIG)]
    pub(crate) channels_config: PathBuf,

    /// Enable debug logging.
    #[clap(short, long)]
    pub(crate) verbose: bool,
}

impl Cli {
    pub(crate) fn writes_to_stdout(&self) -> bool {
        self.output == "-"
    }
}
