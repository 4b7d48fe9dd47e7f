use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use recdvb::config::{load_adapters, load_channels};
use recdvb::recorder::{DvrSource, Recorder};
use recdvb::tuner::{DeviceTuner, LinuxDvb};
use recdvb::{ControlServer, DeadlineTimer};

use crate::context::Cli;

mod context;
mod logging;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let adapters = match load_adapters(&cli.adapters_config) {
        Ok(adapters) => adapters,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };
    let channels = match load_channels(&cli.channels_config) {
        Ok(channels) => channels,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let tuner = DeviceTuner::new(LinuxDvb, adapters, channels).into_shared();
    {
        let mut tuner = tuner.lock();
        if !tuner.tune(cli.channel) {
            error!("Cannot tune to channel {} on any adapter", cli.channel);
            return 1;
        }
        if !tuner.start_capture() {
            return 1;
        }
    }

    let timer = match DeadlineTimer::new(Duration::from_secs(cli.duration)) {
        Ok(timer) => Arc::new(timer),
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    {
        let timer = Arc::clone(&timer);
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Interrupted, finishing the recording");
            timer.expire_now();
        }) {
            warn!("Cannot install the signal handler: {}", e);
        }
    }

    let source = match DvrSource::open(Arc::clone(&tuner)) {
        Ok(source) => source,
        Err(e) => {
            error!("open(dvr0): {}", e);
            return 1;
        }
    };

    let sink: Box<dyn Write + Send> = if cli.writes_to_stdout() {
        Box::new(io::stdout())
    } else {
        match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&cli.output)
        {
            Ok(file) => Box::new(file),
            Err(e) => {
                error!("open({}): {}", cli.output, e);
                return 1;
            }
        }
    };

    let control = match ControlServer::bind_for_adapter(Arc::clone(&tuner), Arc::clone(&timer)) {
        Ok(control) => Some(control),
        Err(e) => {
            warn!("Control socket unavailable: {}", e);
            None
        }
    };

    let result = thread::scope(|s| {
        if let Some(control) = control.as_ref() {
            s.spawn(move || control.run());
        }
        let result = Recorder::new(source, sink, timer).run();
        if let Some(control) = control.as_ref() {
            control.stop();
        }
        result
    });
    drop(control);

    match result {
        Ok(stats) => {
            info!(
                "Saved {} bytes to {}",
                stats.bytes_written,
                if cli.writes_to_stdout() { "stdout" } else { cli.output.as_str() }
            );
            0
        }
        Err(e) => {
            error!("Recording output could not be flushed: {}", e);
            1
        }
    }
}
