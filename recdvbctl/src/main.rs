use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};
use env_logger::Env;
use log::error;
use recdvb_protocol::{control_socket_path, ControlCommand};

mod client;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Retune the session to channel N.
    Tune,
    /// Move the session deadline by N seconds.
    Extend,
}

#[derive(Debug, Parser)]
#[clap(name = "recdvbctl")]
#[clap(about = "Control a running recdvb session.", long_about = None)]
#[clap(version)]
#[clap(group(ArgGroup::new("target").args(&["socket", "adapter"]).required(true)))]
struct Cli {
    /// The control socket of the session.
    #[clap(long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// The adapter the session records from.{n}
    /// The control socket path is derived from it.
    #[clap(long, value_name = "ADAPTER_PATH")]
    adapter: Option<String>,

    #[clap(value_enum)]
    action: Action,

    /// Channel id for `tune`, seconds for `extend`.
    #[clap(allow_negative_numbers = true)]
    value: i64,
}

impl Cli {
    fn socket_path(&self) -> Option<PathBuf> {
        match (&self.socket, &self.adapter) {
            (Some(socket), _) => Some(socket.clone()),
            (None, Some(adapter)) => Some(control_socket_path(adapter)),
            (None, None) => None,
        }
    }

    fn command(&self) -> Option<ControlCommand> {
        match self.action {
            Action::Tune => i32::try_from(self.value)
                .ok()
                .map(|channel| ControlCommand::Tune { channel }),
            Action::Extend => Some(ControlCommand::Extend { seconds: self.value }),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    std::process::exit(run(Cli::parse()));
}

fn run(cli: Cli) -> i32 {
    let path = match cli.socket_path() {
        Some(path) => path,
        None => {
            error!("Specify --socket or --adapter");
            return 1;
        }
    };
    let command = match cli.command() {
        Some(command) => command,
        None => {
            error!("Channel id out of range: {}", cli.value);
            return 1;
        }
    };

    match client::send_command(&path, &command) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_derives_socket_path() {
        let cli = Cli::try_parse_from(["recdvbctl", "--adapter", "/dev/dvb/adapter1", "extend", "600"])
            .unwrap();
        assert_eq!(
            cli.socket_path(),
            Some(PathBuf::from("/tmp/recdvb_dev_dvb_adapter1.sock"))
        );
        assert_eq!(cli.command(), Some(ControlCommand::Extend { seconds: 600 }));
    }

    #[test]
    fn test_negative_extension() {
        let cli = Cli::try_parse_from(["recdvbctl", "--socket", "/tmp/s.sock", "extend", "-60"]).unwrap();
        assert_eq!(cli.command(), Some(ControlCommand::Extend { seconds: -60 }));
    }

    #[test]
    fn test_tune_range() {
        let cli = Cli::try_parse_from(["recdvbctl", "--socket", "/tmp/s.sock", "tune", "27"]).unwrap();
        assert_eq!(cli.command(), Some(ControlCommand::Tune { channel: 27 }));

        let cli = Cli::try_parse_from(["recdvbctl", "--socket", "/tmp/s.sock", "tune", "4294967296"])
            .unwrap();
        assert_eq!(cli.command(), None);
    }

    #[test]
    fn test_target_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["recdvbctl", "tune", "27"]).is_err());
        assert!(Cli::try_parse_from([
            "recdvbctl",
            "--socket",
            "/tmp/s.sock",
            "--adapter",
            "/dev/dvb/adapter0",
            "tune",
            "27"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["recdvbctl", "--socket", "/tmp/s.sock", "stop", "1"]).is_err());
    }

    #[test]
    fn test_missing_session_exits_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("absent.sock");
        let cli = Cli::try_parse_from(["recdvbctl", "--socket", socket.to_str().unwrap(), "extend", "10"])
            .unwrap();
        assert_eq!(run(cli), 1);
    }
}
