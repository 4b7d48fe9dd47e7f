//! Control protocol for a running recdvb session.
//!
//! A recording session listens on a Unix domain socket whose path is derived
//! from the adapter it captures from. A client connects, writes exactly one
//! command line and disconnects. Nothing is ever written back.
//!
//! # Wire Format
//!
//! ```text
//! tune <channel_id>\n
//! extend <seconds>\n
//! ```
//!
//! # Example
//!
//! ```rust
//! use recdvb_protocol::{control_socket_path, ControlCommand};
//!
//! let path = control_socket_path("/dev/dvb/adapter0");
//! assert_eq!(path.to_str(), Some("/tmp/recdvb_dev_dvb_adapter0.sock"));
//!
//! let line = ControlCommand::Extend { seconds: 10 }.encode();
//! assert_eq!(line, "extend 10\n");
//! assert_eq!(
//!     ControlCommand::decode(line.as_bytes()).unwrap(),
//!     ControlCommand::Extend { seconds: 10 }
//! );
//! ```

pub mod codec;
pub mod endpoint;
pub mod error;

pub use codec::{ControlCommand, MAX_COMMAND_SIZE};
pub use endpoint::{control_socket_path, SOCKET_PATH_PREFIX, SOCKET_PATH_SUFFIX};
pub use error::{ClientError, ProtocolError};
