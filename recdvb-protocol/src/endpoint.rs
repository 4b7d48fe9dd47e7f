//! Control socket location.

use std::path::PathBuf;

/// Leading part of every control socket path.
pub const SOCKET_PATH_PREFIX: &str = "/tmp/recdvb";

/// Trailing part of every control socket path.
pub const SOCKET_PATH_SUFFIX: &str = ".sock";

/// Character substituted for path separators in the adapter path.
const SEPARATOR_FILLER: char = '_';

/// Derive the control socket path of the session recording from `adapter`.
///
/// Sessions on different adapters get different sockets, so several
/// recordings can run side by side.
pub fn control_socket_path(adapter: &str) -> PathBuf {
    let mangled: String = adapter
        .chars()
        .map(|c| if c == '/' { SEPARATOR_FILLER } else { c })
        .collect();
    PathBuf::from(format!("{}{}{}", SOCKET_PATH_PREFIX, mangled, SOCKET_PATH_SUFFIX))
}
